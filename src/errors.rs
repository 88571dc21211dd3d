use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Configuration
    #[error("Configuration key {0} is not set")]
    ConfigKeyMissing(String),
    #[error("Failed to read configuration file {path:?}: {source}")]
    ConfigFileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed configuration file {path:?}: {reason}")]
    ConfigMalformed { path: PathBuf, reason: String },
    #[error("Invalid listen address {0}")]
    InvalidListenAddress(String),

    // Metadata
    #[error("Error rendering template: {0}")]
    Template(#[from] askama::Error),

    // HTTP
    #[error("Failed to bind metadata server: {0}")]
    Bind(#[from] warp::Error),
    #[error("Failed to install signal handler: {0}")]
    Signal(std::io::Error),

    // Tracing
    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("Failed to set up OTLP exporter: {0}")]
    Otlp(#[from] opentelemetry::trace::TraceError),
}
