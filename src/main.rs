mod config;
mod errors;
mod logging;
mod metadataservice;
mod utils;

use crate::config::ConfigStore;
use crate::errors::Error;
use crate::utils::get_version_string;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args: Vec<String> = env::args().collect();

    if args.contains(&String::from("--version")) {
        println!("{}", get_version_string());
        return Ok(());
    }

    // Keep the provider alive for as long as traces should be exported
    let _provider = logging::setup_tracing()?;
    info!("Starting metadata server {}", get_version_string());

    let config_path = args
        .iter()
        .skip(1)
        .find(|arg| !arg.starts_with("--"))
        .map(PathBuf::from);
    let store = Arc::new(ConfigStore::load(config_path)?);
    metadataservice::run(store).await
}
