use askama::Template;

use crate::config::{Configuration, DEFAULT_PUBLIC_KEY, PASSWORD};
use crate::errors::Error;

/// cloud-init user-data. Values are inserted as-is, without any YAML quoting.
#[derive(Template)]
#[template(path = "user-data.yml", escape = "none")]
pub struct UserDataTemplate<'a> {
    pub hostname: &'a str,
    pub password: &'a str,
    pub public_key: &'a str,
}

/// Render the user-data document for the given hostname. The template itself ends without a
/// newline, so the document ends with the default public key exactly as configured.
pub fn render(config: &Configuration, hostname: &str) -> Result<String, Error> {
    let template = UserDataTemplate {
        hostname: hostname.trim_end_matches('\n'),
        password: config.require(PASSWORD)?,
        public_key: config.require(DEFAULT_PUBLIC_KEY)?,
    };
    Ok(template.render()?)
}
