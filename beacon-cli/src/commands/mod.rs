pub mod completion;
pub mod config;
pub mod follow;
pub mod messages;
pub mod notifications;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use shared::{config::server::Config, models::Identity};

use crate::client::ApiClient;

/// Who to act as and where the server lives. Shared by every command that
/// talks to the API.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Identity to act as. The server trusts it as if the auth gateway had
    /// verified it.
    #[arg(long = "as", value_name = "IDENTITY")]
    pub identity: String,

    /// Server base URL. Defaults to the configured public URL, then
    /// `http://localhost:<port>`.
    #[arg(long)]
    pub server: Option<String>,

    /// Configuration file (yaml, json, or toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

impl ConnectionArgs {
    /// Loads configuration and builds a client for this identity.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the server URL
    /// does not parse.
    pub fn connect(&self) -> Result<(Config, ApiClient)> {
        let config = Config::load_config(self.config.clone(), None)?;
        let server = ApiClient::server_url(self.server.as_deref(), &config);
        let client = ApiClient::new(
            &server,
            Identity::from(self.identity.as_str()),
            &config.auth.identity_header,
        )?;
        Ok((config, client))
    }
}
