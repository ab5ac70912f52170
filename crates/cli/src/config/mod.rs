//! CLI configuration.

use std::sync::Arc;

use clap::Args;
use spendtrack_client::{
    ApiClient, ClientConfig, FileCredentialStore, ReqwestTransport, UnauthorizedHandler,
};

use crate::config::{api::ApiConfig, logging::LoggingConfig, session::SessionConfig};

pub(crate) mod api;
pub(crate) mod logging;
pub(crate) mod session;

/// Settings shared by every subcommand.
#[derive(Debug, Args)]
pub(crate) struct Config {
    /// Backend connection settings.
    #[command(flatten)]
    pub api: ApiConfig,

    /// Stored session settings.
    #[command(flatten)]
    pub session: SessionConfig,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,
}

impl Config {
    pub(crate) fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_url: self.api.api_url.clone(),
            refresh_mode: self.session.refresh_mode.into(),
            ..ClientConfig::default()
        }
    }

    /// Build an API client from these settings.
    pub(crate) fn build_client(
        &self,
        unauthorized: Arc<dyn UnauthorizedHandler>,
    ) -> Result<ApiClient, String> {
        let transport = ReqwestTransport::new(self.api.timeout())
            .map_err(|error| format!("failed to initialise HTTP client: {error}"))?;

        let store = FileCredentialStore::new(&self.session.session_file);

        ApiClient::new(
            &self.client_config(),
            Arc::new(transport),
            Arc::new(store),
            unauthorized,
        )
        .map_err(|error| format!("failed to open session: {error}"))
    }
}
