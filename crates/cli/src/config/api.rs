//! API Config

use std::time::Duration;

use clap::Args;
use spendtrack_client::DEFAULT_API_URL;

/// Backend connection settings.
#[derive(Debug, Args)]
pub(crate) struct ApiConfig {
    /// Backend origin; requests go to `<api-url>/api/...`
    #[arg(long, env = "SPENDTRACK_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Per-request timeout in seconds (no timeout when omitted)
    #[arg(long, env = "SPENDTRACK_TIMEOUT_SECONDS")]
    pub timeout_seconds: Option<u64>,
}

impl ApiConfig {
    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}
