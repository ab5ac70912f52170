//! Session Config

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use spendtrack_client::RefreshMode;

/// How concurrent token refreshes are coordinated.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum RefreshModeArg {
    /// One refresh at a time; waiting callers reuse its result.
    Serialized,

    /// Every caller refreshes on its own.
    Independent,
}

impl From<RefreshModeArg> for RefreshMode {
    fn from(mode: RefreshModeArg) -> Self {
        match mode {
            RefreshModeArg::Serialized => Self::Serialized,
            RefreshModeArg::Independent => Self::Independent,
        }
    }
}

/// Stored session settings.
#[derive(Debug, Args)]
pub(crate) struct SessionConfig {
    /// File holding the signed-in session
    #[arg(
        long,
        env = "SPENDTRACK_SESSION_FILE",
        default_value = ".spendtrack-session.json"
    )]
    pub session_file: PathBuf,

    /// Refresh coordination (serialized, independent)
    #[arg(
        long,
        env = "SPENDTRACK_REFRESH_MODE",
        value_enum,
        default_value_t = RefreshModeArg::Serialized
    )]
    pub refresh_mode: RefreshModeArg,
}
