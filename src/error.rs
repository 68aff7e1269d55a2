//! Unified error taxonomy for the auditing bot (spec §7).
//!
//! Every user-visible error collapses to a single NOTICE string; the
//! dispatcher never leaks an internal error onto the network. `thiserror`
//! gives typed variants at module boundaries (here, and in
//! [`crate::db::StoreError`], [`crate::config::ConfigError`]); `anyhow` is
//! reserved for the outermost `main` for top-level reporting.

use thiserror::Error;

/// Errors a command handler can produce. Every variant renders to exactly
/// one NOTICE line via [`CommandError::to_notice`].
#[derive(Debug, Error)]
pub enum CommandError {
    /// Bad command arguments, a bad timestamp, or a bad IP/CIDR.
    #[error("parse error: {0}")]
    Parse(String),

    /// An unknown kline id, cliconn id, or preference key.
    #[error("not found: {0}")]
    NotFound(String),

    /// A store operation failed outside of `eval` (the caller still gets a
    /// line, but the handler aborts rather than retrying).
    #[error("store error: {0}")]
    Store(#[from] crate::db::StoreError),
}

impl CommandError {
    /// Render as the single NOTICE line sent back to the caller.
    pub fn to_notice(&self) -> String {
        match self {
            CommandError::Parse(msg) => format!("error: {msg}"),
            CommandError::NotFound(msg) => format!("not found: {msg}"),
            CommandError::Store(e) => format!("store error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_renders_one_line() {
        let e = CommandError::Parse("bad count".to_string());
        assert_eq!(e.to_notice(), "error: bad count");
        assert!(!e.to_notice().contains('\n'));
    }
}
