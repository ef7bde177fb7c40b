//! Stdio feed for a single session.
//!
//! Inbound: one [`SessionCommand`](crate::session::SessionCommand) JSON
//! object per line on stdin. Outbound: one
//! [`GovernanceState`](crate::governance::GovernanceState) JSON object per
//! line on stdout, written whenever the published state changes.

pub mod stdio;

pub use stdio::{CommandReader, StateWriter, forward_commands, publish_states};

use crate::config::loader::env_or;

/// Default maximum inbound line size in bytes (64 KB).
pub const DEFAULT_MAX_LINE_SIZE: usize = 64 * 1024;

/// Default buffer size for stdin and stdout (64 KB).
pub const DEFAULT_STDIO_BUFFER_SIZE: usize = 64 * 1024;

/// Stdio buffer limits.
#[derive(Debug, Clone, Copy)]
pub struct StdioConfig {
    /// Lines longer than this are skipped.
    pub max_line_size: usize,
    /// Read/write buffer size.
    pub buffer_size: usize,
}

impl StdioConfig {
    /// Reads `ZONEGATE_MAX_LINE_SIZE` and `ZONEGATE_STDIO_BUFFER_SIZE`,
    /// falling back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_line_size: env_or("ZONEGATE_MAX_LINE_SIZE", DEFAULT_MAX_LINE_SIZE),
            buffer_size: env_or("ZONEGATE_STDIO_BUFFER_SIZE", DEFAULT_STDIO_BUFFER_SIZE),
        }
    }
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            max_line_size: DEFAULT_MAX_LINE_SIZE,
            buffer_size: DEFAULT_STDIO_BUFFER_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let config = StdioConfig::default();
        assert_eq!(config.max_line_size, DEFAULT_MAX_LINE_SIZE);
        assert_eq!(config.buffer_size, DEFAULT_STDIO_BUFFER_SIZE);
    }
}
