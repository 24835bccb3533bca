//! Error taxonomy for connecting, dispatching and parsing.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExpectError {
    /// Authentication or network setup failed while opening the channel.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The session budget ran out with nothing received.
    #[error("Action failed to complete in {} seconds", format_secs(.budget))]
    Timeout { budget: Duration },

    /// The grammar, its entry rule, or the input it was applied to is invalid.
    #[error("Grammar error: {0}")]
    Grammar(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Render a budget the way callers wrote it: `60`, not `60.0`.
pub(crate) fn format_secs(budget: &Duration) -> String {
    let secs = budget.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", budget.as_secs())
    } else {
        format!("{secs}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = ExpectError::Timeout {
            budget: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "Action failed to complete in 60 seconds");

        let err = ExpectError::Timeout {
            budget: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "Action failed to complete in 1.5 seconds");
    }
}
