//! Transport registry.
//!
//! To add a transport, implement [`InteractiveSession`] with a `NAME`
//! constant and a `boxed` constructor, then add one entry to [`REGISTRY`].

mod local;
mod ssh;

pub use local::{LocalChannel, LocalSession};
pub use ssh::{SshChannel, SshSession};

use crate::error::ExpectError;
use crate::session::InteractiveSession;

/// Name of the transport used when none is configured.
pub const DEFAULT_TRANSPORT: &str = SshSession::NAME;

type OpenFn = fn() -> Box<dyn InteractiveSession>;

static REGISTRY: &[(&str, OpenFn)] = &[
    (SshSession::NAME, SshSession::boxed),
    (LocalSession::NAME, LocalSession::boxed),
];

/// Create an unconnected session for the transport called `name`.
pub fn open(name: &str) -> Result<Box<dyn InteractiveSession>, ExpectError> {
    REGISTRY
        .iter()
        .find(|(transport, _)| *transport == name)
        .map(|(_, open)| open())
        .ok_or_else(|| {
            ExpectError::Config(format!(
                "Unknown transport '{}', expected one of: {}",
                name,
                names().collect::<Vec<_>>().join(", ")
            ))
        })
}

/// Registered transport names.
pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}
