//! # Expectty
//!
//! A deadline-bound expect/send engine for interactive remote shells.
//!
//! Expectty opens an interactive shell (over SSH, or a local PTY), sends a
//! list of commands one at a time, and waits after each for output matching
//! an expected regular expression. The whole session, connect included,
//! shares one time budget: slow early commands leave less time for later
//! ones. The captured output is returned raw or parsed into a tree with a
//! grammar supplied at run time.
//!
//! ## Quick start
//!
//! ```no_run
//! use expectty::{DeviceProfile, Engine, RunParams, RunStatus};
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let profile: DeviceProfile = toml::from_str(r#"
//! init_cmds = [["term len 0", ">"]]
//! default_expect = "[>#]\\s*$"
//! "#)?;
//!
//!     let params = RunParams {
//!         host: "10.0.0.1".into(),
//!         username: "admin".into(),
//!         secret: "secret".into(),
//!         cmds: json!([["show version", ">"], ["show clock"]]),
//!         timeout: 30.0,
//!         ..RunParams::default()
//!     };
//!
//!     let outcome = Engine::new(profile).run(&params).await;
//!     assert_eq!(outcome.status, RunStatus::Succeeded);
//!     println!("{}", outcome.payload["result"]);
//!     Ok(())
//! }
//! ```
//!
//! ## Commands
//!
//! Each command is `["text"]` or `["text", "pattern"]`. A command without a
//! pattern uses the profile's `default_expect`; with neither, reading stops
//! as soon as the shell goes quiet after producing some output.
//!
//! ## Timeouts
//!
//! When the budget runs out mid-command, whatever arrived so far is kept and
//! the next blocking step fails. A step that receives nothing at all before
//! the budget runs out fails the run with [`RunStatus::TimedOut`].
//!
//! ## Structured output
//!
//! With `grammar` and `entry` set, the command output is parsed by a
//! [`GrammarEngine`]. The default, [`PestGrammar`], takes pest grammar text:
//!
//! ```
//! use expectty::{GrammarEngine, PestGrammar};
//!
//! let grammar = r#"
//! version = { "Version " ~ release }
//! release = { (ASCII_DIGIT | ".")+ }
//! "#;
//! let tree = PestGrammar.parse("Version 15.2", grammar, "version").unwrap();
//! assert_eq!(tree["children"][0]["text"], "15.2");
//! ```
//!
//! ## Adding a transport
//!
//! Implement [`InteractiveSession`] (usually by wrapping a [`Shell`] around a
//! [`ShellChannel`]) and register it in [`transports`].

pub mod deadline;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod normalize;
pub mod parser;
pub mod profile;
pub(crate) mod pty;
pub(crate) mod pty_reader;
pub mod session;
pub mod transports;

pub use deadline::Deadline;
pub use dispatch::{SessionOutput, run_commands};
pub use engine::{Engine, RunOutcome, RunParams, RunStatus};
pub use error::ExpectError;
pub use grammar::{GrammarEngine, PestGrammar};
pub use normalize::normalize;
pub use parser::{parse_file, parse_str};
pub use profile::{Command, DeviceProfile};
pub use session::{InteractiveSession, Shell, ShellChannel, Target};
