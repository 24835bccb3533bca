//! The [`Engine`]: runs one session end to end and reports a [`RunOutcome`].

use crate::deadline::{DEFAULT_BUDGET, Deadline};
use crate::dispatch::{SessionOutput, run_commands};
use crate::error::ExpectError;
use crate::grammar::{GrammarEngine, PestGrammar};
use crate::normalize::normalize;
use crate::profile::{Command, DeviceProfile, commands_from_value};
use crate::session::{InteractiveSession, Target};
use crate::transports::{self, DEFAULT_TRANSPORT};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use tracing::{error, info};

/// Exit code reported in the payload of a timed-out run.
pub const TIMEOUT_EXIT_CODE: i32 = -9;

/// Parameters for one run, as handed over by the host runtime.
#[derive(Clone, Deserialize)]
pub struct RunParams {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default, alias = "password")]
    pub secret: String,
    /// Kept as raw JSON so a malformed list can be tolerated.
    #[serde(default, alias = "cmd")]
    pub cmds: Value,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub grammar: Option<String>,
    /// Session budget in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default = "default_transport")]
    pub transport: String,
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> f64 {
    DEFAULT_BUDGET.as_secs_f64()
}

fn default_transport() -> String {
    DEFAULT_TRANSPORT.to_string()
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            secret: String::new(),
            cmds: Value::Null,
            entry: None,
            grammar: None,
            timeout: default_timeout(),
            transport: default_transport(),
        }
    }
}

impl fmt::Debug for RunParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("cmds", &self.cmds)
            .field("entry", &self.entry)
            .field("grammar", &self.grammar.as_ref().map(|g| g.len()))
            .field("timeout", &self.timeout)
            .field("transport", &self.transport)
            .finish()
    }
}

impl RunParams {
    /// The session budget, rejecting negative or non-finite timeouts.
    pub fn budget(&self) -> Result<Duration, ExpectError> {
        Duration::try_from_secs_f64(self.timeout)
            .map_err(|_| ExpectError::Config(format!("Invalid timeout: {}", self.timeout)))
    }

    pub fn target(&self) -> Target {
        Target {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            secret: self.secret.clone(),
        }
    }

    /// `(grammar, entry)` when structured parsing is configured.
    ///
    /// Blank values count as absent; giving only one of the two is an error.
    pub fn grammar_config(&self) -> Result<Option<(&str, &str)>, ExpectError> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.trim().is_empty())
        }

        match (present(&self.grammar), present(&self.entry)) {
            (Some(grammar), Some(entry)) => Ok(Some((grammar, entry))),
            (None, None) => Ok(None),
            _ => Err(ExpectError::Config(
                "'grammar' and 'entry' must be given together".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    TimedOut,
}

/// What a run reports back: a status and a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub payload: Value,
}

impl RunOutcome {
    pub fn succeeded(payload: Value) -> Self {
        Self {
            status: RunStatus::Succeeded,
            payload,
        }
    }

    /// Map an error to its status: timeouts are `TimedOut`, the rest `Failed`.
    pub fn from_error(err: &ExpectError) -> Self {
        match err {
            ExpectError::Timeout { .. } => Self {
                status: RunStatus::TimedOut,
                payload: json!({
                    "result": null,
                    "error": err.to_string(),
                    "exit_code": TIMEOUT_EXIT_CODE,
                }),
            },
            _ => Self {
                status: RunStatus::Failed,
                payload: json!({
                    "error": err.to_string(),
                    "result": null,
                }),
            },
        }
    }
}

/// Runs sessions against one device profile.
///
/// ```no_run
/// use expectty::{DeviceProfile, Engine, RunParams};
/// use serde_json::json;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let params = RunParams {
///         host: "10.0.0.1".into(),
///         username: "admin".into(),
///         secret: "secret".into(),
///         cmds: json!([["show version", ">"]]),
///         timeout: 5.0,
///         ..RunParams::default()
///     };
///     let outcome = Engine::new(DeviceProfile::default()).run(&params).await;
///     println!("{}", serde_json::to_string(&outcome).unwrap());
/// }
/// ```
pub struct Engine<G = PestGrammar> {
    profile: DeviceProfile,
    grammar: G,
}

impl Engine<PestGrammar> {
    pub fn new(profile: DeviceProfile) -> Self {
        Self::with_grammar(profile, PestGrammar)
    }
}

impl<G: GrammarEngine> Engine<G> {
    pub fn with_grammar(profile: DeviceProfile, grammar: G) -> Self {
        Self { profile, grammar }
    }

    /// Open the configured transport and run the session on it.
    pub async fn run(&self, params: &RunParams) -> RunOutcome {
        match transports::open(&params.transport) {
            Ok(mut session) => self.run_session(session.as_mut(), params).await,
            Err(e) => fail(e),
        }
    }

    /// Run the session on a caller-supplied, unconnected `session`.
    pub async fn run_session(
        &self,
        session: &mut dyn InteractiveSession,
        params: &RunParams,
    ) -> RunOutcome {
        match self.execute(session, params).await {
            Ok(payload) => RunOutcome::succeeded(payload),
            Err(e) => fail(e),
        }
    }

    async fn execute(
        &self,
        session: &mut dyn InteractiveSession,
        params: &RunParams,
    ) -> Result<Value, ExpectError> {
        let budget = params.budget()?;
        let grammar = params.grammar_config()?;
        let commands = commands_from_value(&params.cmds)?;

        let deadline = Deadline::start(budget);
        let dispatched = self
            .connect_and_dispatch(session, &params.target(), &commands, &deadline)
            .await;
        session.terminate().await;
        info!(
            transport = session.name(),
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "Session closed"
        );

        render_payload(&dispatched?, grammar, &self.grammar)
    }

    async fn connect_and_dispatch(
        &self,
        session: &mut dyn InteractiveSession,
        target: &Target,
        commands: &[Command],
        deadline: &Deadline,
    ) -> Result<SessionOutput, ExpectError> {
        session.connect(target, deadline).await?;
        run_commands(session, &self.profile, commands, deadline).await
    }
}

fn fail(err: ExpectError) -> RunOutcome {
    error!("Run failed: {}", err);
    RunOutcome::from_error(&err)
}

/// Build the success payload: the parsed tree when a grammar is configured,
/// otherwise the raw command and init output.
pub fn render_payload(
    output: &SessionOutput,
    grammar: Option<(&str, &str)>,
    engine: &impl GrammarEngine,
) -> Result<Value, ExpectError> {
    match grammar {
        Some((grammar, entry)) => {
            let parsed = engine.parse(&normalize(&output.command_output), grammar, entry)?;
            info!(parsed = %parsed, "Parsed output");
            Ok(parsed)
        }
        None => Ok(json!({
            "result": output.command_output,
            "init_output": output.init_output,
        })),
    }
}
