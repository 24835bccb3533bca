use anyhow::{Context, Result};
use clap::Parser;
use expectty::parser::{parse_duration, parse_entry};
use expectty::{Command, DeviceProfile, Engine, RunParams, RunStatus, parse_file};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "expectty",
    about = "Send commands to an interactive shell and wait for the expected output",
    version
)]
struct Args {
    /// JSON file with run parameters (host, username, secret, cmds, entry, grammar, timeout)
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Host to connect to (the program to spawn for the local transport)
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(short, long)]
    username: Option<String>,

    /// Password for the remote account
    #[arg(long, env = "EXPECTTY_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Command to send: plain text, or `"text" "pattern"`. Repeatable.
    #[arg(short, long = "cmd")]
    cmds: Vec<String>,

    /// File with one `"text" "pattern"` command per line
    #[arg(long)]
    commands_file: Option<PathBuf>,

    /// Device profile (TOML or JSON) with init_cmds and default_expect
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Pest grammar file used to parse the command output
    #[arg(long)]
    grammar_file: Option<PathBuf>,

    /// Grammar rule to start parsing from
    #[arg(long)]
    entry: Option<String>,

    /// Session budget: seconds, or a duration such as `5s` or `500ms`
    #[arg(short, long, value_parser = parse_duration)]
    timeout: Option<std::time::Duration>,

    /// Transport to use: ssh or local
    #[arg(long)]
    transport: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let profile = match &args.profile {
        Some(path) => DeviceProfile::load(path)?,
        None => DeviceProfile::default(),
    };
    let params = build_params(args)?;

    let outcome = Engine::new(profile).run(&params).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to serialize result")?
    );

    Ok(match outcome.status {
        RunStatus::Succeeded => ExitCode::SUCCESS,
        RunStatus::Failed => ExitCode::from(1),
        RunStatus::TimedOut => ExitCode::from(124),
    })
}

/// Start from the params file, if any, and let flags override its fields.
fn build_params(args: Args) -> Result<RunParams> {
    let mut params = match &args.params {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read params file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid params file: {}", path.display()))?
        }
        None => RunParams::default(),
    };

    if let Some(host) = args.host {
        params.host = host;
    }
    if let Some(port) = args.port {
        params.port = port;
    }
    if let Some(username) = args.username {
        params.username = username;
    }
    if let Some(secret) = args.secret {
        params.secret = secret;
    }
    if let Some(entry) = args.entry {
        params.entry = Some(entry);
    }
    if let Some(timeout) = args.timeout {
        params.timeout = timeout.as_secs_f64();
    }
    if let Some(transport) = args.transport {
        params.transport = transport;
    }
    if let Some(path) = &args.grammar_file {
        let grammar = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read grammar file: {}", path.display()))?;
        params.grammar = Some(grammar);
    }

    let mut commands: Vec<Command> = Vec::new();
    if let Some(path) = &args.commands_file {
        commands.extend(
            parse_file(path)
                .with_context(|| format!("Failed to parse command file: {}", path.display()))?,
        );
    }
    for entry in &args.cmds {
        commands.push(parse_entry(entry).with_context(|| format!("Invalid --cmd: {entry}"))?);
    }
    if !commands.is_empty() {
        params.cmds = serde_json::to_value(&commands)?;
    }

    Ok(params)
}
