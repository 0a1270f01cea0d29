use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conduit_core::mcp::{PRESET_NAMES, preset};
use conduit_core::{
    AgentEvent, Config, Console, ExitReason, KnowledgeBase, ModelRef, NullTransportFactory,
    Responder, SessionConfig, SessionOutcome, StdioTransportFactory, TransportSpec, config, create_memory,
    run_session,
};
use futures_util::StreamExt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

mod agents;
mod console;
mod onboard;
mod signal;
mod tty;

use console::{ERROR_PREFIX, TerminalConsole};

#[derive(Parser)]
#[command(name = "conduit", version)]
#[command(about = "conduit - tool-augmented agents in your terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure provider, credentials and model
    Onboard,
    /// Interactive assistant with web, market data and memory tools
    Chat {
        /// Directory of .md/.txt documents to search
        #[arg(short, long)]
        knowledge: Option<PathBuf>,
    },
    /// Answer one question and exit
    Ask {
        message: Option<String>,
        /// Wait for the full answer and render it as markdown
        #[arg(long)]
        no_stream: bool,
    },
    /// Interactive session against an MCP server: a preset, a configured
    /// server name, or `custom`
    Mcp {
        server: String,
        #[arg(long)]
        command: Option<String>,
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
        /// KEY=VALUE, repeatable
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
        /// Replaces the server's default instructions, repeatable
        #[arg(long = "instruction")]
        instructions: Vec<String>,
    },
    /// Ask a web + finance agent team one question
    Team { message: Option<String> },
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CONDUIT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();
    tty::save();

    let code = match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", ERROR_PREFIX, e);
            1
        }
    };

    // The line editor thread may still be blocked on stdin, in raw mode.
    tty::restore();
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let command = cli.command.unwrap_or_else(|| {
        if config::config_exists() {
            Commands::Chat { knowledge: None }
        } else {
            Commands::Onboard
        }
    });

    match command {
        Commands::Onboard => {
            let existing = Config::load_or_init()?;
            let updated = onboard::run_onboard(existing).context("Onboarding failed")?;
            config::save_config(&updated)?;
            Ok(0)
        }
        Commands::Chat { knowledge } => chat(knowledge).await,
        Commands::Ask { message, no_stream } => {
            let config = Config::load_or_init()?;
            let model = require_model(&config)?;
            let stream = !no_stream && config.stream.enabled;
            let agent = agents::ask_agent(&config, &model, stream)?;
            let query = message.unwrap_or_else(|| agents::DEFAULT_ASK_QUERY.to_string());
            let mut console = TerminalConsole::new(!stream);
            single_query(&agent, &query, stream, &mut console, signal::shutdown_signal()).await
        }
        Commands::Team { message } => {
            let config = Config::load_or_init()?;
            let model = require_model(&config)?;
            let team = agents::team_agent(&config, &model)?;
            let query = message.unwrap_or_else(|| agents::DEFAULT_TEAM_QUERY.to_string());
            let stream = config.stream.enabled;
            let mut console = TerminalConsole::new(!stream);
            single_query(&team, &query, stream, &mut console, signal::shutdown_signal()).await
        }
        Commands::Mcp {
            server,
            command,
            args,
            env,
            instructions,
        } => mcp(server, command, args, env, instructions).await,
    }
}

fn require_model(config: &Config) -> Result<ModelRef> {
    let model = ModelRef::from_config(&config.model);
    if !model.has_credential() {
        anyhow::bail!(
            "missing credential: {} is not set",
            model.credential_name()
        );
    }
    Ok(model)
}

fn history_path() -> PathBuf {
    config::get_conduit_dir().join("history")
}

fn session_config(config: &Config, transport: TransportSpec, instructions: Vec<String>) -> SessionConfig {
    SessionConfig::new(transport, instructions, ModelRef::from_config(&config.model))
        .with_exit_keywords(config.session.exit_keywords.clone())
        .with_stream(config.stream.enabled)
        .with_show_tool_calls(config.agent.show_tool_calls)
}

fn terminal(config: &Config) -> TerminalConsole {
    let render_markdown = !config.stream.enabled && config.agent.markdown;
    TerminalConsole::new(render_markdown).with_history(history_path())
}

fn report(outcome: &SessionOutcome) -> i32 {
    match &outcome.reason {
        ExitReason::Startup(e) => eprintln!("{} {}", ERROR_PREFIX, e),
        ExitReason::Fault(message) => eprintln!("{} {}", ERROR_PREFIX, message),
        ExitReason::Interrupted | ExitReason::EndOfInput | ExitReason::ExitKeyword => {
            println!("👋 Goodbye!");
        }
    }
    tracing::debug!(turns = outcome.turns, state = ?outcome.state, "session finished");
    outcome.code()
}

async fn chat(knowledge_dir: Option<PathBuf>) -> Result<i32> {
    let config = Config::load_or_init()?;

    std::fs::create_dir_all(&config.workspace_dir).with_context(|| {
        format!(
            "Could not create workspace at {}",
            config.workspace_dir.display()
        )
    })?;

    let knowledge = match knowledge_dir {
        Some(dir) => Some(Arc::new(KnowledgeBase::load_dir(&dir)?)),
        None => None,
    };

    let memory = create_memory(&config.workspace_dir).await?;
    let builder = agents::assistant_builder(&config, memory.clone(), knowledge.clone());
    let session = session_config(
        &config,
        TransportSpec::default(),
        agents::assistant_instructions(knowledge.is_some()),
    );

    println!("🔌 Conduit");
    let mut console = terminal(&config);
    let outcome = run_session(
        session,
        &NullTransportFactory,
        &builder,
        &mut console,
        signal::shutdown_signal(),
    )
    .await;

    if let Err(e) = memory.close().await {
        tracing::warn!("Failed to close memory: {:#}", e);
    }
    Ok(report(&outcome))
}

async fn mcp(
    server: String,
    command: Option<String>,
    args: Vec<String>,
    env: Vec<(String, String)>,
    instructions: Vec<String>,
) -> Result<i32> {
    let config = Config::load_or_init()?;

    let (mut spec, mut default_instructions) = if server == "custom" {
        let command = command.context("`conduit mcp custom` needs --command")?;
        let spec = TransportSpec::new("custom", command).with_args(args);
        (spec, vec![agents::DEFAULT_MCP_INSTRUCTIONS.to_string()])
    } else if let Some(preset) = preset(&server, |key| std::env::var(key).ok()) {
        (preset.spec, preset.instructions)
    } else if let Some(custom) = config.servers.get(&server) {
        let instructions = if custom.instructions.is_empty() {
            vec![agents::DEFAULT_MCP_INSTRUCTIONS.to_string()]
        } else {
            custom.instructions.clone()
        };
        (custom.to_transport_spec(&server), instructions)
    } else {
        let mut known: Vec<&str> = PRESET_NAMES.to_vec();
        known.extend(config.servers.keys().map(String::as_str));
        anyhow::bail!("Unknown MCP server '{}'. Known: {}, custom", server, known.join(", "));
    };

    for (key, value) in env {
        spec = spec.with_env(key, value);
    }
    if !instructions.is_empty() {
        default_instructions = instructions;
    }

    let title = spec.name.clone();
    let factory = StdioTransportFactory::new(Duration::from_secs(config.session.startup_timeout_secs));
    let builder = conduit_core::DefaultAgentBuilder::from_config(format!("{title} agent"), &config);
    let session = session_config(&config, spec, default_instructions);

    println!("🔌 Conduit · {}", title);
    let mut console = terminal(&config);
    let outcome = run_session(
        session,
        &factory,
        &builder,
        &mut console,
        signal::shutdown_signal(),
    )
    .await;

    Ok(report(&outcome))
}

/// Runs one query outside the interactive loop, with the same rendering.
async fn single_query(
    agent: &dyn Responder,
    query: &str,
    stream: bool,
    console: &mut dyn Console,
    shutdown: impl Future<Output = ()>,
) -> Result<i32> {
    let mut events = agent.respond(query);
    let mut buffered = String::new();
    let mut failed = false;
    tokio::pin!(shutdown);

    loop {
        let next: Option<Result<AgentEvent>> = tokio::select! {
            biased;
            () = &mut shutdown => {
                console.end_turn()?;
                return Ok(0);
            }
        };

        match next {
            Some(Ok(AgentEvent::Token(token))) if !stream => buffered.push_str(&token),
            Some(Ok(event)) => console.write_event(&event)?,
            Some(Err(e)) => {
                console.write_error(&format!("{e:#}"))?;
                failed = true;
                break;
            }
            None => break,
        }
    }

    if !buffered.is_empty() {
        console.write_event(&AgentEvent::Token(buffered))?;
    }
    console.end_turn()?;
    Ok(if failed { 1 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conduit_core::ConsoleInput;
    use futures_util::stream::{self, BoxStream};
    use tokio::sync::oneshot;

    struct Fragments(Vec<Result<AgentEvent>>);

    impl Responder for Fragments {
        fn respond<'a>(&'a self, _input: &'a str) -> BoxStream<'a, Result<AgentEvent>> {
            let events: Vec<Result<AgentEvent>> = self
                .0
                .iter()
                .map(|event| match event {
                    Ok(event) => Ok(event.clone()),
                    Err(e) => Err(anyhow::anyhow!("{e}")),
                })
                .collect();
            stream::iter(events).boxed()
        }
    }

    fn tokens(parts: &[&str]) -> Fragments {
        Fragments(
            parts
                .iter()
                .map(|p| Ok(AgentEvent::Token(p.to_string())))
                .collect(),
        )
    }

    /// Records output; optionally fires a signal on the first write.
    #[derive(Default)]
    struct RecordingConsole {
        written: Vec<String>,
        errors: Vec<String>,
        turns_ended: usize,
        signal_on_write: Option<oneshot::Sender<()>>,
    }

    #[async_trait]
    impl Console for RecordingConsole {
        async fn read_line(&mut self) -> Result<ConsoleInput> {
            Ok(ConsoleInput::Eof)
        }

        fn write_event(&mut self, event: &AgentEvent) -> Result<()> {
            if let AgentEvent::Token(token) = event {
                self.written.push(token.clone());
            }
            if let Some(signal) = self.signal_on_write.take() {
                let _ = signal.send(());
            }
            Ok(())
        }

        fn write_error(&mut self, message: &str) -> Result<()> {
            self.errors.push(message.to_string());
            Ok(())
        }

        fn end_turn(&mut self) -> Result<()> {
            self.turns_ended += 1;
            Ok(())
        }

        fn notice(&mut self, _message: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn signal_during_a_write_stops_the_query() {
        let (tx, rx) = oneshot::channel();
        let mut console = RecordingConsole {
            signal_on_write: Some(tx),
            ..RecordingConsole::default()
        };
        let shutdown = async {
            let _ = rx.await;
        };

        let code = single_query(&tokens(&["a", "b", "c"]), "q", true, &mut console, shutdown)
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(console.written, vec!["a"]);
        assert_eq!(console.turns_ended, 1);
    }

    #[tokio::test]
    async fn buffered_query_writes_once_and_reports_errors() {
        let mut console = RecordingConsole::default();
        let code = single_query(
            &tokens(&["Hello", " world"]),
            "q",
            false,
            &mut console,
            std::future::pending(),
        )
        .await
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(console.written, vec!["Hello world"]);

        let failing = Fragments(vec![
            Ok(AgentEvent::Token("par".into())),
            Err(anyhow::anyhow!("provider unavailable")),
        ]);
        let mut console = RecordingConsole::default();
        let code = single_query(&failing, "q", true, &mut console, std::future::pending())
            .await
            .unwrap();
        assert_eq!(code, 1);
        assert_eq!(console.written, vec!["par"]);
        assert_eq!(console.errors, vec!["provider unavailable"]);
        assert_eq!(console.turns_ended, 1);
    }

    #[test]
    fn env_pairs() {
        assert_eq!(
            parse_env_pair("TOKEN=a=b").unwrap(),
            ("TOKEN".to_string(), "a=b".to_string())
        );
        assert!(parse_env_pair("=x").is_err());
        assert!(parse_env_pair("novalue").is_err());
    }

    #[test]
    fn cli_parses_custom_mcp() {
        let cli = Cli::try_parse_from([
            "conduit", "mcp", "custom", "--command", "npx", "--arg", "-y", "--arg", "server",
            "--env", "K=V",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Mcp {
                server, command, args, env, ..
            }) => {
                assert_eq!(server, "custom");
                assert_eq!(command.as_deref(), Some("npx"));
                assert_eq!(args, vec!["-y", "server"]);
                assert_eq!(env, vec![("K".to_string(), "V".to_string())]);
            }
            _ => panic!("expected mcp command"),
        }
    }
}
