//! The interactive session loop.
//!
//! A session acquires one tool transport, builds one agent bound to the tools
//! it discovered, then alternates between reading a line and streaming the
//! agent's response until the user leaves, input ends, an interrupt arrives,
//! or the loop faults. Whatever the exit path, an acquired transport is
//! released exactly once before [`run_session`] returns.

use crate::agent::AgentEvent;
use crate::config::DEFAULT_EXIT_KEYWORDS;
use crate::providers::ModelRef;
use crate::traits::{Tool, Transport, TransportFactory, TransportSpec};
use anyhow::Result;
use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    AcquiringTransport,
    Ready,
    AwaitingInput,
    ProcessingTurn,
    ShuttingDown,
    Terminated,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("missing credential: {name} is not set")]
    MissingCredential { name: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to start tool transport: {0:#}")]
    Transport(anyhow::Error),

    #[error("failed to build agent: {0:#}")]
    Agent(anyhow::Error),
}

#[derive(Debug)]
pub enum ExitReason {
    ExitKeyword,
    EndOfInput,
    Interrupted,
    Fault(String),
    Startup(StartupError),
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub reason: ExitReason,
    pub turns: usize,
}

impl SessionOutcome {
    fn failed(error: StartupError) -> Self {
        Self {
            state: SessionState::Failed,
            reason: ExitReason::Startup(error),
            turns: 0,
        }
    }

    pub fn code(&self) -> i32 {
        match self.reason {
            ExitReason::ExitKeyword | ExitReason::EndOfInput | ExitReason::Interrupted => 0,
            ExitReason::Fault(_) | ExitReason::Startup(_) => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code() == 0
    }
}

pub struct SessionConfig {
    pub transport: TransportSpec,
    pub instructions: Vec<String>,
    pub model: ModelRef,
    pub exit_keywords: Vec<String>,
    pub stream: bool,
    pub show_tool_calls: bool,
}

impl SessionConfig {
    pub fn new(transport: TransportSpec, instructions: Vec<String>, model: ModelRef) -> Self {
        Self {
            transport,
            instructions,
            model,
            exit_keywords: DEFAULT_EXIT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            stream: true,
            show_tool_calls: true,
        }
    }

    pub fn with_exit_keywords(mut self, keywords: Vec<String>) -> Self {
        if !keywords.is_empty() {
            self.exit_keywords = keywords;
        }
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_show_tool_calls(mut self, show: bool) -> Self {
        self.show_tool_calls = show;
        self
    }

    /// Whole-line, case-insensitive match against the exit keywords.
    pub fn is_exit_keyword(&self, input: &str) -> bool {
        let input = input.trim().to_lowercase();
        self.exit_keywords
            .iter()
            .any(|k| k.trim().to_lowercase() == input)
    }

    fn validate(&self) -> Result<(), StartupError> {
        if !self.model.has_credential() {
            return Err(StartupError::MissingCredential {
                name: self.model.credential_name(),
            });
        }
        if let Some(name) = self.transport.missing_env() {
            return Err(StartupError::MissingCredential {
                name: name.to_string(),
            });
        }
        if self.instructions.iter().all(|i| i.trim().is_empty()) {
            return Err(StartupError::InvalidConfig(
                "at least one agent instruction is required".into(),
            ));
        }
        Ok(())
    }
}

/// Something that turns one line of input into a stream of agent events.
pub trait Responder: Send + Sync {
    fn respond<'a>(&'a self, input: &'a str) -> BoxStream<'a, Result<AgentEvent>>;

    /// Completes background work left by finished turns.
    fn finish(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Builds the session's agent once the transport's tools are known.
pub trait AgentBuilder: Send + Sync {
    fn build(
        &self,
        model: &ModelRef,
        instructions: &[String],
        tools: Vec<Arc<dyn Tool>>,
        transport_instructions: Option<&str>,
    ) -> Result<Arc<dyn Responder>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Line(String),
    Eof,
    Interrupted,
}

/// The user-facing side of a session. `read_line` must be safe to drop
/// while pending.
#[async_trait]
pub trait Console: Send {
    async fn read_line(&mut self) -> Result<ConsoleInput>;

    fn write_event(&mut self, event: &AgentEvent) -> Result<()>;

    fn write_error(&mut self, message: &str) -> Result<()>;

    fn end_turn(&mut self) -> Result<()>;

    fn notice(&mut self, message: &str) -> Result<()>;
}

fn transition(state: SessionState) {
    debug!(?state, "session state");
}

/// Runs one session to completion. `shutdown` resolving is treated as an
/// interrupt from the moment the agent is ready.
pub async fn run_session<S>(
    config: SessionConfig,
    factory: &dyn TransportFactory,
    builder: &dyn AgentBuilder,
    console: &mut dyn Console,
    shutdown: S,
) -> SessionOutcome
where
    S: Future<Output = ()> + Send,
{
    transition(SessionState::Init);
    if let Err(e) = config.validate() {
        warn!("Session not started: {}", e);
        return SessionOutcome::failed(e);
    }

    transition(SessionState::AcquiringTransport);
    let transport = match factory.acquire(&config.transport).await {
        Ok(transport) => transport,
        Err(e) => return SessionOutcome::failed(StartupError::Transport(e)),
    };

    let tools = transport.tools();
    info!(transport = %transport.name(), tools = tools.len(), "tools discovered");

    let built = builder.build(
        &config.model,
        &config.instructions,
        tools,
        transport.instructions(),
    );
    let responder = match built {
        Ok(responder) => responder,
        Err(e) => {
            release(transport).await;
            return SessionOutcome::failed(StartupError::Agent(e));
        }
    };

    transition(SessionState::Ready);
    let mut turns = 0;
    let reason = {
        let body = AssertUnwindSafe(drive(&config, responder.as_ref(), &mut *console, &mut turns))
            .catch_unwind();
        let shutdown = std::pin::pin!(shutdown);

        tokio::select! {
            biased;
            () = shutdown => ExitReason::Interrupted,
            result = body => match result {
                Ok(Ok(reason)) => reason,
                Ok(Err(e)) => ExitReason::Fault(format!("{e:#}")),
                Err(panic) => ExitReason::Fault(panic_message(panic.as_ref())),
            },
        }
    };

    transition(SessionState::ShuttingDown);
    if let ExitReason::Fault(message) = &reason {
        warn!("Session fault: {}", message);
    }
    responder.finish().await;
    drop(responder);
    release(transport).await;

    transition(SessionState::Terminated);
    SessionOutcome {
        state: SessionState::Terminated,
        reason,
        turns,
    }
}

async fn release(transport: Box<dyn Transport>) {
    let name = transport.name().to_string();
    if let Err(e) = transport.release().await {
        warn!(transport = %name, "Failed to release transport: {:#}", e);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("panic in session loop: {detail}")
}

async fn drive(
    config: &SessionConfig,
    responder: &dyn Responder,
    console: &mut dyn Console,
    turns: &mut usize,
) -> Result<ExitReason> {
    console.notice(&format!(
        "Type '{}' to end the session.",
        config.exit_keywords.join("' or '")
    ))?;

    loop {
        transition(SessionState::AwaitingInput);
        let line = match console.read_line().await? {
            ConsoleInput::Line(line) => line,
            ConsoleInput::Eof => return Ok(ExitReason::EndOfInput),
            ConsoleInput::Interrupted => return Ok(ExitReason::Interrupted),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if config.is_exit_keyword(input) {
            return Ok(ExitReason::ExitKeyword);
        }

        transition(SessionState::ProcessingTurn);
        *turns += 1;
        run_turn(config, responder, console, input).await?;
    }
}

/// Streams one response to the console. Agent failures are reported inline;
/// only console failures propagate.
async fn run_turn(
    config: &SessionConfig,
    responder: &dyn Responder,
    console: &mut dyn Console,
    input: &str,
) -> Result<()> {
    let mut stream = responder.respond(input);
    let mut buffered = String::new();
    let mut failure = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(AgentEvent::Token(token)) if !config.stream => buffered.push_str(&token),
            Ok(AgentEvent::ToolCall(_) | AgentEvent::ToolResult { .. })
                if !config.show_tool_calls => {}
            Ok(event) => console.write_event(&event)?,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    drop(stream);

    if !buffered.is_empty() {
        console.write_event(&AgentEvent::Token(buffered))?;
    }
    if let Some(e) = failure {
        warn!("Turn failed: {:#}", e);
        console.write_error(&format!("{e:#}"))?;
    }
    console.end_turn()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::StdioTransportFactory;
    use crate::traits::ToolResult;
    use futures_util::stream;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, _args: Value) -> Result<ToolResult> {
            Ok(ToolResult::success("ok"))
        }
    }

    struct CountingTransport {
        tools: Vec<Arc<dyn Tool>>,
        released: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        fn name(&self) -> &str {
            "counting"
        }

        fn tools(&self) -> Vec<Arc<dyn Tool>> {
            self.tools.clone()
        }

        async fn release(self: Box<Self>) -> Result<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        tools: Vec<Arc<dyn Tool>>,
        acquired: AtomicUsize,
        released: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CountingFactory {
        fn with_tools(names: &[&'static str]) -> Self {
            Self {
                tools: names
                    .iter()
                    .map(|n| Arc::new(NamedTool(n)) as Arc<dyn Tool>)
                    .collect(),
                ..Self::default()
            }
        }

        fn acquired(&self) -> usize {
            self.acquired.load(Ordering::SeqCst)
        }

        fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransportFactory for CountingFactory {
        async fn acquire(&self, _spec: &TransportSpec) -> Result<Box<dyn Transport>> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("executable not found");
            }
            Ok(Box::new(CountingTransport {
                tools: self.tools.clone(),
                released: self.released.clone(),
            }))
        }
    }

    /// Echoes its input in two fragments. A few inputs trigger failures.
    struct ScriptedResponder {
        finished: Arc<AtomicUsize>,
    }

    impl Responder for ScriptedResponder {
        fn respond<'a>(&'a self, input: &'a str) -> BoxStream<'a, Result<AgentEvent>> {
            match input {
                "boom" => stream::iter(vec![
                    Ok(AgentEvent::Token("par".into())),
                    Err(anyhow::anyhow!("provider unavailable")),
                ])
                .boxed(),
                "hang" => stream::once(async { Ok(AgentEvent::Token("thinking".into())) })
                    .chain(stream::pending())
                    .boxed(),
                "panic" => panic!("responder exploded"),
                "tool" => stream::iter(vec![
                    Ok(AgentEvent::ToolResult {
                        name: "search".into(),
                        result: ToolResult::success("found"),
                    }),
                    Ok(AgentEvent::Token("done".into())),
                ])
                .boxed(),
                other => stream::iter(vec![
                    Ok(AgentEvent::Token("echo: ".into())),
                    Ok(AgentEvent::Token(other.to_string())),
                ])
                .boxed(),
            }
        }

        fn finish(&self) -> BoxFuture<'_, ()> {
            self.finished.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    #[derive(Default)]
    struct StubBuilder {
        fail: bool,
        seen_tools: Mutex<Vec<usize>>,
        finished: Arc<AtomicUsize>,
    }

    impl AgentBuilder for StubBuilder {
        fn build(
            &self,
            _model: &ModelRef,
            _instructions: &[String],
            tools: Vec<Arc<dyn Tool>>,
            _transport_instructions: Option<&str>,
        ) -> Result<Arc<dyn Responder>> {
            self.seen_tools.lock().unwrap().push(tools.len());
            if self.fail {
                anyhow::bail!("model rejected");
            }
            Ok(Arc::new(ScriptedResponder {
                finished: self.finished.clone(),
            }))
        }
    }

    #[derive(Default)]
    struct ScriptedConsole {
        inputs: VecDeque<ConsoleInput>,
        reads: usize,
        output: Vec<String>,
        errors: Vec<String>,
        notices: Vec<String>,
        turns_ended: usize,
        fail_writes: bool,
    }

    impl ScriptedConsole {
        fn lines(lines: &[&str]) -> Self {
            Self {
                inputs: lines
                    .iter()
                    .map(|l| ConsoleInput::Line(l.to_string()))
                    .collect(),
                ..Self::default()
            }
        }

        fn then(mut self, input: ConsoleInput) -> Self {
            self.inputs.push_back(input);
            self
        }
    }

    #[async_trait]
    impl Console for ScriptedConsole {
        async fn read_line(&mut self) -> Result<ConsoleInput> {
            self.reads += 1;
            match self.inputs.pop_front() {
                Some(input) => Ok(input),
                None => std::future::pending().await,
            }
        }

        fn write_event(&mut self, event: &AgentEvent) -> Result<()> {
            if self.fail_writes {
                anyhow::bail!("broken pipe");
            }
            match event {
                AgentEvent::Token(t) => self.output.push(t.clone()),
                AgentEvent::ToolCall(c) => self.output.push(format!("[call {}]", c.name)),
                AgentEvent::ToolResult { name, .. } => self.output.push(format!("[result {name}]")),
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

        fn notice(&mut self, message: &str) -> Result<()> {
            self.notices.push(message.to_string());
            Ok(())
        }
    }

    fn model() -> ModelRef {
        ModelRef {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            api_key: "sk-test".into(),
            base_url: None,
            temperature: 0.0,
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::new(
            TransportSpec::new("stub", "stub-server"),
            vec!["Be helpful".into()],
            model(),
        )
    }

    fn never() -> std::future::Pending<()> {
        std::future::pending()
    }

    #[tokio::test]
    async fn exit_keyword_ends_without_a_turn() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["  EXIT  ", "hello"]);

        let outcome = run_session(config(), &factory, &builder, &mut console, never()).await;

        assert!(matches!(outcome.reason, ExitReason::ExitKeyword));
        assert_eq!(outcome.state, SessionState::Terminated);
        assert_eq!(outcome.turns, 0);
        assert_eq!(outcome.code(), 0);
        assert!(console.output.is_empty());
        assert_eq!(console.notices, vec!["Type 'exit' or 'quit' to end the session."]);
        assert_eq!(factory.released(), 1);
    }

    #[tokio::test]
    async fn exit_keyword_must_match_whole_line() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["exit now", "Quit"]);

        let outcome = run_session(config(), &factory, &builder, &mut console, never()).await;

        assert!(matches!(outcome.reason, ExitReason::ExitKeyword));
        assert_eq!(outcome.turns, 1);
        assert_eq!(console.output, vec!["echo: ", "exit now"]);
    }

    #[tokio::test]
    async fn fragments_are_written_in_order() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["hi", "there", "quit"]);

        let outcome = run_session(config(), &factory, &builder, &mut console, never()).await;

        assert_eq!(outcome.turns, 2);
        assert_eq!(console.output, vec!["echo: ", "hi", "echo: ", "there"]);
        assert_eq!(console.turns_ended, 2);
        assert!(console.errors.is_empty());
        assert_eq!(factory.released(), 1);
    }

    #[tokio::test]
    async fn turn_error_is_reported_and_loop_continues() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["boom", "after", "exit"]);

        let outcome = run_session(config(), &factory, &builder, &mut console, never()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.turns, 2);
        assert_eq!(console.errors, vec!["provider unavailable"]);
        assert_eq!(console.output, vec!["par", "echo: ", "after"]);
        assert_eq!(factory.released(), 1);
    }

    #[tokio::test]
    async fn missing_executable_fails_before_any_input() {
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["hello", "exit"]);
        let mut config = config();
        config.transport = TransportSpec::new("ghost", "conduit-no-such-server-binary");

        let factory = StdioTransportFactory::new(Duration::from_secs(5));
        let outcome = run_session(config, &factory, &builder, &mut console, never()).await;

        assert!(matches!(
            outcome.reason,
            ExitReason::Startup(StartupError::Transport(_))
        ));
        assert_eq!(outcome.state, SessionState::Failed);
        assert_ne!(outcome.code(), 0);
        assert_eq!(outcome.turns, 0);
        assert_eq!(console.reads, 0);
        assert!(builder.seen_tools.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_acquisition_is_not_released() {
        let factory = CountingFactory {
            fail: true,
            ..CountingFactory::default()
        };
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["exit"]);

        let outcome = run_session(config(), &factory, &builder, &mut console, never()).await;

        assert!(matches!(
            outcome.reason,
            ExitReason::Startup(StartupError::Transport(_))
        ));
        assert_eq!(factory.acquired(), 1);
        assert_eq!(factory.released(), 0);
    }

    #[tokio::test]
    async fn missing_credential_never_acquires() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["exit"]);
        let mut config = config();
        config.model.api_key = "  ".into();

        let outcome = run_session(config, &factory, &builder, &mut console, never()).await;

        match &outcome.reason {
            ExitReason::Startup(StartupError::MissingCredential { name }) => {
                assert_eq!(name, "OPENAI_API_KEY")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(factory.acquired(), 0);
        assert_eq!(console.reads, 0);
    }

    #[tokio::test]
    async fn missing_transport_env_never_acquires() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["exit"]);
        let mut config = config();
        config.transport = TransportSpec::new("github", "npx")
            .with_env("GITHUB_ACCESS_TOKEN", "")
            .with_required_env("GITHUB_ACCESS_TOKEN");

        let outcome = run_session(config, &factory, &builder, &mut console, never()).await;

        assert!(matches!(
            outcome.reason,
            ExitReason::Startup(StartupError::MissingCredential { ref name }) if name == "GITHUB_ACCESS_TOKEN"
        ));
        assert_eq!(factory.acquired(), 0);
    }

    #[tokio::test]
    async fn empty_instructions_are_rejected() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::default();
        let mut config = config();
        config.instructions = vec!["   ".into()];

        let outcome = run_session(config, &factory, &builder, &mut console, never()).await;

        assert!(matches!(
            outcome.reason,
            ExitReason::Startup(StartupError::InvalidConfig(_))
        ));
        assert_eq!(factory.acquired(), 0);
    }

    #[tokio::test]
    async fn agent_failure_releases_transport() {
        let factory = CountingFactory::default();
        let builder = StubBuilder {
            fail: true,
            ..StubBuilder::default()
        };
        let mut console = ScriptedConsole::lines(&["hi"]);

        let outcome = run_session(config(), &factory, &builder, &mut console, never()).await;

        assert!(matches!(
            outcome.reason,
            ExitReason::Startup(StartupError::Agent(_))
        ));
        assert_eq!(factory.released(), 1);
        assert_eq!(console.reads, 0);
    }

    #[tokio::test]
    async fn interrupt_while_waiting_for_input() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["hi"]);

        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        let outcome = run_session(config(), &factory, &builder, &mut console, shutdown).await;

        assert!(matches!(outcome.reason, ExitReason::Interrupted));
        assert_eq!(outcome.code(), 0);
        assert_eq!(outcome.turns, 1);
        assert_eq!(console.reads, 2);
        assert_eq!(factory.released(), 1);
    }

    #[tokio::test]
    async fn responder_is_finished_once_on_every_exit() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["hi", "exit"]);
        run_session(config(), &factory, &builder, &mut console, never()).await;
        assert_eq!(builder.finished.load(Ordering::SeqCst), 1);

        let mut console = ScriptedConsole::lines(&["hang"]);
        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        run_session(config(), &factory, &builder, &mut console, shutdown).await;
        assert_eq!(builder.finished.load(Ordering::SeqCst), 2);
        assert_eq!(factory.released(), 2);

        let failing = StubBuilder {
            fail: true,
            ..StubBuilder::default()
        };
        let mut console = ScriptedConsole::lines(&["hi"]);
        run_session(config(), &factory, &failing, &mut console, never()).await;
        assert_eq!(failing.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn interrupt_abandons_streaming_turn() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["hang", "never read"]);

        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        let outcome = run_session(config(), &factory, &builder, &mut console, shutdown).await;

        assert!(matches!(outcome.reason, ExitReason::Interrupted));
        assert_eq!(console.output, vec!["thinking"]);
        assert_eq!(console.turns_ended, 0);
        assert_eq!(console.reads, 1);
        assert_eq!(factory.released(), 1);
    }

    #[tokio::test]
    async fn console_interrupt_and_eof_exit_cleanly() {
        for input in [ConsoleInput::Interrupted, ConsoleInput::Eof] {
            let factory = CountingFactory::default();
            let builder = StubBuilder::default();
            let mut console = ScriptedConsole::lines(&["", "   "]).then(input);

            let outcome = run_session(config(), &factory, &builder, &mut console, never()).await;

            assert_eq!(outcome.code(), 0);
            assert_eq!(outcome.turns, 0);
            assert_eq!(console.reads, 3);
            assert_eq!(factory.released(), 1);
        }
    }

    #[tokio::test]
    async fn empty_tool_set_still_builds_agent() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["hi", "exit"]);

        let outcome = run_session(config(), &factory, &builder, &mut console, never()).await;

        assert!(outcome.is_success());
        assert_eq!(*builder.seen_tools.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn discovered_tools_reach_the_builder() {
        let factory = CountingFactory::with_tools(&["search", "fetch"]);
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["exit"]);

        run_session(config(), &factory, &builder, &mut console, never()).await;

        assert_eq!(*builder.seen_tools.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn panic_is_a_fault_and_still_releases() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["panic", "exit"]);

        let outcome = run_session(config(), &factory, &builder, &mut console, never()).await;

        match &outcome.reason {
            ExitReason::Fault(message) => assert!(message.contains("responder exploded")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(outcome.code(), 1);
        assert_eq!(factory.released(), 1);
    }

    #[tokio::test]
    async fn console_failure_is_a_fault() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole {
            fail_writes: true,
            ..ScriptedConsole::lines(&["hi", "exit"])
        };

        let outcome = run_session(config(), &factory, &builder, &mut console, never()).await;

        assert!(matches!(outcome.reason, ExitReason::Fault(ref m) if m.contains("broken pipe")));
        assert_eq!(factory.released(), 1);
    }

    #[tokio::test]
    async fn buffered_mode_and_hidden_tool_calls() {
        let factory = CountingFactory::default();
        let builder = StubBuilder::default();
        let mut console = ScriptedConsole::lines(&["tool", "abc", "exit"]);
        let config = config().with_stream(false).with_show_tool_calls(false);

        run_session(config, &factory, &builder, &mut console, never()).await;

        assert_eq!(console.output, vec!["done", "echo: abc"]);
    }

    #[test]
    fn custom_exit_keywords() {
        let custom = config().with_exit_keywords(vec!["Bye".into()]);
        assert!(custom.is_exit_keyword(" bye "));
        assert!(!custom.is_exit_keyword("exit"));

        let defaults = config().with_exit_keywords(vec![]);
        assert!(defaults.is_exit_keyword("QUIT"));
    }
}
