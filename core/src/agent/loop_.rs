use crate::agent::parser::parse_tool_calls;
use crate::agent::{ContextBuilder, ToolRegistry};
use crate::traits::{
    ChatMessage, ChatRequest, Memory, MemoryCategory, Provider, ProviderEvent, Tool, ToolCall,
    ToolResult, ToolSpec,
};
use anyhow::{Result, anyhow};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error};

const DEFAULT_MAX_ITERATIONS: usize = 10;
const DEFAULT_MAX_HISTORY: usize = 40;
const COMPACT_KEEP_RECENT: usize = 20;
const COMPACTION_MAX_SOURCE_CHARS: usize = 12_000;
const COMPACTION_MAX_SUMMARY_CHARS: usize = 2_000;

pub const MAX_ITERATIONS_NOTICE: &str = "Max iterations reached";

/// One item of an agent's streamed response.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Token(String),
    ToolCall(ToolCall),
    ToolResult { name: String, result: ToolResult },
}

/// A model plus its tools, instructions and conversation history.
pub struct Agent {
    name: String,
    role: Option<String>,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    context: ContextBuilder,
    tools: ToolRegistry,
    memory: Option<Arc<dyn Memory>>,
    history: Mutex<Vec<ChatMessage>>,
    memory_writes: Mutex<JoinSet<()>>,
    max_iterations: usize,
    max_history: usize,
    stream: bool,
    session_id: String,
}

impl Agent {
    pub fn new(name: impl Into<String>, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
            provider,
            model: model.into(),
            temperature: 0.7,
            context: ContextBuilder::default(),
            tools: ToolRegistry::default(),
            memory: None,
            history: Mutex::new(vec![]),
            memory_writes: Mutex::new(JoinSet::new()),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_history: DEFAULT_MAX_HISTORY,
            stream: true,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.context = self.context.with_description(description);
        self
    }

    pub fn with_instructions(mut self, instructions: Vec<String>) -> Self {
        self.context = self.context.with_instructions(instructions);
        self
    }

    pub fn with_transport_instructions(mut self, instructions: Option<String>) -> Self {
        self.context = self.context.with_transport_instructions(instructions);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = ToolRegistry::new(tools);
        self.context = self.context.with_tool_specs(self.tools.specs());
        self
    }

    pub fn with_memory(mut self, memory: Option<Arc<dyn Memory>>) -> Self {
        self.context.memory = memory.clone();
        self.memory = memory;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.context.markdown = markdown;
        self
    }

    pub fn with_datetime(mut self, add_datetime: bool) -> Self {
        self.context.add_datetime = add_datetime;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max.max(2);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn tool_names(&self) -> &[String] {
        self.tools.names()
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().await.clone()
    }

    /// Streams the response to `input`. Nothing is sent to the provider until
    /// the stream is first polled. A provider failure is yielded once and ends
    /// the stream; history is only updated when the turn completes.
    pub fn respond(&self, input: &str) -> BoxStream<'_, Result<AgentEvent>> {
        let turn = Turn {
            agent: self,
            input: input.to_string(),
            messages: vec![],
            specs: self.tools.specs(),
            rounds: 0,
            phase: Phase::Prepare,
        };
        futures_util::stream::unfold(turn, Turn::step).boxed()
    }

    /// Drains [`Agent::respond`] and joins the tokens.
    pub async fn respond_text(&self, input: &str) -> Result<String> {
        let mut stream = self.respond(input);
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            if let AgentEvent::Token(token) = event? {
                text.push_str(&token);
            }
        }
        Ok(text)
    }

    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        let raw = if call.arguments.trim().is_empty() {
            "{}"
        } else {
            call.arguments.as_str()
        };
        let args: serde_json::Value = match serde_json::from_str(raw) {
            Ok(args) => args,
            Err(e) => {
                return ToolResult::error(format!(
                    "Failed to parse tool arguments for {}: {}",
                    call.name, e
                ));
            }
        };

        debug!(agent = %self.name, tool = %call.name, "executing tool");
        self.tools.execute(&call.name, args).await
    }

    async fn commit(&self, input: &str, answer: &str) {
        let mut history = self.history.lock().await;
        history.push(ChatMessage::user(input));
        if !answer.trim().is_empty() {
            history.push(ChatMessage::assistant(answer));
        }
        if history.len() > self.max_history {
            self.compact_history(&mut history).await;
        }
        drop(history);

        let mut writes = self.memory_writes.lock().await;
        while writes.try_join_next().is_some() {}
        self.store_message(&mut writes, "user", input);
        self.store_message(&mut writes, "assistant", answer);
    }

    /// Waits for every memory write started by earlier turns.
    pub async fn flush_memory(&self) {
        let mut writes = std::mem::take(&mut *self.memory_writes.lock().await);
        while let Some(result) = writes.join_next().await {
            if let Err(e) = result {
                error!("Memory write task failed: {}", e);
            }
        }
    }

    fn store_message(&self, writes: &mut JoinSet<()>, role: &str, content: &str) {
        let Some(memory) = self.memory.clone() else {
            return;
        };
        if content.trim().is_empty() {
            return;
        }

        let key = format!("msg_{}_{:x}", role, md5::compute(content.as_bytes()));
        let content = content.to_string();
        let session_id = self.session_id.clone();

        writes.spawn(async move {
            if let Err(e) = memory
                .store(&key, &content, MemoryCategory::Daily, Some(&session_id))
                .await
            {
                error!("Failed to store message in memory: {}", e);
            }
        });
    }

    async fn compact_history(&self, history: &mut Vec<ChatMessage>) {
        let keep_recent = COMPACT_KEEP_RECENT.min(self.max_history / 2).min(history.len());
        let compact_count = history.len().saturating_sub(keep_recent);
        if compact_count == 0 {
            return;
        }

        let transcript = build_transcript(&history[..compact_count]);
        let summary = match self.summarize(&transcript).await {
            Ok(s) if !s.trim().is_empty() => s,
            Ok(_) => truncate_transcript(&transcript),
            Err(e) => {
                debug!("History summarization failed, truncating: {}", e);
                truncate_transcript(&transcript)
            }
        };

        let summary_msg =
            ChatMessage::assistant(format!("[Conversation summary]\n{}", summary.trim()));
        history.splice(..compact_count, std::iter::once(summary_msg));
    }

    async fn summarize(&self, transcript: &str) -> Result<String> {
        let messages = [
            ChatMessage::system(
                "You are a conversation summarizer. Summarize the following conversation into a concise context that preserves: user preferences, decisions, unresolved tasks, and key facts. Keep it under 2000 characters.",
            ),
            ChatMessage::user(format!("Summarize this conversation:\n\n{}", transcript)),
        ];
        let request = ChatRequest {
            messages: &messages,
            tools: None,
            model: &self.model,
            temperature: self.temperature,
        };

        let response = self.provider.chat(request).await?;
        Ok(response.text.unwrap_or_default())
    }
}

fn build_transcript(messages: &[ChatMessage]) -> String {
    let mut transcript = String::new();
    for msg in messages {
        transcript.push_str(&format!("{}: {}\n", msg.role.to_uppercase(), msg.content.trim()));
    }

    if transcript.chars().count() > COMPACTION_MAX_SOURCE_CHARS {
        truncate_transcript(&transcript)
    } else {
        transcript
    }
}

fn truncate_transcript(text: &str) -> String {
    if text.chars().count() <= COMPACTION_MAX_SUMMARY_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(COMPACTION_MAX_SUMMARY_CHARS).collect();
    format!("{}...", truncated)
}

/// Native tool calls win; otherwise tagged calls are recovered from the text.
fn split_calls(text: String, native: Vec<ToolCall>) -> (String, Vec<ToolCall>) {
    if !native.is_empty() || !text.contains("<tool_call>") {
        return (text, native);
    }
    parse_tool_calls(&text)
}

enum Phase {
    Prepare,
    Request,
    Streaming {
        events: BoxStream<'static, ProviderEvent>,
        text: String,
        calls: Vec<ToolCall>,
    },
    Tools {
        pending: VecDeque<ToolCall>,
        announced: bool,
    },
    Done,
}

struct Turn<'a> {
    agent: &'a Agent,
    input: String,
    messages: Vec<ChatMessage>,
    specs: Vec<ToolSpec>,
    rounds: usize,
    phase: Phase,
}

impl<'a> Turn<'a> {
    async fn step(mut self) -> Option<(Result<AgentEvent>, Turn<'a>)> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,

                Phase::Prepare => {
                    let history = self.agent.history.lock().await.clone();
                    self.messages = self.agent.context.build_messages(&history, &self.input).await;
                    self.phase = Phase::Request;
                }

                Phase::Request => {
                    self.rounds += 1;
                    let agent = self.agent;
                    let request = ChatRequest {
                        messages: &self.messages,
                        tools: (!self.specs.is_empty()).then_some(self.specs.as_slice()),
                        model: &agent.model,
                        temperature: agent.temperature,
                    };
                    debug!(agent = %agent.name, round = self.rounds, "requesting completion");

                    if agent.stream && agent.provider.supports_streaming() {
                        match agent.provider.chat_stream(request).await {
                            Ok(events) => {
                                self.phase = Phase::Streaming {
                                    events,
                                    text: String::new(),
                                    calls: vec![],
                                };
                            }
                            Err(e) => return Some((Err(e), self)),
                        }
                    } else {
                        match agent.provider.chat(request).await {
                            Ok(response) => {
                                let (text, calls) =
                                    split_calls(response.text.unwrap_or_default(), response.tool_calls);
                                self.finish_round(&text, calls).await;
                                if !text.is_empty() {
                                    return Some((Ok(AgentEvent::Token(text)), self));
                                }
                            }
                            Err(e) => return Some((Err(e), self)),
                        }
                    }
                }

                Phase::Streaming {
                    mut events,
                    mut text,
                    mut calls,
                } => match events.next().await {
                    Some(ProviderEvent::Token(token)) => {
                        text.push_str(&token);
                        self.phase = Phase::Streaming { events, text, calls };
                        return Some((Ok(AgentEvent::Token(token)), self));
                    }
                    Some(ProviderEvent::Thinking(_)) => {
                        self.phase = Phase::Streaming { events, text, calls };
                    }
                    Some(ProviderEvent::ToolCall(call)) => {
                        calls.push(call);
                        self.phase = Phase::Streaming { events, text, calls };
                    }
                    Some(ProviderEvent::Error(message)) => {
                        return Some((Err(anyhow!(message)), self));
                    }
                    Some(ProviderEvent::Done) => {
                        let (text, calls) = split_calls(text, calls);
                        self.finish_round(&text, calls).await;
                    }
                    None => {
                        return Some((Err(anyhow!("Provider stream ended unexpectedly")), self));
                    }
                },

                Phase::Tools {
                    mut pending,
                    announced,
                } => {
                    let Some(call) = pending.front().cloned() else {
                        if self.rounds >= self.agent.max_iterations {
                            self.agent.commit(&self.input, MAX_ITERATIONS_NOTICE).await;
                            return Some((Ok(AgentEvent::Token(MAX_ITERATIONS_NOTICE.to_string())), self));
                        }
                        self.phase = Phase::Request;
                        continue;
                    };

                    if !announced {
                        self.phase = Phase::Tools {
                            pending,
                            announced: true,
                        };
                        return Some((Ok(AgentEvent::ToolCall(call)), self));
                    }

                    pending.pop_front();
                    let result = self.agent.execute_tool(&call).await;
                    self.messages
                        .push(ChatMessage::tool_result(call.id, result.to_message_content()));
                    self.phase = Phase::Tools {
                        pending,
                        announced: false,
                    };
                    return Some((
                        Ok(AgentEvent::ToolResult {
                            name: call.name,
                            result,
                        }),
                        self,
                    ));
                }
            }
        }
    }

    async fn finish_round(&mut self, text: &str, calls: Vec<ToolCall>) {
        if calls.is_empty() {
            self.agent.commit(&self.input, text).await;
            self.phase = Phase::Done;
            return;
        }

        self.messages
            .push(ChatMessage::assistant_with_tool_calls(text, calls.clone()));
        self.phase = Phase::Tools {
            pending: calls.into(),
            announced: false,
        };
    }
}
