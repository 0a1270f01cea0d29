use crate::traits::{
    ChatMessage, ChatRequest, ChatResponse, Provider, ProviderEvent, ToolCall, ToolSpec,
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest<'a> {
    id: &'a str,
    r#type: &'a str,
    function: OpenAIFunctionRequest<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionRequest<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: &'static str,
    function: OpenAIToolFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

/// Tool-call fragments collected across SSE chunks, keyed by the delta index.
#[derive(Debug, Default)]
pub(crate) struct PendingToolCalls {
    calls: BTreeMap<usize, ToolCall>,
}

impl PendingToolCalls {
    fn absorb(&mut self, delta: &StreamToolCall) {
        let entry = self.calls.entry(delta.index).or_insert_with(|| ToolCall {
            id: String::new(),
            name: String::new(),
            arguments: String::new(),
        });

        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            entry.id = id.to_string();
        }
        if let Some(function) = &delta.function {
            if let Some(name) = function.name.as_deref().filter(|n| !n.is_empty()) {
                entry.name = name.to_string();
            }
            if let Some(arguments) = &function.arguments {
                entry.arguments.push_str(arguments);
            }
        }
    }

    fn drain(&mut self) -> Vec<ProviderEvent> {
        std::mem::take(&mut self.calls)
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|mut call| {
                if call.id.is_empty() {
                    call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
                }
                if call.arguments.trim().is_empty() {
                    call.arguments = "{}".to_string();
                }
                ProviderEvent::ToolCall(call)
            })
            .collect()
    }
}

/// Chat-completions client for OpenAI and the services that mirror its API.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    label: String,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            label: "OpenAI".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Name used in error messages, e.g. "Groq".
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn convert_messages<'a>(messages: &'a [ChatMessage]) -> Vec<OpenAIMessage<'a>> {
        messages
            .iter()
            .map(|m| {
                let tool_calls = m.tool_calls.as_ref().map(|tool_calls| {
                    tool_calls
                        .iter()
                        .map(|tc| OpenAIToolCallRequest {
                            id: &tc.id,
                            r#type: "function",
                            function: OpenAIFunctionRequest {
                                name: &tc.name,
                                arguments: &tc.arguments,
                            },
                        })
                        .collect()
                });

                OpenAIMessage {
                    role: &m.role,
                    content: Some(m.content.as_str()),
                    tool_calls,
                    tool_call_id: m.tool_call_id.as_deref(),
                }
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<OpenAITool> {
        tools
            .iter()
            .map(|t| OpenAITool {
                r#type: "function",
                function: OpenAIToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters_schema.clone(),
                },
            })
            .collect()
    }

    async fn send(&self, request: ChatRequest<'_>, stream: bool) -> anyhow::Result<reqwest::Response> {
        let body = OpenAIRequest {
            model: request.model,
            messages: Self::convert_messages(request.messages),
            tools: request
                .tools
                .filter(|tools| !tools.is_empty())
                .map(Self::convert_tools),
            temperature: request.temperature,
            stream,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "{} API error ({}): {}",
                self.label,
                status,
                error_text
            ));
        }

        Ok(response)
    }

    /// Parses one SSE line. Returns every event the line completes, in order.
    pub(crate) fn parse_sse_line(line: &str, pending: &mut PendingToolCalls) -> Vec<ProviderEvent> {
        let line = line.trim();

        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return vec![];
        };
        if data.is_empty() {
            return vec![];
        }
        if data == "[DONE]" {
            return pending.drain();
        }

        let response = match serde_json::from_str::<StreamResponse>(data) {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "skipping unparseable stream chunk");
                return vec![];
            }
        };

        let mut events = vec![];
        for choice in response.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                events.push(ProviderEvent::Token(content));
            }
            if let Some(reasoning) = choice.delta.reasoning_content.filter(|r| !r.is_empty()) {
                events.push(ProviderEvent::Thinking(reasoning));
            }
            for delta in choice.delta.tool_calls.iter().flatten() {
                pending.absorb(delta);
            }
            if choice.finish_reason.as_deref() == Some("tool_calls") {
                events.extend(pending.drain());
            }
        }
        events
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatResponse> {
        let response = self.send(request, false).await?;
        let openai_response: OpenAIResponse = response.json().await?;

        let message = openai_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow::anyhow!("No choices in {} response", self.label))?;

        let tool_calls: Vec<ToolCall> = message
            .tool_calls
            .map(|calls| {
                calls
                    .into_iter()
                    .map(|c| ToolCall {
                        id: c.id,
                        name: c.function.name,
                        arguments: c.function.arguments,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let text = match message.content {
            Some(c) if !c.trim().is_empty() => Some(c),
            _ => message.reasoning_content,
        };

        if text.is_none() && tool_calls.is_empty() {
            return Err(anyhow::anyhow!(
                "Empty response from {}: no content or tool calls",
                self.label
            ));
        }

        Ok(ChatResponse { text, tool_calls })
    }

    async fn chat_stream(
        &self,
        request: ChatRequest<'_>,
    ) -> anyhow::Result<BoxStream<'static, ProviderEvent>> {
        let response = self.send(request, true).await?;
        let (tx, rx) = tokio::sync::mpsc::channel::<ProviderEvent>(256);

        tokio::spawn(async move {
            use futures_util::StreamExt as _;
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut pending = PendingToolCalls::default();

            while let Some(chunk_result) = stream.next().await {
                let chunk = match chunk_result {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(ProviderEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw);
                    for event in Self::parse_sse_line(&line, &mut pending) {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }

            for event in pending.drain() {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(ProviderEvent::Done).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
