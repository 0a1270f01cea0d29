use anyhow::{Result, anyhow};
use async_trait::async_trait;
use conduit_core::{AgentEvent, Console, ConsoleInput};
use console::style;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc;

pub const PROMPT: &str = "🧑 You: ";
pub const ERROR_PREFIX: &str = "❌ Error:";
const SEPARATOR_WIDTH: usize = 60;
const RESULT_PREVIEW_CHARS: usize = 160;

type LineResult = std::result::Result<ConsoleInput, String>;

/// Line editor living on its own thread. Each request yields one reply.
struct InputThread {
    requests: std_mpsc::Sender<()>,
    replies: mpsc::UnboundedReceiver<LineResult>,
    awaiting: bool,
}

impl InputThread {
    fn spawn(history: Option<PathBuf>) -> Result<Self> {
        let (request_tx, request_rx) = std_mpsc::channel::<()>();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("conduit-input".into())
            .spawn(move || input_loop(request_rx, reply_tx, history))?;

        Ok(Self {
            requests: request_tx,
            replies: reply_rx,
            awaiting: false,
        })
    }
}

fn input_loop(
    requests: std_mpsc::Receiver<()>,
    replies: mpsc::UnboundedSender<LineResult>,
    history: Option<PathBuf>,
) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            let _ = replies.send(Err(format!("failed to open line editor: {e}")));
            return;
        }
    };
    if let Some(path) = &history
        && editor.load_history(path).is_err()
    {
        tracing::debug!(path = %path.display(), "no previous input history");
    }

    while requests.recv().is_ok() {
        let reply = match editor.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                    if let Some(path) = &history
                        && let Err(e) = editor.save_history(path)
                    {
                        tracing::debug!("Failed to save input history: {}", e);
                    }
                }
                Ok(ConsoleInput::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ConsoleInput::Interrupted),
            Err(ReadlineError::Eof) => Ok(ConsoleInput::Eof),
            Err(e) => Err(e.to_string()),
        };

        if replies.send(reply).is_err() {
            break;
        }
    }
}

/// Console on stdin/stdout. Streamed tokens are written as they arrive;
/// with `render_markdown` a buffered answer is rendered with termimad.
pub struct TerminalConsole {
    input: Option<InputThread>,
    history: Option<PathBuf>,
    render_markdown: bool,
    skin: termimad::MadSkin,
    mid_line: bool,
}

impl TerminalConsole {
    pub fn new(render_markdown: bool) -> Self {
        Self {
            input: None,
            history: None,
            render_markdown,
            skin: termimad::MadSkin::default(),
            mid_line: false,
        }
    }

    pub fn with_history(mut self, path: PathBuf) -> Self {
        self.history = Some(path);
        self
    }

    fn input(&mut self) -> Result<&mut InputThread> {
        if self.input.is_none() {
            self.input = Some(InputThread::spawn(self.history.clone())?);
        }
        self.input
            .as_mut()
            .ok_or_else(|| anyhow!("input thread unavailable"))
    }

    fn break_line(&mut self, out: &mut impl Write) -> Result<()> {
        if self.mid_line {
            writeln!(out)?;
            self.mid_line = false;
        }
        Ok(())
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= RESULT_PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(RESULT_PREVIEW_CHARS).collect();
    format!("{cut}…")
}

#[async_trait]
impl Console for TerminalConsole {
    async fn read_line(&mut self) -> Result<ConsoleInput> {
        let input = self.input()?;
        if !input.awaiting {
            input
                .requests
                .send(())
                .map_err(|_| anyhow!("input thread stopped"))?;
            input.awaiting = true;
        }

        let reply = input
            .replies
            .recv()
            .await
            .ok_or_else(|| anyhow!("input thread stopped"))?;
        input.awaiting = false;
        reply.map_err(|e| anyhow!(e))
    }

    fn write_event(&mut self, event: &AgentEvent) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();

        match event {
            AgentEvent::Token(token) if self.render_markdown => {
                self.break_line(&mut out)?;
                write!(out, "{}", self.skin.term_text(token))?;
            }
            AgentEvent::Token(token) => {
                write!(out, "{token}")?;
                self.mid_line = !token.ends_with('\n');
            }
            AgentEvent::ToolCall(call) => {
                self.break_line(&mut out)?;
                writeln!(
                    out,
                    "{}",
                    style(format!("🔧 {}({})", call.name, preview(&call.arguments))).dim()
                )?;
            }
            AgentEvent::ToolResult { name, result } => {
                self.break_line(&mut out)?;
                let summary = if result.success {
                    preview(&result.output)
                } else {
                    format!("failed: {}", preview(result.error.as_deref().unwrap_or_default()))
                };
                writeln!(out, "{}", style(format!("   ↳ {name}: {summary}")).dim())?;
            }
        }

        out.flush()?;
        Ok(())
    }

    fn write_error(&mut self, message: &str) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.break_line(&mut out)?;
        writeln!(out, "{} {}", style(ERROR_PREFIX).red().bold(), message)?;
        out.flush()?;
        Ok(())
    }

    fn end_turn(&mut self) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.break_line(&mut out)?;
        writeln!(out, "{}", style("─".repeat(SEPARATOR_WIDTH)).dim())?;
        out.flush()?;
        Ok(())
    }

    fn notice(&mut self, message: &str) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.break_line(&mut out)?;
        writeln!(out, "{}", style(message).dim())?;
        out.flush()?;
        Ok(())
    }
}
