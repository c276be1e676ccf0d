//! Line editing for the interactive session
//!
//! rustyline blocks while it reads, so it lives on its own thread. The
//! session sends a prompt for each read and awaits the outcome on a tokio
//! channel. Completion and history navigation call back into the shared
//! runtime from that thread.

use async_trait::async_trait;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{
    Cmd, CompletionType, ConditionalEventHandler, Context, Editor, Event, EventContext,
    EventHandler, Helper, Highlighter, Hinter, KeyCode, KeyEvent, Modifiers, Movement,
    RepeatCount, Validator,
};
use std::sync::mpsc;
use tokio::runtime::Handle;
use tokio::sync::mpsc as async_mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cli::render::Theme;
use crate::core::{ReplError, Result, SharedHistory};
use crate::runtime::{completion_span, CompletionBridge, InputSource, Prompt, ReadOutcome};

#[derive(Helper, Hinter, Highlighter, Validator)]
struct ReplHelper {
    bridge: CompletionBridge,
    runtime: Handle,
}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = completion_span(line, pos).start;
        let candidates = self
            .runtime
            .block_on(self.bridge.get_completions(line, pos))
            .unwrap_or_else(|e| {
                warn!(error = %e, "completion request failed");
                Vec::new()
            });

        Ok((
            start,
            candidates
                .into_iter()
                .map(|candidate| Pair {
                    display: candidate.clone(),
                    replacement: candidate,
                })
                .collect(),
        ))
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Previous,
    Next,
}

/// Ctrl-Up / Ctrl-Down: swap the whole buffer for a history entry
struct HistoryStep {
    history: SharedHistory,
    direction: Direction,
}

impl ConditionalEventHandler for HistoryStep {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext,
    ) -> Option<Cmd> {
        let mut history = self.history.lock();
        let entry = match self.direction {
            Direction::Previous => history.move_previous(ctx.line()),
            Direction::Next => history.move_next(),
        };
        Some(match entry {
            Some(text) => Cmd::Replace(Movement::WholeBuffer, Some(text)),
            None => Cmd::Noop,
        })
    }
}

struct ReadRequest {
    prompt: String,
}

/// rustyline-backed [`InputSource`]
pub struct LineEditor {
    theme: Theme,
    requests: mpsc::Sender<ReadRequest>,
    responses: async_mpsc::UnboundedReceiver<Result<ReadOutcome>>,
}

impl LineEditor {
    /// Start the editor thread. Must be called from within a tokio runtime.
    pub fn spawn(history: SharedHistory, bridge: CompletionBridge, theme: Theme) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| ReplError::editor(format!("no async runtime available: {e}")))?;
        let (request_tx, request_rx) = mpsc::channel::<ReadRequest>();
        let (response_tx, response_rx) = async_mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        std::thread::Builder::new()
            .name("line-editor".to_string())
            .spawn(move || {
                let mut editor = match build_editor(history, bridge, runtime) {
                    Ok(editor) => {
                        let _ = ready_tx.send(Ok(()));
                        editor
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Ok(request) = request_rx.recv() {
                    let outcome = match editor.readline(&request.prompt) {
                        Ok(line) => Ok(ReadOutcome::Line(line)),
                        Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Quit),
                        Err(ReadlineError::Eof) => Ok(ReadOutcome::EndOfInput),
                        Err(e) => Err(ReplError::editor(e.to_string())),
                    };
                    if response_tx.send(outcome).is_err() {
                        break;
                    }
                }
                debug!("line editor thread exiting");
            })?;

        ready_rx
            .recv()
            .map_err(|_| ReplError::editor("line editor thread exited during startup"))??;

        Ok(Self {
            theme,
            requests: request_tx,
            responses: response_rx,
        })
    }
}

fn build_editor(
    history: SharedHistory,
    bridge: CompletionBridge,
    runtime: Handle,
) -> Result<Editor<ReplHelper, DefaultHistory>> {
    let config = rustyline::Config::builder()
        .auto_add_history(false)
        .completion_type(CompletionType::Circular)
        .build();
    let mut editor = Editor::with_config(config).map_err(|e| ReplError::editor(e.to_string()))?;
    editor.set_helper(Some(ReplHelper { bridge, runtime }));

    for (key, cmd) in fixed_bindings() {
        editor.bind_sequence(key, EventHandler::Simple(cmd));
    }

    editor.bind_sequence(
        KeyEvent(KeyCode::Up, Modifiers::CTRL),
        EventHandler::Conditional(Box::new(HistoryStep {
            history: history.clone(),
            direction: Direction::Previous,
        })),
    );
    editor.bind_sequence(
        KeyEvent(KeyCode::Down, Modifiers::CTRL),
        EventHandler::Conditional(Box::new(HistoryStep {
            history,
            direction: Direction::Next,
        })),
    );

    Ok(editor)
}

/// Bindings that map straight to an editor command
fn fixed_bindings() -> Vec<(KeyEvent, Cmd)> {
    vec![
        (
            KeyEvent(KeyCode::BackTab, Modifiers::NONE),
            Cmd::CompleteBackward,
        ),
        (
            KeyEvent::new('c', Modifiers::CTRL | Modifiers::ALT),
            Cmd::Kill(Movement::WholeBuffer),
        ),
    ]
}

#[async_trait]
impl InputSource for LineEditor {
    async fn read(&mut self, prompt: Prompt, cancel: CancellationToken) -> Result<ReadOutcome> {
        let prompt = match prompt {
            Prompt::Primary { language } => self.theme.primary_prompt(&language),
            Prompt::Continuation => self.theme.continuation(),
        };
        self.requests
            .send(ReadRequest { prompt })
            .map_err(|_| ReplError::editor("line editor thread stopped"))?;

        tokio::select! {
            response = self.responses.recv() => {
                response.unwrap_or_else(|| Err(ReplError::editor("line editor thread stopped")))
            }
            _ = cancel.cancelled() => Ok(ReadOutcome::EndOfInput),
        }
    }
}
