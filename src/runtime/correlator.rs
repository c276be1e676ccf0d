//! Event correlation for one in-flight command
//!
//! This module handles:
//! - Matching kernel events to the submitted root command by ancestry
//! - Coalescing stdout/stderr into one text block per command
//! - Forwarding display and error output to a sink as it arrives
//! - Detecting the single terminal event for the root command
//!
//! [`EventCorrelator`] is a plain state machine fed one event at a time, so
//! the same folding rules apply to live rendering and to notebook transcripts.
//! [`correlate`] is the async driver that subscribes, submits and feeds it.

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::core::event::plain_text_value;
use crate::core::{
    Command, CommandArena, CommandId, KernelEvent, OutputElement, Result, TextStream,
};
use crate::runtime::kernel::KernelFacade;

/// Name given to error outputs produced from kernel events
pub const ERROR_NAME: &str = "Error";

/// Destination for folded output
pub trait OutputSink {
    fn append(&mut self, element: OutputElement);

    /// A displayed value was updated. Appends unless the sink can replace
    /// what it showed last.
    fn update_display(&mut self, element: OutputElement) {
        self.append(element);
    }
}

/// Transcript sink: every element is kept, updates included
impl OutputSink for Vec<OutputElement> {
    fn append(&mut self, element: OutputElement) {
        self.push(element);
    }
}

/// How a correlated command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Succeeded,
    Failed { message: String },
    Cancelled,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Folds the event stream of one root command into a sink
#[derive(Debug)]
pub struct EventCorrelator<S> {
    root: CommandId,
    commands: CommandArena,
    sink: S,
    stdout: Option<String>,
    stderr: Option<String>,
    incomplete: bool,
    outcome: Option<CommandOutcome>,
}

impl<S: OutputSink> EventCorrelator<S> {
    /// Create a new correlator for `root`
    pub fn new(root: CommandId, commands: CommandArena, sink: S) -> Self {
        Self {
            root,
            commands,
            sink,
            stdout: None,
            stderr: None,
            incomplete: false,
            outcome: None,
        }
    }

    pub fn root(&self) -> CommandId {
        self.root
    }

    /// Feed one event. Returns `true` once the root command has finished.
    ///
    /// Events from unrelated commands are ignored, as is anything arriving
    /// after the terminal event.
    pub fn observe(&mut self, event: &KernelEvent) -> bool {
        if self.outcome.is_some() {
            return true;
        }

        let command = event.command();
        if !self.commands.belongs_to(command, self.root) {
            debug!(%command, root = %self.root, kind = event.kind_name(), "ignoring unrelated event");
            return false;
        }

        match event {
            KernelEvent::CodeSubmissionReceived { .. } => {}
            KernelEvent::CompleteCodeSubmissionReceived { .. } => {
                if command == self.root {
                    self.incomplete = false;
                }
            }
            KernelEvent::IncompleteCodeSubmissionReceived { .. } => {
                if command == self.root {
                    self.incomplete = true;
                }
            }

            KernelEvent::ErrorProduced { message, .. } => {
                self.sink
                    .append(OutputElement::error(ERROR_NAME, message.clone(), None));
            }
            KernelEvent::StandardOutputProduced { values, .. } => {
                self.stdout
                    .get_or_insert_with(String::new)
                    .push_str(plain_text_value(values));
            }
            KernelEvent::StandardErrorProduced { values, .. } => {
                self.stderr
                    .get_or_insert_with(String::new)
                    .push_str(plain_text_value(values));
            }
            KernelEvent::DisplayedValueProduced { values, .. } => {
                self.sink.append(OutputElement::display(values));
            }
            KernelEvent::DisplayedValueUpdated { values, .. } => {
                self.sink.update_display(OutputElement::display(values));
            }
            KernelEvent::ReturnValueProduced {
                values,
                already_displayed,
                ..
            } => {
                if !already_displayed {
                    self.sink.append(OutputElement::display(values));
                }
            }

            KernelEvent::CompletionsProduced { .. } | KernelEvent::InputProduced { .. } => {}

            KernelEvent::CommandFailed {
                message,
                stack_trace,
                ..
            } => {
                if command != self.root {
                    debug!(%command, "child command failed");
                    return false;
                }
                self.flush_text();
                self.sink.append(OutputElement::error(
                    ERROR_NAME,
                    message.clone(),
                    stack_trace.as_deref(),
                ));
                self.outcome = Some(CommandOutcome::Failed {
                    message: message.clone(),
                });
                return true;
            }
            KernelEvent::CommandSucceeded { .. } => {
                if command != self.root {
                    return false;
                }
                self.flush_text();
                self.outcome = Some(CommandOutcome::Succeeded);
                return true;
            }
        }

        false
    }

    /// Stop waiting without a terminal event. Buffered text is still flushed.
    pub fn cancel(&mut self) {
        if self.outcome.is_none() {
            self.flush_text();
            self.outcome = Some(CommandOutcome::Cancelled);
        }
    }

    /// Whether the kernel reported the root submission as incomplete
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn outcome(&self) -> Option<&CommandOutcome> {
        self.outcome.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Emit buffered stdout and stderr as one text element, stdout first
    fn flush_text(&mut self) {
        let stdout = self.stdout.take();
        let stderr = self.stderr.take();

        let stream = if stdout.is_some() {
            TextStream::Stdout
        } else {
            TextStream::Stderr
        };

        let text = match (stdout, stderr) {
            (None, None) => return,
            (Some(out), None) => out,
            (None, Some(err)) => err,
            (Some(out), Some(err)) => format!("{out}\n\n{err}"),
        };

        if !text.is_empty() {
            self.sink.append(OutputElement::Text { text, stream });
        }
    }
}

/// Result of driving one command to completion
#[derive(Debug)]
pub struct Correlated<S> {
    pub command: CommandId,
    pub outcome: CommandOutcome,
    pub incomplete: bool,
    pub sink: S,
}

/// Submit `command` and fold its events into `sink` until the root finishes
/// or `cancel` fires.
///
/// The subscription is taken before submission and dropped on every exit
/// path. A closed event stream is returned as an error.
#[instrument(skip_all, fields(language = command.target_language.as_deref()))]
pub async fn correlate<S: OutputSink + Send>(
    kernel: &dyn KernelFacade,
    command: Command,
    sink: S,
    cancel: CancellationToken,
) -> Result<Correlated<S>> {
    let commands = kernel.commands();
    let id = commands.insert(command);
    let mut correlator = EventCorrelator::new(id, commands.clone(), sink);

    if cancel.is_cancelled() {
        correlator.cancel();
        commands.retire_tree(id);
        return Ok(finish(correlator));
    }

    let mut subscription = kernel.subscribe();
    kernel.submit(id, &subscription, cancel.clone()).await?;
    debug!(command = %id, "command submitted");

    loop {
        tokio::select! {
            biased;
            event = subscription.recv() => {
                if correlator.observe(&event?) {
                    break;
                }
            }
            _ = cancel.cancelled() => {
                debug!(command = %id, "correlation cancelled");
                correlator.cancel();
                break;
            }
        }
    }

    drop(subscription);
    commands.retire_tree(id);
    Ok(finish(correlator))
}

fn finish<S: OutputSink>(correlator: EventCorrelator<S>) -> Correlated<S> {
    let command = correlator.root();
    let incomplete = correlator.is_incomplete();
    let outcome = correlator
        .outcome()
        .cloned()
        .unwrap_or(CommandOutcome::Cancelled);
    Correlated {
        command,
        outcome,
        incomplete,
        sink: correlator.into_sink(),
    }
}
