//! Scripted kernel for exercising the runtime without real interpreters
//!
//! Each line of a submission is an instruction:
//!
//! | Line | Events published |
//! |---|---|
//! | `#!lang` | switches (and remembers) the target language |
//! | `out:x` / `err:x` | stdout / stderr text `x` |
//! | `display:x` / `update:x` | displayed value produced / updated |
//! | `return:x` | return value |
//! | `return-displayed:x` | return value flagged as already displayed |
//! | `error:x` | error produced |
//! | `fail:x` | root command failed with message `x`, stops the script |
//! | `incomplete` | as the last line: submission is incomplete, nothing runs; skipped elsewhere |
//! | `child-out:x` | stdout from a child command of the root |
//! | `foreign-out:x` | stdout from an unrelated command |
//! | `input:name` | input request resolved through the installed resolver |
//! | `hang` | stops without a terminal event |
//! | anything else | return value with the line's text |
//!
//! Every event is published before `submit` returns, so a script must stay
//! within one subscription queue's capacity.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::{
    Command, CommandArena, CommandId, CommandKind, CompletionItem, FormattedValue, KernelEvent,
    Result,
};
use crate::runtime::kernel::{EventBus, EventSubscription, InputResolver, KernelFacade};

/// Language tag a scripted submission was routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Routed {
    pub code: String,
    pub language: String,
}

pub(crate) struct ScriptedKernel {
    commands: CommandArena,
    bus: EventBus,
    default_language: Mutex<String>,
    resolver: Mutex<Option<Arc<dyn InputResolver>>>,
    completions: Mutex<Vec<String>>,
    routed: Mutex<Vec<Routed>>,
    outbox: Mutex<Vec<KernelEvent>>,
}

impl ScriptedKernel {
    pub fn new() -> Self {
        Self::with_default_language("csharp")
    }

    pub fn with_default_language(language: &str) -> Self {
        Self {
            commands: CommandArena::new(),
            bus: EventBus::new(),
            default_language: Mutex::new(language.to_string()),
            resolver: Mutex::new(None),
            completions: Mutex::new(Vec::new()),
            routed: Mutex::new(Vec::new()),
            outbox: Mutex::new(Vec::new()),
        }
    }

    /// Candidates returned for every completion request
    pub fn with_completions(self, candidates: &[&str]) -> Self {
        *self.completions.lock() = candidates.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Code submissions in the order they ran, with the language they ran in
    pub fn routed(&self) -> Vec<Routed> {
        self.routed.lock().clone()
    }

    /// Codes of the submissions, in order
    pub fn submitted_codes(&self) -> Vec<String> {
        self.routed.lock().iter().map(|r| r.code.clone()).collect()
    }

    /// Queue an event; `submit` delivers the queue once the script has run
    fn publish(&self, event: KernelEvent) {
        self.outbox.lock().push(event);
    }

    fn run_script(&self, root: CommandId, code: &str, target: Option<String>) {
        self.publish(KernelEvent::CodeSubmissionReceived { command: root });

        let mut language = target.unwrap_or_else(|| self.default_language.lock().clone());
        let mut body = Vec::new();

        for line in code.lines() {
            if let Some(directive) = line.strip_prefix("#!") {
                language = directive.trim().to_string();
                *self.default_language.lock() = language.clone();
            } else {
                body.push(line);
            }
        }

        if body.last().map(|line| line.trim()) == Some("incomplete") {
            self.publish(KernelEvent::IncompleteCodeSubmissionReceived { command: root });
            self.publish(KernelEvent::CommandSucceeded { command: root });
            return;
        }
        self.publish(KernelEvent::CompleteCodeSubmissionReceived { command: root });

        self.routed.lock().push(Routed {
            code: body.join("\n"),
            language,
        });

        for line in body {
            let plain = |text: &str| vec![FormattedValue::plain(text)];

            if let Some(text) = line.strip_prefix("out:") {
                self.publish(KernelEvent::StandardOutputProduced {
                    command: root,
                    values: plain(text),
                });
            } else if let Some(text) = line.strip_prefix("err:") {
                self.publish(KernelEvent::StandardErrorProduced {
                    command: root,
                    values: plain(text),
                });
            } else if let Some(text) = line.strip_prefix("display:") {
                self.publish(KernelEvent::DisplayedValueProduced {
                    command: root,
                    value_id: Some("d1".to_string()),
                    values: plain(text),
                });
            } else if let Some(text) = line.strip_prefix("update:") {
                self.publish(KernelEvent::DisplayedValueUpdated {
                    command: root,
                    value_id: Some("d1".to_string()),
                    values: plain(text),
                });
            } else if let Some(text) = line.strip_prefix("return-displayed:") {
                self.publish(KernelEvent::ReturnValueProduced {
                    command: root,
                    values: plain(text),
                    already_displayed: true,
                });
            } else if let Some(text) = line.strip_prefix("return:") {
                self.publish(KernelEvent::ReturnValueProduced {
                    command: root,
                    values: plain(text),
                    already_displayed: false,
                });
            } else if let Some(text) = line.strip_prefix("error:") {
                self.publish(KernelEvent::ErrorProduced {
                    command: root,
                    message: text.to_string(),
                });
            } else if let Some(text) = line.strip_prefix("fail:") {
                self.publish(KernelEvent::CommandFailed {
                    command: root,
                    message: text.to_string(),
                    stack_trace: Some("at cell\nat kernel".to_string()),
                });
                return;
            } else if let Some(text) = line.strip_prefix("child-out:") {
                let child = self
                    .commands
                    .insert(Command::submit_code(text).child_of(root));
                self.publish(KernelEvent::StandardOutputProduced {
                    command: child,
                    values: plain(text),
                });
                self.publish(KernelEvent::CommandSucceeded { command: child });
            } else if let Some(text) = line.strip_prefix("foreign-out:") {
                let foreign = self.commands.insert(Command::submit_code(text));
                self.publish(KernelEvent::StandardOutputProduced {
                    command: foreign,
                    values: plain(text),
                });
                self.publish(KernelEvent::CommandSucceeded { command: foreign });
            } else if let Some(name) = line.strip_prefix("input:") {
                let request = self
                    .commands
                    .insert(Command::request_input(name, None).child_of(root));
                match self.resolve(name) {
                    Some(value) => {
                        self.publish(KernelEvent::InputProduced {
                            command: request,
                            value: value.clone(),
                        });
                        self.publish(KernelEvent::ReturnValueProduced {
                            command: root,
                            values: plain(&value),
                            already_displayed: false,
                        });
                    }
                    None => {
                        self.publish(KernelEvent::CommandFailed {
                            command: root,
                            message: format!("no value was supplied for input '{name}'"),
                            stack_trace: None,
                        });
                        return;
                    }
                }
            } else if line.trim() == "incomplete" {
                continue;
            } else if line.trim() == "hang" {
                return;
            } else if !line.trim().is_empty() {
                self.publish(KernelEvent::ReturnValueProduced {
                    command: root,
                    values: plain(line),
                    already_displayed: false,
                });
            }
        }

        self.publish(KernelEvent::CommandSucceeded { command: root });
    }

    fn resolve(&self, name: &str) -> Option<String> {
        let resolver = self.resolver.lock().clone();
        resolver.and_then(|r| r.resolve(name, None))
    }
}

#[async_trait]
impl KernelFacade for ScriptedKernel {
    fn commands(&self) -> CommandArena {
        self.commands.clone()
    }

    fn subscribe(&self) -> EventSubscription {
        self.bus.subscribe()
    }

    async fn submit(
        &self,
        command: CommandId,
        _subscription: &EventSubscription,
        _cancel: CancellationToken,
    ) -> Result<()> {
        let Some(submitted) = self.commands.get(command) else {
            return Err(crate::core::ReplError::kernel(format!(
                "unknown command {command}"
            )));
        };

        match submitted.kind {
            CommandKind::SubmitCode { code } => {
                self.run_script(command, &code, submitted.target_language)
            }
            CommandKind::RequestCompletions { .. } => {
                let completions = self
                    .completions
                    .lock()
                    .iter()
                    .map(|c| CompletionItem::new(c.clone()))
                    .collect();
                self.publish(KernelEvent::CompletionsProduced {
                    command,
                    completions,
                });
                self.publish(KernelEvent::CommandSucceeded { command });
            }
            CommandKind::RequestInput { name, .. } => match self.resolve(&name) {
                Some(value) => {
                    self.publish(KernelEvent::InputProduced { command, value });
                    self.publish(KernelEvent::CommandSucceeded { command });
                }
                None => self.publish(KernelEvent::CommandFailed {
                    command,
                    message: format!("no value was supplied for input '{name}'"),
                    stack_trace: None,
                }),
            },
        }

        let events = std::mem::take(&mut *self.outbox.lock());
        for event in events {
            self.bus.publish(event).await;
        }
        Ok(())
    }

    fn default_language(&self) -> String {
        self.default_language.lock().clone()
    }

    fn set_input_resolver(&self, resolver: Arc<dyn InputResolver>) {
        *self.resolver.lock() = Some(resolver);
    }
}
