//! Commands and the arena that records their parent/child relationships.
//!
//! A command is identified by the slot it occupies in a [`CommandArena`], never
//! by its content: two submissions of the same code are two distinct commands.
//! Directive handling inside a kernel spawns child commands whose `parent` points
//! back at the submission that caused them. Ancestry is resolved by following
//! parent indices, so there are no reference cycles to worry about.
//!
//! Slots are never reused, so ids stay valid for the whole session. Once a
//! command tree has finished it is retired: its code payloads are released
//! and only the small slot (kind, language, parent link) remains.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of a command inside its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(usize);

impl CommandId {
    /// Position of the command inside the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// What a command asks the kernel to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKind {
    /// Run a code fragment
    SubmitCode { code: String },
    /// Ask for completion candidates at `position` (a byte offset into `code`)
    RequestCompletions { code: String, position: usize },
    /// Ask for the value of a named input
    RequestInput {
        name: String,
        type_hint: Option<String>,
    },
}

/// A unit of work submitted to a kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    /// Language the command targets; `None` means the kernel's current default
    pub target_language: Option<String>,
    pub parent: Option<CommandId>,
}

impl Command {
    /// Create a code submission
    pub fn submit_code(code: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::SubmitCode { code: code.into() },
            target_language: None,
            parent: None,
        }
    }

    /// Create a completion request for `code` with the cursor at `position`
    pub fn request_completions(code: impl Into<String>, position: usize) -> Self {
        Self {
            kind: CommandKind::RequestCompletions {
                code: code.into(),
                position,
            },
            target_language: None,
            parent: None,
        }
    }

    /// Create an input request
    pub fn request_input(name: impl Into<String>, type_hint: Option<String>) -> Self {
        Self {
            kind: CommandKind::RequestInput {
                name: name.into(),
                type_hint,
            },
            target_language: None,
            parent: None,
        }
    }

    /// Target a specific language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    /// Attach this command under `parent`
    pub fn child_of(mut self, parent: CommandId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Release the code payload, keeping kind, language and parent
    fn retire(&mut self) {
        match &mut self.kind {
            CommandKind::SubmitCode { code } => *code = String::new(),
            CommandKind::RequestCompletions { code, position } => {
                *code = String::new();
                *position = 0;
            }
            CommandKind::RequestInput { .. } => {}
        }
    }

    /// Code carried by the command, if it is a code submission
    pub fn code(&self) -> Option<&str> {
        match &self.kind {
            CommandKind::SubmitCode { code } => Some(code),
            CommandKind::RequestCompletions { code, .. } => Some(code),
            CommandKind::RequestInput { .. } => None,
        }
    }
}

/// Append-only store of every command seen during a session.
///
/// Cloning the arena yields another handle onto the same storage.
#[derive(Debug, Clone, Default)]
pub struct CommandArena {
    commands: Arc<RwLock<Vec<Command>>>,
}

impl CommandArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command and return its identity.
    ///
    /// A parent that is not already in the arena is dropped, which keeps every
    /// parent index strictly smaller than its child's and the ancestry walk finite.
    pub fn insert(&self, mut command: Command) -> CommandId {
        let mut commands = self.commands.write();
        if let Some(parent) = command.parent {
            if parent.0 >= commands.len() {
                tracing::warn!(%parent, "dropping parent link to unknown command");
                command.parent = None;
            }
        }
        commands.push(command);
        CommandId(commands.len() - 1)
    }

    /// Look up a command
    pub fn get(&self, id: CommandId) -> Option<Command> {
        self.commands.read().get(id.0).cloned()
    }

    /// Parent of a command, if any
    pub fn parent(&self, id: CommandId) -> Option<CommandId> {
        self.commands.read().get(id.0).and_then(|c| c.parent)
    }

    /// Top-most ancestor of a command (the command itself when it has no parent)
    pub fn root_of(&self, id: CommandId) -> CommandId {
        let commands = self.commands.read();
        let mut current = id;
        while let Some(parent) = commands.get(current.0).and_then(|c| c.parent) {
            current = parent;
        }
        current
    }

    /// Whether `id` is `root` or one of its descendants
    pub fn belongs_to(&self, id: CommandId, root: CommandId) -> bool {
        self.root_of(id) == root
    }

    /// Direct children of a command, in creation order
    pub fn children_of(&self, id: CommandId) -> Vec<CommandId> {
        self.commands
            .read()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.parent == Some(id))
            .map(|(index, _)| CommandId(index))
            .collect()
    }

    /// Release the payloads of `root` and every command beneath it.
    ///
    /// Called once the root's terminal event has been observed. Ancestry
    /// queries keep working on retired commands.
    pub fn retire_tree(&self, root: CommandId) {
        let mut commands = self.commands.write();
        let mut retired = 0usize;
        // Children always sit after their parent
        for index in root.0..commands.len() {
            let mut current = index;
            while let Some(parent) = commands[current].parent {
                current = parent.0;
            }
            if current == root.0 {
                commands[index].retire();
                retired += 1;
            }
        }
        tracing::trace!(%root, retired, "command tree retired");
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    /// Whether no command has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_not_content() {
        let arena = CommandArena::new();
        let first = arena.insert(Command::submit_code("1"));
        let second = arena.insert(Command::submit_code("1"));

        assert_ne!(first, second);
        assert_eq!(arena.get(first), arena.get(second));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_root_of_walks_parent_chain() {
        let arena = CommandArena::new();
        let root = arena.insert(Command::submit_code("#!fsharp\n1"));
        let child = arena.insert(Command::submit_code("1").with_language("fsharp").child_of(root));
        let grandchild = arena.insert(Command::request_input("abc", None).child_of(child));
        let unrelated = arena.insert(Command::submit_code("2"));

        assert_eq!(arena.root_of(root), root);
        assert_eq!(arena.root_of(child), root);
        assert_eq!(arena.root_of(grandchild), root);
        assert!(arena.belongs_to(grandchild, root));
        assert!(!arena.belongs_to(unrelated, root));
        assert_eq!(arena.children_of(root), vec![child]);
        assert_eq!(arena.parent(grandchild), Some(child));
    }

    #[test]
    fn test_unknown_parent_is_dropped() {
        let arena = CommandArena::new();
        let orphan = arena.insert(Command::submit_code("x").child_of(CommandId(42)));

        assert_eq!(arena.parent(orphan), None);
        assert_eq!(arena.root_of(orphan), orphan);
    }

    #[test]
    fn test_retire_tree_releases_code_but_keeps_links() {
        let arena = CommandArena::new();
        let root = arena.insert(Command::submit_code("#!fsharp\nlet x = 1"));
        let child = arena.insert(
            Command::submit_code("let x = 1")
                .with_language("fsharp")
                .child_of(root),
        );
        let other = arena.insert(Command::request_completions("Console.Wr", 10));

        arena.retire_tree(root);

        assert_eq!(arena.get(root).unwrap().code(), Some(""));
        let retired_child = arena.get(child).unwrap();
        assert_eq!(retired_child.code(), Some(""));
        assert_eq!(retired_child.target_language.as_deref(), Some("fsharp"));
        assert_eq!(arena.children_of(root), vec![child]);
        assert_eq!(arena.root_of(child), root);
        assert_eq!(arena.get(other).unwrap().code(), Some("Console.Wr"));
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn test_clones_share_storage() {
        let arena = CommandArena::new();
        let handle = arena.clone();
        let id = handle.insert(Command::submit_code("shared"));

        assert_eq!(arena.get(id).and_then(|c| c.code().map(str::to_string)), Some("shared".to_string()));
    }
}
