use egui::Pos2;

use crate::artifact::{Artifact, ArtifactId, Style};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Undo,
    Redo,
}

/// Polygon (and optionally label and style) of an artifact at one side of a
/// shape change.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeState {
    pub polygon: Vec<Pos2>,
    pub label: Option<String>,
    pub style: Option<Style>,
}

impl ShapeState {
    pub fn polygon(polygon: Vec<Pos2>) -> Self {
        Self {
            polygon,
            label: None,
            style: None,
        }
    }
}

/// A reversible document transition. Every variant carries the full state
/// on both sides, so applying it twice in the same direction is harmless.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Add {
        artifact: Artifact,
    },
    Delete {
        artifact: Artifact,
    },
    ModifyShape {
        id: ArtifactId,
        before: ShapeState,
        after: ShapeState,
    },
    ModifyAttribute {
        id: ArtifactId,
        before: String,
        after: String,
    },
    /// Every artifact one eraser stroke touched, before and after. Artifacts
    /// that survived keep their id on both sides; split fragments appear only
    /// in `after`, deleted artifacts only in `before`.
    EraseBatch {
        before: Vec<Artifact>,
        after: Vec<Artifact>,
    },
    /// Undone in reverse order, redone in order.
    Batch(Vec<Command>),
}

impl Command {
    pub fn describe(&self) -> String {
        match self {
            Command::Add { artifact } => format!("add {}", artifact.id()),
            Command::Delete { artifact } => format!("delete {}", artifact.id()),
            Command::ModifyShape { id, .. } => format!("edit shape of {id}"),
            Command::ModifyAttribute { id, .. } => format!("rename {id}"),
            Command::EraseBatch { before, .. } => format!("erase ({} touched)", before.len()),
            Command::Batch(commands) => format!("{} changes", commands.len()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UndoEntry {
    pub label: String,
    pub command: Command,
}

impl UndoEntry {
    pub fn new(command: Command) -> Self {
        Self {
            label: command.describe(),
            command,
        }
    }
}

/// Linear undo/redo stacks.
#[derive(Clone, Debug, Default)]
pub struct History {
    undo_stack: Vec<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
    /// 0 = unbounded
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            limit,
        }
    }

    /// Record a new transition. Anything that could be redone is forgotten.
    pub fn push(&mut self, entry: UndoEntry) {
        log::debug!("history: {}", entry.label);
        self.undo_stack.push(entry);
        self.redo_stack.clear();
        if self.limit > 0 && self.undo_stack.len() > self.limit {
            let excess = self.undo_stack.len() - self.limit;
            self.undo_stack.drain(..excess);
        }
    }

    /// Move the newest entry to the redo stack and return its command for
    /// the caller to apply backwards.
    pub fn undo(&mut self) -> Option<Command> {
        let entry = self.undo_stack.pop()?;
        let command = entry.command.clone();
        self.redo_stack.push(entry);
        Some(command)
    }

    pub fn redo(&mut self) -> Option<Command> {
        let entry = self.redo_stack.pop()?;
        let command = entry.command.clone();
        self.undo_stack.push(entry);
        Some(command)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(|e| e.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rename(id: u64, before: &str, after: &str) -> UndoEntry {
        UndoEntry::new(Command::ModifyAttribute {
            id: ArtifactId(id),
            before: before.into(),
            after: after.into(),
        })
    }

    #[test]
    fn undo_and_redo_on_empty_stacks_do_nothing() {
        let mut history = History::default();
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
    }

    #[test]
    fn entries_move_between_stacks() {
        let mut history = History::default();
        history.push(rename(1, "a", "b"));
        history.push(rename(1, "b", "c"));
        assert_eq!(history.undo_label(), Some("rename #1"));

        let undone = history.undo().unwrap();
        assert!(matches!(undone, Command::ModifyAttribute { ref after, .. } if after == "c"));
        assert!(history.can_redo());

        let redone = history.redo().unwrap();
        assert_eq!(redone, undone);
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn push_clears_redo() {
        let mut history = History::default();
        history.push(rename(1, "a", "b"));
        history.undo();
        assert!(history.can_redo());
        history.push(rename(2, "x", "y"));
        assert!(!history.can_redo());
        assert!(history.redo_label().is_none());
    }

    #[test]
    fn limit_drops_oldest() {
        let mut history = History::new(2);
        history.push(rename(1, "a", "b"));
        history.push(rename(2, "a", "b"));
        history.push(rename(3, "a", "b"));
        assert_eq!(history.len(), 2);
        history.undo();
        assert_eq!(history.undo_label(), Some("rename #2"));
        history.undo();
        assert!(!history.can_undo());
    }

    #[test]
    fn clear_empties_both_stacks() {
        let mut history = History::default();
        history.push(rename(1, "a", "b"));
        history.push(rename(1, "b", "c"));
        history.undo();
        history.clear();
        assert!(history.is_empty());
        assert!(!history.can_redo());
    }
}
