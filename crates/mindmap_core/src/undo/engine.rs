//! Undo/redo engine.
//!
//! # Responsibility
//! - Execute commands once and keep them on bounded undo/redo stacks.
//! - Route change notifications from command actions to listeners.
//!
//! # Invariants
//! - A command whose forward action fails is never pushed.
//! - Executing a new command clears the redo stack.
//! - A command whose reverse (or repeated forward) action fails returns to
//!   the stack it was taken from.
//! - The undo stack never holds more than `undo_levels` commands; the oldest
//!   command is dropped first.

use crate::model::map::MapModel;
use crate::undo::command::{Command, CommandResult};
use crate::undo::notify::{ChangeNotifier, NodeChangeListener};
use log::{debug, info, warn};
use std::collections::VecDeque;

/// Default number of undo steps kept.
pub const DEFAULT_UNDO_LEVELS: usize = 100;

/// Status of an undo or redo request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// A command was reversed (undo) or re-applied (redo).
    Applied { description: String },
    NothingToUndo,
    NothingToRedo,
}

/// Command history for one map.
pub struct UndoEngine {
    undo_stack: VecDeque<Command>,
    redo_stack: Vec<Command>,
    undo_levels: usize,
    notifier: ChangeNotifier,
}

impl Default for UndoEngine {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_LEVELS)
    }
}

impl UndoEngine {
    /// Creates an engine keeping at most `undo_levels` undo steps (minimum 1).
    pub fn new(undo_levels: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            undo_levels: undo_levels.max(1),
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_levels
    }

    pub fn add_listener(&mut self, listener: Box<dyn NodeChangeListener>) {
        self.notifier.add_listener(listener);
    }

    /// Runs `command` and records it.
    ///
    /// # Errors
    /// - Returns the command error unchanged; nothing is recorded and the map
    ///   is unchanged.
    pub fn execute(&mut self, map: &mut MapModel, command: Command) -> CommandResult<()> {
        if let Err(err) = command.act(map, &mut self.notifier) {
            warn!(
                "event=command_execute module=undo status=rejected command={} error={}",
                command.description(),
                err
            );
            return Err(err);
        }
        info!(
            "event=command_execute module=undo status=ok command={} undo_depth={}",
            command.description(),
            self.undo_stack.len() + 1
        );
        self.redo_stack.clear();
        self.push_undo(command);
        Ok(())
    }

    /// Reverses the most recent command.
    pub fn undo(&mut self, map: &mut MapModel) -> CommandResult<UndoOutcome> {
        let Some(command) = self.undo_stack.pop_back() else {
            debug!("event=command_undo module=undo status=skipped reason=empty_stack");
            return Ok(UndoOutcome::NothingToUndo);
        };
        if let Err(err) = command.undo(map, &mut self.notifier) {
            warn!(
                "event=command_undo module=undo status=error command={} error={}",
                command.description(),
                err
            );
            self.undo_stack.push_back(command);
            return Err(err);
        }
        info!(
            "event=command_undo module=undo status=ok command={}",
            command.description()
        );
        let description = command.description().to_string();
        self.redo_stack.push(command);
        Ok(UndoOutcome::Applied { description })
    }

    /// Re-applies the most recently undone command.
    pub fn redo(&mut self, map: &mut MapModel) -> CommandResult<UndoOutcome> {
        let Some(command) = self.redo_stack.pop() else {
            debug!("event=command_redo module=undo status=skipped reason=empty_stack");
            return Ok(UndoOutcome::NothingToRedo);
        };
        if let Err(err) = command.act(map, &mut self.notifier) {
            warn!(
                "event=command_redo module=undo status=error command={} error={}",
                command.description(),
                err
            );
            self.redo_stack.push(command);
            return Err(err);
        }
        info!(
            "event=command_redo module=undo status=ok command={}",
            command.description()
        );
        let description = command.description().to_string();
        self.push_undo(command);
        Ok(UndoOutcome::Applied { description })
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Description of the command `undo` would reverse.
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(Command::description)
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(Command::description)
    }

    /// Drops both histories, e.g. after a document is loaded.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn push_undo(&mut self, command: Command) {
        self.undo_stack.push_back(command);
        while self.undo_stack.len() > self.undo_levels {
            if let Some(dropped) = self.undo_stack.pop_front() {
                debug!(
                    "event=undo_history_trimmed module=undo status=ok dropped={} limit={}",
                    dropped.description(),
                    self.undo_levels
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{UndoEngine, UndoOutcome};
    use crate::model::map::MapModel;
    use crate::model::node::NodeText;
    use crate::undo::command::Command;

    #[test]
    fn undo_levels_drop_oldest_command() {
        let mut map = MapModel::new(NodeText::plain("0"));
        let root = map.root_id();
        let mut engine = UndoEngine::new(2);
        for step in 1..=3 {
            let command = Command::set_text(&map, root, NodeText::plain(step.to_string())).unwrap();
            engine.execute(&mut map, command).unwrap();
        }
        assert_eq!(engine.undo_depth(), 2);

        engine.undo(&mut map).unwrap();
        engine.undo(&mut map).unwrap();
        assert_eq!(engine.undo(&mut map).unwrap(), UndoOutcome::NothingToUndo);
        assert_eq!(map.root().text(), &NodeText::plain("1"));
    }

    #[test]
    fn zero_undo_levels_is_clamped() {
        assert_eq!(UndoEngine::new(0).undo_levels(), 1);
    }
}
