//! History
//!
//! The history owns the document and is the ground truth for its state. Every undoable change goes through
//! [`History::execute`] or [`History::write_with`], which apply the command and record it.
//!
//! History is strictly linear: a new command discards everything that was undone.

use crate::commands::{Affected, Command, CommandConsumer, CommandError, DoUndo};
use crate::element::ElementID;
use crate::id::TextureId;
use crate::state::{self, Document, LayerID};

pub mod writer;

/// Undo/redo availability, broadcast after every change to the stacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryMessage {
    pub can_undo: bool,
    pub can_redo: bool,
}

pub struct History {
    document: Document,
    undo: Vec<Command>,
    redo: Vec<Command>,
    on_change: parking_lot::Mutex<bus::Bus<HistoryMessage>>,
}
impl History {
    /// Take ownership of a document, without any history.
    #[must_use]
    pub fn from_document(document: Document) -> Self {
        Self {
            document,
            undo: Vec::new(),
            redo: Vec::new(),
            on_change: bus::Bus::new(64).into(),
        }
    }
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }
    /// Apply a command and push it onto the undo stack, clearing redo.
    /// On error, nothing is applied or recorded.
    pub fn execute(&mut self, command: Command) -> Result<Affected, CommandError> {
        let (result, affected) = self.write_with(|writer| writer.push(command));
        result.map(|()| affected)
    }
    /// Record every command issued through the writer as one undo step.
    /// Returns the closure's result and everything the recorded commands touched.
    pub fn write_with<F, T>(&mut self, write: F) -> (T, Affected)
    where
        F: FnOnce(&mut writer::HistoryWriter<'_>) -> T,
    {
        let (result, affected, changed) = {
            let mut writer = writer::HistoryWriter {
                document: &mut self.document,
                undo: &mut self.undo,
                redo: &mut self.redo,
                commands: smallvec::SmallVec::new(),
                affected: Affected::default(),
            };
            // `HistoryWriter`'s Drop records the commands, even on panic.
            let result = write(&mut writer);
            let changed = writer.changed();
            (result, std::mem::take(&mut writer.affected), changed)
        };
        if changed {
            self.notify();
        }
        (result, affected)
    }
    /// Revert the most recent command. `None` if there was nothing to undo.
    pub fn undo(&mut self) -> Option<Affected> {
        let command = self.undo.pop()?;
        if let Err(e) = self.document.apply(DoUndo::Undo(&command)) {
            // The stacks no longer describe the document. Keep the command where it was rather than
            // losing it, the state is unchanged.
            log::error!("failed to undo {}: {e}", command.name());
            self.undo.push(command);
            return None;
        }
        log::trace!("undid {}", command.name());
        let affected = command.affected();
        self.redo.push(command);
        self.notify();
        Some(affected)
    }
    /// Re-apply the most recently undone command. `None` if there was nothing to redo.
    pub fn redo(&mut self) -> Option<Affected> {
        let command = self.redo.pop()?;
        if let Err(e) = self.document.apply(DoUndo::Do(&command)) {
            log::error!("failed to redo {}: {e}", command.name());
            self.redo.push(command);
            return None;
        }
        log::trace!("redid {}", command.name());
        let affected = command.affected();
        self.undo.push(command);
        self.notify();
        Some(affected)
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
    #[must_use]
    pub fn message(&self) -> HistoryMessage {
        HistoryMessage {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }
    /// Receive a [`HistoryMessage`] after every change to the stacks.
    pub fn listen(&self) -> bus::BusReader<HistoryMessage> {
        self.on_change.lock().add_rx()
    }
    fn notify(&self) {
        // A full bus means some listener stopped reading. Not our problem, drop the message.
        if self.on_change.lock().try_broadcast(self.message()).is_err() {
            log::trace!("history listener is behind, dropped message");
        }
    }

    // Non-history state. Selection and the current layer are session state that happens
    // to live on the document.

    pub fn select_layer(&mut self, layer: LayerID) -> Result<(), state::TargetError> {
        self.document.set_current(layer)
    }
    pub fn set_selection(
        &mut self,
        selection: Option<(LayerID, ElementID)>,
    ) -> Result<(), state::TargetError> {
        self.document.set_selection(selection)
    }
    pub fn register_texture(&mut self, id: TextureId) {
        self.document.register_texture(id);
    }
}
