//! # Commands
//!
//! Commands are the only way undoable document state is modified. Every committing edit is recorded as a
//! command by a [`crate::queue::writer`], and undo is the same command applied with old and new swapped.

use crate::color::Color;
use crate::element::{Element, ElementID, ElementTransform};
use crate::state::{Document, Layer, LayerID};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("command constructed for a state that does not match the current state")]
    MismatchedState,
    #[error("resource referenced by the command is not found")]
    UnknownResource,
    #[error("command makes no changes")]
    NoOp,
}
pub trait CommandConsumer<C> {
    /// Apply a single command. If this generates an error,
    /// the state of `self` should *not* be observably changed.
    fn apply(&mut self, command: DoUndo<'_, C>) -> Result<(), CommandError>;
}

#[derive(PartialEq, Eq, Debug)]
pub enum DoUndo<'c, T> {
    Do(&'c T),
    Undo(&'c T),
}
// Only holds a reference, so copyable regardless of T.
impl<T> Clone for DoUndo<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for DoUndo<'_, T> {}
impl<'c, T> DoUndo<'c, T> {
    /// The opposite direction over the same command.
    #[must_use]
    pub fn invert(self) -> Self {
        match self {
            Self::Do(c) => Self::Undo(c),
            Self::Undo(c) => Self::Do(c),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    UpdateStrength {
        from: f32,
        to: f32,
    },
    UpdatePrompt {
        from: String,
        to: String,
    },
    UpdateSeed {
        from: u64,
        to: u64,
    },
    /// Every element of the layer was removed.
    ClearLayer {
        target: LayerID,
        removed: Vec<Element>,
    },
    ChangeLayerVisibility {
        target: LayerID,
        from_hidden: bool,
        to_hidden: bool,
    },
    ChangeLayerOpacity {
        target: LayerID,
        from: f32,
        to: f32,
    },
    ChangeLayerLock {
        target: LayerID,
        from: bool,
        to: bool,
    },
    AddLayer {
        layer: Box<Layer>,
        index: usize,
        previous_current: LayerID,
    },
    DuplicateLayer {
        source: LayerID,
        duplicate: Box<Layer>,
        index: usize,
        previous_current: LayerID,
    },
    DeleteLayer {
        layer: Box<Layer>,
        index: usize,
        previous_current: LayerID,
        next_current: LayerID,
    },
    MoveLayer {
        target: LayerID,
        from: usize,
        to: usize,
    },
    ChangeBackgroundColor {
        from: Option<Color>,
        to: Option<Color>,
    },
    RemoveBackground {
        from: Color,
    },
    /// A committed move, resize or rotation of an element.
    RegisterTransform {
        layer: LayerID,
        element: ElementID,
        from: ElementTransform,
        to: ElementTransform,
    },
    /// An element appended to the top of a layer. Stroke commits and pastes.
    AddElement {
        layer: LayerID,
        element: Box<Element>,
    },
    /// Many commands treated as a single one, as far as the user can tell.
    Scope(Box<[Command]>),
}

bitflags::bitflags! {
    /// Which derived state a command invalidates.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct Affects : u8 {
        /// Element lists or transforms changed, drawables must be redrawn.
        const LAYER_CONTENT    = 0b0000_0001;
        /// Opacity, visibility or lock changed. Composite only.
        const LAYER_PROPERTIES = 0b0000_0010;
        /// Layers added, removed or reordered.
        const LAYER_STRUCTURE  = 0b0000_0100;
        const BACKGROUND       = 0b0000_1000;
        /// Generation parameters. Never drawn.
        const GENERATION       = 0b0001_0000;
    }
}

/// Summary of what a command (or group of commands) touched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Affected {
    pub flags: Affects,
    /// Layers whose content must be redrawn.
    pub layers: smallvec::SmallVec<[LayerID; 2]>,
}
impl Affected {
    fn content(layer: LayerID) -> Self {
        Self {
            flags: Affects::LAYER_CONTENT,
            layers: smallvec::smallvec![layer],
        }
    }
    fn flags(flags: Affects) -> Self {
        Self {
            flags,
            layers: smallvec::SmallVec::new(),
        }
    }
    pub fn merge(&mut self, other: Self) {
        self.flags |= other.flags;
        for layer in other.layers {
            if !self.layers.contains(&layer) {
                self.layers.push(layer);
            }
        }
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl Command {
    #[must_use]
    pub fn affected(&self) -> Affected {
        match self {
            Self::UpdateStrength { .. } | Self::UpdatePrompt { .. } | Self::UpdateSeed { .. } => {
                Affected::flags(Affects::GENERATION)
            }
            Self::ClearLayer { target, .. } => Affected::content(*target),
            Self::RegisterTransform { layer, .. } | Self::AddElement { layer, .. } => {
                Affected::content(*layer)
            }
            Self::ChangeLayerVisibility { .. }
            | Self::ChangeLayerOpacity { .. }
            | Self::ChangeLayerLock { .. } => Affected::flags(Affects::LAYER_PROPERTIES),
            Self::AddLayer { layer, .. } | Self::DeleteLayer { layer, .. } => Affected {
                flags: Affects::LAYER_STRUCTURE | Affects::LAYER_CONTENT,
                layers: smallvec::smallvec![layer.id()],
            },
            Self::DuplicateLayer { duplicate, .. } => Affected {
                flags: Affects::LAYER_STRUCTURE | Affects::LAYER_CONTENT,
                layers: smallvec::smallvec![duplicate.id()],
            },
            Self::MoveLayer { .. } => Affected::flags(Affects::LAYER_STRUCTURE),
            Self::ChangeBackgroundColor { .. } | Self::RemoveBackground { .. } => {
                Affected::flags(Affects::BACKGROUND)
            }
            Self::Scope(commands) => {
                commands
                    .iter()
                    .fold(Affected::default(), |mut affected, command| {
                        affected.merge(command.affected());
                        affected
                    })
            }
        }
    }
    /// Short name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateStrength { .. } => "UpdateStrength",
            Self::UpdatePrompt { .. } => "UpdatePrompt",
            Self::UpdateSeed { .. } => "UpdateSeed",
            Self::ClearLayer { .. } => "ClearLayer",
            Self::ChangeLayerVisibility { .. } => "ChangeLayerVisibility",
            Self::ChangeLayerOpacity { .. } => "ChangeLayerOpacity",
            Self::ChangeLayerLock { .. } => "ChangeLayerLock",
            Self::AddLayer { .. } => "AddLayer",
            Self::DuplicateLayer { .. } => "DuplicateLayer",
            Self::DeleteLayer { .. } => "DeleteLayer",
            Self::MoveLayer { .. } => "MoveLayer",
            Self::ChangeBackgroundColor { .. } => "ChangeBackgroundColor",
            Self::RemoveBackground { .. } => "RemoveBackground",
            Self::RegisterTransform { .. } => "RegisterTransform",
            Self::AddElement { .. } => "AddElement",
            Self::Scope(_) => "Scope",
        }
    }
}

/// Insert a captured layer and make it current.
fn insert_layer(
    document: &mut Document,
    layer: &Layer,
    index: usize,
) -> Result<(), CommandError> {
    document
        .layers_mut()
        .insert(index, layer.clone())
        .map_err(|_| CommandError::MismatchedState)?;
    // Just inserted, can't be missing.
    let _ = document.set_current(layer.id());
    Ok(())
}
/// Remove a layer that was inserted by a command, restoring the old current layer.
fn uninsert_layer(
    document: &mut Document,
    layer: LayerID,
    index: usize,
    restore_current: LayerID,
) -> Result<(), CommandError> {
    if document.layers().position(layer) != Some(index) {
        return Err(CommandError::MismatchedState);
    }
    if document.layers().len() == 1 {
        // Would leave the document empty.
        return Err(CommandError::MismatchedState);
    }
    if restore_current == layer || document.layer(restore_current).is_none() {
        return Err(CommandError::MismatchedState);
    }
    document
        .layers_mut()
        .remove(layer)
        .map_err(|_| CommandError::UnknownResource)?;
    // Checked above.
    let _ = document.set_current(restore_current);
    Ok(())
}

impl CommandConsumer<Command> for Document {
    fn apply(&mut self, command: DoUndo<'_, Command>) -> Result<(), CommandError> {
        let result = apply_inner(self, command);
        if result.is_ok() {
            self.fixup_selection();
        }
        result
    }
}

// Exact float compares are intended, old values are copied around and never recomputed.
#[allow(clippy::too_many_lines, clippy::float_cmp)]
fn apply_inner(document: &mut Document, command: DoUndo<'_, Command>) -> Result<(), CommandError> {
    match command {
        DoUndo::Do(Command::UpdateStrength { from, to })
        | DoUndo::Undo(Command::UpdateStrength { from: to, to: from }) => {
            let strength = &mut document.generation_mut().strength;
            if *strength != *from {
                return Err(CommandError::MismatchedState);
            }
            *strength = *to;
        }
        DoUndo::Do(Command::UpdatePrompt { from, to })
        | DoUndo::Undo(Command::UpdatePrompt { from: to, to: from }) => {
            let prompt = &mut document.generation_mut().prompt;
            if *prompt != *from {
                return Err(CommandError::MismatchedState);
            }
            prompt.clone_from(to);
        }
        DoUndo::Do(Command::UpdateSeed { from, to })
        | DoUndo::Undo(Command::UpdateSeed { from: to, to: from }) => {
            let seed = &mut document.generation_mut().seed;
            if *seed != *from {
                return Err(CommandError::MismatchedState);
            }
            *seed = *to;
        }
        DoUndo::Do(Command::ClearLayer { target, removed }) => {
            let layer = document
                .layer_mut(*target)
                .ok_or(CommandError::UnknownResource)?;
            if !layer
                .elements
                .iter()
                .map(Element::id)
                .eq(removed.iter().map(Element::id))
            {
                return Err(CommandError::MismatchedState);
            }
            layer.elements.clear();
        }
        DoUndo::Undo(Command::ClearLayer { target, removed }) => {
            let layer = document
                .layer_mut(*target)
                .ok_or(CommandError::UnknownResource)?;
            if !layer.elements.is_empty() {
                return Err(CommandError::MismatchedState);
            }
            layer.elements.clone_from(removed);
        }
        DoUndo::Do(Command::ChangeLayerVisibility {
            target,
            from_hidden,
            to_hidden,
        })
        | DoUndo::Undo(Command::ChangeLayerVisibility {
            target,
            from_hidden: to_hidden,
            to_hidden: from_hidden,
        }) => {
            let layer = document
                .layer_mut(*target)
                .ok_or(CommandError::UnknownResource)?;
            if layer.hidden != *from_hidden {
                return Err(CommandError::MismatchedState);
            }
            layer.hidden = *to_hidden;
        }
        DoUndo::Do(Command::ChangeLayerOpacity { target, from, to })
        | DoUndo::Undo(Command::ChangeLayerOpacity {
            target,
            from: to,
            to: from,
        }) => {
            let layer = document
                .layer_mut(*target)
                .ok_or(CommandError::UnknownResource)?;
            if layer.opacity != *from {
                return Err(CommandError::MismatchedState);
            }
            layer.opacity = *to;
        }
        DoUndo::Do(Command::ChangeLayerLock { target, from, to })
        | DoUndo::Undo(Command::ChangeLayerLock {
            target,
            from: to,
            to: from,
        }) => {
            let layer = document
                .layer_mut(*target)
                .ok_or(CommandError::UnknownResource)?;
            if layer.locked != *from {
                return Err(CommandError::MismatchedState);
            }
            layer.locked = *to;
        }
        DoUndo::Do(Command::AddLayer { layer, index, .. })
        | DoUndo::Do(Command::DuplicateLayer {
            duplicate: layer,
            index,
            ..
        }) => {
            insert_layer(document, layer, *index)?;
        }
        DoUndo::Undo(Command::AddLayer {
            layer,
            index,
            previous_current,
        })
        | DoUndo::Undo(Command::DuplicateLayer {
            duplicate: layer,
            index,
            previous_current,
            ..
        }) => {
            uninsert_layer(document, layer.id(), *index, *previous_current)?;
        }
        DoUndo::Do(Command::DeleteLayer {
            layer,
            index,
            next_current,
            ..
        }) => {
            uninsert_layer(document, layer.id(), *index, *next_current)?;
        }
        DoUndo::Undo(Command::DeleteLayer {
            layer,
            index,
            previous_current,
            ..
        }) => {
            insert_layer(document, layer, *index)?;
            if document.set_current(*previous_current).is_err() {
                log::warn!("{previous_current} missing after restoring {}", layer.id());
            }
        }
        DoUndo::Do(Command::MoveLayer { target, from, to })
        | DoUndo::Undo(Command::MoveLayer {
            target,
            from: to,
            to: from,
        }) => {
            if document.layers().position(*target) != Some(*from) {
                return Err(CommandError::MismatchedState);
            }
            document
                .layers_mut()
                .reorder(*from, *to)
                .map_err(|_| CommandError::MismatchedState)?;
        }
        DoUndo::Do(Command::ChangeBackgroundColor { from, to })
        | DoUndo::Undo(Command::ChangeBackgroundColor { from: to, to: from }) => {
            let background = document.background_mut();
            if *background != *from {
                return Err(CommandError::MismatchedState);
            }
            *background = *to;
        }
        DoUndo::Do(Command::RemoveBackground { from }) => {
            let background = document.background_mut();
            if *background != Some(*from) {
                return Err(CommandError::MismatchedState);
            }
            *background = None;
        }
        DoUndo::Undo(Command::RemoveBackground { from }) => {
            let background = document.background_mut();
            if background.is_some() {
                return Err(CommandError::MismatchedState);
            }
            *background = Some(*from);
        }
        DoUndo::Do(Command::RegisterTransform {
            layer,
            element,
            from,
            to,
        })
        | DoUndo::Undo(Command::RegisterTransform {
            layer,
            element,
            from: to,
            to: from,
        }) => {
            let element = document
                .layer_mut(*layer)
                .and_then(|layer| layer.element_mut(*element))
                .ok_or(CommandError::UnknownResource)?;
            if element.transform() != from {
                return Err(CommandError::MismatchedState);
            }
            element.set_transform(*to);
        }
        DoUndo::Do(Command::AddElement { layer, element }) => {
            let layer = document
                .layer_mut(*layer)
                .ok_or(CommandError::UnknownResource)?;
            if layer.element(element.id()).is_some() {
                return Err(CommandError::MismatchedState);
            }
            layer.elements.push((**element).clone());
        }
        DoUndo::Undo(Command::AddElement { layer, element }) => {
            let layer = document
                .layer_mut(*layer)
                .ok_or(CommandError::UnknownResource)?;
            if layer.elements.last().map(Element::id) != Some(element.id()) {
                return Err(CommandError::MismatchedState);
            }
            layer.elements.pop();
        }
        DoUndo::Do(Command::Scope(commands)) => {
            apply_all(document, commands.iter().map(DoUndo::Do))?;
        }
        DoUndo::Undo(Command::Scope(commands)) => {
            apply_all(document, commands.iter().rev().map(DoUndo::Undo))?;
        }
    }
    Ok(())
}

/// Apply in order. On failure, everything applied so far is reverted before returning the error.
fn apply_all<'c>(
    document: &mut Document,
    commands: impl Iterator<Item = DoUndo<'c, Command>>,
) -> Result<(), CommandError> {
    let mut applied: Vec<DoUndo<'c, Command>> = Vec::new();
    for command in commands {
        if let Err(e) = apply_inner(document, command) {
            for done in applied.iter().rev() {
                if let Err(revert) = apply_inner(document, done.invert()) {
                    log::error!("failed to revert partially applied scope: {revert}");
                }
            }
            return Err(e);
        }
        applied.push(command);
    }
    Ok(())
}
