//! Helpers that build commands from the present state, apply them, and record them.
//!
//! Every helper returns [`CommandError::NoOp`] rather than recording a command that changes nothing.

use crate::color::Color;
use crate::commands::{Affected, Command, CommandConsumer, CommandError, DoUndo};
use crate::element::{Element, ElementID, ElementTransform};
use crate::state::{Document, Layer, LayerID};

pub struct HistoryWriter<'a> {
    pub(super) document: &'a mut Document,
    pub(super) undo: &'a mut Vec<Command>,
    pub(super) redo: &'a mut Vec<Command>,
    // Optimize for exactly one command (the most common case)
    pub(super) commands: smallvec::SmallVec<[Command; 1]>,
    pub(super) affected: Affected,
}
impl Drop for HistoryWriter<'_> {
    fn drop(&mut self) {
        if self.commands.is_empty() {
            return;
        }
        // Always record exactly one command, bundling if there are more.
        let command = if self.commands.len() == 1 {
            // Length checked.
            let Some(command) = self.commands.pop() else {
                return;
            };
            command
        } else {
            Command::Scope(std::mem::take(&mut self.commands).into_vec().into_boxed_slice())
        };
        log::trace!("writing new command: {}", command.name());
        self.undo.push(command);
        self.redo.clear();
    }
}
impl HistoryWriter<'_> {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.commands.is_empty()
    }
    /// The document as modified so far by this writer.
    #[must_use]
    pub fn document(&self) -> &Document {
        self.document
    }
    /// Apply and record an arbitrary command.
    pub fn push(&mut self, command: Command) -> Result<(), CommandError> {
        self.document.apply(DoUndo::Do(&command))?;
        self.affected.merge(command.affected());
        self.commands.push(command);
        Ok(())
    }
    fn layer(&self, id: LayerID) -> Result<&Layer, CommandError> {
        self.document
            .layer(id)
            .ok_or(CommandError::UnknownResource)
    }

    /// Insert an empty layer directly above the current one and make it current.
    pub fn add_layer(&mut self) -> Result<LayerID, CommandError> {
        self.insert_layer(Layer::new_empty())
    }
    /// Insert an existing layer above the current one and make it current.
    pub fn insert_layer(&mut self, layer: Layer) -> Result<LayerID, CommandError> {
        let previous_current = self.document.current_layer_id();
        let index = self
            .document
            .layers()
            .position(previous_current)
            .map_or(self.document.layers().len(), |idx| idx + 1);
        let id = layer.id();
        self.push(Command::AddLayer {
            layer: Box::new(layer),
            index,
            previous_current,
        })?;
        Ok(id)
    }
    /// Copy a layer and its elements directly above it, and make the copy current.
    pub fn duplicate_layer(&mut self, source: LayerID) -> Result<LayerID, CommandError> {
        let layer = self.layer(source)?;
        let duplicate = layer.duplicate();
        let index = layer.index() + 1;
        let id = duplicate.id();
        self.push(Command::DuplicateLayer {
            source,
            duplicate: Box::new(duplicate),
            index,
            previous_current: self.document.current_layer_id(),
        })?;
        Ok(id)
    }
    /// Remove a layer. The sole remaining layer is cleared instead.
    ///
    /// If the removed layer was current, the layer below it becomes current, or the new bottom layer.
    pub fn delete_layer(&mut self, target: LayerID) -> Result<(), CommandError> {
        let layers = self.document.layers();
        if layers.len() == 1 {
            self.layer(target)?;
            return self.clear_layer(target);
        }
        let layer = self.layer(target)?.clone();
        let index = layer.index();
        let previous_current = self.document.current_layer_id();
        let next_current = if previous_current == target {
            let neighbor = if index == 0 { 1 } else { index - 1 };
            layers
                .at(neighbor)
                .map(Layer::id)
                .ok_or(CommandError::UnknownResource)?
        } else {
            previous_current
        };
        self.push(Command::DeleteLayer {
            layer: Box::new(layer),
            index,
            previous_current,
            next_current,
        })
    }
    pub fn clear_layer(&mut self, target: LayerID) -> Result<(), CommandError> {
        let layer = self.layer(target)?;
        if layer.is_empty() {
            return Err(CommandError::NoOp);
        }
        let removed = layer.elements.clone();
        self.push(Command::ClearLayer { target, removed })
    }
    /// Move a layer to a new z index. Other layers shift to stay dense.
    pub fn move_layer(&mut self, target: LayerID, to: usize) -> Result<(), CommandError> {
        let from = self.layer(target)?.index();
        if to >= self.document.layers().len() {
            return Err(CommandError::UnknownResource);
        }
        if from == to {
            return Err(CommandError::NoOp);
        }
        self.push(Command::MoveLayer { target, from, to })
    }
    pub fn set_visibility(&mut self, target: LayerID, visible: bool) -> Result<(), CommandError> {
        let from_hidden = self.layer(target)?.hidden;
        if from_hidden != visible {
            return Err(CommandError::NoOp);
        }
        self.push(Command::ChangeLayerVisibility {
            target,
            from_hidden,
            to_hidden: !visible,
        })
    }
    /// Opacity is clamped into `[0, 1]`.
    pub fn set_opacity(&mut self, target: LayerID, opacity: f32) -> Result<(), CommandError> {
        let from = self.layer(target)?.opacity;
        let to = crate::util::unit_clamp(opacity);
        #[allow(clippy::float_cmp)]
        if from == to {
            return Err(CommandError::NoOp);
        }
        self.push(Command::ChangeLayerOpacity { target, from, to })
    }
    pub fn set_locked(&mut self, target: LayerID, locked: bool) -> Result<(), CommandError> {
        let from = self.layer(target)?.locked;
        if from == locked {
            return Err(CommandError::NoOp);
        }
        self.push(Command::ChangeLayerLock {
            target,
            from,
            to: locked,
        })
    }
    /// Append an element on top of a layer's content.
    pub fn add_element(
        &mut self,
        layer: LayerID,
        element: Element,
    ) -> Result<ElementID, CommandError> {
        self.layer(layer)?;
        let id = element.id();
        self.push(Command::AddElement {
            layer,
            element: Box::new(element),
        })?;
        Ok(id)
    }
    /// Record the net effect of an interactive transform.
    pub fn register_transform(
        &mut self,
        layer: LayerID,
        element: ElementID,
        to: ElementTransform,
    ) -> Result<(), CommandError> {
        let from = *self
            .layer(layer)?
            .element(element)
            .ok_or(CommandError::UnknownResource)?
            .transform();
        if from == to {
            return Err(CommandError::NoOp);
        }
        self.push(Command::RegisterTransform {
            layer,
            element,
            from,
            to,
        })
    }
    pub fn set_background(&mut self, color: Color) -> Result<(), CommandError> {
        let from = self.document.background();
        if from == Some(color) {
            return Err(CommandError::NoOp);
        }
        self.push(Command::ChangeBackgroundColor {
            from,
            to: Some(color),
        })
    }
    pub fn remove_background(&mut self) -> Result<(), CommandError> {
        let from = self.document.background().ok_or(CommandError::NoOp)?;
        self.push(Command::RemoveBackground { from })
    }
    pub fn set_strength(&mut self, strength: f32) -> Result<(), CommandError> {
        let from = self.document.generation().strength;
        let to = crate::util::unit_clamp(strength);
        #[allow(clippy::float_cmp)]
        if from == to {
            return Err(CommandError::NoOp);
        }
        self.push(Command::UpdateStrength { from, to })
    }
    pub fn set_prompt(&mut self, prompt: impl Into<String>) -> Result<(), CommandError> {
        let to = prompt.into();
        let from = self.document.generation().prompt.clone();
        if from == to {
            return Err(CommandError::NoOp);
        }
        self.push(Command::UpdatePrompt { from, to })
    }
    pub fn set_seed(&mut self, seed: u64) -> Result<(), CommandError> {
        let from = self.document.generation().seed;
        if from == seed {
            return Err(CommandError::NoOp);
        }
        self.push(Command::UpdateSeed { from, to: seed })
    }
}

#[cfg(test)]
mod test {
    use crate::color::Color;
    use crate::commands::CommandError;
    use crate::queue::History;
    use crate::state::Document;

    #[test]
    fn delete_sole_layer_clears() {
        let mut history = History::from_document(Document::new([8, 8], None));
        let only = history.document().current_layer_id();
        // Empty sole layer, nothing to do.
        assert_eq!(
            history.write_with(|w| w.delete_layer(only)).0,
            Err(CommandError::NoOp)
        );
        let primitive = crate::element::Element::primitive(
            crate::element::Primitive {
                shape: crate::element::PrimitiveShape::Circle,
                fill: Color::BLACK,
            },
            crate::element::ElementTransform {
                center: ultraviolet::Vec2::new(4.0, 4.0),
                size: ultraviolet::Vec2::new(4.0, 4.0),
                rotation: 0.0,
            },
        );
        history
            .write_with(|w| w.add_element(only, primitive))
            .0
            .unwrap();
        history.write_with(|w| w.delete_layer(only)).0.unwrap();
        let document = history.document();
        assert_eq!(document.layers().len(), 1);
        assert_eq!(document.current_layer_id(), only);
        assert!(document.current_layer().unwrap().is_empty());
    }
    #[test]
    fn delete_current_selects_neighbor() {
        let mut history = History::from_document(Document::new([8, 8], None));
        let bottom = history.document().current_layer_id();
        let middle = history.write_with(|w| w.add_layer()).0.unwrap();
        let top = history.write_with(|w| w.add_layer()).0.unwrap();
        history.select_layer(middle).unwrap();
        history.write_with(|w| w.delete_layer(middle)).0.unwrap();
        assert_eq!(history.document().current_layer_id(), bottom);
        assert!(history.document().layers().is_dense());

        history.select_layer(bottom).unwrap();
        history.write_with(|w| w.delete_layer(bottom)).0.unwrap();
        assert_eq!(history.document().current_layer_id(), top);

        history.undo().unwrap();
        assert_eq!(history.document().current_layer_id(), bottom);
        history.undo().unwrap();
        assert_eq!(history.document().layers().len(), 3);
        assert_eq!(history.document().layer(middle).map(|l| l.index()), Some(1));
    }
    #[test]
    fn no_ops_are_not_recorded() {
        let mut history = History::from_document(Document::new([8, 8], Some(Color::WHITE)));
        let layer = history.document().current_layer_id();
        assert_eq!(
            history.write_with(|w| w.set_opacity(layer, 1.0)).0,
            Err(CommandError::NoOp)
        );
        assert_eq!(
            history.write_with(|w| w.set_visibility(layer, true)).0,
            Err(CommandError::NoOp)
        );
        assert_eq!(
            history.write_with(|w| w.set_background(Color::WHITE)).0,
            Err(CommandError::NoOp)
        );
        assert_eq!(
            history.write_with(|w| w.move_layer(layer, 0)).0,
            Err(CommandError::NoOp)
        );
        assert!(!history.can_undo());
    }
    #[test]
    fn duplicate_sits_above_source() {
        let mut history = History::from_document(Document::new([8, 8], None));
        let source = history.document().current_layer_id();
        history.write_with(|w| w.set_opacity(source, 0.25)).0.unwrap();
        let copy = history.write_with(|w| w.duplicate_layer(source)).0.unwrap();
        let document = history.document();
        assert_eq!(document.current_layer_id(), copy);
        assert_eq!(document.layer(copy).map(|l| (l.index(), l.opacity)), Some((1, 0.25)));
    }
}
