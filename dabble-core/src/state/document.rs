use crate::color::Color;
use crate::element::{Element, ElementID};
use crate::id::TextureId;

use super::layers::{Layer, LayerID, LayerStore};
use super::TargetError;

pub type DocumentID = crate::DabbleID<Document>;

/// Parameters handed to the downstream image-generation client. Undoable, never drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct Generation {
    pub strength: f32,
    pub prompt: String,
    pub seed: u64,
}
impl Default for Generation {
    fn default() -> Self {
        Self {
            strength: 0.5,
            prompt: String::new(),
            seed: 0,
        }
    }
}

/// Root aggregate. Always holds at least one layer, and exactly one of them is current.
///
/// Undoable state is only reachable mutably from within this crate, through commands.
#[derive(Clone, Debug)]
pub struct Document {
    id: DocumentID,
    canvas_size: [u32; 2],
    background: Option<Color>,
    layers: LayerStore,
    current: LayerID,
    selection: Option<(LayerID, ElementID)>,
    generation: Generation,
    textures: std::collections::BTreeSet<TextureId>,
}
impl Document {
    /// A document with a single empty layer.
    #[must_use]
    pub fn new(canvas_size: [u32; 2], background: Option<Color>) -> Self {
        Self::with_layers(canvas_size, background, [Layer::new_empty()])
    }
    /// A document from existing layers, bottom first. An empty iterator yields one empty layer.
    /// The topmost layer becomes current.
    pub fn with_layers(
        canvas_size: [u32; 2],
        background: Option<Color>,
        layers: impl IntoIterator<Item = Layer>,
    ) -> Self {
        let mut store = LayerStore::default();
        for layer in layers {
            // Fresh layers from the caller. A duplicate id is skipped.
            let index = store.len();
            if let Err(e) = store.insert(index, layer) {
                log::warn!("skipping layer while building document: {e}");
            }
        }
        if store.is_empty() {
            // Empty store, insertion at 0 cannot fail.
            let _ = store.insert(0, Layer::new_empty());
        }
        let current = store.top().map(Layer::id).unwrap_or_default();
        Self {
            id: DocumentID::default(),
            canvas_size,
            background,
            layers: store,
            current,
            selection: None,
            generation: Generation::default(),
            textures: std::collections::BTreeSet::new(),
        }
    }
    #[must_use]
    pub fn id(&self) -> DocumentID {
        self.id
    }
    #[must_use]
    pub fn canvas_size(&self) -> [u32; 2] {
        self.canvas_size
    }
    #[must_use]
    pub fn background(&self) -> Option<Color> {
        self.background
    }
    #[must_use]
    pub fn layers(&self) -> &LayerStore {
        &self.layers
    }
    #[must_use]
    pub fn layer(&self, id: LayerID) -> Option<&Layer> {
        self.layers.get(id)
    }
    #[must_use]
    pub fn current_layer_id(&self) -> LayerID {
        self.current
    }
    #[must_use]
    pub fn current_layer(&self) -> Option<&Layer> {
        self.layers.get(self.current)
    }
    #[must_use]
    pub fn selection(&self) -> Option<(LayerID, ElementID)> {
        self.selection
    }
    #[must_use]
    pub fn selected_element(&self) -> Option<&Element> {
        let (layer, element) = self.selection?;
        self.layers.get(layer)?.element(element)
    }
    #[must_use]
    pub fn generation(&self) -> &Generation {
        &self.generation
    }
    /// Every texture id registered against this document, for id-based reload.
    pub fn textures(&self) -> impl Iterator<Item = &TextureId> + '_ {
        self.textures.iter()
    }

    pub(crate) fn register_texture(&mut self, id: TextureId) {
        self.textures.insert(id);
    }
    pub(crate) fn set_current(&mut self, id: LayerID) -> Result<(), TargetError> {
        if self.layers.get(id).is_none() {
            return Err(TargetError::TargetNotFound);
        }
        self.current = id;
        Ok(())
    }
    pub(crate) fn set_selection(
        &mut self,
        selection: Option<(LayerID, ElementID)>,
    ) -> Result<(), TargetError> {
        if let Some((layer, element)) = selection {
            self.layers
                .get(layer)
                .and_then(|layer| layer.element(element))
                .ok_or(TargetError::TargetNotFound)?;
        }
        self.selection = selection;
        Ok(())
    }
    /// Forget the selection if the element it names is gone.
    pub(crate) fn fixup_selection(&mut self) {
        if self.selection.is_some() && self.selected_element().is_none() {
            self.selection = None;
        }
    }
    pub(crate) fn layers_mut(&mut self) -> &mut LayerStore {
        &mut self.layers
    }
    pub(crate) fn layer_mut(&mut self, id: LayerID) -> Option<&mut Layer> {
        self.layers.get_mut(id)
    }
    pub(crate) fn background_mut(&mut self) -> &mut Option<Color> {
        &mut self.background
    }
    pub(crate) fn generation_mut(&mut self) -> &mut Generation {
        &mut self.generation
    }
}
