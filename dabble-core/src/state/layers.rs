//! Ordered layer stack. Index 0 is the bottom of the stack and paints first.

use crate::element::{Element, ElementID};
use crate::id::TextureId;

use super::TargetError;

pub type LayerID = crate::DabbleID<Layer>;

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    id: LayerID,
    /// Z order. Always equal to the layer's position in its store.
    index: usize,
    pub opacity: f32,
    pub hidden: bool,
    pub locked: bool,
    pub elements: Vec<Element>,
}
impl Layer {
    #[must_use]
    pub fn new_empty() -> Self {
        Self {
            id: LayerID::default(),
            index: 0,
            opacity: 1.0,
            hidden: false,
            locked: false,
            elements: Vec::new(),
        }
    }
    /// A copy of this layer and all of its elements, every one with a fresh identity.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            id: LayerID::default(),
            elements: self.elements.iter().map(Element::duplicate).collect(),
            ..self.clone()
        }
    }
    #[must_use]
    pub fn id(&self) -> LayerID {
        self.id
    }
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
    /// Pool id of the persistent drawable.
    #[must_use]
    pub fn drawable_id(&self) -> TextureId {
        Self::drawable_texture(self.id)
    }
    /// Pool id of the per-redraw scratch drawable.
    #[must_use]
    pub fn temporary_id(&self) -> TextureId {
        Self::temporary_texture(self.id)
    }
    #[must_use]
    pub fn drawable_texture(id: LayerID) -> TextureId {
        TextureId::explicit(format!("layer/{}/drawable", id.id()))
    }
    #[must_use]
    pub fn temporary_texture(id: LayerID) -> TextureId {
        TextureId::explicit(format!("layer/{}/temporary", id.id()))
    }
    #[must_use]
    pub fn element(&self, id: ElementID) -> Option<&Element> {
        self.elements.iter().find(|element| element.id() == id)
    }
    pub fn element_mut(&mut self, id: ElementID) -> Option<&mut Element> {
        self.elements.iter_mut().find(|element| element.id() == id)
    }
}
impl Default for Layer {
    fn default() -> Self {
        Self::new_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerStore {
    layers: Vec<Layer>,
}
impl LayerStore {
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
    /// Bottom to top.
    pub fn iter(&self) -> std::slice::Iter<'_, Layer> {
        self.layers.iter()
    }
    #[must_use]
    pub fn get(&self, id: LayerID) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }
    pub(crate) fn get_mut(&mut self, id: LayerID) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|layer| layer.id == id)
    }
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }
    #[must_use]
    pub fn position(&self, id: LayerID) -> Option<usize> {
        self.layers.iter().position(|layer| layer.id == id)
    }
    #[must_use]
    pub fn top(&self) -> Option<&Layer> {
        self.layers.last()
    }
    pub(crate) fn insert(&mut self, index: usize, layer: Layer) -> Result<(), TargetError> {
        if index > self.layers.len() {
            return Err(TargetError::OutOfRange {
                index,
                len: self.layers.len(),
            });
        }
        if self.get(layer.id).is_some() {
            return Err(TargetError::AlreadyPresent);
        }
        self.layers.insert(index, layer);
        self.renumber();
        Ok(())
    }
    pub(crate) fn remove(&mut self, id: LayerID) -> Result<(usize, Layer), TargetError> {
        let index = self.position(id).ok_or(TargetError::TargetNotFound)?;
        let layer = self.layers.remove(index);
        self.renumber();
        Ok((index, layer))
    }
    /// Move the layer at `from` so that it ends up at `to`.
    pub(crate) fn reorder(&mut self, from: usize, to: usize) -> Result<(), TargetError> {
        let len = self.layers.len();
        for index in [from, to] {
            if index >= len {
                return Err(TargetError::OutOfRange { index, len });
            }
        }
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        self.renumber();
        Ok(())
    }
    fn renumber(&mut self) {
        for (index, layer) in self.layers.iter_mut().enumerate() {
            layer.index = index;
        }
    }
    /// Indices form exactly `0..len`, in order.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        self.layers
            .iter()
            .enumerate()
            .all(|(index, layer)| layer.index == index)
    }
}
