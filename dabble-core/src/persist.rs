//! Persisted document layout.
//!
//! The engine produces and accepts this shape. Packaging it into files is left to the caller.

use crate::color::Color;

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct PersistedLayer {
    pub index: usize,
    pub opacity: f32,
    pub hidden: bool,
    /// PNG encoded drawable.
    pub bitmap: Vec<u8>,
}

/// Brush settings active when the document was saved.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct DrawParameters {
    pub brush: String,
    pub color: Color,
    pub size: f32,
    pub opacity: f32,
}
impl Default for DrawParameters {
    fn default() -> Self {
        Self {
            brush: "Round".to_owned(),
            color: Color::BLACK,
            size: 1.0,
            opacity: 1.0,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct PersistedDocument {
    pub canvas_size: [u32; 2],
    pub background: Option<Color>,
    /// Bottom first.
    pub layers: Vec<PersistedLayer>,
    #[serde(default)]
    pub draw: DrawParameters,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("canvas has zero area")]
    EmptyCanvas,
    #[error("document has no layers")]
    NoLayers,
    #[error("layer indices are not a dense sequence from zero")]
    SparseIndices,
    #[error("layer {0} has an invalid opacity")]
    InvalidOpacity(usize),
}

impl PersistedDocument {
    /// Check the structural invariants a loaded document must hold.
    pub fn validate(&self) -> Result<(), PersistError> {
        if self.canvas_size.contains(&0) {
            return Err(PersistError::EmptyCanvas);
        }
        if self.layers.is_empty() {
            return Err(PersistError::NoLayers);
        }
        let mut indices: Vec<_> = self.layers.iter().map(|layer| layer.index).collect();
        indices.sort_unstable();
        if !indices.iter().copied().eq(0..self.layers.len()) {
            return Err(PersistError::SparseIndices);
        }
        if let Some(layer) = self
            .layers
            .iter()
            .find(|layer| !(0.0..=1.0).contains(&layer.opacity))
        {
            return Err(PersistError::InvalidOpacity(layer.index));
        }
        Ok(())
    }
    /// Layers sorted bottom first by their index.
    #[must_use]
    pub fn layers_in_order(&self) -> Vec<&PersistedLayer> {
        let mut layers: Vec<_> = self.layers.iter().collect();
        layers.sort_by_key(|layer| layer.index);
        layers
    }
}

#[cfg(test)]
mod test {
    use super::*;
    fn layer(index: usize) -> PersistedLayer {
        PersistedLayer {
            index,
            opacity: 1.0,
            hidden: false,
            bitmap: Vec::new(),
        }
    }
    #[test]
    fn validate() {
        let mut document = PersistedDocument {
            canvas_size: [64, 64],
            background: Some(Color::WHITE),
            layers: vec![layer(1), layer(0)],
            draw: DrawParameters::default(),
        };
        assert_eq!(document.validate(), Ok(()));
        assert_eq!(document.layers_in_order()[0].index, 0);

        document.layers.push(layer(3));
        assert_eq!(document.validate(), Err(PersistError::SparseIndices));
        document.layers.pop();

        document.layers[0].opacity = f32::NAN;
        assert_eq!(document.validate(), Err(PersistError::InvalidOpacity(1)));

        document.layers.clear();
        assert_eq!(document.validate(), Err(PersistError::NoLayers));
    }
    #[test]
    fn json_shape() {
        let document = PersistedDocument {
            canvas_size: [2, 2],
            background: None,
            layers: vec![layer(0)],
            draw: DrawParameters::default(),
        };
        let json = serde_json::to_string(&document).unwrap();
        let back: PersistedDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, document);
        // Draw parameters are optional on load.
        let minimal = r#"{"canvas_size":[2,2],"background":[1.0,1.0,1.0,1.0],"layers":[]}"#;
        let loaded: PersistedDocument = serde_json::from_str(minimal).unwrap();
        assert_eq!(loaded.background, Some(Color::WHITE));
        assert_eq!(loaded.draw, DrawParameters::default());
    }
}
