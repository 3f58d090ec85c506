//! # Compositor
//!
//! Builds the frame, once per redraw:
//! 1. Clear the back buffer.
//! 2. Fill it with the document background.
//! 3. For each visible layer, bottom to top, copy its drawable into its temporary drawable, add the
//!    selected element if the layer holds it and the live stroke if it is the current layer, then blend
//!    the temporary onto the back buffer at the layer's opacity.
//! 4. Present: copy the back buffer to the front buffer, so readers never see a partial frame.
//! 5. Offer a downsampled copy of the frame to the generation client. Dropped if the client is behind.

use std::sync::Arc;

use crossbeam::channel;
use dabble_core::blend::Blend;
use dabble_core::element::{Element, ElementID};
use dabble_core::id::TextureId;
use dabble_core::state::{Document, Layer, LayerID};

use crate::error::EngineError;
use crate::pool::TexturePool;
use crate::printer::Printer;
use crate::raster;
use crate::texture::Texture;

/// Transient state drawn on top of the current layer, never part of the document.
#[derive(Default)]
pub struct Overlay<'a> {
    /// Lifted element with its live transform, drawn on the layer holding the selection.
    pub selected: Option<&'a Element>,
    /// In-progress stroke buffer and the blend it lands with, drawn on the current layer.
    pub stroke: Option<(&'a Texture, Blend)>,
    /// Slider values being dragged, not yet committed.
    pub opacity_overrides: Option<&'a hashbrown::HashMap<LayerID, f32>>,
}

pub struct Compositor {
    canvas_size: [u32; 2],
    back: Arc<Texture>,
    front: Arc<Texture>,
    inference_size: u32,
    frames: (channel::Sender<image::RgbaImage>, channel::Receiver<image::RgbaImage>),
}
impl Compositor {
    pub fn new(
        pool: &TexturePool,
        canvas_size: [u32; 2],
        inference_size: u32,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            canvas_size,
            back: pool.make_empty_texture(TextureId::explicit("compositor/back"), canvas_size)?,
            front: pool.make_empty_texture(TextureId::explicit("compositor/front"), canvas_size)?,
            inference_size,
            frames: channel::bounded(1),
        })
    }
    #[must_use]
    pub fn canvas_size(&self) -> [u32; 2] {
        self.canvas_size
    }
    /// The last presented frame.
    #[must_use]
    pub fn front(&self) -> &Arc<Texture> {
        &self.front
    }
    /// Downsampled frames for the generation client. At most one is ever waiting.
    #[must_use]
    pub fn frames(&self) -> channel::Receiver<image::RgbaImage> {
        self.frames.1.clone()
    }
    /// Clear a layer's drawable and draw its elements in order, leaving out `skip`.
    pub fn redraw_layer(
        &self,
        pool: &TexturePool,
        layer: &Layer,
        skip: Option<ElementID>,
    ) -> Result<Arc<Texture>, EngineError> {
        let drawable = pool.make_empty_texture(layer.drawable_id(), self.canvas_size)?;
        drawable.clear();
        let printer = Printer::new(pool);
        for element in layer
            .elements
            .iter()
            .filter(|element| Some(element.id()) != skip)
        {
            if let Err(e) = printer.draw(element, &drawable, Blend::default()) {
                log::warn!("{}: element {} skipped: {e}", layer.id(), element.id());
            }
        }
        Ok(drawable)
    }
    pub fn composite(&self, pool: &TexturePool, document: &Document, overlay: &Overlay<'_>) {
        // 1, 2
        match document.background() {
            Some(background) => self.back.fill(background),
            None => self.back.clear(),
        }
        // 3
        let current = document.current_layer_id();
        let selection_layer = document.selection().map(|(layer, _)| layer);
        for layer in document.layers().iter().filter(|layer| !layer.hidden) {
            let opacity = overlay
                .opacity_overrides
                .and_then(|overrides| overrides.get(&layer.id()).copied())
                .unwrap_or(layer.opacity);
            let selected = overlay
                .selected
                .filter(|_| selection_layer == Some(layer.id()));
            let stroke = overlay.stroke.filter(|_| layer.id() == current);
            if let Err(e) = self.composite_layer(pool, layer, selected, stroke, opacity) {
                log::warn!("{} left out of the frame: {e}", layer.id());
            }
        }
        // 4
        self.front.write().copy_from_slice(&self.back.read());
        // 5
        self.offer_frame();
    }
    fn composite_layer(
        &self,
        pool: &TexturePool,
        layer: &Layer,
        selected: Option<&Element>,
        stroke: Option<(&Texture, Blend)>,
        opacity: f32,
    ) -> Result<(), EngineError> {
        // a
        let temporary = pool.make_empty_texture(layer.temporary_id(), self.canvas_size)?;
        temporary.clear();
        // b, skipped for drawables never drawn into.
        if let Some(drawable) = pool
            .find_texture(&layer.drawable_id())
            .filter(|drawable| !drawable.is_blank())
        {
            raster::composite(&temporary, &drawable, Blend::default());
        }
        // c, d
        if let Some(selected) = selected {
            Printer::new(pool).draw(selected, &temporary, Blend::default())?;
        }
        if let Some((stroke, blend)) = stroke {
            raster::composite(&temporary, stroke, blend);
        }
        // e
        if !temporary.is_blank() {
            raster::composite(&self.back, &temporary, Blend::transparent(opacity));
        }
        Ok(())
    }
    fn offer_frame(&self) {
        let sender = &self.frames.0;
        if sender.is_full() {
            log::trace!("inference frame skipped, consumer is behind");
            return;
        }
        let frame = raster::downsample(&self.front, self.inference_size);
        if let Err(channel::TrySendError::Full(_)) = sender.try_send(frame) {
            log::trace!("inference frame dropped");
        }
    }
}
