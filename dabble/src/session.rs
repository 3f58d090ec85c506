//! # Canvas session
//!
//! The session owns one open document and everything that renders it: the history, the texture pool,
//! the compositor, the snapshot worker, and the brush engine. It is the only way in from the outside.
//!
//! Every committing edit goes through the history. Live values (slider drags, an element being dragged,
//! the stroke under the pointer) stay on the session and are passed to the compositor as an overlay.
//!
//! Without a render device the session still edits the document and its history, and every render is a
//! no-op.

use std::sync::Arc;

use dabble_core::blend::Blend;
use dabble_core::brush::{Brush, BrushCatalog, PAPER_GRAIN};
use dabble_core::color::Color;
use dabble_core::commands::{Affected, Affects, CommandError};
use dabble_core::element::{
    Chartlet, Element, ElementID, ElementTransform, Primitive, PrimitiveShape,
};
use dabble_core::id::TextureId;
use dabble_core::persist::{DrawParameters, PersistedDocument, PersistedLayer};
use dabble_core::queue::{writer::HistoryWriter, History, HistoryMessage};
use dabble_core::state::{Document, Layer, LayerID, TargetError};
use dabble_core::stroke::{LineSegment, PointerSample};
use dabble_core::util::{unit_clamp, Rect};
use rand::{Rng, SeedableRng};
use ultraviolet::Vec2;

use crate::brush_engine::{StrokeBuilder, StrokeSettings, Tool};
use crate::compositor::{Compositor, Overlay};
use crate::config::EngineConfig;
use crate::error::{EngineError, LookupKind};
use crate::pool::TexturePool;
use crate::printer::Printer;
use crate::raster;
use crate::render_device::RenderContext;
use crate::scheduler::RedrawScheduler;
use crate::snapshot::{Snapshot, SnapshotJob, SnapshotWorker};
use crate::texture::Texture;

const PAPER_GRAIN_SIZE: u32 = 128;

/// Content for [`CanvasSession::add_element`].
pub enum ElementSource {
    /// An encoded bitmap, placed at the canvas center at its natural size.
    /// Without an id, one is derived from the bytes so identical bitmaps share a texture.
    Bitmap {
        id: Option<TextureId>,
        encoded: Vec<u8>,
    },
    Primitive {
        shape: PrimitiveShape,
        fill: Color,
        transform: ElementTransform,
    },
}

struct Renderer {
    pool: TexturePool,
    compositor: Compositor,
    snapshots: Option<SnapshotWorker>,
    /// Dabs of the stroke in progress, on a transparent canvas.
    stroke_buffer: Arc<Texture>,
}
impl Renderer {
    fn new(config: &EngineConfig, canvas_size: [u32; 2]) -> Result<Self, EngineError> {
        let pool = TexturePool::new(RenderContext::new(config)?);
        pool.make_texture_from_image(
            TextureId::explicit(PAPER_GRAIN),
            &raster::paper_grain(PAPER_GRAIN_SIZE, 0),
        )?;
        let compositor = Compositor::new(&pool, canvas_size, config.inference_size)?;
        let stroke_buffer =
            pool.make_empty_texture(TextureId::explicit("session/stroke"), canvas_size)?;
        let snapshots = SnapshotWorker::spawn(config.snapshot_compression)
            .inspect_err(|e| log::warn!("snapshots disabled, worker failed to start: {e}"))
            .ok();
        pool.log_residency();
        Ok(Self {
            pool,
            compositor,
            snapshots,
            stroke_buffer,
        })
    }
}

/// An element lifted off its layer for interactive transform.
struct Lifted {
    /// Copy carrying the live transform.
    element: Element,
    /// Transform held by the document.
    committed: ElementTransform,
}

pub struct CanvasSession {
    config: EngineConfig,
    history: History,
    brushes: BrushCatalog,
    settings: StrokeSettings,
    builder: StrokeBuilder,
    /// Layer the stroke in progress lands on.
    stroke_layer: Option<LayerID>,
    seeds: rand::rngs::SmallRng,
    lifted: Option<Lifted>,
    opacity_preview: hashbrown::HashMap<LayerID, f32>,
    /// Bumped on every layer redraw, stamps snapshot jobs.
    versions: hashbrown::HashMap<LayerID, u64>,
    scheduler: RedrawScheduler,
    renderer: Option<Renderer>,
}
impl CanvasSession {
    /// A blank white canvas of the configured size.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let document = Document::new(config.canvas_size, Some(Color::WHITE));
        Self::with_document(config, document)
    }
    #[must_use]
    pub fn with_document(config: EngineConfig, document: Document) -> Self {
        let renderer = Self::open_renderer(&config, document.canvas_size());
        Self::from_parts(config, document, renderer)
    }
    /// Rebuild a session from its persisted layout. Each layer's bitmap becomes a full-canvas chartlet.
    pub fn open(config: EngineConfig, persisted: &PersistedDocument) -> Result<Self, EngineError> {
        persisted.validate()?;
        let canvas_size = persisted.canvas_size;
        let mut config = config;
        config.canvas_size = canvas_size;
        let renderer = Self::open_renderer(&config, canvas_size);
        let layers: Vec<Layer> = persisted
            .layers_in_order()
            .into_iter()
            .map(|saved| {
                let mut layer = Layer::new_empty();
                layer.opacity = saved.opacity;
                layer.hidden = saved.hidden;
                if saved.bitmap.is_empty() {
                    return layer;
                }
                let texture = TextureId::from_content(&saved.bitmap);
                let loaded = renderer.as_ref().map_or(true, |renderer| {
                    renderer
                        .pool
                        .make_texture(texture.clone(), &saved.bitmap)
                        .inspect_err(|e| log::warn!("layer {} bitmap dropped: {e}", saved.index))
                        .is_ok()
                });
                if loaded {
                    layer.elements.push(full_canvas_chartlet(texture, canvas_size));
                }
                layer
            })
            .collect();
        let document = Document::with_layers(canvas_size, persisted.background, layers);
        let mut session = Self::from_parts(config, document, renderer);
        session.apply_draw_parameters(&persisted.draw);
        Ok(session)
    }
    fn open_renderer(config: &EngineConfig, canvas_size: [u32; 2]) -> Option<Renderer> {
        Renderer::new(config, canvas_size)
            .inspect_err(|e| log::warn!("rendering disabled: {e}"))
            .ok()
    }
    fn from_parts(config: EngineConfig, document: Document, renderer: Option<Renderer>) -> Self {
        log::info!(
            "session for {} opened, {}x{}, {} layers",
            document.id(),
            document.canvas_size()[0],
            document.canvas_size()[1],
            document.layers().len()
        );
        let mut session = Self {
            builder: StrokeBuilder::new(config.pencil_only),
            config,
            history: History::from_document(document),
            brushes: BrushCatalog::defaults().clone(),
            settings: StrokeSettings::default(),
            stroke_layer: None,
            seeds: rand::rngs::SmallRng::from_entropy(),
            lifted: None,
            opacity_preview: hashbrown::HashMap::new(),
            versions: hashbrown::HashMap::new(),
            scheduler: RedrawScheduler::default(),
            renderer,
        };
        session.redraw_all_layers();
        session.request_redraw();
        session
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    #[must_use]
    pub fn document(&self) -> &Document {
        self.history.document()
    }
    /// True if no render device could be opened. Rendering is disabled for the session's lifetime.
    #[must_use]
    pub fn is_headless(&self) -> bool {
        self.renderer.is_none()
    }
    #[must_use]
    pub fn settings(&self) -> &StrokeSettings {
        &self.settings
    }
    #[must_use]
    pub fn brushes(&self) -> &BrushCatalog {
        &self.brushes
    }
    #[must_use]
    pub fn is_stroke_active(&self) -> bool {
        self.builder.is_active()
    }
    #[must_use]
    pub fn texture(&self, id: &TextureId) -> Option<Arc<Texture>> {
        self.renderer.as_ref()?.pool.find_texture(id)
    }
    #[must_use]
    pub fn layer_drawable(&self, layer: LayerID) -> Option<Arc<Texture>> {
        self.texture(&Layer::drawable_texture(layer))
    }
    /// The last presented frame.
    #[must_use]
    pub fn frame(&self) -> Option<Arc<Texture>> {
        Some(self.renderer.as_ref()?.compositor.front().clone())
    }
    /// Live transform of the lifted element.
    #[must_use]
    pub fn selected_transform(&self) -> Option<ElementTransform> {
        self.lifted.as_ref().map(|lifted| *lifted.element.transform())
    }

    // Tool settings. Live values, never recorded.

    /// Switch brush. On a miss the current brush stays active.
    pub fn select_brush(&mut self, name: &str) -> Result<(), EngineError> {
        let Some(brush) = self.brushes.get(name).cloned() else {
            let e = EngineError::brush_miss(name);
            log::warn!("keeping {}: {e}", self.settings.brush.name);
            return Err(e);
        };
        self.settle();
        self.settings.brush = brush;
        Ok(())
    }
    /// Add or replace a brush in this session's catalog.
    pub fn add_brush(&mut self, brush: Brush) -> Arc<Brush> {
        self.brushes.insert(brush)
    }
    /// Switching tools finalizes the stroke in progress.
    pub fn select_tool(&mut self, tool: Tool) {
        if self.settings.tool != tool {
            self.settle();
            self.settings.tool = tool;
        }
    }
    pub fn select_color(&mut self, color: Color) {
        self.settings.color = color;
    }
    pub fn set_opacity(&mut self, opacity: f32) {
        self.settings.opacity = unit_clamp(opacity);
    }
    pub fn set_size(&mut self, size: f32) {
        self.settings.size = size.max(0.0);
    }
    pub fn set_pencil_only(&mut self, pencil_only: bool) {
        self.config.pencil_only = pencil_only;
        self.builder.set_pencil_only(pencil_only);
    }

    // Pointer input.

    pub fn pointer_began(&mut self, sample: &PointerSample) {
        if !self.builder.accepts(sample) {
            log::trace!("pointer {} rejected", sample.pointer);
            return;
        }
        let document = self.history.document();
        let layer = document.current_layer_id();
        if document.layer(layer).is_some_and(|layer| layer.locked) {
            log::info!("{layer} is locked, stroke ignored");
            return;
        }
        let [width, height] = document.canvas_size();
        self.builder.set_clip(Some(Rect {
            min: Vec2::zero(),
            max: Vec2::new(width as f32, height as f32),
        }));
        if self.lifted.is_some() {
            self.deselect();
        }
        let seed = self.seeds.gen();
        let Some(segments) = self.builder.begin(sample, self.settings.clone(), seed) else {
            return;
        };
        self.stroke_layer = Some(layer);
        if let Some(renderer) = &self.renderer {
            renderer.stroke_buffer.clear();
        }
        self.stamp_live(&segments);
        self.request_redraw();
    }
    pub fn pointer_moved(&mut self, sample: &PointerSample) {
        let segments = self.builder.extend(sample);
        if segments.iter().any(|segment| !segment.is_empty()) {
            self.stamp_live(&segments);
            self.request_redraw();
        }
    }
    /// Finish the stroke. Returns the id of the committed element.
    pub fn pointer_ended(&mut self, sample: &PointerSample) -> Option<ElementID> {
        let element = self.builder.end(sample)?;
        self.commit_stroke(element)
    }
    fn stamp_live(&self, segments: &[LineSegment]) {
        let (Some(renderer), Some(settings)) = (&self.renderer, self.builder.settings()) else {
            return;
        };
        Printer::new(&renderer.pool).stamp_segments(
            &renderer.stroke_buffer,
            segments,
            &settings.brush,
            settings.color,
            settings.is_eraser(),
        );
    }
    /// Commit the stroke in progress, if any.
    fn settle(&mut self) {
        if let Some(element) = self.builder.finish() {
            self.commit_stroke(element);
        }
    }
    fn commit_stroke(&mut self, element: Element) -> Option<ElementID> {
        let layer = self.stroke_layer.take()?;
        if let Some(renderer) = &self.renderer {
            renderer.stroke_buffer.clear();
        }
        self.request_redraw();
        self.record(|writer| writer.add_element(layer, element))
            .inspect_err(|e| log::warn!("stroke dropped: {e}"))
            .ok()
    }

    // Elements and selection.

    /// Insert an element on the current layer and lift it for placement.
    /// A bitmap that fails to load adds nothing.
    pub fn add_element(&mut self, source: ElementSource) -> Option<ElementID> {
        self.settle();
        let document = self.history.document();
        let layer = document.current_layer_id();
        if document.layer(layer).is_some_and(|layer| layer.locked) {
            log::info!("{layer} is locked, element ignored");
            return None;
        }
        let canvas_size = document.canvas_size();
        let element = match source {
            ElementSource::Bitmap { id, encoded } => {
                let Some(renderer) = &self.renderer else {
                    log::warn!("bitmap dropped: {}", EngineError::DeviceUnavailable);
                    return None;
                };
                let id = id.map_or_else(|| TextureId::from_content(&encoded), TextureId::into_user);
                let texture = match renderer.pool.make_texture(id.clone(), &encoded) {
                    Ok(texture) => texture,
                    Err(e) => {
                        log::warn!("bitmap {id} dropped: {e}");
                        return None;
                    }
                };
                let [width, height] = texture.size();
                Element::chartlet(
                    Chartlet {
                        texture: id,
                        pixel_size: [width, height],
                    },
                    ElementTransform {
                        center: Vec2::new(canvas_size[0] as f32, canvas_size[1] as f32) / 2.0,
                        size: Vec2::new(width as f32, height as f32),
                        rotation: 0.0,
                    },
                )
            }
            ElementSource::Primitive {
                shape,
                fill,
                transform,
            } => Element::primitive(Primitive { shape, fill }, transform),
        };
        self.register_created_textures();
        if self.lifted.is_some() {
            self.deselect();
        }
        let id = self
            .record(|writer| writer.add_element(layer, element))
            .inspect_err(|e| log::warn!("element dropped: {e}"))
            .ok()?;
        self.lift(layer, id);
        Some(id)
    }
    /// Lift a smart object on the current layer for transform.
    pub fn select_element(&mut self, element: ElementID) -> bool {
        self.settle();
        let layer = self.history.document().current_layer_id();
        let eligible = self
            .history
            .document()
            .layer(layer)
            .and_then(|layer| layer.element(element))
            .is_some_and(Element::is_smart_object);
        if !eligible {
            return false;
        }
        if self.lifted.is_some() {
            self.deselect();
        }
        self.lift(layer, element)
    }
    fn lift(&mut self, layer: LayerID, element: ElementID) -> bool {
        if let Err(e) = self.history.set_selection(Some((layer, element))) {
            log::debug!("can't select {element}: {e}");
            return false;
        }
        self.sync_selection();
        // The lifted element moves from the drawable to the overlay.
        self.redraw_layer(layer);
        self.request_redraw();
        true
    }
    /// Move the lifted element. Nothing is recorded until [`Self::commit_selection`].
    pub fn update_selection_transform(&mut self, position: Vec2, size: Vec2, rotation: f32) -> bool {
        let Some(lifted) = &mut self.lifted else {
            return false;
        };
        lifted.element.update_transform(position, size, rotation);
        self.request_redraw();
        true
    }
    /// Record the net transform of the drag as one command.
    pub fn commit_selection(&mut self) -> Result<(), CommandError> {
        let Some(lifted) = &self.lifted else {
            return Err(CommandError::NoOp);
        };
        let to = *lifted.element.transform();
        let (layer, element) = self
            .history
            .document()
            .selection()
            .ok_or(CommandError::UnknownResource)?;
        self.record(|writer| writer.register_transform(layer, element, to))
    }
    /// Commit and drop the selection. The element returns to its layer's drawable.
    pub fn deselect(&mut self) {
        let Some((layer, _)) = self.history.document().selection() else {
            self.lifted = None;
            return;
        };
        let _ = self.commit_selection();
        // Clearing cannot fail.
        let _ = self.history.set_selection(None);
        self.lifted = None;
        self.redraw_layer(layer);
        self.request_redraw();
    }
    /// Follow the document's selection, keeping the live transform unless the document moved the element.
    fn sync_selection(&mut self) {
        let Some(element) = self.history.document().selected_element() else {
            self.lifted = None;
            return;
        };
        let current = self.lifted.as_ref().is_some_and(|lifted| {
            lifted.element.id() == element.id() && lifted.committed == *element.transform()
        });
        if !current {
            self.lifted = Some(Lifted {
                element: element.clone(),
                committed: *element.transform(),
            });
        }
    }

    // History.

    fn record<T>(
        &mut self,
        write: impl FnOnce(&mut HistoryWriter<'_>) -> Result<T, CommandError>,
    ) -> Result<T, CommandError> {
        self.settle();
        let (result, affected) = self.history.write_with(write);
        if let Err(e) = &result {
            if *e != CommandError::NoOp {
                log::warn!("command rejected: {e}");
            }
        }
        self.after_change(&affected);
        result
    }
    fn after_change(&mut self, affected: &Affected) {
        self.sync_selection();
        for &layer in &affected.layers {
            if self.history.document().layer(layer).is_some() {
                self.redraw_layer(layer);
            } else {
                self.forget_layer(layer);
            }
        }
        if !(affected.flags - Affects::GENERATION).is_empty() {
            self.request_redraw();
        }
    }
    /// Record a pending drag before the stacks move.
    fn settle_all(&mut self) {
        self.settle();
        if self.lifted.is_some() {
            let _ = self.commit_selection();
        }
    }
    pub fn undo(&mut self) -> bool {
        self.settle_all();
        let Some(affected) = self.history.undo() else {
            return false;
        };
        self.after_change(&affected);
        true
    }
    pub fn redo(&mut self) -> bool {
        self.settle_all();
        let Some(affected) = self.history.redo() else {
            return false;
        };
        self.after_change(&affected);
        true
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }
    /// Receive `can_undo`/`can_redo` after every change to the stacks.
    pub fn history_listener(&self) -> bus::BusReader<HistoryMessage> {
        self.history.listen()
    }

    // Layers.

    pub fn clear_layer(&mut self) -> Result<(), CommandError> {
        let layer = self.history.document().current_layer_id();
        self.record(|writer| writer.clear_layer(layer))
    }
    /// A new empty layer above the current one, which becomes current.
    pub fn create_layer(&mut self) -> Result<LayerID, CommandError> {
        self.record(|writer| writer.add_layer())
    }
    pub fn duplicate_layer(&mut self, layer: LayerID) -> Result<LayerID, CommandError> {
        self.record(|writer| writer.duplicate_layer(layer))
    }
    /// Deleting the only layer clears it instead.
    pub fn delete_layer(&mut self, layer: LayerID) -> Result<(), CommandError> {
        self.record(|writer| writer.delete_layer(layer))
    }
    pub fn move_layer(&mut self, layer: LayerID, to: usize) -> Result<(), CommandError> {
        self.record(|writer| writer.move_layer(layer, to))
    }
    pub fn set_layer_visibility(&mut self, layer: LayerID, visible: bool) -> Result<(), CommandError> {
        self.record(|writer| writer.set_visibility(layer, visible))
    }
    pub fn set_layer_locked(&mut self, layer: LayerID, locked: bool) -> Result<(), CommandError> {
        self.record(|writer| writer.set_locked(layer, locked))
    }
    /// Show an opacity while its slider is dragged. Not recorded.
    pub fn preview_layer_opacity(&mut self, layer: LayerID, opacity: f32) -> bool {
        if self.history.document().layer(layer).is_none() {
            return false;
        }
        self.opacity_preview.insert(layer, unit_clamp(opacity));
        self.request_redraw();
        true
    }
    /// Slider released: drop the preview and record the final value.
    pub fn commit_layer_opacity(&mut self, layer: LayerID, opacity: f32) -> Result<(), CommandError> {
        if self.opacity_preview.remove(&layer).is_some() {
            self.request_redraw();
        }
        self.record(|writer| writer.set_opacity(layer, opacity))
    }
    pub fn select_layer(&mut self, layer: LayerID) -> Result<(), TargetError> {
        if self.history.document().current_layer_id() == layer {
            return Ok(());
        }
        if self.history.document().layer(layer).is_none() {
            return Err(TargetError::TargetNotFound);
        }
        self.settle();
        self.deselect();
        self.history.select_layer(layer)?;
        self.request_redraw();
        Ok(())
    }

    // Document properties.

    pub fn set_background_color(&mut self, color: Color) -> Result<(), CommandError> {
        self.record(|writer| writer.set_background(color))
    }
    pub fn remove_background(&mut self) -> Result<(), CommandError> {
        self.record(|writer| writer.remove_background())
    }
    pub fn set_strength(&mut self, strength: f32) -> Result<(), CommandError> {
        self.record(|writer| writer.set_strength(strength))
    }
    pub fn set_prompt(&mut self, prompt: impl Into<String>) -> Result<(), CommandError> {
        let prompt = prompt.into();
        self.record(|writer| writer.set_prompt(prompt))
    }
    pub fn set_seed(&mut self, seed: u64) -> Result<(), CommandError> {
        self.record(|writer| writer.set_seed(seed))
    }

    // Rendering.

    /// Returns false if a redraw was already pending.
    pub fn request_redraw(&self) -> bool {
        self.scheduler.request()
    }
    /// Called by the platform frame timer. Composites at most once, and only if something changed.
    pub fn on_refresh_tick(&mut self) -> bool {
        if !self.scheduler.take() {
            return false;
        }
        self.redraw();
        true
    }
    /// Requests and redraws so far.
    #[must_use]
    pub fn redraw_stats(&self) -> (u64, u64) {
        self.scheduler.stats()
    }
    /// Composite a frame now.
    pub fn redraw(&mut self) {
        let Some(renderer) = &self.renderer else {
            return;
        };
        let stroke = self.builder.settings().map(|settings| {
            (
                &*renderer.stroke_buffer,
                Blend::for_tool(settings.is_eraser(), 1.0),
            )
        });
        let overlay = Overlay {
            selected: self.lifted.as_ref().map(|lifted| &lifted.element),
            stroke,
            opacity_overrides: Some(&self.opacity_preview),
        };
        renderer
            .compositor
            .composite(&renderer.pool, self.history.document(), &overlay);
        self.register_created_textures();
    }
    fn redraw_layer(&mut self, id: LayerID) {
        let Some(renderer) = &self.renderer else {
            return;
        };
        let document = self.history.document();
        let Some(layer) = document.layer(id) else {
            return;
        };
        let skip = document
            .selection()
            .filter(|(layer, _)| *layer == id)
            .map(|(_, element)| element);
        match renderer.compositor.redraw_layer(&renderer.pool, layer, skip) {
            Ok(drawable) => {
                let version = self.versions.entry(id).or_default();
                *version += 1;
                if let Some(worker) = &renderer.snapshots {
                    worker.submit(SnapshotJob {
                        layer: id,
                        version: *version,
                        image: drawable.to_rgba8(),
                    });
                }
            }
            Err(e) => log::warn!("failed to redraw {id}: {e}"),
        }
        self.register_created_textures();
    }
    fn redraw_all_layers(&mut self) {
        let layers: Vec<LayerID> = self.history.document().layers().iter().map(Layer::id).collect();
        for layer in layers {
            self.redraw_layer(layer);
        }
    }
    /// Free the textures of a layer that left the document. Undo brings it back through a redraw.
    fn forget_layer(&mut self, id: LayerID) {
        self.opacity_preview.remove(&id);
        let Some(renderer) = &self.renderer else {
            return;
        };
        renderer.pool.release(&Layer::drawable_texture(id));
        renderer.pool.release(&Layer::temporary_texture(id));
        if let Some(worker) = &renderer.snapshots {
            // A job still queued for this layer would store it again.
            worker.flush();
            worker.store().remove(id);
        }
        renderer.pool.log_residency();
    }
    fn register_created_textures(&mut self) {
        let Some(renderer) = &self.renderer else {
            return;
        };
        for id in renderer.pool.take_created() {
            self.history.register_texture(id);
        }
    }

    // Outputs.

    /// Downsampled frames for the generation client. `None` when headless.
    #[must_use]
    pub fn inference_frames(&self) -> Option<crossbeam::channel::Receiver<image::RgbaImage>> {
        Some(self.renderer.as_ref()?.compositor.frames())
    }
    /// Latest stored snapshot of a layer. May lag one redraw behind, see [`Self::flush_snapshots`].
    #[must_use]
    pub fn layer_snapshot(&self, layer: LayerID) -> Option<Snapshot> {
        self.renderer
            .as_ref()?
            .snapshots
            .as_ref()?
            .store()
            .get(layer)
    }
    /// Block until every queued snapshot is stored.
    pub fn flush_snapshots(&self) {
        if let Some(worker) = self.renderer.as_ref().and_then(|r| r.snapshots.as_ref()) {
            worker.flush();
        }
    }
    #[must_use]
    pub fn draw_parameters(&self) -> DrawParameters {
        DrawParameters {
            brush: self.settings.brush.name.clone(),
            color: self.settings.color,
            size: self.settings.size,
            opacity: self.settings.opacity,
        }
    }
    fn apply_draw_parameters(&mut self, draw: &DrawParameters) {
        // A missing brush is logged and the default kept.
        let _ = self.select_brush(&draw.brush);
        self.select_color(draw.color);
        self.set_size(draw.size);
        self.set_opacity(draw.opacity);
    }
    /// The persisted layout of the document. Commits any stroke or drag in progress and drops the selection.
    pub fn export(&mut self) -> Result<PersistedDocument, EngineError> {
        self.settle();
        self.deselect();
        if self.renderer.is_none() {
            return Err(EngineError::DeviceUnavailable);
        }
        self.flush_snapshots();
        let stale: Vec<LayerID> = self
            .history
            .document()
            .layers()
            .iter()
            .map(Layer::id)
            .filter(|&id| {
                self.layer_snapshot(id).map(|snapshot| snapshot.version)
                    != self.versions.get(&id).copied()
            })
            .collect();
        for id in stale {
            self.redraw_layer(id);
        }
        self.flush_snapshots();

        let document = self.history.document();
        let layers = document
            .layers()
            .iter()
            .map(|layer| {
                let snapshot =
                    self.layer_snapshot(layer.id())
                        .ok_or_else(|| EngineError::LookupMiss {
                            kind: LookupKind::Layer,
                            id: layer.id().to_string(),
                        })?;
                Ok(PersistedLayer {
                    index: layer.index(),
                    opacity: layer.opacity,
                    hidden: layer.hidden,
                    bitmap: snapshot.png.to_vec(),
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;
        Ok(PersistedDocument {
            canvas_size: document.canvas_size(),
            background: document.background(),
            layers,
            draw: self.draw_parameters(),
        })
    }
    /// A new layer above the current one holding a bitmap stretched over the canvas.
    pub fn import_layer(&mut self, encoded: &[u8]) -> Option<LayerID> {
        self.settle();
        let Some(renderer) = &self.renderer else {
            log::warn!("layer import dropped: {}", EngineError::DeviceUnavailable);
            return None;
        };
        let texture = TextureId::from_content(encoded);
        renderer
            .pool
            .make_texture(texture.clone(), encoded)
            .inspect_err(|e| log::warn!("layer import dropped: {e}"))
            .ok()?;
        self.register_created_textures();
        let mut layer = Layer::new_empty();
        layer.elements.push(full_canvas_chartlet(
            texture,
            self.history.document().canvas_size(),
        ));
        self.record(|writer| writer.insert_layer(layer))
            .inspect_err(|e| log::warn!("layer import dropped: {e}"))
            .ok()
    }
}

fn full_canvas_chartlet(texture: TextureId, canvas_size: [u32; 2]) -> Element {
    let [width, height] = canvas_size;
    Element::chartlet(
        Chartlet {
            texture,
            pixel_size: canvas_size,
        },
        ElementTransform::from_rect(Rect {
            min: Vec2::zero(),
            max: Vec2::new(width as f32, height as f32),
        }),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::SnapshotCompression;
    use dabble_core::stroke::PointerKind;

    fn config(side: u32) -> EngineConfig {
        EngineConfig {
            canvas_size: [side, side],
            inference_size: 16,
            snapshot_compression: SnapshotCompression::Fast,
            ..EngineConfig::default()
        }
    }
    fn rgba(r: f32, g: f32, b: f32) -> Color {
        Color::new_lossy(r, g, b, 1.0).unwrap()
    }
    fn sample(x: f32, y: f32) -> PointerSample {
        PointerSample::at(Vec2::new(x, y))
    }
    fn dab(session: &mut CanvasSession, x: f32, y: f32) -> Option<ElementID> {
        session.pointer_began(&sample(x, y));
        session.pointer_ended(&sample(x, y))
    }
    fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba(color));
        crate::snapshot::encode_png(&image, SnapshotCompression::Fast).unwrap()
    }
    fn full_rect(session: &mut CanvasSession, fill: Color) {
        let [width, height] = session.document().canvas_size();
        let (width, height) = (width as f32, height as f32);
        session
            .add_element(ElementSource::Primitive {
                shape: PrimitiveShape::Rectangle,
                fill,
                transform: ElementTransform {
                    center: Vec2::new(width, height) / 2.0,
                    size: Vec2::new(width, height),
                    rotation: 0.0,
                },
            })
            .unwrap();
        session.deselect();
    }
    fn frame_pixel(session: &mut CanvasSession, x: u32, y: u32) -> [f32; 4] {
        session.on_refresh_tick();
        session.frame().unwrap().pixel(x, y).unwrap()
    }
    fn snapshot_png(session: &CanvasSession, layer: LayerID) -> Arc<[u8]> {
        session.flush_snapshots();
        session.layer_snapshot(layer).unwrap().png
    }
    fn drawable_alpha(session: &CanvasSession, layer: LayerID, x: u32, y: u32) -> f32 {
        session.layer_drawable(layer).unwrap().pixel(x, y).unwrap()[3]
    }

    #[test]
    fn single_dab() {
        let mut session = CanvasSession::new(config(64));
        session.set_size(4.0);
        let layer = session.document().current_layer_id();
        assert!(dab(&mut session, 32.0, 32.0).is_some());

        let center = frame_pixel(&mut session, 32, 32);
        assert!(center[..3].iter().all(|&channel| channel < 0.01));
        assert_eq!(session.frame().unwrap().pixel(0, 0), Some([1.0; 4]));

        let snapshot = image::load_from_memory(&snapshot_png(&session, layer))
            .unwrap()
            .to_rgba8();
        assert_eq!(snapshot.get_pixel(32, 32).0[3], 255);
        assert_eq!(snapshot.get_pixel(0, 0).0[3], 0);
        assert_eq!(snapshot.get_pixel(63, 63).0[3], 0);
    }
    #[test]
    fn opacity_undo() {
        let mut session = CanvasSession::new(config(16));
        let layer = session.document().current_layer_id();
        session.commit_layer_opacity(layer, 0.25).unwrap();
        let opacity = |session: &CanvasSession| session.document().layer(layer).unwrap().opacity;
        assert_eq!(opacity(&session), 0.25);
        assert!(session.undo());
        assert_eq!(opacity(&session), 1.0);
        assert!(session.redo());
        assert_eq!(opacity(&session), 0.25);
        assert!(!session.redo());
    }
    #[test]
    fn undo_then_redo_restores_pixels() {
        let mut session = CanvasSession::new(config(64));
        session.set_size(2.0);
        let layer = session.document().current_layer_id();
        let blank = snapshot_png(&session, layer);

        session.pointer_began(&sample(10.0, 10.0));
        session.pointer_moved(&sample(30.0, 20.0));
        session.pointer_moved(&sample(50.0, 40.0));
        session.pointer_ended(&sample(50.0, 40.0)).unwrap();
        let drawn = snapshot_png(&session, layer);
        assert_ne!(drawn, blank);

        assert!(session.undo());
        assert_eq!(snapshot_png(&session, layer), blank);
        assert!(session.redo());
        assert_eq!(snapshot_png(&session, layer), drawn);
    }
    #[test]
    fn new_edit_discards_redo() {
        let mut session = CanvasSession::new(config(32));
        dab(&mut session, 8.0, 8.0).unwrap();
        assert!(session.undo());
        assert!(session.can_redo());
        dab(&mut session, 16.0, 16.0).unwrap();
        assert!(!session.can_redo());
        assert!(session.can_undo());
    }
    #[test]
    fn history_listener_hears_changes() {
        let mut session = CanvasSession::new(config(16));
        let mut listener = session.history_listener();
        dab(&mut session, 8.0, 8.0).unwrap();
        let message = listener.try_recv().unwrap();
        assert!(message.can_undo);
        assert!(!message.can_redo);
        session.undo();
        let message = listener.try_recv().unwrap();
        assert!(!message.can_undo);
        assert!(message.can_redo);
    }
    #[test]
    fn layer_indices_stay_dense() {
        let mut session = CanvasSession::new(config(16));
        let bottom = session.document().current_layer_id();
        let middle = session.create_layer().unwrap();
        let top = session.create_layer().unwrap();
        assert_eq!(session.document().current_layer_id(), top);
        let dense = |session: &CanvasSession| {
            session
                .document()
                .layers()
                .iter()
                .enumerate()
                .all(|(position, layer)| layer.index() == position)
        };
        assert!(dense(&session));

        session.delete_layer(middle).unwrap();
        assert_eq!(session.document().layers().len(), 2);
        assert!(dense(&session));
        assert!(session.layer_drawable(middle).is_none());

        assert!(session.undo());
        assert_eq!(session.document().layers().len(), 3);
        assert!(dense(&session));
        assert!(session.layer_drawable(middle).is_some());

        session.move_layer(bottom, 2).unwrap();
        assert!(dense(&session));
        assert_eq!(session.document().layers().top().map(Layer::id), Some(bottom));
    }
    #[test]
    fn last_layer_is_cleared_not_deleted() {
        let mut session = CanvasSession::new(config(16));
        let only = session.document().current_layer_id();
        dab(&mut session, 8.0, 8.0).unwrap();
        let _ = session.delete_layer(only);
        assert_eq!(session.document().layers().len(), 1);
        assert!(session.document().layer(only).unwrap().is_empty());
    }
    #[test]
    fn identical_bitmaps_share_a_texture() {
        let mut session = CanvasSession::new(config(32));
        let encoded = png(4, 4, [255, 0, 0, 255]);
        let first = session
            .add_element(ElementSource::Bitmap {
                id: None,
                encoded: encoded.clone(),
            })
            .unwrap();
        let second = session
            .add_element(ElementSource::Bitmap { id: None, encoded })
            .unwrap();
        assert_ne!(first, second);
        let layer = session.document().current_layer().unwrap();
        let texture = |element: ElementID| match layer.element(element).unwrap().kind() {
            dabble_core::element::ElementKind::Chartlet(chartlet) => chartlet.texture.clone(),
            _ => panic!("not a chartlet"),
        };
        let (first, second) = (texture(first), texture(second));
        assert_eq!(first, second);
        assert!(session.document().textures().any(|id| *id == first));
        assert!(session.texture(&first).is_some());
    }
    #[test]
    fn undecodable_bitmap_adds_nothing() {
        let mut session = CanvasSession::new(config(32));
        let added = session.add_element(ElementSource::Bitmap {
            id: None,
            encoded: vec![1, 2, 3],
        });
        assert!(added.is_none());
        assert!(!session.can_undo());
    }
    #[test]
    fn bitmap_ids_cannot_alias_engine_textures() {
        let mut session = CanvasSession::new(config(32));
        let layer = session.document().current_layer_id();
        let element = session
            .add_element(ElementSource::Bitmap {
                id: Some(Layer::drawable_texture(layer)),
                encoded: png(4, 4, [255, 0, 0, 255]),
            })
            .unwrap();
        session.deselect();
        let texture = match session.document().layer(layer).unwrap().element(element).unwrap().kind() {
            dabble_core::element::ElementKind::Chartlet(chartlet) => chartlet.texture.clone(),
            _ => panic!("not a chartlet"),
        };
        assert_ne!(texture, Layer::drawable_texture(layer));
        assert!(texture.as_str().starts_with("user/"));
        assert_eq!(drawable_alpha(&session, layer, 16, 16), 1.0);
        assert_eq!(drawable_alpha(&session, layer, 2, 2), 0.0);
    }
    #[test]
    fn far_pointer_samples_stay_on_canvas() {
        let mut session = CanvasSession::new(config(16));
        let layer = session.document().current_layer_id();
        session.pointer_began(&sample(8.0, 8.0));
        session.pointer_moved(&sample(2_000_000.0, 0.0));
        let id = session.pointer_ended(&sample(2_000_000.0, 0.0)).unwrap();
        let document = session.document();
        let element = document.layer(layer).unwrap().element(id).unwrap();
        let dabble_core::element::ElementKind::Stroke(group) = element.kind() else {
            panic!("not a stroke");
        };
        assert!(group.dabs().count() < 1000);
        assert!(drawable_alpha(&session, layer, 12, 8) > 0.0);
    }
    #[test]
    fn deleted_layer_drops_its_snapshot() {
        let mut session = CanvasSession::new(config(32));
        let doomed = session.create_layer().unwrap();
        dab(&mut session, 8.0, 8.0).unwrap();
        session.delete_layer(doomed).unwrap();
        session.flush_snapshots();
        assert!(session.layer_snapshot(doomed).is_none());
    }
    #[test]
    fn layers_composite_bottom_to_top() {
        let red = rgba(1.0, 0.0, 0.0);
        let green = rgba(0.0, 1.0, 0.0);
        let blue = rgba(0.0, 0.0, 1.0);
        let mut session = CanvasSession::new(config(16));
        let bottom = session.document().current_layer_id();
        full_rect(&mut session, red);
        session.create_layer().unwrap();
        full_rect(&mut session, green);
        let top = session.create_layer().unwrap();
        full_rect(&mut session, blue);

        assert_eq!(frame_pixel(&mut session, 8, 8), blue.premultiplied());
        session.set_layer_visibility(top, false).unwrap();
        assert_eq!(frame_pixel(&mut session, 8, 8), green.premultiplied());
        session.move_layer(bottom, 2).unwrap();
        assert_eq!(frame_pixel(&mut session, 8, 8), red.premultiplied());
        session.set_layer_visibility(bottom, false).unwrap();
        assert_eq!(frame_pixel(&mut session, 8, 8), green.premultiplied());
    }
    #[test]
    fn moved_chartlet_moves_pixels() {
        let mut session = CanvasSession::new(config(128));
        let layer = session.document().current_layer_id();
        let element = session
            .add_element(ElementSource::Bitmap {
                id: None,
                encoded: png(16, 16, [0, 0, 255, 255]),
            })
            .unwrap();
        // Lifted: drawn by the compositor, not into the drawable.
        assert!(session.layer_drawable(layer).unwrap().is_blank());
        session.deselect();

        let bounds = |session: &CanvasSession| {
            let drawable = session.layer_drawable(layer).unwrap();
            let bounds =
                raster::coverage_bounds(&drawable.read(), drawable.size(), 0.5).unwrap();
            (bounds.min, bounds.max)
        };
        assert_eq!(bounds(&session), ([56, 56], [72, 72]));

        assert!(session.select_element(element));
        assert!(session.update_selection_transform(
            Vec2::new(114.0, 114.0),
            Vec2::new(16.0, 16.0),
            0.0
        ));
        // Live transforms are not recorded.
        assert_eq!(
            session.document().selected_element().map(|e| e.transform().center),
            Some(Vec2::new(64.0, 64.0))
        );
        session.commit_selection().unwrap();
        session.deselect();
        assert_eq!(bounds(&session), ([106, 106], [122, 122]));

        assert!(session.undo());
        assert_eq!(bounds(&session), ([56, 56], [72, 72]));
    }
    #[test]
    fn only_smart_objects_are_selectable() {
        let mut session = CanvasSession::new(config(32));
        let stroke = dab(&mut session, 16.0, 16.0).unwrap();
        assert!(!session.select_element(stroke));
        assert!(session.selected_transform().is_none());
    }
    #[test]
    fn every_stroke_commits_one_element() {
        let mut session = CanvasSession::new(config(64));
        let layer = session.document().current_layer_id();
        for moves in 0..5 {
            session.pointer_began(&sample(10.0, 10.0));
            let mut end = sample(10.0, 10.0);
            for step in 1..=moves {
                end = sample(10.0 + 5.0 * step as f32, 10.0 + 2.0 * step as f32);
                session.pointer_moved(&end);
            }
            let id = session.pointer_ended(&end).unwrap();
            assert!(!session.is_stroke_active());
            let layer = session.document().layer(layer).unwrap();
            assert_eq!(layer.elements.len(), moves + 1);
            match layer.element(id).unwrap().kind() {
                dabble_core::element::ElementKind::Stroke(group) => {
                    assert!(group.dab_count() >= 1);
                }
                _ => panic!("not a stroke"),
            }
        }
    }
    #[test]
    fn switching_tools_commits_the_stroke() {
        let mut session = CanvasSession::new(config(32));
        session.pointer_began(&sample(8.0, 8.0));
        session.pointer_moved(&sample(12.0, 8.0));
        assert!(!session.can_undo());
        session.select_tool(Tool::Eraser);
        assert!(!session.is_stroke_active());
        assert!(session.can_undo());
        assert_eq!(session.document().current_layer().unwrap().elements.len(), 1);
    }
    #[test]
    fn redraws_coalesce() {
        let mut session = CanvasSession::new(config(32));
        assert!(session.on_refresh_tick());
        assert!(!session.on_refresh_tick());
        let (_, redraws) = session.redraw_stats();

        session.pointer_began(&sample(4.0, 4.0));
        for step in 1..10 {
            session.pointer_moved(&sample(4.0 + 2.0 * step as f32, 4.0));
        }
        let (requests, _) = session.redraw_stats();
        assert!(requests >= 10);
        assert!(session.on_refresh_tick());
        assert!(!session.on_refresh_tick());
        assert_eq!(session.redraw_stats().1, redraws + 1);
    }
    #[test]
    fn second_touch_is_ignored() {
        let mut session = CanvasSession::new(config(32));
        let first = sample(4.0, 4.0);
        let second = PointerSample {
            pointer: 1,
            ..sample(20.0, 20.0)
        };
        session.pointer_began(&first);
        session.pointer_began(&second);
        session.pointer_moved(&second);
        assert!(session.pointer_ended(&second).is_none());
        assert!(session.is_stroke_active());
        assert!(session.pointer_ended(&first).is_some());
        assert_eq!(session.document().current_layer().unwrap().elements.len(), 1);
    }
    #[test]
    fn pencil_only_ignores_touch() {
        let mut session = CanvasSession::new(config(32));
        session.set_pencil_only(true);
        session.pointer_began(&sample(8.0, 8.0));
        assert!(!session.is_stroke_active());
        let pencil = PointerSample {
            kind: PointerKind::Pencil,
            ..sample(8.0, 8.0)
        };
        session.pointer_began(&pencil);
        assert!(session.is_stroke_active());
        assert!(session.pointer_ended(&pencil).is_some());
    }
    #[test]
    fn locked_layer_rejects_edits() {
        let mut session = CanvasSession::new(config(32));
        let layer = session.document().current_layer_id();
        session.set_layer_locked(layer, true).unwrap();
        session.pointer_began(&sample(8.0, 8.0));
        assert!(!session.is_stroke_active());
        let added = session.add_element(ElementSource::Primitive {
            shape: PrimitiveShape::Rectangle,
            fill: Color::BLACK,
            transform: ElementTransform::from_rect(Rect {
                min: Vec2::zero(),
                max: Vec2::broadcast(4.0),
            }),
        });
        assert!(added.is_none());
        assert!(session.document().layer(layer).unwrap().is_empty());
    }
    #[test]
    fn eraser_strokes_persist() {
        let mut session = CanvasSession::new(config(64));
        session.set_size(4.0);
        let layer = session.document().current_layer_id();
        dab(&mut session, 32.0, 32.0).unwrap();
        assert!(drawable_alpha(&session, layer, 32, 32) > 0.99);

        session.select_tool(Tool::Eraser);
        dab(&mut session, 32.0, 32.0).unwrap();
        assert!(drawable_alpha(&session, layer, 32, 32) < 0.01);
        assert_eq!(session.document().layer(layer).unwrap().elements.len(), 2);

        assert!(session.undo());
        assert!(drawable_alpha(&session, layer, 32, 32) > 0.99);
    }
    #[test]
    fn snapshot_versions_increase() {
        let mut session = CanvasSession::new(config(32));
        let layer = session.document().current_layer_id();
        session.flush_snapshots();
        let first = session.layer_snapshot(layer).unwrap().version;
        dab(&mut session, 8.0, 8.0).unwrap();
        session.flush_snapshots();
        let second = session.layer_snapshot(layer).unwrap().version;
        dab(&mut session, 20.0, 20.0).unwrap();
        session.flush_snapshots();
        let third = session.layer_snapshot(layer).unwrap().version;
        assert!(first < second && second < third);
    }
    #[test]
    fn headless_keeps_history() {
        let mut config = config(32);
        config.headless = true;
        let mut session = CanvasSession::new(config);
        assert!(session.is_headless());
        assert!(dab(&mut session, 8.0, 8.0).is_some());
        assert!(session.can_undo());
        assert!(session.frame().is_none());
        assert!(session.inference_frames().is_none());
        assert!(matches!(session.export(), Err(EngineError::DeviceUnavailable)));
        assert!(session.undo());
        assert!(session.document().current_layer().unwrap().is_empty());
    }
    #[test]
    fn unknown_brush_keeps_current() {
        let mut session = CanvasSession::new(config(16));
        let result = session.select_brush("No Such Brush");
        assert!(matches!(
            result,
            Err(EngineError::LookupMiss {
                kind: LookupKind::Brush,
                ..
            })
        ));
        assert_eq!(session.settings().brush.name, "Round");
        session.select_brush("Chalk").unwrap();
        assert_eq!(session.settings().brush.name, "Chalk");
        // The grain texture is registered at startup.
        assert!(session.texture(&TextureId::explicit(PAPER_GRAIN)).is_some());
    }
    #[test]
    fn export_then_open() {
        let red = rgba(1.0, 0.0, 0.0);
        let mut session = CanvasSession::new(config(16));
        full_rect(&mut session, red);
        let top = session.create_layer().unwrap();
        session.commit_layer_opacity(top, 0.5).unwrap();
        session.set_layer_visibility(top, false).unwrap();
        session.set_size(3.0);
        session.select_color(rgba(0.0, 0.0, 1.0));

        let persisted = session.export().unwrap();
        assert_eq!(persisted.layers.len(), 2);
        assert_eq!(persisted.background, Some(Color::WHITE));
        assert_eq!(persisted.draw.size, 3.0);
        let bottom = persisted.layers_in_order()[0];
        let decoded = image::load_from_memory(&bottom.bitmap).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(8, 8).0, [255, 0, 0, 255]);

        let opened = CanvasSession::open(config(64), &persisted).unwrap();
        let document = opened.document();
        assert_eq!(document.canvas_size(), [16, 16]);
        assert_eq!(document.layers().len(), 2);
        let bottom = document.layers().at(0).unwrap();
        let top = document.layers().at(1).unwrap();
        assert_eq!(top.opacity, 0.5);
        assert!(top.hidden);
        assert!(!opened.can_undo());
        assert_eq!(
            opened.layer_drawable(bottom.id()).unwrap().pixel(8, 8),
            Some(red.premultiplied())
        );
        assert_eq!(opened.settings().size, 3.0);
        assert_eq!(opened.settings().color, rgba(0.0, 0.0, 1.0));
    }
    #[test]
    fn open_rejects_invalid_documents() {
        let persisted = PersistedDocument {
            canvas_size: [16, 16],
            background: None,
            layers: Vec::new(),
            draw: DrawParameters::default(),
        };
        assert!(matches!(
            CanvasSession::open(config(16), &persisted),
            Err(EngineError::InvalidDocument(_))
        ));
    }
    #[test]
    fn imported_layer_goes_on_top_of_current() {
        let mut session = CanvasSession::new(config(16));
        let bottom = session.document().current_layer_id();
        let layer = session.import_layer(&png(16, 16, [0, 255, 0, 255])).unwrap();
        assert_eq!(session.document().current_layer_id(), layer);
        assert_eq!(session.document().layers().position(layer), Some(1));
        assert_eq!(
            session.layer_drawable(layer).unwrap().pixel(3, 12),
            Some([0.0, 1.0, 0.0, 1.0])
        );
        assert!(session.undo());
        assert_eq!(session.document().current_layer_id(), bottom);
    }
    #[test]
    fn live_stroke_shows_before_commit() {
        let mut session = CanvasSession::new(config(64));
        session.set_size(4.0);
        session.pointer_began(&sample(32.0, 32.0));
        let center = frame_pixel(&mut session, 32, 32);
        assert!(center[0] < 0.01);
        assert!(session.document().current_layer().unwrap().is_empty());
        assert!(!session.can_undo());
    }
    #[test]
    fn opacity_preview_is_not_recorded() {
        let mut session = CanvasSession::new(config(16));
        let layer = session.document().current_layer_id();
        full_rect(&mut session, Color::BLACK);
        assert!(session.undo());
        assert!(session.redo());
        assert!(!session.can_redo());

        assert!(session.preview_layer_opacity(layer, 0.5));
        let gray = frame_pixel(&mut session, 8, 8);
        assert!((gray[0] - 0.5).abs() < 0.01);
        assert_eq!(session.document().layer(layer).unwrap().opacity, 1.0);

        session.commit_layer_opacity(layer, 0.5).unwrap();
        assert_eq!(session.document().layer(layer).unwrap().opacity, 0.5);
        assert!(session.undo());
        assert_eq!(session.document().layer(layer).unwrap().opacity, 1.0);
        let black = frame_pixel(&mut session, 8, 8);
        assert!(black[0] < 0.01);
    }
    #[test]
    fn inference_frames_are_downsampled() {
        let mut session = CanvasSession::new(config(64));
        let frames = session.inference_frames().unwrap();
        assert!(session.on_refresh_tick());
        let frame = frames.try_recv().unwrap();
        assert_eq!(frame.dimensions(), (16, 16));
    }
}
