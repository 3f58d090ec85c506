#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use dabble::brush_engine::Tool;
use dabble::{CanvasSession, EngineConfig};
use dabble_core::color::Color;
use dabble_core::stroke::PointerSample;
use ultraviolet::Vec2;

/// Draw a short scripted scene and write each layer's bitmap into the directory given as the first
/// argument, `dabble-out` by default.
fn main() -> AnyResult<()> {
    let config = EngineConfig::from_preferences();
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(config.level_filter())
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", config.level_filter());
    }
    if config.did_fail_to_load() {
        log::warn!("preferences failed to load, using defaults");
    }
    let out_dir: std::path::PathBuf = std::env::args_os()
        .nth(1)
        .map_or_else(|| "dabble-out".into(), Into::into);

    let mut session = CanvasSession::new(config);
    let [width, height] = session.document().canvas_size();
    let (width, height) = (width as f32, height as f32);
    let stroke = |session: &mut CanvasSession, from: Vec2, to: Vec2| {
        session.pointer_began(&PointerSample::at(from));
        for step in 1..=16 {
            let t = step as f32 / 16.0;
            session.pointer_moved(&PointerSample::at(from + (to - from) * t));
        }
        session.pointer_ended(&PointerSample::at(to));
    };

    session.set_size(2.0);
    stroke(
        &mut session,
        Vec2::new(width * 0.1, height * 0.5),
        Vec2::new(width * 0.9, height * 0.5),
    );
    session.create_layer()?;
    if let Err(e) = session.select_brush("Chalk") {
        log::warn!("{e}");
    }
    session.select_color(Color::new_lossy(0.8, 0.2, 0.1, 1.0)?);
    stroke(
        &mut session,
        Vec2::new(width * 0.5, height * 0.1),
        Vec2::new(width * 0.5, height * 0.9),
    );
    session.select_tool(Tool::Eraser);
    stroke(
        &mut session,
        Vec2::new(width * 0.4, height * 0.4),
        Vec2::new(width * 0.6, height * 0.6),
    );
    // Changed our mind about the erasing.
    session.undo();
    session.on_refresh_tick();

    if session.is_headless() {
        log::info!(
            "headless, nothing to write. {} layers, can undo: {}",
            session.document().layers().len(),
            session.can_undo()
        );
        return Ok(());
    }
    let persisted = session.export()?;
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    for layer in &persisted.layers {
        let path = out_dir.join(format!("layer-{}.png", layer.index));
        std::fs::write(&path, &layer.bitmap)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!(
            "wrote {} ({})",
            path.display(),
            human_bytes::human_bytes(layer.bitmap.len() as f64)
        );
    }
    let (requests, redraws) = session.redraw_stats();
    log::info!("{requests} redraw requests, {redraws} redraws");
    Ok(())
}
