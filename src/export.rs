use std::path::PathBuf;

use anyhow::{Context, Result};
use glam::DVec2;
use image::ImageEncoder;

use crate::config::MapProfile;
use crate::view::{MapView, RenderOutcome, ViewSnapshot};

/// A finished export: encoded image plus the filename to save it
/// under. Handed to the sink and dropped.
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Receives the finished artifact (the download trigger).
pub trait DownloadSink {
    fn deliver(&self, artifact: &ExportArtifact) -> Result<()>;
}

/// Writes artifacts into a directory.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DownloadSink for FileSink {
    fn deliver(&self, artifact: &ExportArtifact) -> Result<()> {
        let path = self.dir.join(&artifact.filename);
        std::fs::write(&path, &artifact.bytes)
            .with_context(|| format!("write {}", path.display()))?;
        log::info!("export written to {}", path.display());
        Ok(())
    }
}

/// View mutation applied for the capture: full map extent at native
/// resolution, so one output pixel equals one map-image pixel.
pub fn full_extent_target(profile: &MapProfile) -> (u32, u32, f64, DVec2) {
    let center = DVec2::new(profile.width as f64 / 2.0, -(profile.height as f64) / 2.0);
    (profile.width, profile.height, 1.0, center)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Resizing,
    AwaitingRenderComplete,
    Compositing,
    Restoring,
}

/// Drives the resize → render → capture → restore sequence against the
/// live view.
///
/// The pipeline is advanced by the event loop: `start` mutates the
/// view to the export target, then each tick's [`RenderOutcome`] is
/// fed to `on_render` until the awaited ticket completes. Capture and
/// restore then run synchronously. The view snapshot taken in `start`
/// is restored **unconditionally** — a failed capture or delivery can
/// never leave the interactive view stuck at export scale.
///
/// Overlapping requests are rejected: `start` while the pipeline is
/// not idle logs a warning and returns false.
pub struct ExportPipeline {
    phase: Phase,
    snapshot: Option<ViewSnapshot>,
    awaited: Option<u64>,
    filename: Option<String>,
    sink: Box<dyn DownloadSink>,
}

impl ExportPipeline {
    pub fn new(sink: Box<dyn DownloadSink>) -> Self {
        Self {
            phase: Phase::Idle,
            snapshot: None,
            awaited: None,
            filename: None,
            sink,
        }
    }

    /// True from `start` until the view has been restored; drives the
    /// transient "exporting" indicator.
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Begin an export. Returns false if one is already in flight.
    pub fn start(&mut self, view: &mut MapView, profile: &MapProfile) -> bool {
        if self.is_busy() {
            log::warn!("export already in progress, request ignored");
            return false;
        }

        self.phase = Phase::Resizing;
        self.snapshot = Some(view.snapshot());
        self.filename = Some(format!("{}_high_res.png", profile.name));

        let (w, h, resolution, center) = full_extent_target(profile);
        view.set_view((w, h), resolution, center);

        self.awaited = Some(view.ticket());
        self.phase = Phase::AwaitingRenderComplete;
        log::info!("export started: {}x{} at resolution {}", w, h, resolution);
        true
    }

    /// Feed a render outcome. When the awaited render is complete the
    /// capture runs and the view is restored. Completions for older
    /// tickets are ignored.
    pub fn on_render(&mut self, outcome: RenderOutcome, view: &mut MapView) {
        if self.phase != Phase::AwaitingRenderComplete {
            return;
        }
        if !outcome.complete || Some(outcome.ticket) != self.awaited {
            return;
        }
        self.finish(view);
    }

    fn finish(&mut self, view: &mut MapView) {
        self.phase = Phase::Compositing;
        let captured = self.capture(view);

        self.phase = Phase::Restoring;
        match captured {
            Ok(artifact) => {
                if let Err(err) = self.sink.deliver(&artifact) {
                    log::error!("export delivery failed: {err:#}");
                }
            }
            Err(err) => log::error!("export capture failed: {err:#}"),
        }

        if let Some(snap) = self.snapshot.take() {
            view.restore(&snap);
        }
        self.awaited = None;
        self.filename = None;
        self.phase = Phase::Idle;
    }

    /// Flatten the visible layer surfaces and encode the result.
    fn capture(&self, view: &MapView) -> Result<ExportArtifact> {
        let flat = view.composite();
        let (w, h) = (flat.width(), flat.height());

        let img = image::RgbaImage::from_raw(w, h, flat.into_pixels())
            .context("composited surface has inconsistent dimensions")?;

        let mut bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut bytes)
            .write_image(img.as_raw(), w, h, image::ExtendedColorType::Rgba8)
            .context("encode export image")?;

        Ok(ExportArtifact {
            bytes,
            filename: self.filename.clone().unwrap_or_else(|| "map.png".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::tiles::{TileSource, TILE_SIZE};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::time::Duration;

    struct SolidSource;

    impl TileSource for SolidSource {
        fn fetch(&self, _tx: u32, _ty: u32) -> Result<Vec<u8>> {
            let img =
                image::RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, image::Rgba([10, 20, 30, 255]));
            let mut bytes = Vec::new();
            img.write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
            Ok(bytes)
        }
    }

    /// Keeps delivered artifacts for inspection.
    struct CollectSink {
        artifacts: Rc<RefCell<Vec<(String, Vec<u8>)>>>,
    }

    impl DownloadSink for CollectSink {
        fn deliver(&self, artifact: &ExportArtifact) -> Result<()> {
            self.artifacts
                .borrow_mut()
                .push((artifact.filename.clone(), artifact.bytes.clone()));
            Ok(())
        }
    }

    struct FailingSink;

    impl DownloadSink for FailingSink {
        fn deliver(&self, _artifact: &ExportArtifact) -> Result<()> {
            anyhow::bail!("disk full")
        }
    }

    fn profile() -> MapProfile {
        MapProfile {
            name: "proving-grounds".to_string(),
            tiles_root: "unused".to_string(),
            width: 512,
            height: 256,
            hex_icon_size: 36.0,
        }
    }

    fn view() -> MapView {
        MapView::new((512, 256), Arc::new(SolidSource), (64, 32))
    }

    /// Drive the pipeline the way the event loop does, until idle.
    fn drive(pipeline: &mut ExportPipeline, view: &mut MapView) {
        for _ in 0..400 {
            view.pump();
            let outcome = view.render();
            pipeline.on_render(outcome, view);
            if !pipeline.is_busy() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("export never finished");
    }

    #[test]
    fn test_export_produces_full_size_png() {
        let artifacts = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = ExportPipeline::new(Box::new(CollectSink {
            artifacts: artifacts.clone(),
        }));
        let mut v = view();

        assert!(pipeline.start(&mut v, &profile()));
        drive(&mut pipeline, &mut v);

        let delivered = artifacts.borrow();
        assert_eq!(delivered.len(), 1);
        let (name, bytes) = &delivered[0];
        assert_eq!(name, "proving-grounds_high_res.png");

        let img = image::load_from_memory(bytes).unwrap().to_rgba8();
        assert_eq!((img.width(), img.height()), (512, 256));
        assert_eq!(img.get_pixel(256, 128).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_view_restored_after_success() {
        let artifacts = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = ExportPipeline::new(Box::new(CollectSink {
            artifacts: artifacts.clone(),
        }));
        let mut v = view();
        let before = v.snapshot();

        pipeline.start(&mut v, &profile());
        assert_ne!(v.snapshot(), before);
        drive(&mut pipeline, &mut v);

        assert_eq!(v.snapshot(), before);
    }

    #[test]
    fn test_view_restored_after_delivery_failure() {
        let mut pipeline = ExportPipeline::new(Box::new(FailingSink));
        let mut v = view();
        let before = v.snapshot();

        pipeline.start(&mut v, &profile());
        drive(&mut pipeline, &mut v);

        assert_eq!(v.snapshot(), before);
        assert!(!pipeline.is_busy());
    }

    #[test]
    fn test_busy_guard_rejects_reentry() {
        let mut pipeline = ExportPipeline::new(Box::new(FailingSink));
        let mut v = view();

        assert!(pipeline.start(&mut v, &profile()));
        assert!(pipeline.is_busy());
        assert!(!pipeline.start(&mut v, &profile()));

        drive(&mut pipeline, &mut v);
        // idle again: a new export may start
        assert!(pipeline.start(&mut v, &profile()));
        drive(&mut pipeline, &mut v);
    }

    #[test]
    fn test_stale_ticket_completion_ignored() {
        let mut pipeline = ExportPipeline::new(Box::new(FailingSink));
        let mut v = view();

        pipeline.start(&mut v, &profile());
        let stale = RenderOutcome {
            ticket: v.ticket().wrapping_sub(1),
            complete: true,
        };
        pipeline.on_render(stale, &mut v);
        assert!(pipeline.is_busy());
        drive(&mut pipeline, &mut v);
    }

    #[test]
    fn test_hidden_overlay_skipped_in_capture() {
        use crate::markers::icon::{icon, MarkerKind};
        use crate::markers::overlay::Feature;
        use glam::DVec2;

        let artifacts = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = ExportPipeline::new(Box::new(CollectSink {
            artifacts: artifacts.clone(),
        }));
        let mut v = view();
        v.set_features(vec![Feature {
            position: DVec2::new(256.0, -128.0),
            glyph: icon("#ff0000", MarkerKind::Circle, 10.0),
            scale: 10.0,
        }]);
        v.set_overlay_visible(false);

        pipeline.start(&mut v, &profile());
        drive(&mut pipeline, &mut v);

        let delivered = artifacts.borrow();
        let img = image::load_from_memory(&delivered[0].1).unwrap().to_rgba8();
        // marker suppressed: center pixel is the raw tile color
        assert_eq!(img.get_pixel(256, 128).0, [10, 20, 30, 255]);
    }
}
