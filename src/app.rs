use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{Config, MapProfile};
use crate::data::LocationRegistry;
use crate::export::{DownloadSink, ExportPipeline};
use crate::markers::icon::MarkerTypeMode;
use crate::markers::store::MarkerStore;
use crate::markers::{hit, overlay};
use crate::persist::{self, Backend};
use crate::view::surface::Surface;
use crate::view::{tiles, MapView};

/// Zoom factor per scroll step.
const ZOOM_STEP: f64 = 1.5;

/// Application state: one session over one map. Everything mutable
/// lives here; collaborators (backend, download sink) are injected at
/// construction.
pub struct App {
    pub config: Config,
    pub profile: MapProfile,
    pub registry: LocationRegistry,
    pub store: MarkerStore,
    pub mode: MarkerTypeMode,
    pub view: MapView,
    pub export: ExportPipeline,
    backend: Arc<dyn Backend>,
    /// Saves normally run on a detached thread; tests run them inline.
    detach_saves: bool,
    color_idx: usize,
    /// Resolution the overlay features were last built for.
    overlay_resolution: f64,
    /// Last flattened frame shown by the UI. Held stale while an
    /// export has the view resized.
    pub frame: Surface,
    /// Last mouse position for drag tracking
    pub last_mouse: Option<(u16, u16)>,
    pub should_quit: bool,
}

impl App {
    /// Build a session for `map_name` sized to the terminal. Data load
    /// failures are logged and leave the affected state empty; the
    /// session stays usable.
    pub fn new(
        config: Config,
        map_name: &str,
        backend: Arc<dyn Backend>,
        sink: Box<dyn DownloadSink>,
        term_width: u16,
        term_height: u16,
    ) -> Result<Self> {
        let profile = config
            .profile(map_name)
            .with_context(|| format!("unknown map {map_name}"))?
            .clone();

        let source = tiles::source_for(&profile.tiles_root)?;
        let size = surface_size(term_width, term_height);
        let view = MapView::new((profile.width, profile.height), source, size);

        let registry = match backend.fetch_locations(&profile.name) {
            Ok(records) => LocationRegistry::from_records(records),
            Err(err) => {
                log::error!("loading locations for {} failed: {err:#}", profile.name);
                LocationRegistry::new()
            }
        };

        let mut store = MarkerStore::new();
        match backend.fetch_markers(&profile.name) {
            Ok(markers) => store.load(markers),
            Err(err) => {
                log::error!("loading markers for {} failed: {err:#}", profile.name);
            }
        }

        let mut app = Self {
            config,
            profile,
            registry,
            store,
            mode: MarkerTypeMode::Circle,
            view,
            export: ExportPipeline::new(sink),
            backend,
            detach_saves: true,
            color_idx: 0,
            overlay_resolution: f64::NAN,
            frame: Surface::new(size.0, size.1),
            last_mouse: None,
            should_quit: false,
        };
        app.rebuild_overlay();
        Ok(app)
    }

    /// Currently selected marker color (hex string).
    pub fn current_color(&self) -> &str {
        self.config
            .palette
            .get(self.color_idx)
            .map(String::as_str)
            .unwrap_or("#ff0000")
    }

    /// Advance the color picker. Existing markers keep their colors.
    pub fn cycle_color(&mut self) {
        if !self.config.palette.is_empty() {
            self.color_idx = (self.color_idx + 1) % self.config.palette.len();
        }
    }

    /// Advance the marker display mode and rebuild the overlay.
    pub fn cycle_mode(&mut self) {
        self.mode = self.mode.next();
        self.rebuild_overlay();
    }

    /// Toggle marker overlay visibility (hidden layers are also left
    /// out of exports).
    pub fn toggle_overlay(&mut self) {
        self.view.toggle_overlay();
    }

    /// Left click: toggle the nearest location within tolerance, save,
    /// rebuild. A miss changes nothing and saves nothing.
    pub fn handle_click(&mut self, col: u16, row: u16) {
        if self.export.is_busy() {
            return;
        }
        let Some((px, py)) = cell_to_pixel(col, row) else {
            return;
        };
        let click = self.view.state().surface_to_map(px, py);
        let Some(location) = hit::locate(click, &self.registry) else {
            return;
        };

        let key = location.key.clone();
        let color = self.current_color().to_string();
        let marked = self.store.toggle(&key, &color);
        log::debug!("{} {key}", if marked { "marked" } else { "unmarked" });
        self.dispatch_save();
        self.rebuild_overlay();
    }

    /// Remove all markers and persist the empty mapping.
    pub fn reset_markers(&mut self) {
        self.store.clear();
        self.dispatch_save();
        self.rebuild_overlay();
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        if self.export.is_busy() {
            return;
        }
        self.view.pan(dx, dy);
    }

    /// Zoom towards a terminal cell position.
    pub fn zoom_at_cell(&mut self, col: u16, row: u16, zoom_in: bool) {
        if self.export.is_busy() {
            return;
        }
        let (px, py) = cell_to_pixel(col, row).unwrap_or_else(|| {
            let (w, h) = self.view.state().size;
            (w as f64 / 2.0, h as f64 / 2.0)
        });
        let factor = if zoom_in { 1.0 / ZOOM_STEP } else { ZOOM_STEP };
        self.view.zoom_at(px, py, factor);
        self.rebuild_overlay();
    }

    /// Zoom at the view center (keyboard zoom).
    pub fn zoom_center(&mut self, zoom_in: bool) {
        if self.export.is_busy() {
            return;
        }
        let (w, h) = self.view.state().size;
        let factor = if zoom_in { 1.0 / ZOOM_STEP } else { ZOOM_STEP };
        self.view.zoom_at(w as f64 / 2.0, h as f64 / 2.0, factor);
        self.rebuild_overlay();
    }

    /// Re-fit the whole map into the view.
    pub fn fit_view(&mut self) {
        if self.export.is_busy() {
            return;
        }
        self.view.fit();
        self.rebuild_overlay();
    }

    /// Handle mouse drag panning.
    pub fn handle_drag(&mut self, x: u16, y: u16) {
        if let Some((last_x, last_y)) = self.last_mouse {
            let dx = last_x as f64 - x as f64;
            // one terminal row is two surface pixels
            let dy = (last_y as f64 - y as f64) * 2.0;
            self.pan(dx, dy);
        }
        self.last_mouse = Some((x, y));
    }

    pub fn end_drag(&mut self) {
        self.last_mouse = None;
    }

    /// Update view surfaces on terminal resize.
    pub fn resize(&mut self, term_width: u16, term_height: u16) {
        if self.export.is_busy() {
            return;
        }
        self.view.resize(surface_size(term_width, term_height));
    }

    /// Kick off the high-resolution export.
    pub fn start_export(&mut self) {
        if self.export.start(&mut self.view, &self.profile) {
            // icons must be sized for the export resolution
            self.rebuild_overlay();
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// One event-loop iteration: drain tile loads, render, advance the
    /// export pipeline, refresh the presented frame.
    pub fn tick(&mut self) {
        self.view.pump();
        self.sync_overlay_scale();
        let outcome = self.view.render();
        self.export.on_render(outcome, &mut self.view);
        // the pipeline may have restored the interactive view state
        self.sync_overlay_scale();
        if !self.export.is_busy() {
            self.view.render();
            self.frame = self.view.composite();
        }
    }

    /// Rebuild the overlay whenever the view resolution drifted from
    /// what the features were built for (zoom, export resize/restore).
    fn sync_overlay_scale(&mut self) {
        if self.view.state().resolution != self.overlay_resolution {
            self.rebuild_overlay();
        }
    }

    /// Full overlay rebuild from registry + store at the current
    /// resolution.
    fn rebuild_overlay(&mut self) {
        let resolution = self.view.state().resolution;
        let features = overlay::rebuild(
            &self.registry,
            &self.store,
            self.mode,
            self.config.icon_sizes(&self.profile),
            resolution,
        );
        self.view.set_features(features);
        self.overlay_resolution = resolution;
    }

    /// Hand the full current mapping to the backend without waiting
    /// for the result.
    fn dispatch_save(&mut self) {
        let snapshot = self.store.snapshot();
        if self.detach_saves {
            persist::save_detached(
                Arc::clone(&self.backend),
                self.profile.name.clone(),
                snapshot,
            );
        } else if let Err(err) = self.backend.save_markers(&self.profile.name, &snapshot) {
            log::warn!("saving markers failed: {err:#}");
        }
    }
}

/// View surface size for a terminal: one pixel per column, two rows of
/// pixels per row (half-block rendering), minus the border and status
/// bar.
fn surface_size(term_width: u16, term_height: u16) -> (u32, u32) {
    let inner_w = term_width.saturating_sub(2).max(1) as u32;
    let inner_h = term_height.saturating_sub(3).max(1) as u32;
    (inner_w, inner_h * 2)
}

/// Terminal cell to view surface pixel (center of the cell), None for
/// clicks on the border.
fn cell_to_pixel(col: u16, row: u16) -> Option<(f64, f64)> {
    if col == 0 || row == 0 {
        return None;
    }
    Some(((col - 1) as f64 + 0.5, (row - 1) as f64 * 2.0 + 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LocationRecord;
    use crate::export::ExportArtifact;
    use glam::DVec2;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory backend double recording every save.
    struct MemoryBackend {
        locations: Vec<LocationRecord>,
        markers: HashMap<String, String>,
        saves: Mutex<Vec<HashMap<String, String>>>,
        fail_loads: bool,
    }

    impl MemoryBackend {
        fn new(locations: Vec<LocationRecord>) -> Self {
            Self {
                locations,
                markers: HashMap::new(),
                saves: Mutex::new(Vec::new()),
                fail_loads: false,
            }
        }
    }

    impl Backend for MemoryBackend {
        fn fetch_locations(&self, _map: &str) -> Result<Vec<LocationRecord>> {
            if self.fail_loads {
                anyhow::bail!("backend down");
            }
            Ok(self.locations.clone())
        }

        fn fetch_markers(&self, _map: &str) -> Result<HashMap<String, String>> {
            if self.fail_loads {
                anyhow::bail!("backend down");
            }
            Ok(self.markers.clone())
        }

        fn save_markers(&self, _map: &str, markers: &HashMap<String, String>) -> Result<()> {
            self.saves.lock().unwrap().push(markers.clone());
            Ok(())
        }
    }

    struct NullSink;

    impl DownloadSink for NullSink {
        fn deliver(&self, _artifact: &ExportArtifact) -> Result<()> {
            Ok(())
        }
    }

    fn locations() -> Vec<LocationRecord> {
        vec![
            LocationRecord {
                pixel_coords: [100.0, 100.0],
                hex_coords: [0, 0],
            },
            LocationRecord {
                pixel_coords: [400.0, 300.0],
                hex_coords: [1, 2],
            },
        ]
    }

    fn test_config() -> Config {
        Config {
            maps: vec![MapProfile {
                name: "proving-grounds".to_string(),
                tiles_root: "/nonexistent/tiles".to_string(),
                width: 512,
                height: 512,
                hex_icon_size: 36.0,
            }],
            ..Config::default()
        }
    }

    fn app_with(backend: Arc<MemoryBackend>) -> App {
        let mut app = App::new(
            test_config(),
            "proving-grounds",
            backend,
            Box::new(NullSink),
            80,
            24,
        )
        .unwrap();
        app.detach_saves = false;
        app
    }

    /// Surface pixel under a map point, as a clickable terminal cell.
    fn cell_for(app: &App, map_x: f64, map_y: f64) -> (u16, u16) {
        let (sx, sy) = app.view.state().map_to_surface(DVec2::new(map_x, map_y));
        (sx as u16 + 1, (sy / 2.0) as u16 + 1)
    }

    #[test]
    fn test_click_toggles_and_saves() {
        let backend = Arc::new(MemoryBackend::new(locations()));
        let mut app = app_with(backend.clone());

        let (col, row) = cell_for(&app, 100.0, -100.0);
        app.handle_click(col, row);

        assert!(app.store.is_marked("0,0"));
        assert_eq!(app.store.color_of("0,0"), Some("#ff0000"));
        let saves = backend.saves.lock().unwrap();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].len(), 1);
    }

    #[test]
    fn test_second_click_unmarks() {
        let backend = Arc::new(MemoryBackend::new(locations()));
        let mut app = app_with(backend.clone());

        let (col, row) = cell_for(&app, 100.0, -100.0);
        app.handle_click(col, row);
        app.handle_click(col, row);

        assert!(!app.store.is_marked("0,0"));
        // every mutation saved the full mapping
        let saves = backend.saves.lock().unwrap();
        assert_eq!(saves.len(), 2);
        assert!(saves[1].is_empty());
    }

    #[test]
    fn test_miss_changes_nothing() {
        let backend = Arc::new(MemoryBackend::new(locations()));
        let mut app = app_with(backend.clone());

        // far corner of the map, no location nearby
        let (col, row) = cell_for(&app, 500.0, -500.0);
        app.handle_click(col, row);

        assert!(app.store.is_empty());
        assert!(backend.saves.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reset_saves_empty_mapping() {
        let backend = Arc::new(MemoryBackend::new(locations()));
        let mut app = app_with(backend.clone());

        let (col, row) = cell_for(&app, 100.0, -100.0);
        app.handle_click(col, row);
        app.reset_markers();

        assert!(app.store.is_empty());
        let saves = backend.saves.lock().unwrap();
        assert!(saves.last().unwrap().is_empty());
    }

    #[test]
    fn test_failed_loads_leave_state_empty() {
        let mut backend = MemoryBackend::new(locations());
        backend.fail_loads = true;
        let app = app_with(Arc::new(backend));

        assert!(app.registry.is_empty());
        assert!(app.store.is_empty());
        // still interactive
        assert!(!app.should_quit);
    }

    #[test]
    fn test_zoom_rebuilds_overlay_scale() {
        let backend = Arc::new(MemoryBackend::new(locations()));
        let mut app = app_with(backend);
        let before = app.overlay_resolution;

        app.zoom_center(true);
        assert!(app.overlay_resolution < before);
    }

    #[test]
    fn test_export_restores_view_and_overlay_scale() {
        let backend = Arc::new(MemoryBackend::new(locations()));
        let mut app = app_with(backend);
        let before = app.view.snapshot();

        app.start_export();
        assert!(app.export.is_busy());
        assert_eq!(app.overlay_resolution, 1.0);

        for _ in 0..400 {
            app.tick();
            if !app.export.is_busy() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(!app.export.is_busy());
        assert_eq!(app.view.snapshot(), before);
        assert_eq!(app.overlay_resolution, app.view.state().resolution);
    }

    #[test]
    fn test_interaction_ignored_while_exporting() {
        let backend = Arc::new(MemoryBackend::new(locations()));
        let mut app = app_with(backend.clone());

        app.start_export();
        let (col, row) = cell_for(&app, 100.0, -100.0);
        app.handle_click(col, row);
        assert!(app.store.is_empty());
        assert!(backend.saves.lock().unwrap().is_empty());
    }

    #[test]
    fn test_color_cycle_affects_new_markers_only() {
        let backend = Arc::new(MemoryBackend::new(locations()));
        let mut app = app_with(backend);

        let (col, row) = cell_for(&app, 100.0, -100.0);
        app.handle_click(col, row);
        app.cycle_color();
        let (col2, row2) = cell_for(&app, 400.0, -300.0);
        app.handle_click(col2, row2);

        assert_eq!(app.store.color_of("0,0"), Some("#ff0000"));
        assert_eq!(app.store.color_of("1,2"), Some("#00a8f3"));
    }
}
