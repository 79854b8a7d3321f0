pub mod surface;
pub mod tiles;

use std::sync::Arc;

use glam::DVec2;

use crate::markers::overlay::{rasterize, Feature};
use surface::Surface;
use tiles::{TileLayer, TileSource};

/// The visible portion of the map and its scale.
///
/// `resolution` is map units per surface pixel: smaller values mean a
/// more zoomed-in view. Map space is the map image's pixel space with
/// the Y axis negated (y grows upward); the flip is confined to the
/// `map_to_surface`/`surface_to_map` pair so every consumer agrees on
/// it.
#[derive(Clone, Debug)]
pub struct ViewState {
    /// View center in map units.
    pub center: DVec2,
    /// Map units per surface pixel.
    pub resolution: f64,
    /// Surface dimensions in pixels.
    pub size: (u32, u32),
    pub min_resolution: f64,
    pub max_resolution: f64,
    /// Full map dimensions in pixels; bounds the center.
    pub map_size: DVec2,
}

/// Restorable subset of the view state.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewSnapshot {
    pub center: DVec2,
    pub resolution: f64,
    pub size: (u32, u32),
}

impl ViewState {
    pub fn new(
        center: DVec2,
        resolution: f64,
        size: (u32, u32),
        min_resolution: f64,
        max_resolution: f64,
    ) -> Self {
        Self {
            center,
            resolution,
            size,
            min_resolution,
            max_resolution,
            map_size: DVec2::new(f64::INFINITY, f64::INFINITY),
        }
    }

    /// View showing the entire map, centered.
    pub fn fit(map_px: (u32, u32), size: (u32, u32)) -> Self {
        let map_size = DVec2::new(map_px.0 as f64, map_px.1 as f64);
        let fit_res = (map_size.x / size.0.max(1) as f64)
            .max(map_size.y / size.1.max(1) as f64)
            .max(f64::MIN_POSITIVE);
        Self {
            center: DVec2::new(map_size.x / 2.0, -map_size.y / 2.0),
            resolution: fit_res,
            size,
            min_resolution: 0.25f64.min(fit_res),
            max_resolution: fit_res * 2.0,
            map_size,
        }
    }

    /// Project a map-space point to surface pixel coordinates.
    pub fn map_to_surface(&self, p: DVec2) -> (f64, f64) {
        let (w, h) = self.size;
        let sx = (p.x - self.center.x) / self.resolution + w as f64 / 2.0;
        let sy = (self.center.y - p.y) / self.resolution + h as f64 / 2.0;
        (sx, sy)
    }

    /// Unproject surface pixel coordinates back to map space.
    pub fn surface_to_map(&self, sx: f64, sy: f64) -> DVec2 {
        let (w, h) = self.size;
        DVec2::new(
            (sx - w as f64 / 2.0) * self.resolution + self.center.x,
            self.center.y - (sy - h as f64 / 2.0) * self.resolution,
        )
    }

    /// Set the resolution, clamped to the interactive zoom bounds.
    pub fn set_resolution(&mut self, resolution: f64) {
        self.resolution = resolution.clamp(self.min_resolution, self.max_resolution);
    }

    /// Pan by a surface-pixel delta.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.center.x += dx * self.resolution;
        self.center.y -= dy * self.resolution;
        self.clamp_center();
    }

    /// Zoom by a factor towards a surface pixel, keeping the map point
    /// under it fixed.
    pub fn zoom_at(&mut self, sx: f64, sy: f64, factor: f64) {
        // Get the map coordinates under the cursor
        let anchor = self.surface_to_map(sx, sy);

        self.set_resolution(self.resolution * factor);

        // Calculate where that point now projects to and pan the
        // difference back under the cursor
        let (nx, ny) = self.map_to_surface(anchor);
        self.pan(nx - sx, ny - sy);
    }

    fn clamp_center(&mut self) {
        self.center.x = self.center.x.clamp(0.0, self.map_size.x);
        self.center.y = self.center.y.clamp(-self.map_size.y, 0.0);
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            center: self.center,
            resolution: self.resolution,
            size: self.size,
        }
    }

    pub fn restore(&mut self, snap: &ViewSnapshot) {
        self.center = snap.center;
        self.resolution = snap.resolution;
        self.size = snap.size;
    }
}

/// Result of a render pass. `complete` means every tile needed for the
/// current view state is resident (or has terminally failed), i.e. the
/// surfaces show the final picture for ticket `ticket`.
#[derive(Clone, Copy, Debug)]
pub struct RenderOutcome {
    pub ticket: u64,
    pub complete: bool,
}

/// Marker overlay layer: holds the current feature set and rasterizes
/// it over the tile layer.
struct OverlayLayer {
    visible: bool,
    surface: Surface,
    features: Vec<Feature>,
}

impl OverlayLayer {
    fn new(size: (u32, u32)) -> Self {
        Self {
            visible: true,
            surface: Surface::new(size.0, size.1),
            features: Vec::new(),
        }
    }

    fn ensure_size(&mut self, size: (u32, u32)) {
        if (self.surface.width(), self.surface.height()) != size {
            self.surface = Surface::new(size.0, size.1);
        }
    }

    fn render(&mut self, state: &ViewState) {
        self.surface.clear();
        if self.visible {
            rasterize(&self.features, state, &mut self.surface);
        }
    }
}

/// The live map view: view state plus the z-ordered layer stack (tiles
/// below, marker overlay above), each rendering into its own RGBA
/// surface.
///
/// Every view-state mutation bumps a render ticket; a [`RenderOutcome`]
/// is only `complete` for the ticket it was rendered under, so a
/// consumer waiting on a ticket can't be fooled by a completion that
/// belongs to an older state.
pub struct MapView {
    state: ViewState,
    tiles: TileLayer,
    overlay: OverlayLayer,
    ticket: u64,
    dirty: bool,
    last_pass: Option<(u64, bool)>,
}

impl MapView {
    pub fn new(map_px: (u32, u32), source: Arc<dyn TileSource>, size: (u32, u32)) -> Self {
        Self {
            state: ViewState::fit(map_px, size),
            tiles: TileLayer::new(map_px, source, size),
            overlay: OverlayLayer::new(size),
            ticket: 0,
            dirty: true,
            last_pass: None,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    fn touch(&mut self) {
        self.ticket += 1;
        self.dirty = true;
    }

    /// Resize the view surfaces (terminal resize).
    pub fn resize(&mut self, size: (u32, u32)) {
        if self.state.size != size {
            self.state.size = (size.0.max(1), size.1.max(1));
            self.touch();
        }
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.state.pan(dx, dy);
        self.touch();
    }

    pub fn zoom_at(&mut self, sx: f64, sy: f64, factor: f64) {
        self.state.zoom_at(sx, sy, factor);
        self.touch();
    }

    /// Re-center and re-fit to show the whole map.
    pub fn fit(&mut self) {
        self.state = ViewState::fit(
            (self.state.map_size.x as u32, self.state.map_size.y as u32),
            self.state.size,
        );
        self.touch();
    }

    /// Set size, resolution and center directly, bypassing the
    /// interactive zoom bounds. Used by the export procedure.
    pub fn set_view(&mut self, size: (u32, u32), resolution: f64, center: DVec2) {
        self.state.size = size;
        self.state.resolution = resolution;
        self.state.center = center;
        self.touch();
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.state.snapshot()
    }

    pub fn restore(&mut self, snap: &ViewSnapshot) {
        self.state.restore(snap);
        self.touch();
    }

    /// Replace the overlay feature set.
    pub fn set_features(&mut self, features: Vec<Feature>) {
        self.overlay.features = features;
        self.dirty = true;
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay.visible
    }

    pub fn set_overlay_visible(&mut self, visible: bool) {
        if self.overlay.visible != visible {
            self.overlay.visible = visible;
            self.dirty = true;
        }
    }

    pub fn toggle_overlay(&mut self) {
        self.overlay.visible = !self.overlay.visible;
        self.dirty = true;
    }

    /// Drain finished tile loads into the cache. Returns true if
    /// anything arrived (a re-render is then needed).
    pub fn pump(&mut self) -> bool {
        if self.tiles.pump() {
            self.dirty = true;
            true
        } else {
            false
        }
    }

    /// Render both layers if anything changed since the last pass and
    /// report completeness for the current ticket.
    pub fn render(&mut self) -> RenderOutcome {
        if self.dirty {
            self.tiles.ensure_size(self.state.size);
            self.overlay.ensure_size(self.state.size);
            let resident = self.tiles.render(&self.state);
            self.overlay.render(&self.state);
            self.last_pass = Some((self.ticket, resident));
            self.dirty = false;
        }
        let complete = matches!(self.last_pass, Some((t, resident)) if t == self.ticket && resident);
        RenderOutcome {
            ticket: self.ticket,
            complete,
        }
    }

    /// Flatten the currently visible layer surfaces, in z-order, onto a
    /// freshly allocated surface. Hidden layers are skipped.
    pub fn composite(&self) -> Surface {
        let (w, h) = self.state.size;
        let mut out = Surface::new(w, h);
        if self.tiles.visible {
            out.blit_over(self.tiles.surface());
        }
        if self.overlay.visible {
            out.blit_over(&self.overlay.surface);
        }
        out
    }
}
