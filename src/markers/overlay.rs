use glam::DVec2;

use crate::data::LocationRegistry;
use crate::markers::icon::{self, IconGlyph, MarkerKind, MarkerTypeMode, HEX_STROKE};
use crate::markers::store::MarkerStore;
use crate::view::surface::Surface;
use crate::view::ViewState;

/// Per-map icon base sizes, in logical map units. The hexagon size is
/// a static per-map constant; the circle size is shared.
#[derive(Clone, Copy, Debug)]
pub struct IconSizes {
    pub circle: f64,
    pub hex: f64,
}

/// One renderable marker icon, positioned in map space.
#[derive(Clone, Debug)]
pub struct Feature {
    pub position: DVec2,
    pub glyph: IconGlyph,
    /// Display scale = base size / view resolution. This is the
    /// on-screen radius in pixels; it shrinks as resolution grows.
    pub scale: f64,
}

/// Rebuild the full feature set from scratch. No diffing: the set is
/// small (tens to low hundreds of locations) and a full rebuild stays
/// correct under arbitrary interleavings of toggles, mode switches and
/// zoom changes. In `Both` mode the circle is emitted first so the
/// hexagon outline draws on top of it.
pub fn rebuild(
    registry: &LocationRegistry,
    store: &MarkerStore,
    mode: MarkerTypeMode,
    sizes: IconSizes,
    resolution: f64,
) -> Vec<Feature> {
    let mut features = Vec::new();

    for location in registry.iter() {
        let Some(color) = store.color_of(&location.key) else {
            continue;
        };
        let position = location.map_position();

        if matches!(mode, MarkerTypeMode::Circle | MarkerTypeMode::Both) {
            let glyph = icon::icon(color, MarkerKind::Circle, sizes.circle);
            features.push(Feature {
                position,
                glyph,
                scale: sizes.circle / resolution,
            });
        }
        if matches!(mode, MarkerTypeMode::Hex | MarkerTypeMode::Both) {
            let glyph = icon::icon(color, MarkerKind::Hex, sizes.hex);
            features.push(Feature {
                position,
                glyph,
                scale: sizes.hex / resolution,
            });
        }
    }

    features
}

/// Draw a feature set onto a layer surface for the given view state.
pub fn rasterize(features: &[Feature], state: &ViewState, surface: &mut Surface) {
    for feature in features {
        let (sx, sy) = state.map_to_surface(feature.position);
        let radius = feature.scale;

        // cull icons fully outside the surface
        if sx + radius < 0.0
            || sy + radius < 0.0
            || sx - radius > surface.width() as f64
            || sy - radius > surface.height() as f64
        {
            continue;
        }

        let cx = sx.round() as i64;
        let cy = sy.round() as i64;
        let r = radius.round().max(1.0) as i64;

        match feature.glyph.kind {
            MarkerKind::Circle => surface.fill_circle(cx, cy, r, feature.glyph.color),
            MarkerKind::Hex => {
                let stroke = (HEX_STROKE * feature.scale / feature.glyph.size)
                    .round()
                    .max(1.0) as i64;
                surface.stroke_hexagon(cx, cy, r, stroke, feature.glyph.color);
            }
        }
    }
}
