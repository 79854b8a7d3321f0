use glam::DVec2;

use crate::data::{Location, LocationRegistry};

/// Click tolerance in map units. Deliberately independent of zoom:
/// markable locations sit on a fixed pixel grid, so the catch area
/// stays constant relative to the map content.
pub const HIT_TOLERANCE: f64 = 32.0;

/// Find the location nearest to a click, in map space, within
/// [`HIT_TOLERANCE`]. Ties are broken by registry order: the scan uses
/// a strict comparison, so the first-loaded of two equidistant
/// candidates wins.
pub fn locate<'a>(click: DVec2, registry: &'a LocationRegistry) -> Option<&'a Location> {
    let mut best: Option<&Location> = None;
    let mut best_dist = HIT_TOLERANCE;

    for location in registry.iter() {
        let dist = click.distance(location.map_position());
        if dist < best_dist {
            best_dist = dist;
            best = Some(location);
        }
    }

    best
}
