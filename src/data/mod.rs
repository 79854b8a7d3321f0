use glam::DVec2;
use serde::Deserialize;

/// One location record as served by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationRecord {
    /// Position on the full map image, in pixels (y grows downward).
    pub pixel_coords: [f64; 2],
    /// Axial hex coordinates; joined into the canonical key.
    pub hex_coords: [i64; 2],
}

/// Join a hex coordinate pair into its canonical string key.
pub fn canonical_key(hex: [i64; 2]) -> String {
    format!("{},{}", hex[0], hex[1])
}

/// A predefined markable point on the map.
#[derive(Debug, Clone)]
pub struct Location {
    /// Canonical `"q,r"` key, unique within the registry.
    pub key: String,
    /// Pixel position on the full map image.
    pub pixel: DVec2,
}

impl Location {
    /// Position in map space (pixel space with the Y axis negated).
    pub fn map_position(&self) -> DVec2 {
        DVec2::new(self.pixel.x, -self.pixel.y)
    }
}

/// Immutable, ordered set of markable locations. Populated once at
/// startup and never mutated afterwards.
#[derive(Default)]
pub struct LocationRegistry {
    locations: Vec<Location>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from backend records, preserving order.
    /// Duplicate keys are dropped (first record wins) with a warning.
    pub fn from_records(records: Vec<LocationRecord>) -> Self {
        let mut locations: Vec<Location> = Vec::with_capacity(records.len());
        for record in records {
            let key = canonical_key(record.hex_coords);
            if locations.iter().any(|l| l.key == key) {
                log::warn!("duplicate location key {key} ignored");
                continue;
            }
            locations.push(Location {
                key,
                pixel: DVec2::new(record.pixel_coords[0], record.pixel_coords[1]),
            });
        }
        Self { locations }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(px: f64, py: f64, q: i64, r: i64) -> LocationRecord {
        LocationRecord {
            pixel_coords: [px, py],
            hex_coords: [q, r],
        }
    }

    #[test]
    fn test_canonical_key_join() {
        assert_eq!(canonical_key([3, -4]), "3,-4");
        assert_eq!(canonical_key([0, 0]), "0,0");
    }

    #[test]
    fn test_registry_preserves_order() {
        let reg = LocationRegistry::from_records(vec![
            record(10.0, 20.0, 0, 0),
            record(30.0, 40.0, 1, 0),
        ]);
        let keys: Vec<_> = reg.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, ["0,0", "1,0"]);
    }

    #[test]
    fn test_duplicate_key_first_wins() {
        let reg = LocationRegistry::from_records(vec![
            record(10.0, 20.0, 5, 5),
            record(99.0, 99.0, 5, 5),
        ]);
        assert_eq!(reg.len(), 1);
        let only = reg.iter().next().unwrap();
        assert_eq!(only.pixel.x, 10.0);
    }

    #[test]
    fn test_map_position_flips_y() {
        let loc = Location {
            key: "0,0".into(),
            pixel: DVec2::new(100.0, 250.0),
        };
        assert_eq!(loc.map_position(), DVec2::new(100.0, -250.0));
    }

    #[test]
    fn test_record_parses_from_json() {
        let raw = br#"[{"pixel_coords": [512.5, 300.0], "hex_coords": [-2, 7]}]"#;
        let records: Vec<LocationRecord> = serde_json::from_slice(raw).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pixel_coords, [512.5, 300.0]);
        assert_eq!(canonical_key(records[0].hex_coords), "-2,7");
    }
}
