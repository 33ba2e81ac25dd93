use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinate {
            latitude,
            longitude,
        }
    }
}

/// A resolved destination. Produced once per search.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub coordinate: Coordinate,
    pub label: String,
}

/// A notable location near a destination, hydrated with its summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub title: String,
    pub extract: String,
    pub url: String,
    pub image: Option<String>,
    pub coordinate: Coordinate,
}

/// Axis-aligned box around a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: Coordinate,
    pub north_east: Coordinate,
}

impl Bounds {
    /// Smallest box containing every place, or `None` for an empty slice.
    pub fn around(places: &[Place]) -> Option<Bounds> {
        let first = places.first()?.coordinate;
        let mut bounds = Bounds {
            south_west: first,
            north_east: first,
        };
        for place in &places[1..] {
            let c = place.coordinate;
            bounds.south_west.latitude = bounds.south_west.latitude.min(c.latitude);
            bounds.south_west.longitude = bounds.south_west.longitude.min(c.longitude);
            bounds.north_east.latitude = bounds.north_east.latitude.max(c.latitude);
            bounds.north_east.longitude = bounds.north_east.longitude.max(c.longitude);
        }
        Some(bounds)
    }

    /// Grows the box by `ratio` of its height and width on every side.
    pub fn pad(self, ratio: f64) -> Bounds {
        let lat_pad = (self.north_east.latitude - self.south_west.latitude).abs() * ratio;
        let lon_pad = (self.north_east.longitude - self.south_west.longitude).abs() * ratio;
        Bounds {
            south_west: Coordinate::new(
                self.south_west.latitude - lat_pad,
                self.south_west.longitude - lon_pad,
            ),
            north_east: Coordinate::new(
                self.north_east.latitude + lat_pad,
                self.north_east.longitude + lon_pad,
            ),
        }
    }
}
