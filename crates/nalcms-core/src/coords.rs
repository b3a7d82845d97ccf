/// Geographic coordinates and target-grid cell addressing.
/// All coordinate math uses f64.

/// A point in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Squared separation in degree space. Only meaningful for ranking nearby
    /// points, which is all the nearest-mass-point search needs.
    pub fn dist2(self, other: LatLon) -> f64 {
        (self.lat - other.lat).powi(2) + (self.lon - other.lon).powi(2)
    }
}

/// A target grid cell addressed by (j, i) = (south→north row, west→east column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellIndex {
    pub j: usize,
    pub i: usize,
}

impl CellIndex {
    pub fn new(j: usize, i: usize) -> Self {
        Self { j, i }
    }

    /// Grid-index positions of the four corners spanning `extent` cells, in
    /// bottom-left, bottom-right, top-right, top-left order.
    pub fn corner_indices(self, extent: usize) -> [(usize, usize); 4] {
        let (j, i, e) = (self.j, self.i, extent);
        [(j, i), (j, i + e), (j + e, i + e), (j + e, i)]
    }
}
