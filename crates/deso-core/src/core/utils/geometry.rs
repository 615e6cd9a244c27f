use nalgebra::Point2;

/// Spatial tolerance for identifying coincident nodes, in metres.
///
/// Coordinates are keyed on a millimetre grid; anything closer than this is
/// the same physical location.
pub const COORD_TOLERANCE_M: f64 = 0.001;

/// Gap up to which network geometry is auto-snapped onto nearby nodes, in
/// metres.
pub const SNAP_TOLERANCE_M: f64 = 0.1;

/// A point identity usable as a map key across independently constructed
/// graphs: the coordinates rounded onto the millimetre grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridKey(pub i64, pub i64);

impl GridKey {
    pub fn from_point(point: &Point2<f64>) -> Self {
        Self(
            (point.x / COORD_TOLERANCE_M).round() as i64,
            (point.y / COORD_TOLERANCE_M).round() as i64,
        )
    }

    pub fn to_point(self) -> Point2<f64> {
        Point2::new(
            self.0 as f64 * COORD_TOLERANCE_M,
            self.1 as f64 * COORD_TOLERANCE_M,
        )
    }
}

pub fn distance(a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    nalgebra::distance(a, b)
}

/// Length of a polyline in metres.
pub fn polyline_length(points: &[Point2<f64>]) -> f64 {
    points.windows(2).map(|w| distance(&w[0], &w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_keys_identify_near_coincident_points() {
        let a = Point2::new(100.0001, 50.0);
        let b = Point2::new(100.0004, 50.0);
        let c = Point2::new(100.01, 50.0);
        assert_eq!(GridKey::from_point(&a), GridKey::from_point(&b));
        assert_ne!(GridKey::from_point(&a), GridKey::from_point(&c));
    }

    #[test]
    fn polyline_length_sums_segments() {
        let line = [
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 0.0),
            Point2::new(3.0, 4.0),
        ];
        assert!((polyline_length(&line) - 7.0).abs() < 1e-12);
    }
}
