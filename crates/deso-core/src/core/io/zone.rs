use super::IoError;
use nalgebra::Point2;
use serde_json::Value;
use std::path::Path;

/// Reads the zone geometry file: one centroid per building, joined on the
/// `Name`/`name` attribute. Polygon footprints are reduced to the centroid
/// of their exterior ring.
pub fn read_zone_centroids(path: &Path) -> Result<Vec<(String, Point2<f64>)>, IoError> {
    let text = std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let json: Value = serde_json::from_str(&text).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let features = json
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| IoError::BadValue {
            path: path.to_path_buf(),
            row: 0,
            message: "the zone file is not a GeoJSON FeatureCollection".to_string(),
        })?;

    let mut centroids = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        let properties = feature.get("properties").unwrap_or(&Value::Null);
        let name = properties
            .get("Name")
            .or_else(|| properties.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| IoError::BadValue {
                path: path.to_path_buf(),
                row: index,
                message: "zone feature is missing its 'Name' attribute".to_string(),
            })?;
        let geometry = feature.get("geometry").unwrap_or(&Value::Null);
        let centroid = match geometry.get("type").and_then(Value::as_str) {
            Some("Point") => point(geometry.get("coordinates")),
            Some("Polygon") => geometry
                .get("coordinates")
                .and_then(Value::as_array)
                .and_then(|rings| rings.first())
                .and_then(Value::as_array)
                .and_then(ring_centroid),
            _ => None,
        }
        .ok_or_else(|| IoError::BadValue {
            path: path.to_path_buf(),
            row: index,
            message: format!("building '{name}' has no usable Point or Polygon geometry"),
        })?;
        centroids.push((name.to_string(), centroid));
    }
    Ok(centroids)
}

fn point(value: Option<&Value>) -> Option<Point2<f64>> {
    let coordinates = value?.as_array()?;
    Some(Point2::new(
        coordinates.first()?.as_f64()?,
        coordinates.get(1)?.as_f64()?,
    ))
}

fn ring_centroid(ring: &Vec<Value>) -> Option<Point2<f64>> {
    // the closing vertex repeats the first one
    let vertices: Vec<Point2<f64>> = ring
        .iter()
        .filter_map(|coordinate| point(Some(coordinate)))
        .collect();
    let open = if vertices.len() > 1 && vertices.first() == vertices.last() {
        &vertices[..vertices.len() - 1]
    } else {
        &vertices[..]
    };
    if open.is_empty() {
        return None;
    }
    let x = open.iter().map(|v| v.x).sum::<f64>() / open.len() as f64;
    let y = open.iter().map(|v| v.y).sum::<f64>() / open.len() as f64;
    Some(Point2::new(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_points_and_polygon_centroids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone.geojson");
        let zone = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [10.0, 20.0]},
                    "properties": {"Name": "B1001"}
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]]]
                    },
                    "properties": {"name": "B1002"}
                }
            ]
        });
        std::fs::write(&path, zone.to_string()).unwrap();
        let centroids = read_zone_centroids(&path).unwrap();
        assert_eq!(centroids.len(), 2);
        assert_eq!(centroids[0].0, "B1001");
        assert_eq!(centroids[1].1, Point2::new(1.0, 1.0));
    }
}
