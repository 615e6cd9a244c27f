use super::IoError;
use crate::core::utils::geometry::{SNAP_TOLERANCE_M, distance};
use nalgebra::Point2;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Maximum distance between a consumer node and the centroid of the building
/// it claims to serve, in metres.
pub const FOOTPRINT_TOLERANCE_M: f64 = 30.0;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(
        "The network layout file is not a GeoJSON FeatureCollection.\n\
         Provide a FeatureCollection with Point features for nodes (attributes 'building' and \
         'type') and LineString features for edges (attribute 'type_mat')."
    )]
    NotAFeatureCollection,

    #[error(
        "Feature {feature} of the network layout is missing the required attribute \
         '{attribute}'.\nNodes need 'building' (a building name or NONE) and 'type' \
         (CONSUMER, PLANT or NONE); edges need 'type_mat' (a pipe material code)."
    )]
    MissingAttribute {
        feature: usize,
        attribute: &'static str,
    },

    #[error(
        "Node feature {feature} declares the unknown type '{value}'.\n\
         Valid node types are CONSUMER, PLANT and NONE."
    )]
    InvalidNodeType { feature: usize, value: String },

    #[error(
        "An edge end at ({x:.2}, {y:.2}) does not reach any node; the nearest node is \
         {gap:.2} m away.\nGaps of up to {SNAP_TOLERANCE_M} m are closed automatically. \
         Move the edge end onto a node or place a node at its end."
    )]
    DanglingEdge { x: f64, y: f64, gap: f64 },

    #[error(
        "Network component {component} (containing {members:?}) has no PLANT node.\n\
         Every disconnected part of the network needs exactly one node of type PLANT."
    )]
    NoPlant {
        component: usize,
        members: Vec<String>,
    },

    #[error(
        "Network component {component} has {count} PLANT nodes.\n\
         Every disconnected part of the network needs exactly one node of type PLANT; split the \
         layout or remove the surplus plants."
    )]
    MultiplePlants { component: usize, count: usize },

    #[error(
        "The network layout references the building '{name}' which does not exist in this \
         domain.\nCheck the 'building' attributes of the layout's consumer nodes against the \
         zone file."
    )]
    UnknownBuilding { name: String },

    #[error(
        "The consumer node for building '{name}' lies {gap:.1} m from the building's centroid, \
         beyond the {FOOTPRINT_TOLERANCE_M} m footprint tolerance.\nMove the node onto the \
         building it serves."
    )]
    NodeOutsideBuilding { name: String, gap: f64 },

    #[error(
        "{count} edges end on building '{name}' which has no node.\n\
         A node is only created automatically when exactly one edge unambiguously reaches a \
         building; place the node explicitly."
    )]
    AmbiguousBuildingConnection { name: String, count: usize },

    #[error(
        "The following buildings are designated for district supply but are absent from the \
         network layout: {missing:?}.\nConnect them to a network or change their supply \
         designation to STANDALONE."
    )]
    MissingDistrictBuildings { missing: Vec<String> },

    #[error(
        "The network layout contains consumer nodes for buildings that are not designated for \
         district supply: {names:?}.\nRemove the nodes or designate the buildings accordingly."
    )]
    UnexpectedBuildingNodes { names: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutNodeKind {
    Consumer,
    Plant,
    Junction,
}

#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub position: Point2<f64>,
    pub building: Option<String>,
    pub kind: LayoutNodeKind,
}

#[derive(Debug, Clone)]
pub struct LayoutEdge {
    pub endpoints: (usize, usize),
    pub length_m: f64,
    pub pipe_material: String,
}

/// A validated user-supplied base network layout.
#[derive(Debug, Clone)]
pub struct NetworkLayout {
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
    /// Member buildings per network, keyed by assigned network identifier
    /// ("N1001", "N1002", ...).
    pub networks: BTreeMap<String, Vec<String>>,
}

impl NetworkLayout {
    /// The network each building belongs to, if any.
    pub fn building_networks(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (network, members) in &self.networks {
            for member in members {
                map.insert(member.clone(), network.clone());
            }
        }
        map
    }
}

struct RawNode {
    position: Point2<f64>,
    building: Option<String>,
    kind: LayoutNodeKind,
}

/// Loads and validates a base network layout from a GeoJSON file.
///
/// `buildings` are the domain's building centroids; `district_buildings` the
/// subset designated for district supply in the supply table. All §-errors
/// surface before any optimization work starts.
pub fn load_network_layout(
    path: &Path,
    buildings: &[(String, Point2<f64>)],
    district_buildings: &[String],
) -> Result<NetworkLayout, LayoutError> {
    let text = std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let json: Value = serde_json::from_str(&text).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    parse_layout(&json, buildings, district_buildings)
}

fn parse_layout(
    json: &Value,
    buildings: &[(String, Point2<f64>)],
    district_buildings: &[String],
) -> Result<NetworkLayout, LayoutError> {
    if json.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(LayoutError::NotAFeatureCollection);
    }
    let features = json
        .get("features")
        .and_then(Value::as_array)
        .ok_or(LayoutError::NotAFeatureCollection)?;

    let mut nodes: Vec<RawNode> = Vec::new();
    let mut polylines: Vec<(Vec<Point2<f64>>, String)> = Vec::new();

    for (index, feature) in features.iter().enumerate() {
        let geometry = feature
            .get("geometry")
            .ok_or(LayoutError::NotAFeatureCollection)?;
        let properties = feature.get("properties").unwrap_or(&Value::Null);
        match geometry.get("type").and_then(Value::as_str) {
            Some("Point") => {
                let position = read_point(geometry.get("coordinates"))
                    .ok_or(LayoutError::NotAFeatureCollection)?;
                let building = properties
                    .get("building")
                    .and_then(Value::as_str)
                    .ok_or(LayoutError::MissingAttribute {
                        feature: index,
                        attribute: "building",
                    })?;
                let kind = properties.get("type").and_then(Value::as_str).ok_or(
                    LayoutError::MissingAttribute {
                        feature: index,
                        attribute: "type",
                    },
                )?;
                let kind = match kind {
                    "CONSUMER" => LayoutNodeKind::Consumer,
                    "PLANT" => LayoutNodeKind::Plant,
                    "NONE" => LayoutNodeKind::Junction,
                    other => {
                        return Err(LayoutError::InvalidNodeType {
                            feature: index,
                            value: other.to_string(),
                        });
                    }
                };
                let building = match building {
                    "NONE" | "" => None,
                    name => Some(name.to_string()),
                };
                // Nodes within snapping distance of an earlier node collapse
                // onto it.
                if let Some(existing) = nodes
                    .iter_mut()
                    .find(|n| distance(&n.position, &position) <= SNAP_TOLERANCE_M)
                {
                    if existing.building.is_none() {
                        existing.building = building;
                    }
                    if existing.kind == LayoutNodeKind::Junction {
                        existing.kind = kind;
                    }
                } else {
                    nodes.push(RawNode {
                        position,
                        building,
                        kind,
                    });
                }
            }
            Some("LineString") => {
                let coordinates = geometry
                    .get("coordinates")
                    .and_then(Value::as_array)
                    .ok_or(LayoutError::NotAFeatureCollection)?;
                let mut polyline = Vec::with_capacity(coordinates.len());
                for coordinate in coordinates {
                    polyline.push(
                        read_point(Some(coordinate)).ok_or(LayoutError::NotAFeatureCollection)?,
                    );
                }
                let material = properties
                    .get("type_mat")
                    .and_then(Value::as_str)
                    .ok_or(LayoutError::MissingAttribute {
                        feature: index,
                        attribute: "type_mat",
                    })?;
                polylines.push((polyline, material.to_string()));
            }
            _ => return Err(LayoutError::NotAFeatureCollection),
        }
    }

    let edges = bind_edges(&mut nodes, &polylines, buildings)?;
    validate_and_assemble(nodes, edges, buildings, district_buildings)
}

fn read_point(value: Option<&Value>) -> Option<Point2<f64>> {
    let coordinates = value?.as_array()?;
    Some(Point2::new(
        coordinates.first()?.as_f64()?,
        coordinates.get(1)?.as_f64()?,
    ))
}

/// Snaps edge ends onto nodes, auto-creating a consumer node when exactly
/// one edge unambiguously reaches a node-less building.
fn bind_edges(
    nodes: &mut Vec<RawNode>,
    polylines: &[(Vec<Point2<f64>>, String)],
    buildings: &[(String, Point2<f64>)],
) -> Result<Vec<LayoutEdge>, LayoutError> {
    // endpoints that reach a node-less building, bucketed by building name
    let mut pending: BTreeMap<String, Vec<Point2<f64>>> = BTreeMap::new();
    for (polyline, _) in polylines {
        for end in [polyline.first(), polyline.last()].into_iter().flatten() {
            let nearest_gap = nodes
                .iter()
                .map(|n| distance(&n.position, end))
                .fold(f64::INFINITY, f64::min);
            if nearest_gap <= SNAP_TOLERANCE_M {
                continue;
            }
            if let Some((name, _)) = buildings
                .iter()
                .find(|(_, centroid)| distance(centroid, end) <= SNAP_TOLERANCE_M)
            {
                pending.entry(name.clone()).or_default().push(*end);
            }
        }
    }
    for (name, ends) in pending {
        if ends.len() != 1 {
            return Err(LayoutError::AmbiguousBuildingConnection {
                name,
                count: ends.len(),
            });
        }
        nodes.push(RawNode {
            position: ends[0],
            building: Some(name),
            kind: LayoutNodeKind::Consumer,
        });
    }

    let mut edges = Vec::with_capacity(polylines.len());
    for (polyline, material) in polylines {
        let mut endpoint_indexes = [0usize; 2];
        for (slot, end) in [polyline.first(), polyline.last()].into_iter().enumerate() {
            let end = end.expect("polylines carry at least one coordinate");
            let Some((index, gap)) = nodes
                .iter()
                .enumerate()
                .map(|(i, n)| (i, distance(&n.position, end)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
            else {
                return Err(LayoutError::DanglingEdge {
                    x: end.x,
                    y: end.y,
                    gap: f64::INFINITY,
                });
            };
            if gap > SNAP_TOLERANCE_M {
                return Err(LayoutError::DanglingEdge {
                    x: end.x,
                    y: end.y,
                    gap,
                });
            }
            endpoint_indexes[slot] = index;
        }
        edges.push(LayoutEdge {
            endpoints: (endpoint_indexes[0], endpoint_indexes[1]),
            length_m: crate::core::utils::geometry::polyline_length(polyline),
            pipe_material: material.clone(),
        });
    }
    Ok(edges)
}

fn validate_and_assemble(
    raw_nodes: Vec<RawNode>,
    edges: Vec<LayoutEdge>,
    buildings: &[(String, Point2<f64>)],
    district_buildings: &[String],
) -> Result<NetworkLayout, LayoutError> {
    // consumer nodes must sit on known buildings
    for node in &raw_nodes {
        if let Some(name) = &node.building {
            let Some((_, centroid)) = buildings.iter().find(|(id, _)| id == name) else {
                return Err(LayoutError::UnknownBuilding { name: name.clone() });
            };
            let gap = distance(centroid, &node.position);
            if gap > FOOTPRINT_TOLERANCE_M {
                return Err(LayoutError::NodeOutsideBuilding {
                    name: name.clone(),
                    gap,
                });
            }
        }
    }

    // connected components via breadth-first traversal
    let mut adjacency = vec![Vec::new(); raw_nodes.len()];
    for edge in &edges {
        adjacency[edge.endpoints.0].push(edge.endpoints.1);
        adjacency[edge.endpoints.1].push(edge.endpoints.0);
    }
    let mut component_of = vec![usize::MAX; raw_nodes.len()];
    let mut component_count = 0;
    for start in 0..raw_nodes.len() {
        if component_of[start] != usize::MAX {
            continue;
        }
        let mut queue = vec![start];
        component_of[start] = component_count;
        while let Some(node) = queue.pop() {
            for &neighbor in &adjacency[node] {
                if component_of[neighbor] == usize::MAX {
                    component_of[neighbor] = component_count;
                    queue.push(neighbor);
                }
            }
        }
        component_count += 1;
    }

    // exactly one plant per component
    let mut members_by_component: Vec<Vec<String>> = vec![Vec::new(); component_count];
    let mut plants_by_component = vec![0usize; component_count];
    for (index, node) in raw_nodes.iter().enumerate() {
        let component = component_of[index];
        if node.kind == LayoutNodeKind::Plant {
            plants_by_component[component] += 1;
        }
        if let Some(name) = &node.building {
            if node.kind == LayoutNodeKind::Consumer {
                members_by_component[component].push(name.clone());
            }
        }
    }
    for (component, members) in members_by_component.iter().enumerate() {
        if members.is_empty() {
            continue;
        }
        match plants_by_component[component] {
            0 => {
                return Err(LayoutError::NoPlant {
                    component,
                    members: members.clone(),
                });
            }
            1 => {}
            count => return Err(LayoutError::MultiplePlants { component, count }),
        }
    }

    // designated buildings must all be present, and no others
    let connected: Vec<String> = members_by_component.iter().flatten().cloned().collect();
    let missing: Vec<String> = district_buildings
        .iter()
        .filter(|name| !connected.contains(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(LayoutError::MissingDistrictBuildings { missing });
    }
    let unexpected: Vec<String> = connected
        .iter()
        .filter(|name| !district_buildings.contains(name))
        .cloned()
        .collect();
    if !unexpected.is_empty() {
        return Err(LayoutError::UnexpectedBuildingNodes { names: unexpected });
    }

    // assign network identifiers by smallest member name for stable output
    let mut components: Vec<Vec<String>> = members_by_component
        .into_iter()
        .filter(|members| !members.is_empty())
        .map(|mut members| {
            members.sort();
            members
        })
        .collect();
    components.sort();
    let networks = components
        .into_iter()
        .enumerate()
        .map(|(i, members)| (format!("N{}", 1001 + i), members))
        .collect();

    Ok(NetworkLayout {
        nodes: raw_nodes
            .into_iter()
            .map(|n| LayoutNode {
                position: n.position,
                building: n.building,
                kind: n.kind,
            })
            .collect(),
        edges,
        networks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(x: f64, y: f64, building: &str, kind: &str) -> Value {
        json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [x, y]},
            "properties": {"building": building, "type": kind}
        })
    }

    fn edge(ends: [[f64; 2]; 2]) -> Value {
        json!({
            "type": "Feature",
            "geometry": {"type": "LineString", "coordinates": ends},
            "properties": {"type_mat": "DN100"}
        })
    }

    fn two_building_layout() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                node(0.0, 0.0, "B1001", "CONSUMER"),
                node(100.0, 0.0, "B1002", "CONSUMER"),
                node(50.0, 0.0, "NONE", "PLANT"),
                edge([[0.0, 0.0], [50.0, 0.0]]),
                edge([[50.0, 0.04], [100.0, 0.0]]),
            ]
        })
    }

    fn domain() -> Vec<(String, Point2<f64>)> {
        vec![
            ("B1001".to_string(), Point2::new(0.0, 0.0)),
            ("B1002".to_string(), Point2::new(100.0, 0.0)),
        ]
    }

    #[test]
    fn valid_layout_loads_and_snaps_small_gaps() {
        let layout = parse_layout(
            &two_building_layout(),
            &domain(),
            &["B1001".to_string(), "B1002".to_string()],
        )
        .unwrap();
        assert_eq!(layout.networks.len(), 1);
        assert_eq!(
            layout.networks["N1001"],
            vec!["B1001".to_string(), "B1002".to_string()]
        );
    }

    #[test]
    fn missing_plant_is_a_configuration_error() {
        let layout = json!({
            "type": "FeatureCollection",
            "features": [
                node(0.0, 0.0, "B1001", "CONSUMER"),
                node(100.0, 0.0, "B1002", "CONSUMER"),
                edge([[0.0, 0.0], [100.0, 0.0]]),
            ]
        });
        let result = parse_layout(
            &layout,
            &domain(),
            &["B1001".to_string(), "B1002".to_string()],
        );
        assert!(matches!(result, Err(LayoutError::NoPlant { .. })));
    }

    #[test]
    fn gaps_beyond_tolerance_are_reported() {
        let layout = json!({
            "type": "FeatureCollection",
            "features": [
                node(0.0, 0.0, "B1001", "CONSUMER"),
                node(100.0, 0.0, "B1002", "PLANT"),
                edge([[0.0, 1.5], [100.0, 0.0]]),
            ]
        });
        let result = parse_layout(&layout, &domain(), &["B1001".to_string()]);
        assert!(matches!(result, Err(LayoutError::DanglingEdge { .. })));
    }

    #[test]
    fn designated_buildings_must_be_connected() {
        let result = parse_layout(
            &two_building_layout(),
            &domain(),
            &["B1001".to_string(), "B1002".to_string(), "B1003".to_string()],
        );
        assert!(matches!(
            result,
            Err(LayoutError::MissingDistrictBuildings { .. })
        ));
    }

    #[test]
    fn undesignated_building_nodes_are_rejected() {
        let result = parse_layout(&two_building_layout(), &domain(), &["B1001".to_string()]);
        assert!(matches!(
            result,
            Err(LayoutError::UnexpectedBuildingNodes { .. })
        ));
    }
}
