use crate::core::models::flows::{EnergyFlow, Placement};
use crate::core::technologies::component::annualized_investment;
use crate::core::utils::geometry::{GridKey, distance};
use crate::engine::error::EngineError;
use nalgebra::Point2;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Unit cost of buried pipe, per trench metre.
pub const PIPE_UNIT_COST_USD_PER_M: f64 = 460.0;
/// Depreciation period of network piping.
pub const PIPE_LIFETIME_YEARS: f64 = 40.0;
/// Distribution heat loss per trench metre.
pub const HEAT_LOSS_W_PER_M: f64 = 30.0;

/// Role of a node within one candidate network.
///
/// A substrate node that merely routes a network's pipes without being served
/// by it appears as a junction; the same location can be a building node in
/// another network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Building(String),
    Junction,
}

#[derive(Debug, Clone)]
pub struct NetNode {
    pub key: GridKey,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct PipeSegment {
    pub length_m: f64,
}

pub type NetworkGraph = UnGraph<NetNode, PipeSegment>;

pub fn network_identifier(index: u16) -> String {
    format!("N{}", 1000 + index)
}

/// The one full-domain network substrate: a minimum spanning tree over all
/// building centroids, computed once per domain and shared by every
/// candidate network and by the geographic clustering.
#[derive(Debug, Clone)]
pub struct SubstrateGraph {
    graph: NetworkGraph,
    node_of_building: BTreeMap<String, NodeIndex>,
}

impl SubstrateGraph {
    /// Builds the condensed domain graph from the building centroids.
    pub fn generate_condensed_graph(buildings: &[(String, Point2<f64>)]) -> Self {
        let mut graph: NetworkGraph = UnGraph::default();
        let mut node_of_building = BTreeMap::new();
        for (identifier, position) in buildings {
            let index = graph.add_node(NetNode {
                key: GridKey::from_point(position),
                kind: NodeKind::Building(identifier.clone()),
            });
            node_of_building.insert(identifier.clone(), index);
        }

        // Prim's algorithm over the complete distance graph; the tree is the
        // routing substrate for every candidate network.
        let n = buildings.len();
        if n > 1 {
            let mut in_tree = vec![false; n];
            let mut best_distance = vec![f64::INFINITY; n];
            let mut best_parent = vec![0usize; n];
            in_tree[0] = true;
            for other in 1..n {
                best_distance[other] = distance(&buildings[0].1, &buildings[other].1);
            }
            for _ in 1..n {
                let Some(next) = (0..n)
                    .filter(|&i| !in_tree[i])
                    .min_by(|&a, &b| best_distance[a].total_cmp(&best_distance[b]))
                else {
                    break;
                };
                in_tree[next] = true;
                graph.add_edge(
                    node_of_building[&buildings[best_parent[next]].0],
                    node_of_building[&buildings[next].0],
                    PipeSegment {
                        length_m: best_distance[next],
                    },
                );
                for other in 0..n {
                    if in_tree[other] {
                        continue;
                    }
                    let d = distance(&buildings[next].1, &buildings[other].1);
                    if d < best_distance[other] {
                        best_distance[other] = d;
                        best_parent[other] = next;
                    }
                }
            }
        }

        Self {
            graph,
            node_of_building,
        }
    }

    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    pub fn node_of_building(&self, building: &str) -> Option<NodeIndex> {
        self.node_of_building.get(building).copied()
    }

    /// The unique tree path between two buildings, as substrate node
    /// indexes.
    fn path_between(&self, from: NodeIndex, to: NodeIndex) -> Vec<NodeIndex> {
        let mut predecessor: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
        let mut queue = VecDeque::from([from]);
        let mut seen = BTreeSet::from([from]);
        while let Some(node) = queue.pop_front() {
            if node == to {
                break;
            }
            for neighbor in self.graph.neighbors(node) {
                if seen.insert(neighbor) {
                    predecessor.insert(neighbor, node);
                    queue.push_back(neighbor);
                }
            }
        }
        let mut path = vec![to];
        let mut current = to;
        while current != from {
            match predecessor.get(&current) {
                Some(&previous) => {
                    path.push(previous);
                    current = previous;
                }
                None => return Vec::new(),
            }
        }
        path.reverse();
        path
    }
}

/// One candidate thermal network: the subgraph of the substrate spanning the
/// buildings assigned to one connectivity value.
#[derive(Debug, Clone)]
pub struct Network {
    pub identifier: String,
    pub graph: NetworkGraph,
    pub member_buildings: Vec<String>,
}

impl Network {
    /// Extracts the network with the given connectivity value from the
    /// substrate: the union of the substrate paths from the first member to
    /// every other member (the spanning subtree of the member set).
    ///
    /// Substrate buildings the pipes merely pass through become junction
    /// nodes.
    pub fn build_network(
        network_index: u16,
        ordered_building_ids: &[String],
        connections: &[u16],
        substrate: &SubstrateGraph,
    ) -> Result<Network, EngineError> {
        let members: Vec<&String> = ordered_building_ids
            .iter()
            .zip(connections)
            .filter(|&(_, &value)| value == network_index)
            .map(|(id, _)| id)
            .collect();
        if members.len() < 2 {
            return Err(EngineError::Connectivity(format!(
                "network {} would serve {} building(s); a network needs at least two",
                network_identifier(network_index),
                members.len()
            )));
        }
        let member_set: BTreeSet<&str> = members.iter().map(|s| s.as_str()).collect();

        let mut substrate_nodes: BTreeSet<NodeIndex> = BTreeSet::new();
        let first = substrate.node_of_building(members[0]).ok_or_else(|| {
            EngineError::Connectivity(format!("building '{}' is not in the domain", members[0]))
        })?;
        for member in &members[1..] {
            let to = substrate.node_of_building(member).ok_or_else(|| {
                EngineError::Connectivity(format!("building '{member}' is not in the domain"))
            })?;
            substrate_nodes.extend(substrate.path_between(first, to));
        }
        substrate_nodes.insert(first);

        let mut graph: NetworkGraph = UnGraph::default();
        let mut local_of_substrate: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
        for &substrate_index in &substrate_nodes {
            let node = &substrate.graph()[substrate_index];
            let kind = match &node.kind {
                NodeKind::Building(id) if member_set.contains(id.as_str()) => {
                    NodeKind::Building(id.clone())
                }
                _ => NodeKind::Junction,
            };
            let local = graph.add_node(NetNode {
                key: node.key,
                kind,
            });
            local_of_substrate.insert(substrate_index, local);
        }
        for edge in substrate.graph().edge_references() {
            if let (Some(&a), Some(&b)) = (
                local_of_substrate.get(&edge.source()),
                local_of_substrate.get(&edge.target()),
            ) {
                graph.add_edge(
                    a,
                    b,
                    PipeSegment {
                        length_m: edge.weight().length_m,
                    },
                );
            }
        }

        Ok(Network {
            identifier: network_identifier(network_index),
            graph,
            member_buildings: members.into_iter().cloned().collect(),
        })
    }

    /// Rebuilds the derived member list from the graph's building nodes.
    fn refresh_members(&mut self) {
        self.member_buildings = self
            .graph
            .node_weights()
            .filter_map(|node| match &node.kind {
                NodeKind::Building(id) => Some(id.clone()),
                NodeKind::Junction => None,
            })
            .collect();
        self.member_buildings.sort();
    }

    pub fn node_keys(&self) -> BTreeSet<GridKey> {
        self.graph.node_weights().map(|node| node.key).collect()
    }

    pub fn total_pipe_length_m(&self) -> f64 {
        self.graph
            .edge_weights()
            .map(|segment| segment.length_m)
            .sum()
    }

    /// Annualized investment into the network's piping.
    pub fn annual_piping_cost_usd(&self, interest_rate: f64) -> f64 {
        annualized_investment(
            self.total_pipe_length_m() * PIPE_UNIT_COST_USD_PER_M,
            interest_rate,
            PIPE_LIFETIME_YEARS,
        )
    }

    /// Constant distribution-loss flow the supply system has to cover on top
    /// of the aggregated building demand.
    pub fn thermal_loss_flow(&self, carrier: &str) -> EnergyFlow {
        EnergyFlow::constant(
            Placement::Primary,
            Placement::Consumer,
            carrier,
            self.total_pipe_length_m() * HEAT_LOSS_W_PER_M / 1000.0,
        )
    }

    /// Pairwise spatial overlap between candidate networks: for every
    /// network, the nodes it shares with each other network.
    pub fn identify_overlapping_networks(
        networks: &BTreeMap<u16, Network>,
    ) -> BTreeMap<u16, BTreeMap<u16, Vec<GridKey>>> {
        let keys: BTreeMap<u16, BTreeSet<GridKey>> = networks
            .iter()
            .map(|(&id, network)| (id, network.node_keys()))
            .collect();
        let mut overlaps: BTreeMap<u16, BTreeMap<u16, Vec<GridKey>>> = BTreeMap::new();
        let ids: Vec<u16> = networks.keys().copied().collect();
        for (position, &a) in ids.iter().enumerate() {
            for &b in &ids[position + 1..] {
                let shared: Vec<GridKey> = keys[&a].intersection(&keys[&b]).copied().collect();
                if shared.is_empty() {
                    continue;
                }
                overlaps.entry(a).or_default().insert(b, shared.clone());
                overlaps.entry(b).or_default().insert(a, shared);
            }
        }
        overlaps
    }

    /// Folds the listed networks into the retained one; shared locations are
    /// deduplicated and serve both sets of members afterwards.
    pub fn merge_networks(networks: &mut BTreeMap<u16, Network>, retain: u16, merge: &[u16]) {
        let Some(mut retained) = networks.remove(&retain) else {
            return;
        };
        for id in merge {
            let Some(other) = networks.remove(id) else {
                continue;
            };
            let mut local_of_key: BTreeMap<GridKey, NodeIndex> = retained
                .graph
                .node_indices()
                .map(|i| (retained.graph[i].key, i))
                .collect();
            let mut local_of_other: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
            for index in other.graph.node_indices() {
                let node = &other.graph[index];
                let local = match local_of_key.get(&node.key) {
                    Some(&existing) => {
                        // a junction of one network can be a served building
                        // of the other
                        if let (NodeKind::Junction, NodeKind::Building(_)) =
                            (&retained.graph[existing].kind, &node.kind)
                        {
                            retained.graph[existing].kind = node.kind.clone();
                        }
                        existing
                    }
                    None => {
                        let added = retained.graph.add_node(node.clone());
                        local_of_key.insert(node.key, added);
                        added
                    }
                };
                local_of_other.insert(index, local);
            }
            for edge in other.graph.edge_references() {
                let a = local_of_other[&edge.source()];
                let b = local_of_other[&edge.target()];
                if retained.graph.find_edge(a, b).is_none() {
                    retained.graph.add_edge(
                        a,
                        b,
                        PipeSegment {
                            length_m: edge.weight().length_m,
                        },
                    );
                }
            }
        }
        retained.refresh_members();
        networks.insert(retain, retained);
    }

    /// Removes the overlapping nodes from every network overlapping the
    /// retained one, then reduces each cut network to the connected part
    /// serving the most buildings.
    pub fn cut_networks_on_overlap(
        networks: &mut BTreeMap<u16, Network>,
        overlaps_of_retained: &BTreeMap<u16, Vec<GridKey>>,
        retain: u16,
    ) {
        for (&other_id, shared) in overlaps_of_retained {
            if other_id == retain {
                continue;
            }
            let Some(network) = networks.get_mut(&other_id) else {
                continue;
            };
            let shared: BTreeSet<GridKey> = shared.iter().copied().collect();
            network
                .graph
                .retain_nodes(|graph, index| !shared.contains(&graph[index].key));
            if let Some(kept) = largest_component_by_members(&network.graph) {
                network.graph = kept;
                network.refresh_members();
            } else {
                networks.remove(&other_id);
            }
        }
    }

    /// Drops the listed networks entirely; their buildings fall back to
    /// stand-alone supply.
    pub fn delete_networks(networks: &mut BTreeMap<u16, Network>, delete: &[u16]) {
        for id in delete {
            networks.remove(id);
        }
    }

    /// The networks' building memberships, for rebuilding a connectivity
    /// vector after overlap correction.
    pub fn building_assignments(networks: &BTreeMap<u16, Network>) -> BTreeMap<String, u16> {
        let mut assignments = BTreeMap::new();
        for (&id, network) in networks {
            for member in &network.member_buildings {
                assignments.insert(member.clone(), id);
            }
        }
        assignments
    }
}

/// The connected component holding the most building nodes, if any building
/// node is left.
fn largest_component_by_members(graph: &NetworkGraph) -> Option<NetworkGraph> {
    let mut assigned: BTreeMap<NodeIndex, usize> = BTreeMap::new();
    let mut component_count = 0;
    for start in graph.node_indices() {
        if assigned.contains_key(&start) {
            continue;
        }
        let mut queue = VecDeque::from([start]);
        assigned.insert(start, component_count);
        while let Some(node) = queue.pop_front() {
            for neighbor in graph.neighbors(node) {
                if !assigned.contains_key(&neighbor) {
                    assigned.insert(neighbor, component_count);
                    queue.push_back(neighbor);
                }
            }
        }
        component_count += 1;
    }
    let mut members_per_component = vec![0usize; component_count];
    for (&index, &component) in &assigned {
        if matches!(graph[index].kind, NodeKind::Building(_)) {
            members_per_component[component] += 1;
        }
    }
    let (best, &count) = members_per_component
        .iter()
        .enumerate()
        .max_by_key(|&(_, &count)| count)?;
    if count == 0 {
        return None;
    }
    let mut kept: NetworkGraph = UnGraph::default();
    let mut local: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
    for index in graph.node_indices() {
        if assigned[&index] == best {
            local.insert(index, kept.add_node(graph[index].clone()));
        }
    }
    for edge in graph.edge_references() {
        if let (Some(&a), Some(&b)) = (local.get(&edge.source()), local.get(&edge.target())) {
            kept.add_edge(
                a,
                b,
                PipeSegment {
                    length_m: edge.weight().length_m,
                },
            );
        }
    }
    Some(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_domain() -> Vec<(String, Point2<f64>)> {
        vec![
            ("B1001".to_string(), Point2::new(0.0, 0.0)),
            ("B1002".to_string(), Point2::new(100.0, 0.0)),
            ("B1003".to_string(), Point2::new(200.0, 0.0)),
            ("B1004".to_string(), Point2::new(300.0, 0.0)),
        ]
    }

    fn ids(domain: &[(String, Point2<f64>)]) -> Vec<String> {
        domain.iter().map(|(id, _)| id.clone()).collect()
    }

    #[test]
    fn condensed_graph_is_a_spanning_tree() {
        let domain = line_domain();
        let substrate = SubstrateGraph::generate_condensed_graph(&domain);
        assert_eq!(substrate.graph().node_count(), 4);
        assert_eq!(substrate.graph().edge_count(), 3);
    }

    #[test]
    fn member_network_routes_through_junctions() {
        let domain = line_domain();
        let substrate = SubstrateGraph::generate_condensed_graph(&domain);
        // B1001 and B1003 share a network; B1002 lies on the path between
        // them and must appear as a junction.
        let network =
            Network::build_network(1, &ids(&domain), &[1, 0, 1, 0], &substrate).unwrap();
        assert_eq!(network.member_buildings, vec!["B1001", "B1003"]);
        assert_eq!(network.graph.node_count(), 3);
        let junctions = network
            .graph
            .node_weights()
            .filter(|n| n.kind == NodeKind::Junction)
            .count();
        assert_eq!(junctions, 1);
        assert!((network.total_pipe_length_m() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn single_member_networks_cannot_be_built() {
        let domain = line_domain();
        let substrate = SubstrateGraph::generate_condensed_graph(&domain);
        assert!(Network::build_network(1, &ids(&domain), &[1, 0, 0, 0], &substrate).is_err());
    }

    fn overlapping_pair(substrate: &SubstrateGraph, domain: &[(String, Point2<f64>)]) -> BTreeMap<u16, Network> {
        // both networks route through B1002's junction node
        let a = Network::build_network(1, &ids(domain), &[1, 0, 1, 0], substrate).unwrap();
        let b = Network::build_network(2, &ids(domain), &[0, 2, 0, 2], substrate).unwrap();
        BTreeMap::from([(1, a), (2, b)])
    }

    #[test]
    fn overlap_identification_is_symmetric() {
        let domain = line_domain();
        let substrate = SubstrateGraph::generate_condensed_graph(&domain);
        let networks = overlapping_pair(&substrate, &domain);
        let overlaps = Network::identify_overlapping_networks(&networks);
        assert!(overlaps.contains_key(&1));
        assert!(overlaps.contains_key(&2));
        assert!(!overlaps[&1][&2].is_empty());
        assert_eq!(overlaps[&1][&2], overlaps[&2][&1]);
    }

    #[test]
    fn merge_produces_one_connected_union() {
        let domain = line_domain();
        let substrate = SubstrateGraph::generate_condensed_graph(&domain);
        let mut networks = overlapping_pair(&substrate, &domain);
        let union_keys: BTreeSet<GridKey> = networks
            .values()
            .flat_map(|n| n.node_keys())
            .collect();
        Network::merge_networks(&mut networks, 1, &[2]);
        assert_eq!(networks.len(), 1);
        let merged = &networks[&1];
        assert_eq!(merged.node_keys(), union_keys);
        assert_eq!(
            merged.member_buildings,
            vec!["B1001", "B1002", "B1003", "B1004"]
        );
        assert!(Network::identify_overlapping_networks(&networks).is_empty());
        // the union stays one connected graph
        assert!(largest_component_by_members(&merged.graph)
            .map(|g| g.node_count() == merged.graph.node_count())
            .unwrap_or(false));
    }

    #[test]
    fn cut_removes_shared_nodes_from_the_other_network() {
        let domain = line_domain();
        let substrate = SubstrateGraph::generate_condensed_graph(&domain);
        let mut networks = overlapping_pair(&substrate, &domain);
        let overlaps = Network::identify_overlapping_networks(&networks);
        Network::cut_networks_on_overlap(&mut networks, &overlaps[&1], 1);
        assert!(Network::identify_overlapping_networks(&networks).is_empty());
    }

    #[test]
    fn delete_drops_networks_entirely() {
        let domain = line_domain();
        let substrate = SubstrateGraph::generate_condensed_graph(&domain);
        let mut networks = overlapping_pair(&substrate, &domain);
        Network::delete_networks(&mut networks, &[2]);
        assert_eq!(networks.len(), 1);
        assert!(Network::identify_overlapping_networks(&networks).is_empty());
    }

    #[test]
    fn piping_cost_is_annualized_over_the_pipe_lifetime() {
        let domain = line_domain();
        let substrate = SubstrateGraph::generate_condensed_graph(&domain);
        let network =
            Network::build_network(1, &ids(&domain), &[1, 1, 0, 0], &substrate).unwrap();
        let expected = annualized_investment(
            100.0 * PIPE_UNIT_COST_USD_PER_M,
            0.05,
            PIPE_LIFETIME_YEARS,
        );
        assert!((network.annual_piping_cost_usd(0.05) - expected).abs() < 1e-9);
        let losses = network.thermal_loss_flow("T60W");
        assert!((losses.profile()[0] - 3.0).abs() < 1e-9);
    }
}
