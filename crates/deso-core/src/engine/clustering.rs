use crate::core::utils::geometry::distance;
use crate::engine::config::ClusteringMethod;
use crate::engine::network::{NodeKind, SubstrateGraph};
use nalgebra::Point2;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

/// Geographic clustering of the domain's building centroids.
///
/// Backs the cluster-aware mutation and crossover operators: buildings in
/// the same cluster tend to switch networks together. Cluster index -1 marks
/// outliers, which the operators treat individually. Oversized clusters are
/// subdivided on a grid so a single cluster cannot dominate the genome.
pub struct Clustering<'a> {
    substrate: &'a SubstrateGraph,
    points: Vec<Point2<f64>>,
    min_samples: usize,
    eps_m: f64,
    grid_size_m: f64,
    subdivision_threshold: usize,
    cluster_indexes: Vec<i32>,
    grid_cell_indexes: Vec<(i64, i64)>,
}

impl<'a> Clustering<'a> {
    pub fn new(substrate: &'a SubstrateGraph, points: Vec<Point2<f64>>) -> Self {
        Self {
            substrate,
            points,
            min_samples: 5,
            eps_m: 100.0,
            grid_size_m: 300.0,
            subdivision_threshold: 5,
            cluster_indexes: Vec::new(),
            grid_cell_indexes: Vec::new(),
        }
    }

    /// Runs the configured clustering and returns one cluster index per
    /// building, in domain order.
    pub fn cluster(mut self, method: ClusteringMethod, rng: &mut impl Rng) -> Vec<i32> {
        self.cluster_indexes = match method {
            ClusteringMethod::Density => self.density_scan(),
            ClusteringMethod::LabelPropagation => self.label_propagation(rng),
        };
        self.subdivide_with_grid();
        self.cluster_indexes
    }

    /// Density scan over centroid distances: a building is a core point when
    /// at least `min_samples` buildings (itself included) lie within
    /// `eps_m`; clusters grow from core points, everything else is noise.
    fn density_scan(&self) -> Vec<i32> {
        let n = self.points.len();
        let neighbors: Vec<Vec<usize>> = (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| distance(&self.points[i], &self.points[j]) <= self.eps_m)
                    .collect()
            })
            .collect();
        let core: Vec<bool> = neighbors
            .iter()
            .map(|adjacent| adjacent.len() >= self.min_samples)
            .collect();

        let mut labels = vec![-1i32; n];
        let mut next_cluster = 0;
        for start in 0..n {
            if labels[start] != -1 || !core[start] {
                continue;
            }
            labels[start] = next_cluster;
            let mut queue = vec![start];
            while let Some(point) = queue.pop() {
                for &neighbor in &neighbors[point] {
                    if labels[neighbor] == -1 {
                        labels[neighbor] = next_cluster;
                        if core[neighbor] {
                            queue.push(neighbor);
                        }
                    }
                }
            }
            next_cluster += 1;
        }
        labels
    }

    /// Community detection on the substrate graph: every building starts in
    /// its own community and repeatedly adopts the most frequent label among
    /// its tree neighbours. Single-member communities are outliers.
    fn label_propagation(&self, rng: &mut impl Rng) -> Vec<i32> {
        let graph = self.substrate.graph();
        let nodes: Vec<_> = graph.node_indices().collect();
        let position_of: BTreeMap<_, _> = nodes
            .iter()
            .enumerate()
            .map(|(position, &node)| (node, position))
            .collect();
        let mut labels: Vec<usize> = (0..nodes.len()).collect();

        for _ in 0..10 {
            let mut order: Vec<usize> = (0..nodes.len()).collect();
            order.shuffle(rng);
            let mut changed = false;
            for position in order {
                let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
                for neighbor in graph.neighbors(nodes[position]) {
                    *counts.entry(labels[position_of[&neighbor]]).or_insert(0) += 1;
                }
                if let Some((&label, _)) = counts
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                {
                    if labels[position] != label {
                        labels[position] = label;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        // map communities onto cluster indexes, marking lone buildings as
        // outliers
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &label in &labels {
            *counts.entry(label).or_insert(0) += 1;
        }
        let mut mapping: BTreeMap<usize, i32> = BTreeMap::new();
        let mut next_index = 1;
        for (&label, &count) in &counts {
            if count > 1 {
                mapping.insert(label, next_index);
                next_index += 1;
            }
        }

        // substrate order is domain order for building nodes
        let mut result = vec![-1i32; self.points.len()];
        let mut building_position = 0;
        for (position, node) in nodes.iter().enumerate() {
            if matches!(graph[*node].kind, NodeKind::Building(_)) {
                result[building_position] =
                    mapping.get(&labels[position]).copied().unwrap_or(-1);
                building_position += 1;
            }
        }
        result
    }

    /// Splits clusters that pack too many buildings into one grid cell.
    fn subdivide_with_grid(&mut self) {
        let max_index = self.cluster_indexes.iter().copied().max().unwrap_or(-1);
        if max_index < 0 || self.area_small() || self.nbr_points_small() {
            return;
        }
        self.grid_cell_indexes = self.points_to_grid();
        self.split_clusters();
    }

    /// The clustered area is too small for subdivision to be meaningful.
    fn area_small(&self) -> bool {
        let xs: Vec<f64> = self.points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = self.points.iter().map(|p| p.y).collect();
        let x_range = xs.iter().cloned().fold(f64::MIN, f64::max)
            - xs.iter().cloned().fold(f64::MAX, f64::min);
        let y_range = ys.iter().cloned().fold(f64::MIN, f64::max)
            - ys.iter().cloned().fold(f64::MAX, f64::min);
        x_range + y_range < 4.0 * self.grid_size_m
    }

    fn nbr_points_small(&self) -> bool {
        self.points.len() < 4 * self.subdivision_threshold
    }

    /// Assigns every centroid to its grid cell.
    fn points_to_grid(&self) -> Vec<(i64, i64)> {
        let xs: Vec<f64> = self.points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = self.points.iter().map(|p| p.y).collect();
        let x_min = xs.iter().cloned().fold(f64::MAX, f64::min);
        let x_max = xs.iter().cloned().fold(f64::MIN, f64::max);
        let y_min = ys.iter().cloned().fold(f64::MAX, f64::min);
        let y_max = ys.iter().cloned().fold(f64::MIN, f64::max);

        let x_cells = ((x_max - x_min) / self.grid_size_m) as i64 + 1;
        let y_cells = ((y_max - y_min) / self.grid_size_m) as i64 + 1;
        let x_zero = x_min - (x_max - x_min) / (2.0 * x_cells as f64);
        let y_zero = y_min - (y_max - y_min) / (2.0 * y_cells as f64);

        self.points
            .iter()
            .map(|point| {
                (
                    ((point.x - x_zero) / self.grid_size_m) as i64,
                    ((point.y - y_zero) / self.grid_size_m) as i64,
                )
            })
            .collect()
    }

    fn count_points_per_subdivision(&self) -> BTreeMap<i32, BTreeMap<(i64, i64), usize>> {
        let mut counts: BTreeMap<i32, BTreeMap<(i64, i64), usize>> = BTreeMap::new();
        for (position, &cluster) in self.cluster_indexes.iter().enumerate() {
            *counts
                .entry(cluster)
                .or_default()
                .entry(self.grid_cell_indexes[position])
                .or_insert(0) += 1;
        }
        counts
    }

    /// Splits clusters around their densest grid cell until none can be
    /// split further. Outliers are never split.
    fn split_clusters(&mut self) {
        let mut unsplittable: Vec<i32> = vec![-1];
        loop {
            let counts = self.count_points_per_subdivision();
            let candidates: Vec<i32> = counts
                .keys()
                .copied()
                .filter(|cluster| !unsplittable.contains(cluster))
                .collect();
            if candidates.is_empty() {
                break;
            }
            for cluster in candidates {
                let cells = &counts[&cluster];
                let (&densest, &count) = cells
                    .iter()
                    .max_by_key(|&(_, &count)| count)
                    .expect("clusters have at least one cell");
                if count < self.subdivision_threshold {
                    unsplittable.push(cluster);
                    continue;
                }
                if self.split_off_new_cluster(cluster, densest, cells) {
                    // cell counts changed; re-derive them before continuing
                    break;
                } else {
                    unsplittable.push(cluster);
                }
            }
        }
    }

    /// Splits one cluster towards the side of its densest cell holding the
    /// most buildings. Returns whether a new cluster was created.
    fn split_off_new_cluster(
        &mut self,
        cluster: i32,
        on_cell: (i64, i64),
        cells: &BTreeMap<(i64, i64), usize>,
    ) -> bool {
        let mut side_counts = BTreeMap::from([("north", 0), ("east", 0), ("south", 0), ("west", 0)]);
        let mut side_cells: BTreeMap<&str, Vec<(i64, i64)>> = BTreeMap::new();
        for (&cell, &count) in cells {
            if cell == on_cell {
                continue;
            }
            if cell.1 > on_cell.1 {
                *side_counts.get_mut("north").expect("side exists") += count;
                side_cells.entry("north").or_default().push(cell);
            }
            if cell.0 > on_cell.0 {
                *side_counts.get_mut("east").expect("side exists") += count;
                side_cells.entry("east").or_default().push(cell);
            }
            if cell.1 < on_cell.1 {
                *side_counts.get_mut("south").expect("side exists") += count;
                side_cells.entry("south").or_default().push(cell);
            }
            if cell.0 < on_cell.0 {
                *side_counts.get_mut("west").expect("side exists") += count;
                side_cells.entry("west").or_default().push(cell);
            }
        }
        let (&direction, &count) = side_counts
            .iter()
            .max_by_key(|&(_, &count)| count)
            .expect("four sides exist");
        if count < self.subdivision_threshold {
            return false;
        }
        let new_cluster = self.cluster_indexes.iter().copied().max().unwrap_or(0) + 1;
        let cells_to_move = &side_cells[direction];
        for position in 0..self.cluster_indexes.len() {
            if self.cluster_indexes[position] == cluster
                && cells_to_move.contains(&self.grid_cell_indexes[position])
            {
                self.cluster_indexes[position] = new_cluster;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::network::SubstrateGraph;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn two_blobs() -> Vec<(String, Point2<f64>)> {
        let mut buildings = Vec::new();
        for i in 0..6 {
            buildings.push((
                format!("B10{i:02}"),
                Point2::new(10.0 * i as f64, 0.0),
            ));
        }
        for i in 0..6 {
            buildings.push((
                format!("B11{i:02}"),
                Point2::new(5000.0 + 10.0 * i as f64, 0.0),
            ));
        }
        // one building far from everything
        buildings.push(("B1200".to_string(), Point2::new(20_000.0, 20_000.0)));
        buildings
    }

    #[test]
    fn density_scan_separates_blobs_and_marks_outliers() {
        let buildings = two_blobs();
        let substrate = SubstrateGraph::generate_condensed_graph(&buildings);
        let points: Vec<_> = buildings.iter().map(|(_, p)| *p).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let clusters =
            Clustering::new(&substrate, points).cluster(ClusteringMethod::Density, &mut rng);
        assert_eq!(clusters.len(), 13);
        assert!(clusters[0] >= 0);
        assert_eq!(clusters[0], clusters[5]);
        assert_eq!(clusters[6], clusters[11]);
        assert_ne!(clusters[0], clusters[6]);
        assert_eq!(clusters[12], -1);
    }

    #[test]
    fn label_propagation_yields_one_index_per_building() {
        let buildings = two_blobs();
        let substrate = SubstrateGraph::generate_condensed_graph(&buildings);
        let points: Vec<_> = buildings.iter().map(|(_, p)| *p).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let clusters = Clustering::new(&substrate, points)
            .cluster(ClusteringMethod::LabelPropagation, &mut rng);
        assert_eq!(clusters.len(), 13);
    }

    #[test]
    fn dense_grid_cells_are_subdivided() {
        // 40 buildings tightly packed: one density cluster, forced through
        // grid subdivision into several
        let mut buildings = Vec::new();
        for i in 0..40 {
            buildings.push((
                format!("B1{i:03}"),
                Point2::new(40.0 * (i % 20) as f64, 700.0 * (i / 20) as f64),
            ));
        }
        let substrate = SubstrateGraph::generate_condensed_graph(&buildings);
        let points: Vec<_> = buildings.iter().map(|(_, p)| *p).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let clusters =
            Clustering::new(&substrate, points).cluster(ClusteringMethod::Density, &mut rng);
        let distinct: std::collections::BTreeSet<i32> =
            clusters.iter().copied().filter(|&c| c >= 0).collect();
        assert!(distinct.len() >= 4);
    }
}
