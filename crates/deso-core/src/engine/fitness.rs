use std::cmp::Ordering;

/// Objective values of one evaluated solution, aligned with the configured
/// objective list. All objectives are minimized.
#[derive(Debug, Clone, PartialEq)]
pub struct Fitness {
    values: Vec<f64>,
}

impl Fitness {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Pareto dominance: at least as good in every objective and strictly
    /// better in at least one.
    pub fn dominates(&self, other: &Fitness) -> bool {
        let mut strictly_better = false;
        for (a, b) in self.values.iter().zip(&other.values) {
            if a > b {
                return false;
            }
            if a < b {
                strictly_better = true;
            }
        }
        strictly_better
    }

    /// Elementwise sum, used when combining subsystem fitnesses into a
    /// system-level one.
    pub fn combined(&self, other: &Fitness) -> Fitness {
        Fitness {
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| a + b)
                .collect(),
        }
    }
}

/// Fast non-dominated sorting: partitions indexes into fronts such that no
/// solution is dominated by a member of the same or a later front.
pub fn fast_non_dominated_sort(fitnesses: &[&Fitness]) -> Vec<Vec<usize>> {
    let n = fitnesses.len();
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();
    let mut first_front = Vec::new();

    for p in 0..n {
        for q in 0..n {
            if p == q {
                continue;
            }
            if fitnesses[p].dominates(fitnesses[q]) {
                dominated_by[p].push(q);
            } else if fitnesses[q].dominates(fitnesses[p]) {
                domination_count[p] += 1;
            }
        }
        if domination_count[p] == 0 {
            first_front.push(p);
        }
    }

    let mut current = first_front;
    while !current.is_empty() {
        let mut next = Vec::new();
        for &p in &current {
            for &q in &dominated_by[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        fronts.push(std::mem::take(&mut current));
        current = next;
    }
    fronts
}

/// Crowding distances of one front, in the order the front was given.
pub fn crowding_distances(front: &[&Fitness]) -> Vec<f64> {
    let n = front.len();
    let mut distances = vec![0.0; n];
    if n == 0 {
        return distances;
    }
    let objectives = front[0].values().len();
    for objective in 0..objectives {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            front[a].values()[objective].total_cmp(&front[b].values()[objective])
        });
        distances[order[0]] = f64::INFINITY;
        distances[order[n - 1]] = f64::INFINITY;
        let span =
            front[order[n - 1]].values()[objective] - front[order[0]].values()[objective];
        if span <= f64::EPSILON {
            continue;
        }
        for window in order.windows(3) {
            let (previous, middle, following) = (window[0], window[1], window[2]);
            distances[middle] += (front[following].values()[objective]
                - front[previous].values()[objective])
                / span;
        }
    }
    distances
}

/// NSGA-II style selection: admits whole fronts while they fit, then fills
/// the remainder with the most crowded-out members of the split front.
pub fn select_nsga2(fitnesses: &[&Fitness], k: usize) -> Vec<usize> {
    let mut selected = Vec::with_capacity(k);
    for front in fast_non_dominated_sort(fitnesses) {
        if selected.len() + front.len() <= k {
            selected.extend_from_slice(&front);
            if selected.len() == k {
                break;
            }
            continue;
        }
        let front_fitnesses: Vec<&Fitness> = front.iter().map(|&i| fitnesses[i]).collect();
        let distances = crowding_distances(&front_fitnesses);
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by(|&a, &b| {
            distances[b]
                .partial_cmp(&distances[a])
                .unwrap_or(Ordering::Equal)
        });
        for index in order.into_iter().take(k - selected.len()) {
            selected.push(front[index]);
        }
        break;
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fits(values: &[&[f64]]) -> Vec<Fitness> {
        values.iter().map(|v| Fitness::new(v.to_vec())).collect()
    }

    #[test]
    fn dominance_is_strict_somewhere_and_weak_everywhere() {
        let a = Fitness::new(vec![1.0, 2.0]);
        let b = Fitness::new(vec![2.0, 2.0]);
        let c = Fitness::new(vec![2.0, 1.0]);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(!a.dominates(&c));
        assert!(!c.dominates(&a));
        assert!(!a.dominates(&a));
    }

    #[test]
    fn sorting_never_places_a_dominated_solution_earlier() {
        // hand-constructed dominance structure:
        //   [1,1] dominates everything; [2,2] and [1,3] are mutually
        //   non-dominated; [3,3] is dominated by both fronts above it.
        let fitnesses = fits(&[&[2.0, 2.0], &[1.0, 1.0], &[3.0, 3.0], &[1.0, 3.0]]);
        let refs: Vec<&Fitness> = fitnesses.iter().collect();
        let fronts = fast_non_dominated_sort(&refs);
        assert_eq!(fronts[0], vec![1]);
        assert_eq!(fronts[1], vec![0, 3]);
        assert_eq!(fronts[2], vec![2]);
    }

    #[test]
    fn equal_fitnesses_share_a_front() {
        let fitnesses = fits(&[&[1.0, 1.0], &[1.0, 1.0]]);
        let refs: Vec<&Fitness> = fitnesses.iter().collect();
        let fronts = fast_non_dominated_sort(&refs);
        assert_eq!(fronts.len(), 1);
        assert_eq!(fronts[0].len(), 2);
    }

    #[test]
    fn nsga2_prefers_boundary_solutions_when_splitting_a_front() {
        let fitnesses = fits(&[
            &[0.0, 4.0],
            &[1.9, 2.1],
            &[2.0, 2.0],
            &[4.0, 0.0],
        ]);
        let refs: Vec<&Fitness> = fitnesses.iter().collect();
        let selected = select_nsga2(&refs, 3);
        assert_eq!(selected.len(), 3);
        assert!(selected.contains(&0));
        assert!(selected.contains(&3));
    }

    #[test]
    fn selection_caps_at_k() {
        let fitnesses = fits(&[&[1.0], &[2.0], &[3.0]]);
        let refs: Vec<&Fitness> = fitnesses.iter().collect();
        assert_eq!(select_nsga2(&refs, 2).len(), 2);
        assert_eq!(select_nsga2(&refs, 10).len(), 3);
    }
}
