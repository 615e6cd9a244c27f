//! Slice-generic genetic operators shared by the connectivity and capacity
//! genotypes.

use rand::Rng;

/// One-point crossover: swaps the tails of two equally long genomes after a
/// random cut point.
pub fn cx_one_point<T>(a: &mut [T], b: &mut [T], rng: &mut impl Rng) {
    let len = a.len().min(b.len());
    if len < 2 {
        return;
    }
    let point = rng.gen_range(1..len);
    for index in point..len {
        std::mem::swap(&mut a[index], &mut b[index]);
    }
}

/// Two-point crossover: swaps the slice between two random cut points.
pub fn cx_two_point<T>(a: &mut [T], b: &mut [T], rng: &mut impl Rng) {
    let len = a.len().min(b.len());
    if len < 2 {
        return;
    }
    let first = rng.gen_range(1..len);
    let second = rng.gen_range(1..len);
    let (low, high) = if first <= second {
        (first, second)
    } else {
        (second, first)
    };
    for index in low..high {
        std::mem::swap(&mut a[index], &mut b[index]);
    }
}

/// Uniform crossover: swaps each gene independently with probability `indpb`.
pub fn cx_uniform<T>(a: &mut [T], b: &mut [T], indpb: f64, rng: &mut impl Rng) {
    let len = a.len().min(b.len());
    for index in 0..len {
        if rng.r#gen::<f64>() < indpb {
            std::mem::swap(&mut a[index], &mut b[index]);
        }
    }
}

/// Shuffle mutation: each gene is swapped with another random position with
/// probability `indpb`.
pub fn mut_shuffle_indexes<T>(genome: &mut [T], indpb: f64, rng: &mut impl Rng) {
    let len = genome.len();
    if len < 2 {
        return;
    }
    for index in 0..len {
        if rng.r#gen::<f64>() < indpb {
            let mut other = rng.gen_range(0..len - 1);
            if other >= index {
                other += 1;
            }
            genome.swap(index, other);
        }
    }
}

/// Integer mutation: each gene is redrawn uniformly from `[low, up]` with
/// probability `indpb`.
pub fn mut_uniform_int(genome: &mut [u16], low: u16, up: u16, indpb: f64, rng: &mut impl Rng) {
    for gene in genome.iter_mut() {
        if rng.r#gen::<f64>() < indpb {
            *gene = rng.gen_range(low..=up);
        }
    }
}

/// Polynomial bounded mutation with distribution index `eta`, as used for
/// real-valued genomes in `[low, up]`.
pub fn mut_polynomial_bounded(
    genome: &mut [f64],
    eta: f64,
    low: f64,
    up: f64,
    indpb: f64,
    rng: &mut impl Rng,
) {
    let span = up - low;
    if span <= 0.0 {
        return;
    }
    for gene in genome.iter_mut() {
        if rng.r#gen::<f64>() >= indpb {
            continue;
        }
        let x = *gene;
        let delta_1 = (x - low) / span;
        let delta_2 = (up - x) / span;
        let u: f64 = rng.r#gen();
        let mut_pow = 1.0 / (eta + 1.0);
        let delta_q = if u < 0.5 {
            let xy = 1.0 - delta_1;
            let value = 2.0 * u + (1.0 - 2.0 * u) * xy.powf(eta + 1.0);
            value.powf(mut_pow) - 1.0
        } else {
            let xy = 1.0 - delta_2;
            let value = 2.0 * (1.0 - u) + 2.0 * (u - 0.5) * xy.powf(eta + 1.0);
            1.0 - value.powf(mut_pow)
        };
        *gene = (x + delta_q * span).clamp(low, up);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn one_point_preserves_the_multiset_of_genes() {
        let mut a = vec![1u16, 2, 3, 4, 5];
        let mut b = vec![6u16, 7, 8, 9, 10];
        cx_one_point(&mut a, &mut b, &mut rng());
        let mut all: Vec<u16> = a.iter().chain(b.iter()).copied().collect();
        all.sort();
        assert_eq!(all, (1..=10).collect::<Vec<u16>>());
        assert_eq!(a[0], 1);
        assert_eq!(b[0], 6);
    }

    #[test]
    fn uniform_int_respects_bounds() {
        let mut genome = vec![0u16; 100];
        mut_uniform_int(&mut genome, 0, 3, 1.0, &mut rng());
        assert!(genome.iter().all(|&g| g <= 3));
        assert!(genome.iter().any(|&g| g > 0));
    }

    #[test]
    fn shuffle_preserves_the_multiset_of_genes() {
        let mut genome = vec![1u16, 1, 2, 2, 3, 3, 0, 0];
        let mut sorted = genome.clone();
        sorted.sort();
        mut_shuffle_indexes(&mut genome, 0.8, &mut rng());
        let mut shuffled = genome.clone();
        shuffled.sort();
        assert_eq!(shuffled, sorted);
    }

    #[test]
    fn polynomial_mutation_stays_in_bounds() {
        let mut genome = vec![0.5; 200];
        mut_polynomial_bounded(&mut genome, 20.0, 0.0, 1.0, 1.0, &mut rng());
        assert!(genome.iter().all(|&g| (0.0..=1.0).contains(&g)));
        assert!(genome.iter().any(|&g| (g - 0.5).abs() > 1e-6));
    }
}
