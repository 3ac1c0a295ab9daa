// src/core/select.rs

//! Classical prefix-sum weighted random selection, shared by `KeyProvider`
//! and `DynamicWeightManager`.

use rand::Rng;

/// Picks an index from `weights` with probability proportional to its
/// value. Zero-or-negative weights are excluded. If exactly one candidate
/// has positive weight, the RNG is skipped entirely. Returns `None` if no candidate has
/// positive weight.
pub fn weighted_choice(weights: &[f64]) -> Option<usize> {
    weighted_choice_with(weights, &mut rand::thread_rng())
}

/// Testable variant taking an explicit RNG.
pub fn weighted_choice_with<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let live: Vec<usize> = weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0.0)
        .map(|(i, _)| i)
        .collect();

    match live.len() {
        0 => None,
        1 => Some(live[0]),
        _ => {
            let total: f64 = live.iter().map(|&i| weights[i]).sum();
            let mut r = rng.gen_range(0.0..total);
            for &i in &live {
                let w = weights[i];
                if r < w {
                    return Some(i);
                }
                r -= w;
            }
            // Floating-point rounding may leave a small remainder; fall
            // back to the last live candidate rather than `None`.
            live.last().copied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn single_positive_weight_is_returned_without_rng() {
        assert_eq!(weighted_choice(&[0.0, 5.0, 0.0]), Some(1));
    }

    #[test]
    fn all_zero_weights_returns_none() {
        assert_eq!(weighted_choice(&[0.0, 0.0]), None);
    }

    #[test]
    fn selection_respects_relative_weight_over_many_draws() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0u32; 2];
        for _ in 0..10_000 {
            let idx = weighted_choice_with(&[9.0, 1.0], &mut rng).unwrap();
            counts[idx] += 1;
        }
        // Expect roughly a 9:1 split; allow generous tolerance for a unit test.
        assert!(counts[0] > counts[1] * 4);
    }
}
