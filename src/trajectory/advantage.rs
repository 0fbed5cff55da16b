//! Group-relative advantage estimation.
//!
//! Each trajectory's advantage is the z-score of its reward within the group
//! of rollouts sampled for the same scenario:
//!
//!   A_i = (R_i - mean(R)) / std(R)

/// Compute group-relative advantages for a group of rewards.
///
/// - An empty group yields an empty vector.
/// - When every reward is identical (std = 0) all advantages are 0.0.
pub fn compute_group_advantages(rewards: &[f64]) -> Vec<f64> {
    if rewards.is_empty() {
        return Vec::new();
    }

    let n = rewards.len() as f64;
    let mean = rewards.iter().sum::<f64>() / n;

    // Population standard deviation: the group is the whole population.
    let variance = rewards.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    if std < 1e-8 {
        return vec![0.0; rewards.len()];
    }

    rewards.iter().map(|r| (r - mean) / std).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advantages_basic() {
        // Mean = 0.5, std = 0.5
        let advs = compute_group_advantages(&[0.0, 0.0, 1.0, 1.0]);
        assert_eq!(advs.len(), 4);
        assert!((advs[0] - (-1.0)).abs() < 1e-9);
        assert!((advs[1] - (-1.0)).abs() < 1e-9);
        assert!((advs[2] - 1.0).abs() < 1e-9);
        assert!((advs[3] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_advantages_all_same() {
        let advs = compute_group_advantages(&[7.0, 7.0, 7.0]);
        for a in &advs {
            assert!(a.abs() < 1e-9, "Expected 0.0, got {a}");
        }
    }

    #[test]
    fn test_advantages_empty() {
        assert!(compute_group_advantages(&[]).is_empty());
    }

    #[test]
    fn test_advantages_single_element() {
        let advs = compute_group_advantages(&[4.2]);
        assert_eq!(advs.len(), 1);
        assert!(advs[0].abs() < 1e-9);
    }

    #[test]
    fn test_advantages_sum_to_zero() {
        // Listing rewards live on a 0..10 scale.
        let advs = compute_group_advantages(&[3.0, 8.5, 6.0, 10.0, 0.0, 7.2, 5.5, 9.1, 4.4, 6.6]);
        let sum: f64 = advs.iter().sum();
        assert!(sum.abs() < 1e-9, "Sum of advantages should be ~0, got {sum}");
    }

    #[test]
    fn test_advantages_ordering_preserved() {
        let advs = compute_group_advantages(&[2.0, 1.0]);
        assert!(advs[0] > 0.0);
        assert!(advs[1] < 0.0);
    }
}
