//! Property-based tests for the k-d tree index and the predictors.
//!
//! Point sets are generated with proptest and every query is cross-checked
//! against an exhaustive scan using the same metric.

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use kdtree_knn::{classify, regress, BuildOptions, KdTree, SplitRule};

// =============================================================================
// Strategies
// =============================================================================

/// Coordinates on a coarse grid, so that equal distances are common.
fn arb_grid_coord() -> impl Strategy<Value = f32> {
    (-4i32..=4).prop_map(|v| v as f32)
}

fn arb_coord() -> impl Strategy<Value = f32> {
    prop_oneof![arb_grid_coord(), -50.0f32..50.0]
}

/// `(points, query)` with 1..=200 points in 1..=8 dimensions.
fn arb_dataset() -> impl Strategy<Value = (Vec<Vec<f32>>, Vec<f32>)> {
    (1usize..=8, 1usize..=200).prop_flat_map(|(d, n)| {
        (
            prop_vec(prop_vec(arb_coord(), d), n),
            prop_vec(arb_coord(), d),
        )
    })
}

fn arb_order() -> impl Strategy<Value = f32> {
    prop_oneof![Just(1.0f32), Just(2.0f32), Just(3.0f32)]
}

fn arb_split_rule() -> impl Strategy<Value = SplitRule> {
    prop_oneof![Just(SplitRule::Cycle), Just(SplitRule::MaxSpread)]
}

fn brute_force(tree: &KdTree, query: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut all: Vec<(usize, f32)> = (0..tree.n_samples())
        .map(|id| (id, tree.metric().distance(query, tree.sample(id))))
        .collect();
    all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    all.truncate(k);
    all
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn knn_matches_exhaustive_scan(
        (points, query) in arb_dataset(),
        p in arb_order(),
        rule in arb_split_rule(),
        k_seed in any::<usize>(),
    ) {
        let n = points.len();
        let labels: Vec<f32> = (0..n).map(|i| (i % 5) as f32).collect();
        let options = BuildOptions::new(p).with_split_rule(rule);
        let tree = KdTree::build_with(&points, &labels, &options).unwrap();
        let k = 1 + k_seed % n;

        let neighbors = tree.knn(&query, k).unwrap();
        prop_assert_eq!(neighbors.len(), k);

        let got: Vec<(usize, f32)> = neighbors.iter().map(|n| (n.id, n.distance)).collect();
        prop_assert_eq!(&got, &brute_force(&tree, &query, k));

        let mut got_labels: Vec<f32> = neighbors.iter().map(|n| n.label).collect();
        let mut want_labels: Vec<f32> =
            brute_force(&tree, &query, k).iter().map(|&(id, _)| labels[id]).collect();
        got_labels.sort_by(f32::total_cmp);
        want_labels.sort_by(f32::total_cmp);
        prop_assert_eq!(got_labels, want_labels);
    }

    #[test]
    fn knn_results_are_distinct_sorted_ids(
        (points, query) in arb_dataset(),
        p in arb_order(),
        k_seed in any::<usize>(),
    ) {
        let n = points.len();
        let tree = KdTree::build(&points, &vec![0.0; n], p).unwrap();
        let k = 1 + k_seed % n;
        let neighbors = tree.knn(&query, k).unwrap();

        prop_assert!(neighbors.windows(2).all(|w| w[0].distance <= w[1].distance));
        let mut ids: Vec<usize> = neighbors.iter().map(|n| n.id).collect();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), k);
        prop_assert!(ids.iter().all(|&id| id < n));

        // No hidden state: asking again gives the same answer.
        prop_assert_eq!(tree.knn(&query, k).unwrap(), neighbors);
    }

    #[test]
    fn every_training_point_finds_itself(
        (points, _query) in arb_dataset(),
        p in arb_order(),
    ) {
        let n = points.len();
        let tree = KdTree::build(&points, &vec![0.0; n], p).unwrap();
        for point in &points {
            let nearest = tree.nearest(point).unwrap();
            prop_assert_eq!(nearest.distance, 0.0);
            prop_assert_eq!(tree.sample(nearest.id), point.as_slice());
        }
    }

    #[test]
    fn regress_of_constant_labels_is_constant(
        (points, query) in arb_dataset(),
        c in -1000.0f32..1000.0,
        k_seed in any::<usize>(),
    ) {
        let n = points.len();
        let model = KdTree::build(&points, &vec![c; n], 2.0).unwrap();
        let k = 1 + k_seed % n;
        prop_assert_eq!(regress(&model, &[query], k).unwrap(), vec![c]);
    }

    #[test]
    fn classify_with_k1_on_distinct_points_returns_own_label(
        n in 1usize..100,
        p in arb_order(),
    ) {
        let points: Vec<Vec<f32>> = (0..n).map(|i| vec![i as f32, (i % 3) as f32]).collect();
        let labels: Vec<f32> = (0..n).map(|i| (i % 4) as f32).collect();
        let model = KdTree::build(&points, &labels, p).unwrap();
        prop_assert_eq!(classify(&model, &points, 1).unwrap(), labels);
    }
}
