//! Exact k-nearest-neighbor search over a k-d tree, with majority-vote
//! classification and mean regression built on top.
//!
//! ```
//! use kdtree_knn::{build_index, classify, knn_query, regress};
//!
//! let points = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![5.0, 5.0], vec![2.0, 1.0]];
//! let labels = [0.0, 0.0, 1.0, 1.0];
//! let model = build_index(&points, &labels, 2.0)?;
//!
//! // (0,0) and (1,1) are both at distance 1; equal distances keep the smaller id.
//! let neighbors = knn_query(&model, &[1.0, 0.0], 2)?;
//! assert_eq!(neighbors.iter().map(|n| n.id).collect::<Vec<_>>(), vec![0, 1]);
//! assert_eq!(neighbors.iter().map(|n| n.distance).collect::<Vec<_>>(), vec![1.0, 1.0]);
//! assert_eq!(regress(&model, &[vec![1.0, 0.0]], 2)?, vec![0.0]);
//!
//! // (2,1) and (1,1) split the vote; the smaller label wins.
//! assert_eq!(classify(&model, &[vec![2.0, 0.0]], 2)?, vec![0.0]);
//! # Ok::<(), kdtree_knn::KnnError>(())
//! ```

pub mod common_types;
pub mod error;
pub mod knn;

pub use common_types::DataPoint;
pub use error::{ErrorKind, KnnError, Result};
pub use knn::{
    minkowski_distance, BuildOptions, KNeighbors, KdTree, KnnDistance, Neighbor, Reduction,
    SplitRule, TreeNode,
};

/// Builds an index over `points` (one row per sample) and their `labels`,
/// measuring distances with the Minkowski order `p`.
pub fn build_index(points: &[Vec<f32>], labels: &[f32], p: f32) -> Result<KdTree> {
    KdTree::build(points, labels, p)
}

/// The `k` nearest training samples to `query`, closest first.
pub fn knn_query(model: &KdTree, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
    model.knn(query, k)
}

pub fn knn_query_batch(
    model: &KdTree,
    queries: &[Vec<f32>],
    k: usize,
) -> Result<Vec<Vec<Neighbor>>> {
    model.knn_batch(queries, k)
}

pub fn classify(model: &KdTree, queries: &[Vec<f32>], k: usize) -> Result<Vec<f32>> {
    knn::classify(model, queries, k)
}

pub fn regress(model: &KdTree, queries: &[Vec<f32>], k: usize) -> Result<Vec<f32>> {
    knn::regress(model, queries, k)
}

/// Drops the model. Equivalent to letting it go out of scope.
pub fn release(model: KdTree) {
    model.release();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_round_trip() {
        let points = vec![vec![0.0], vec![1.0], vec![2.0], vec![10.0]];
        let labels = [1.0, 1.0, 2.0, 8.0];
        let model = build_index(&points, &labels, 1.0).unwrap();

        let batch = knn_query_batch(&model, &[vec![0.2], vec![9.0]], 2).unwrap();
        assert_eq!(batch[0].iter().map(|n| n.id).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(batch[1].iter().map(|n| n.id).collect::<Vec<_>>(), vec![3, 2]);

        assert_eq!(classify(&model, &[vec![0.2]], 3).unwrap(), vec![1.0]);
        assert_eq!(regress(&model, &[vec![9.0]], 2).unwrap(), vec![5.0]);
        release(model);
    }

    #[test]
    fn test_build_index_error_kinds() {
        assert_eq!(build_index(&[], &[], 2.0).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(
            build_index(&[vec![1.0]], &[1.0], -1.0).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_model_is_shareable_across_threads() {
        let points: Vec<Vec<f32>> =
            (0..64).map(|i| vec![i as f32, (i * 3 % 17) as f32]).collect();
        let labels: Vec<f32> = (0..64).map(|i| (i % 3) as f32).collect();
        let model = build_index(&points, &labels, 2.0).unwrap();
        let expected = knn_query(&model, &[5.0, 5.0], 4).unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| knn_query(&model, &[5.0, 5.0], 4).unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }
}
