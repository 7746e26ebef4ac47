// The k-nearest-neighbor engine: metric, candidate heap, k-d tree index and predictors.
pub mod distance;
pub mod heap_utils;
pub mod kd_tree;
pub mod predict;

pub use distance::{minkowski_distance, KnnDistance};
pub use kd_tree::{BuildOptions, KdTree, Neighbor, SplitRule, TreeNode};
pub use predict::{classify, predict, regress, KNeighbors, Reduction};
