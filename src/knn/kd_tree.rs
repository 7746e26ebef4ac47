//! This module contains the k-d tree index: construction over a fixed point set
//! and exact k-nearest-neighbor / radius queries with branch-and-bound pruning.
//!
//! Nodes live in a flat arena and reference their sample by `id` into the
//! owned, row-major copy of the training points. The tree is built once and
//! only read afterwards, so a `&KdTree` can be shared freely between threads.

use log::{debug, trace, warn};

use super::distance::KnnDistance;
use super::heap_utils::KBestNeighbors;
use crate::common_types::DataPoint;
use crate::error::{KnnError, Result};

/// How the splitting dimension is chosen at each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SplitRule {
    /// `depth mod n_features`. Deterministic and cheap.
    #[default]
    Cycle,
    /// The dimension with the widest `max - min` spread over the node's subset.
    /// The first such dimension wins ties.
    MaxSpread,
}

/// Options fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildOptions {
    /// Minkowski order used for every distance against the built index.
    pub p: f32,
    pub split_rule: SplitRule,
}

impl BuildOptions {
    pub const DEFAULT_P: f32 = 2.0;

    pub fn new(p: f32) -> Self {
        BuildOptions { p, split_rule: SplitRule::default() }
    }

    pub fn with_p(mut self, p: f32) -> Self {
        self.p = p;
        self
    }

    pub fn with_split_rule(mut self, split_rule: SplitRule) -> Self {
        self.split_rule = split_rule;
        self
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions::new(Self::DEFAULT_P)
    }
}

/// One result of a neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Neighbor {
    /// Row of the sample in the training set.
    pub id: usize,
    pub distance: f32,
    pub label: f32,
}

/// A node of the tree. Children are arena indices into [`KdTree::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeNode {
    pub id: usize,
    pub split: usize,
    pub left: Option<usize>,
    pub right: Option<usize>,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct KdTree {
    nodes: Vec<TreeNode>,
    data: Vec<f32>,
    labels: Vec<f32>,
    n_samples: usize,
    n_features: usize,
    depth: usize,
    metric: KnnDistance,
    split_rule: SplitRule,
}

const ROOT: usize = 0;

// Past this dimensionality pruning rarely helps and queries approach a linear scan.
const HIGH_DIMENSION_WARNING: usize = 20;

// Initial capacity of the build and traversal stacks; they grow with the tree depth.
const SEARCH_STACK_HINT: usize = 64;

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// A pending subtree: the range `order[start..end]` hanging off `parent`.
#[derive(Debug)]
struct BuildTask {
    start: usize,
    end: usize,
    depth: usize,
    parent: Option<(usize, Side)>,
}

impl KdTree {
    /// Builds an index over `points` (one row per sample) with the default split rule.
    pub fn build(points: &[Vec<f32>], labels: &[f32], p: f32) -> Result<Self> {
        Self::build_with(points, labels, &BuildOptions::new(p))
    }

    pub fn build_with(
        points: &[Vec<f32>],
        labels: &[f32],
        options: &BuildOptions,
    ) -> Result<Self> {
        let (data, n_features) = flatten_rows(points.iter().map(Vec::as_slice), points.len())?;
        Self::from_parts(data, n_features, copy_values(labels)?, options)
    }

    /// Builds an index over a row-major `n_samples x n_features` buffer.
    pub fn build_flat(
        points: &[f32],
        n_features: usize,
        labels: &[f32],
        options: &BuildOptions,
    ) -> Result<Self> {
        Self::from_parts(copy_values(points)?, n_features, copy_values(labels)?, options)
    }

    pub fn from_data_points(points: &[DataPoint], options: &BuildOptions) -> Result<Self> {
        let (data, n_features) =
            flatten_rows(points.iter().map(|p| p.features.as_slice()), points.len())?;
        let mut labels = Vec::new();
        labels.try_reserve_exact(points.len())?;
        labels.extend(points.iter().map(|p| p.label));
        Self::from_parts(data, n_features, labels, options)
    }

    fn from_parts(
        data: Vec<f32>,
        n_features: usize,
        labels: Vec<f32>,
        options: &BuildOptions,
    ) -> Result<Self> {
        if n_features == 0 {
            return Err(KnnError::InvalidInput(
                "points must have at least one feature".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(KnnError::InvalidInput(
                "cannot build an index from zero samples".to_string(),
            ));
        }
        if data.len() % n_features != 0 {
            return Err(KnnError::InvalidInput(format!(
                "point buffer of length {} is not a multiple of {} features",
                data.len(),
                n_features
            )));
        }
        let n_samples = data.len() / n_features;
        if labels.len() != n_samples {
            return Err(KnnError::InvalidInput(format!(
                "got {} samples but {} labels",
                n_samples,
                labels.len()
            )));
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(KnnError::InvalidInput(format!(
                "sample {} has a non-finite value at feature {}",
                pos / n_features,
                pos % n_features
            )));
        }
        if let Some(pos) = labels.iter().position(|v| !v.is_finite()) {
            return Err(KnnError::InvalidInput(format!("label {} is not finite", pos)));
        }
        let metric = KnnDistance::from_order(options.p)?;

        if n_features > HIGH_DIMENSION_WARNING {
            warn!(
                "building a k-d tree over {} features; \
                 expect queries to degrade toward a linear scan",
                n_features
            );
        }

        let (nodes, depth) = build_nodes(&data, n_samples, n_features, options.split_rule)?;
        let tree = KdTree {
            nodes,
            data,
            labels,
            n_samples,
            n_features,
            depth,
            metric,
            split_rule: options.split_rule,
        };
        debug!(
            "built k-d tree: {} samples, {} features, p = {}, {:?} split, {} nodes, depth {}",
            tree.n_samples,
            tree.n_features,
            tree.p(),
            tree.split_rule,
            tree.nodes.len(),
            tree.depth
        );
        Ok(tree)
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// The Minkowski order fixed at build time.
    pub fn p(&self) -> f32 {
        self.metric.order()
    }

    pub fn metric(&self) -> KnnDistance {
        self.metric
    }

    pub fn split_rule(&self) -> SplitRule {
        self.split_rule
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[ROOT]
    }

    pub fn node(&self, index: usize) -> Option<&TreeNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Coordinates of training sample `id`.
    ///
    /// # Panics
    /// Panics if `id >= n_samples`.
    pub fn sample(&self, id: usize) -> &[f32] {
        &self.data[id * self.n_features..(id + 1) * self.n_features]
    }

    /// # Panics
    /// Panics if `id >= n_samples`.
    pub fn label(&self, id: usize) -> f32 {
        self.labels[id]
    }

    pub fn labels(&self) -> &[f32] {
        &self.labels
    }

    /// Number of levels, a single node being depth 1.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The `k` training samples closest to `query`, sorted by ascending distance.
    ///
    /// Equal distances are ordered by sample id, and when they straddle the
    /// k-th position the smaller ids are kept.
    pub fn knn(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_k(k)?;
        self.check_query(query)?;
        let best = self.search_k_best(query, k)?;

        let mut neighbors = Vec::new();
        neighbors.try_reserve_exact(best.len())?;
        neighbors.extend(best.into_sorted_vec().into_iter().map(|elem| Neighbor {
            id: elem.id,
            distance: elem.distance.0,
            label: self.labels[elem.id],
        }));
        Ok(neighbors)
    }

    /// Ids and distances of the `k` nearest samples, as two parallel vectors.
    pub fn knn_indices(&self, query: &[f32], k: usize) -> Result<(Vec<usize>, Vec<f32>)> {
        Ok(self.knn(query, k)?.into_iter().map(|n| (n.id, n.distance)).unzip())
    }

    pub fn nearest(&self, query: &[f32]) -> Result<Neighbor> {
        self.knn(query, 1)?.into_iter().next().ok_or_else(|| {
            KnnError::InvalidInput("index holds no samples".to_string())
        })
    }

    /// Runs [`KdTree::knn`] for every row of `queries`.
    pub fn knn_batch(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Vec<Neighbor>>> {
        self.check_k(k)?;
        let mut results = Vec::new();
        results.try_reserve_exact(queries.len())?;
        for query in queries {
            results.push(self.knn(query, k)?);
        }
        Ok(results)
    }

    /// All samples within `radius` of `query` (inclusive), sorted by ascending distance.
    pub fn within_radius(&self, query: &[f32], radius: f32) -> Result<Vec<Neighbor>> {
        self.check_query(query)?;
        if radius.is_nan() || radius < 0.0 {
            return Err(KnnError::InvalidArgument(format!(
                "radius must be non-negative, got {}",
                radius
            )));
        }

        let mut found = Vec::new();
        let mut stack = Vec::new();
        stack.try_reserve(SEARCH_STACK_HINT)?;
        push_fallible(&mut stack, (ROOT, 0.0f32))?;

        while let Some((index, bound)) = stack.pop() {
            if bound > radius {
                continue;
            }
            let node = &self.nodes[index];
            let point = self.sample(node.id);
            let distance = self.metric.distance(query, point);
            if distance <= radius {
                let neighbor = Neighbor { id: node.id, distance, label: self.labels[node.id] };
                push_fallible(&mut found, neighbor)?;
            }
            let (near, far, gap) = Self::children_by_side(node, query, point);
            if let Some(far) = far {
                push_fallible(&mut stack, (far, self.metric.axis_distance(gap).max(bound)))?;
            }
            if let Some(near) = near {
                push_fallible(&mut stack, (near, bound))?;
            }
        }

        found.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    /// Consumes the index. Dropping it has the same effect; the arena and the
    /// sample buffers are released once, together.
    pub fn release(self) {
        debug!(
            "releasing k-d tree with {} nodes over {} features",
            self.nodes.len(),
            self.n_features
        );
    }

    pub(crate) fn check_k(&self, k: usize) -> Result<()> {
        if k == 0 {
            return Err(KnnError::InvalidArgument("k must be at least 1".to_string()));
        }
        if k > self.n_samples {
            return Err(KnnError::InvalidArgument(format!(
                "k = {} exceeds the number of samples ({})",
                k, self.n_samples
            )));
        }
        Ok(())
    }

    fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.n_features {
            return Err(KnnError::InvalidArgument(format!(
                "query has {} features but the index was built with {}",
                query.len(),
                self.n_features
            )));
        }
        if let Some(pos) = query.iter().position(|v| !v.is_finite()) {
            return Err(KnnError::InvalidArgument(format!(
                "query has a non-finite value at feature {}",
                pos
            )));
        }
        Ok(())
    }

    /// Splits a node's children into the side of the splitting hyperplane that
    /// holds `query` and the other side, plus the query's gap to the plane.
    fn children_by_side(
        node: &TreeNode,
        query: &[f32],
        point: &[f32],
    ) -> (Option<usize>, Option<usize>, f32) {
        let diff = query[node.split] - point[node.split];
        if diff < 0.0 {
            (node.left, node.right, -diff)
        } else {
            (node.right, node.left, diff)
        }
    }

    /// Branch-and-bound descent. Each stack entry carries a lower bound on the
    /// distance from `query` to anything in that subtree; the far child is
    /// pushed before the near one, so its bound is only tested once the near
    /// subtree has been fully explored.
    fn search_k_best(&self, query: &[f32], k: usize) -> Result<KBestNeighbors> {
        let mut best = KBestNeighbors::new(k)?;
        let mut stack = Vec::new();
        stack.try_reserve(SEARCH_STACK_HINT)?;
        push_fallible(&mut stack, (ROOT, 0.0f32))?;
        let mut visited = 0usize;

        while let Some((index, bound)) = stack.pop() {
            if !best.may_contain_better(bound) {
                continue;
            }
            visited += 1;
            let node = &self.nodes[index];
            let point = self.sample(node.id);
            best.add(self.metric.distance(query, point), node.id);

            let (near, far, gap) = Self::children_by_side(node, query, point);
            if let Some(far) = far {
                // Every point beyond the plane is at least `gap` away on this
                // axis alone, which bounds the Minkowski distance for any p > 0.
                push_fallible(&mut stack, (far, self.metric.axis_distance(gap).max(bound)))?;
            }
            if let Some(near) = near {
                push_fallible(&mut stack, (near, bound))?;
            }
        }

        trace!("knn query (k = {}) visited {} of {} nodes", k, visited, self.n_samples);
        Ok(best)
    }
}

/// Pushes onto a growable stack, reporting allocation failure instead of aborting.
fn push_fallible<T>(stack: &mut Vec<T>, item: T) -> Result<()> {
    stack.try_reserve(1)?;
    stack.push(item);
    Ok(())
}

fn copy_values(values: &[f32]) -> Result<Vec<f32>> {
    let mut copy = Vec::new();
    copy.try_reserve_exact(values.len())?;
    copy.extend_from_slice(values);
    Ok(copy)
}

/// Copies rows of equal length into one row-major buffer.
fn flatten_rows<'a>(
    mut rows: impl Iterator<Item = &'a [f32]>,
    n_rows: usize,
) -> Result<(Vec<f32>, usize)> {
    let first = rows.next().ok_or_else(|| {
        KnnError::InvalidInput("cannot build an index from zero samples".to_string())
    })?;
    let n_features = first.len();
    if n_features == 0 {
        return Err(KnnError::InvalidInput(
            "points must have at least one feature".to_string(),
        ));
    }
    let total = n_rows.checked_mul(n_features).ok_or_else(|| {
        KnnError::InvalidInput(format!(
            "{} samples of {} features overflow the address space",
            n_rows, n_features
        ))
    })?;

    let mut data = Vec::new();
    data.try_reserve_exact(total)?;
    data.extend_from_slice(first);
    for (i, row) in rows.enumerate() {
        if row.len() != n_features {
            return Err(KnnError::InvalidInput(format!(
                "all points must have the same dimensionality: \
                 sample {} has {} features, expected {}",
                i + 1,
                row.len(),
                n_features
            )));
        }
        data.extend_from_slice(row);
    }
    Ok((data, n_features))
}

/// Builds the node arena over a working permutation of the sample ids.
///
/// Each subset is split at its median on the chosen dimension: the left child
/// gets the samples strictly below the pivot's coordinate, the right child
/// the samples at or above it. Pending subsets are kept on an explicit stack,
/// so heavily duplicated coordinates (which skew the tree) cannot exhaust the
/// call stack. Returns the arena and the number of levels.
fn build_nodes(
    data: &[f32],
    n_samples: usize,
    n_features: usize,
    split_rule: SplitRule,
) -> Result<(Vec<TreeNode>, usize)> {
    let coord = |id: usize, dim: usize| data[id * n_features + dim];

    let mut order = Vec::new();
    order.try_reserve_exact(n_samples)?;
    order.extend(0..n_samples);

    let mut nodes: Vec<TreeNode> = Vec::new();
    nodes.try_reserve_exact(n_samples)?;

    let mut tasks = Vec::new();
    tasks.try_reserve(SEARCH_STACK_HINT)?;
    push_fallible(&mut tasks, BuildTask { start: 0, end: n_samples, depth: 0, parent: None })?;
    let mut levels = 0;
    while let Some(task) = tasks.pop() {
        levels = levels.max(task.depth + 1);
        let subset = &mut order[task.start..task.end];
        let split = match split_rule {
            SplitRule::Cycle => task.depth % n_features,
            SplitRule::MaxSpread => max_spread_dimension(subset, n_features, coord),
        };
        let pivot_pos = partition_at_median(subset, |id| coord(id, split));

        let index = nodes.len();
        nodes.push(TreeNode { id: subset[pivot_pos], split, left: None, right: None });
        match task.parent {
            Some((parent, Side::Left)) => nodes[parent].left = Some(index),
            Some((parent, Side::Right)) => nodes[parent].right = Some(index),
            None => {}
        }

        let mid = task.start + pivot_pos;
        if mid + 1 < task.end {
            let right = BuildTask {
                start: mid + 1,
                end: task.end,
                depth: task.depth + 1,
                parent: Some((index, Side::Right)),
            };
            push_fallible(&mut tasks, right)?;
        }
        if task.start < mid {
            let left = BuildTask {
                start: task.start,
                end: mid,
                depth: task.depth + 1,
                parent: Some((index, Side::Left)),
            };
            push_fallible(&mut tasks, left)?;
        }
    }
    Ok((nodes, levels))
}

/// Places the median of `subset` (by `key`, then id) so that everything before
/// it has a strictly smaller key and everything after it a key at least as
/// large. Returns the pivot's position.
fn partition_at_median(subset: &mut [usize], key: impl Fn(usize) -> f32) -> usize {
    let mid = subset.len() / 2;
    subset.select_nth_unstable_by(mid, |&a, &b| key(a).total_cmp(&key(b)).then(a.cmp(&b)));

    // Samples tied with the pivot may sit on its left; move them right.
    let pivot_value = key(subset[mid]);
    let mut below = 0;
    for i in 0..mid {
        if key(subset[i]) < pivot_value {
            subset.swap(i, below);
            below += 1;
        }
    }
    subset.swap(below, mid);
    below
}

fn max_spread_dimension(
    subset: &[usize],
    n_features: usize,
    coord: impl Fn(usize, usize) -> f32,
) -> usize {
    if subset.len() == 1 {
        return 0;
    }
    let mut best_dim = 0;
    let mut best_spread = f32::NEG_INFINITY;
    for dim in 0..n_features {
        let (lo, hi) = subset.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &id| {
            let v = coord(id, dim);
            (lo.min(v), hi.max(v))
        });
        if hi - lo > best_spread {
            best_spread = hi - lo;
            best_dim = dim;
        }
    }
    best_dim
}
