//! Classification and regression as reductions over k-NN query results.

use std::collections::BTreeMap;

use log::warn;
use ordered_float::OrderedFloat;

use super::kd_tree::{BuildOptions, KdTree, Neighbor};
use crate::error::{KnnError, Result};

/// How the labels of the k neighbors collapse into one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reduction {
    /// Most frequent label; ties go to the smallest label value.
    MajorityVote,
    /// Unweighted arithmetic mean of the labels.
    Mean,
}

impl Reduction {
    /// Reduces a neighbor list. An empty list yields NaN.
    pub fn reduce(&self, neighbors: &[Neighbor]) -> f32 {
        match self {
            Reduction::MajorityVote => majority_vote(neighbors),
            Reduction::Mean => mean_label(neighbors),
        }
    }
}

fn majority_vote(neighbors: &[Neighbor]) -> f32 {
    let mut label_counts: BTreeMap<OrderedFloat<f32>, usize> = BTreeMap::new();
    for neighbor in neighbors {
        *label_counts.entry(OrderedFloat(neighbor.label)).or_insert(0) += 1;
    }
    // Labels come out in ascending order, so only a strictly larger count
    // displaces the current winner.
    let mut winner: Option<(f32, usize)> = None;
    for (label, count) in label_counts {
        if winner.is_none_or(|(_, best)| count > best) {
            winner = Some((label.0, count));
        }
    }
    winner.map_or(f32::NAN, |(label, _)| label)
}

fn mean_label(neighbors: &[Neighbor]) -> f32 {
    if neighbors.is_empty() {
        return f32::NAN;
    }
    // f64 keeps the sum exact for f32 labels, so a constant label set maps back to itself.
    let sum: f64 = neighbors.iter().map(|n| f64::from(n.label)).sum();
    (sum / neighbors.len() as f64) as f32
}

/// One prediction per row of `queries`.
///
/// Fails with whatever [`KdTree::knn`] fails with for the first bad row.
pub fn predict(
    model: &KdTree,
    queries: &[Vec<f32>],
    k: usize,
    reduction: Reduction,
) -> Result<Vec<f32>> {
    model.check_k(k)?;
    let mut predictions = Vec::new();
    predictions.try_reserve_exact(queries.len())?;
    for query in queries {
        predictions.push(reduction.reduce(&model.knn(query, k)?));
    }
    Ok(predictions)
}

/// Majority vote over the `k` nearest labels for every query row.
pub fn classify(model: &KdTree, queries: &[Vec<f32>], k: usize) -> Result<Vec<f32>> {
    predict(model, queries, k, Reduction::MajorityVote)
}

/// Mean of the `k` nearest labels for every query row.
pub fn regress(model: &KdTree, queries: &[Vec<f32>], k: usize) -> Result<Vec<f32>> {
    predict(model, queries, k, Reduction::Mean)
}

/// A fit/predict estimator over a k-d tree.
///
/// Classifier and regressor are the same type with a different [`Reduction`].
#[derive(Debug, Clone)]
pub struct KNeighbors {
    k: usize,
    options: BuildOptions,
    reduction: Reduction,
    model: Option<KdTree>,
}

impl KNeighbors {
    pub fn new(k: usize, options: BuildOptions, reduction: Reduction) -> Self {
        KNeighbors { k, options, reduction, model: None }
    }

    pub fn classifier(k: usize, p: f32) -> Self {
        Self::new(k, BuildOptions::new(p), Reduction::MajorityVote)
    }

    pub fn regressor(k: usize, p: f32) -> Self {
        Self::new(k, BuildOptions::new(p), Reduction::Mean)
    }

    /// Builds the index over the training set, replacing any previous one.
    /// On failure the estimator is left unfitted.
    pub fn fit(&mut self, points: &[Vec<f32>], labels: &[f32]) -> Result<()> {
        self.model = None;
        let model = KdTree::build_with(points, labels, &self.options)?;
        if self.k > model.n_samples() {
            warn!(
                "k = {} exceeds the {} training samples; predictions will be rejected",
                self.k,
                model.n_samples()
            );
        }
        self.model = Some(model);
        Ok(())
    }

    pub fn predict(&self, queries: &[Vec<f32>]) -> Result<Vec<f32>> {
        let model = self.model.as_ref().ok_or(KnnError::NotFitted)?;
        predict(model, queries, self.k, self.reduction)
    }

    pub fn predict_single(&self, query: &[f32]) -> Result<f32> {
        let model = self.model.as_ref().ok_or(KnnError::NotFitted)?;
        model.check_k(self.k)?;
        Ok(self.reduction.reduce(&model.knn(query, self.k)?))
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&KdTree> {
        self.model.as_ref()
    }
}
