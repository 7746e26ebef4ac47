//! This module contains common data structures shared by the index and the predictors.

/// Represents a single training sample, with features and a numeric label.
///
/// Labels are stored as `f32` for both classification and regression; class
/// identity is encoded numerically.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub features: Vec<f32>,
    pub label: f32,
}

impl DataPoint {
    pub fn new(features: Vec<f32>, label: f32) -> Self {
        DataPoint { features, label }
    }

    pub fn dimensionality(&self) -> usize {
        self.features.len()
    }
}

impl From<(Vec<f32>, f32)> for DataPoint {
    fn from((features, label): (Vec<f32>, f32)) -> Self {
        DataPoint { features, label }
    }
}
