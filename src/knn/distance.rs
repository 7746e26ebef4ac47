//! Minkowski distances of order `p`.
//!
//! `p = 1` is Manhattan, `p = 2` is Euclidean and `p = +inf` is the Chebyshev
//! limit. The common orders are evaluated without calling `powf`.

use crate::error::{KnnError, Result};
use num_traits::Float;

/// Distance metric resolved once from a Minkowski order.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KnnDistance {
    Manhattan,
    Euclidean,
    Chebyshev,
    Minkowski { p: f32 },
}

impl KnnDistance {
    /// Picks the metric for order `p`. Fails if `p` is NaN or not positive.
    pub fn from_order(p: f32) -> Result<Self> {
        validate_order(p)?;
        Ok(if p == 1.0 {
            KnnDistance::Manhattan
        } else if p == 2.0 {
            KnnDistance::Euclidean
        } else if p.is_infinite() {
            KnnDistance::Chebyshev
        } else {
            KnnDistance::Minkowski { p }
        })
    }

    pub fn order(&self) -> f32 {
        match *self {
            KnnDistance::Manhattan => 1.0,
            KnnDistance::Euclidean => 2.0,
            KnnDistance::Chebyshev => f32::INFINITY,
            KnnDistance::Minkowski { p } => p,
        }
    }

    /// Distance between two points of equal length. Lengths are not re-checked here;
    /// callers validate dimensionality once per query.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match *self {
            KnnDistance::Manhattan => manhattan(a, b),
            KnnDistance::Euclidean => euclidean(a, b),
            KnnDistance::Chebyshev => chebyshev(a, b),
            KnnDistance::Minkowski { p } => minkowski(a, b, p),
        }
    }

    /// Distance between two points that differ only on one axis, by `diff`.
    ///
    /// Evaluated the same way as [`KnnDistance::distance`], so it never exceeds
    /// the computed distance to a point whose gap on that axis is at least
    /// `|diff|`. This makes it a safe pruning bound under rounding.
    #[inline]
    pub fn axis_distance(&self, diff: f32) -> f32 {
        let gap = diff.abs();
        match *self {
            KnnDistance::Manhattan | KnnDistance::Chebyshev => gap,
            KnnDistance::Euclidean => (gap * gap).sqrt(),
            KnnDistance::Minkowski { p } => gap.powf(p).powf(p.recip()),
        }
    }
}

/// Computes `(sum |a_i - b_i|^p)^(1/p)`.
///
/// Fails with `InvalidArgument` if `p <= 0`, `p` is NaN, or the slices differ in length.
pub fn minkowski_distance<F: Float>(a: &[F], b: &[F], p: F) -> Result<F> {
    validate_order(p)?;
    if a.len() != b.len() {
        return Err(KnnError::InvalidArgument(format!(
            "points must have the same dimensionality, got {} and {}",
            a.len(),
            b.len()
        )));
    }
    let one = F::one();
    Ok(if p == one {
        manhattan(a, b)
    } else if p == one + one {
        euclidean(a, b)
    } else if p.is_infinite() {
        chebyshev(a, b)
    } else {
        minkowski(a, b, p)
    })
}

fn validate_order<F: Float>(p: F) -> Result<()> {
    if p.is_nan() || p <= F::zero() {
        return Err(KnnError::InvalidArgument(format!(
            "Minkowski order must be positive, got {}",
            p.to_f64().unwrap_or(f64::NAN)
        )));
    }
    Ok(())
}

fn manhattan<F: Float>(a: &[F], b: &[F]) -> F {
    a.iter()
        .zip(b.iter())
        .fold(F::zero(), |acc, (&x, &y)| acc + (x - y).abs())
}

fn euclidean<F: Float>(a: &[F], b: &[F]) -> F {
    a.iter()
        .zip(b.iter())
        .fold(F::zero(), |acc, (&x, &y)| {
            let diff = x - y;
            acc + diff * diff
        })
        .sqrt()
}

fn chebyshev<F: Float>(a: &[F], b: &[F]) -> F {
    a.iter()
        .zip(b.iter())
        .fold(F::zero(), |acc, (&x, &y)| acc.max((x - y).abs()))
}

fn minkowski<F: Float>(a: &[F], b: &[F], p: F) -> F {
    a.iter()
        .zip(b.iter())
        .fold(F::zero(), |acc, (&x, &y)| acc + (x - y).abs().powf(p))
        .powf(p.recip())
}
