use rand::Rng;
use rand_distr::{Distribution, Exp1, StandardNormal};

/// A box in `R^n`: each dimension is bounded by an interval, possibly infinite.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxSpace {
    low: Vec<f32>,
    high: Vec<f32>,
}

impl BoxSpace {
    /// Creates a box from per-dimension lower and upper bounds.
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Self {
        assert_eq!(low.len(), high.len(), "Bounds must have the same dimension");
        assert!(
            low.iter().zip(&high).all(|(lo, hi)| lo <= hi),
            "Lower bounds must not exceed upper bounds"
        );
        Self { low, high }
    }

    /// Creates a box with the same bounds in every dimension.
    pub fn uniform(low: f32, high: f32, dim: usize) -> Self {
        Self::new(vec![low; dim], vec![high; dim])
    }

    /// Creates a box spanning all of `R^dim`.
    pub fn unbounded(dim: usize) -> Self {
        Self::uniform(f32::NEG_INFINITY, f32::INFINITY, dim)
    }

    pub fn low(&self) -> &[f32] {
        &self.low
    }

    pub fn high(&self) -> &[f32] {
        &self.high
    }

    /// The number of dimensions.
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    /// Returns true if the value has the right dimension and lies within the bounds.
    pub fn contains(&self, value: &[f32]) -> bool {
        value.len() == self.dim()
            && value
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi)
    }

    /// Draws a random point from the box.
    ///
    /// Bounded dimensions are sampled uniformly, half-bounded dimensions from
    /// a shifted exponential distribution and unbounded dimensions from a
    /// standard normal distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f32> {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(&lo, &hi)| match (lo.is_finite(), hi.is_finite()) {
                (true, true) if lo == hi => lo,
                (true, true) => rng.gen_range(lo..=hi),
                (true, false) => {
                    let offset: f32 = Exp1.sample(rng);
                    lo + offset
                }
                (false, true) => {
                    let offset: f32 = Exp1.sample(rng);
                    hi - offset
                }
                (false, false) => StandardNormal.sample(rng),
            })
            .collect()
    }
}
