//! Weighted choice of the next growth site.
//!
//! Weights are laid out as a prefix sum; a uniform draw scaled by the total is located
//! in that array with a binary search that falls back to a linear scan once the
//! window is small.

use rand::Rng;

/// Window size below which the search scans linearly.
pub const BINARY_THRESHOLD: usize = 4;

/// Growth weight of a frontier cell: `charge^eta` for free cells with positive potential, else 0.
#[inline(always)]
pub fn site_weight(charge: f64, state: i32, eta: f64) -> f64 {
    if state > 0 || charge <= 0.0 {
        return 0.0;
    }
    let weight = charge.powf(eta);
    if weight.is_finite() { weight } else { 0.0 }
}

/// Replaces `cumulative` with the running sum of `weights` and returns the total.
pub fn build_cumulative<I>(weights: I, cumulative: &mut Vec<f64>) -> f64
where
    I: IntoIterator<Item = f64>,
{
    cumulative.clear();
    let mut total = 0.0;
    for weight in weights {
        total += weight;
        cumulative.push(total);
    }
    total
}

#[inline(always)]
fn locate_value_linear(target: f64, list: &[f64]) -> Option<usize> {
    list.iter().position(|&v| target < v)
}

/// Index of the first prefix sum strictly greater than `target`, or `None` if there is none.
pub fn locate_value(target: f64, list: &[f64]) -> Option<usize> {
    if list.is_empty() {
        return None;
    }
    let mut left = 0;
    let mut right = list.len() - 1;
    while left < right {
        if right - left + 1 < BINARY_THRESHOLD {
            return locate_value_linear(target, &list[left..=right]).map(|i| left + i);
        }
        let mid = left + (right - left) / 2;
        if target < list[mid] {
            right = mid;
        } else {
            left = mid + 1;
        }
    }
    (target < list[right]).then_some(right)
}

/// Picks one entry of a cumulative weight array.
///
/// Implementations own their source of randomness; the simulation holds exactly one
/// sampler so that every execution model consumes the same sequence of draws.
pub trait SiteSampler {
    /// Returns the chosen index, or `None` when the total weight is zero.
    fn pick(&mut self, cumulative: &[f64]) -> Option<usize>;
}

/// Draws `breach = U(0,1) * total` and locates it in the prefix sums.
#[derive(Debug, Clone)]
pub struct WeightedSampler<R> {
    rng: R,
}

impl<R: Rng> WeightedSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> SiteSampler for WeightedSampler<R> {
    fn pick(&mut self, cumulative: &[f64]) -> Option<usize> {
        let total = *cumulative.last()?;
        if total <= 0.0 {
            return None;
        }
        let breach = self.rng.random::<f64>() * total;
        locate_value(breach, cumulative)
    }
}

impl<S: SiteSampler + ?Sized> SiteSampler for Box<S> {
    fn pick(&mut self, cumulative: &[f64]) -> Option<usize> {
        (**self).pick(cumulative)
    }
}
