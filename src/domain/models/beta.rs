//! Beta-Bernoulli math kernel.
//!
//! Everything the bandit needs to reason about a single arm lives here:
//! posterior moments, a credible-interval confidence score, the UCB1 bound
//! used for deterministic selection, and the samplers behind Thompson
//! Sampling.
//!
//! ## Sampling
//!
//! Beta draws are composed from two independent Gamma draws
//! (`X ~ Gamma(a, 1)`, `Y ~ Gamma(b, 1)`, `X / (X + Y) ~ Beta(a, b)`).
//! Gamma draws use Marsaglia-Tsang rejection for `shape >= 1` and the
//! Ahrens-Dieter boost `Gamma(s) = Gamma(1 + s) * U^(1/s)` below that.
//! Standard normal variates come from the polar form of Box-Muller.
//!
//! All samplers take the RNG by reference so callers decide between a
//! seeded generator (reproducible runs, tests) and OS entropy.

use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// UCB bonus applied when there is no trial history at all.
pub const NO_HISTORY_UCB_BONUS: f64 = 0.5;

/// Lower bound of the confidence score.
pub const MIN_CONFIDENCE: f64 = 0.05;

/// Upper bound of the confidence score.
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Multiplier turning a standard deviation into a ~95% credible-interval width.
const CREDIBLE_WIDTH_SIGMAS: f64 = 4.0;

// ---------------------------------------------------------------------------
// BetaDistribution
// ---------------------------------------------------------------------------

/// A Beta distribution parameterised by `alpha` and `beta`, used as the
/// conjugate posterior for a strategy's Bernoulli success rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaDistribution {
    /// One plus the (decayed) number of successes.
    pub alpha: f64,
    /// One plus the (decayed) number of failures.
    pub beta: f64,
}

impl BetaDistribution {
    /// A uniform (uninformative) prior: Beta(1, 1).
    pub const fn uniform() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }

    /// Create a distribution with the given parameters.
    pub const fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    /// Expected success rate: `alpha / (alpha + beta)`.
    pub fn mean(&self) -> f64 {
        beta_mean(self.alpha, self.beta)
    }

    /// Posterior variance.
    pub fn variance(&self) -> f64 {
        beta_variance(self.alpha, self.beta)
    }

    /// How sure we are about [`mean`](Self::mean), in `[0.05, 0.99]`.
    pub fn confidence(&self) -> f64 {
        beta_confidence(self.alpha, self.beta)
    }

    /// Upper confidence bound given the total trial count across competing arms.
    pub fn ucb(&self, total_trials: f64) -> f64 {
        beta_ucb(self.alpha, self.beta, total_trials)
    }

    /// Amount of (decayed) evidence behind this posterior, i.e. the trial count
    /// above the uniform prior.
    pub fn evidence(&self) -> f64 {
        (self.alpha - 1.0).max(0.0) + (self.beta - 1.0).max(0.0)
    }

    /// Draw one sample from the distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        sample_beta(rng, self.alpha, self.beta)
    }

    /// Shrink accumulated evidence toward the uniform prior by `factor`
    /// (`1.0` keeps everything, `0.0` forgets everything). Both parameters
    /// stay floored at 1.
    pub fn decayed(&self, factor: f64) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        Self {
            alpha: (1.0 + (self.alpha - 1.0) * factor).max(1.0),
            beta: (1.0 + (self.beta - 1.0) * factor).max(1.0),
        }
    }

    /// Add another posterior's evidence to this one.
    pub fn combined(&self, other: &Self) -> Self {
        Self {
            alpha: self.alpha + (other.alpha - 1.0).max(0.0),
            beta: self.beta + (other.beta - 1.0).max(0.0),
        }
    }
}

impl Default for BetaDistribution {
    fn default() -> Self {
        Self::uniform()
    }
}

// ---------------------------------------------------------------------------
// Closed-form moments
// ---------------------------------------------------------------------------

/// Mean of Beta(alpha, beta).
pub fn beta_mean(alpha: f64, beta: f64) -> f64 {
    let sum = alpha + beta;
    if sum <= 0.0 {
        0.5
    } else {
        alpha / sum
    }
}

/// Variance of Beta(alpha, beta): `ab / ((a+b)^2 (a+b+1))`.
pub fn beta_variance(alpha: f64, beta: f64) -> f64 {
    let sum = alpha + beta;
    if sum <= 0.0 {
        return 0.0;
    }
    (alpha * beta) / (sum.powi(2) * (sum + 1.0))
}

/// Confidence derived from the width of the ~95% credible interval.
///
/// A narrower interval means more evidence and therefore more confidence.
/// This is not the expected success rate; see [`beta_mean`] for that.
pub fn beta_confidence(alpha: f64, beta: f64) -> f64 {
    let width = CREDIBLE_WIDTH_SIGMAS * beta_variance(alpha, beta).sqrt();
    (1.0 - width).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// UCB1 score: `mean + sqrt(2 ln(total) / max(arm_trials, 1))`.
///
/// With no trial history (`total_trials < 1`) the bonus is a flat
/// [`NO_HISTORY_UCB_BONUS`] so unseen arms still get explored.
pub fn beta_ucb(alpha: f64, beta: f64, total_trials: f64) -> f64 {
    let mean = beta_mean(alpha, beta);
    if total_trials.is_nan() || total_trials < 1.0 {
        return mean + NO_HISTORY_UCB_BONUS;
    }
    let arm_trials = ((alpha - 1.0).max(0.0) + (beta - 1.0).max(0.0)).max(1.0);
    mean + (2.0 * total_trials.ln() / arm_trials).sqrt()
}

// ---------------------------------------------------------------------------
// Samplers
// ---------------------------------------------------------------------------

/// Standard normal variate via the polar Box-Muller method.
pub fn sample_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u = 2.0 * rng.random::<f64>() - 1.0;
        let v = 2.0 * rng.random::<f64>() - 1.0;
        let s = u * u + v * v;
        if s > 0.0 && s < 1.0 {
            return u * (-2.0 * s.ln() / s).sqrt();
        }
    }
}

/// Gamma(shape, scale) variate.
///
/// Returns `0.0` for non-positive or non-finite parameters.
pub fn sample_gamma<R: Rng + ?Sized>(rng: &mut R, shape: f64, scale: f64) -> f64 {
    if !(shape.is_finite() && scale.is_finite()) || shape <= 0.0 || scale <= 0.0 {
        return 0.0;
    }

    if shape < 1.0 {
        let u: f64 = rng.random();
        return sample_gamma(rng, shape + 1.0, scale) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();

    loop {
        let x = sample_normal(rng);
        let t = 1.0 + c * x;
        if t <= 0.0 {
            continue;
        }
        let v = t * t * t;
        let u: f64 = rng.random();

        if u < 1.0 - 0.0331 * x.powi(4) {
            return d * v * scale;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v * scale;
        }
    }
}

/// Beta(alpha, beta) variate composed from two Gamma draws.
pub fn sample_beta<R: Rng + ?Sized>(rng: &mut R, alpha: f64, beta: f64) -> f64 {
    let x = sample_gamma(rng, alpha, 1.0);
    let y = sample_gamma(rng, beta, 1.0);
    let sum = x + y;
    if sum <= 0.0 || !sum.is_finite() {
        return 0.5;
    }
    x / sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DRAWS: usize = 40_000;

    fn moments(samples: &[f64]) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (mean, var)
    }

    #[test]
    fn test_uniform_moments() {
        let d = BetaDistribution::uniform();
        assert!((d.mean() - 0.5).abs() < f64::EPSILON);
        assert!((d.variance() - 1.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_beta_mean_and_variance_closed_form() {
        assert!((beta_mean(3.0, 1.0) - 0.75).abs() < f64::EPSILON);
        // 2*5 / (49 * 8)
        assert!((beta_variance(2.0, 5.0) - 10.0 / 392.0).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_is_floored_for_uniform_prior() {
        assert!((beta_confidence(1.0, 1.0) - MIN_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_grows_with_evidence() {
        let weak = beta_confidence(3.0, 3.0);
        let strong = beta_confidence(300.0, 300.0);
        assert!(strong > weak);
        assert!(strong <= MAX_CONFIDENCE);
    }

    #[test]
    fn test_confidence_differs_from_mean() {
        // A heavily failing arm is confidently bad.
        let d = BetaDistribution::new(2.0, 200.0);
        assert!(d.mean() < 0.05);
        assert!(d.confidence() > 0.9);
    }

    #[test]
    fn test_ucb_without_history_adds_flat_bonus() {
        assert!((beta_ucb(1.0, 1.0, 0.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ucb1_bound() {
        // mean = 0.75, arm trials = 4, total = 10
        let expected = 0.75 + (2.0 * 10f64.ln() / 4.0).sqrt();
        assert!((beta_ucb(4.0, 2.0, 10.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_decayed_halves_evidence() {
        let d = BetaDistribution::new(9.0, 5.0).decayed(0.5);
        assert!((d.alpha - 5.0).abs() < 1e-12);
        assert!((d.beta - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_decayed_never_drops_below_prior() {
        let d = BetaDistribution::new(1.0, 4.0).decayed(0.0);
        assert_eq!(d, BetaDistribution::uniform());
    }

    #[test]
    fn test_normal_moments() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples: Vec<f64> = (0..DRAWS).map(|_| sample_normal(&mut rng)).collect();
        let (mean, var) = moments(&samples);
        assert!(mean.abs() < 0.03, "normal mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "normal variance {var}");
    }

    #[test]
    fn test_gamma_moments_shape_above_one() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples: Vec<f64> = (0..DRAWS).map(|_| sample_gamma(&mut rng, 2.5, 2.0)).collect();
        let (mean, var) = moments(&samples);
        // mean = k*theta = 5, var = k*theta^2 = 10
        assert!((mean - 5.0).abs() < 0.1, "gamma mean {mean}");
        assert!((var - 10.0).abs() < 0.6, "gamma variance {var}");
    }

    #[test]
    fn test_gamma_moments_shape_below_one() {
        let mut rng = StdRng::seed_from_u64(13);
        let samples: Vec<f64> = (0..DRAWS).map(|_| sample_gamma(&mut rng, 0.5, 1.0)).collect();
        let (mean, var) = moments(&samples);
        assert!((mean - 0.5).abs() < 0.02, "gamma mean {mean}");
        assert!((var - 0.5).abs() < 0.05, "gamma variance {var}");
        assert!(samples.iter().all(|x| *x >= 0.0));
    }

    #[test]
    fn test_gamma_rejects_invalid_parameters() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_gamma(&mut rng, 0.0, 1.0), 0.0);
        assert_eq!(sample_gamma(&mut rng, f64::NAN, 1.0), 0.0);
    }

    #[test]
    fn test_beta_sample_moments() {
        let mut rng = StdRng::seed_from_u64(17);
        let samples: Vec<f64> = (0..DRAWS).map(|_| sample_beta(&mut rng, 2.0, 5.0)).collect();
        let (mean, var) = moments(&samples);
        assert!((mean - 2.0 / 7.0).abs() < 0.01, "beta mean {mean}");
        assert!((var - 10.0 / 392.0).abs() < 0.003, "beta variance {var}");
        assert!(samples.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_beta_sample_small_shapes_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(19);
        let d = BetaDistribution::new(0.3, 0.7);
        for _ in 0..1_000 {
            let s = d.sample(&mut rng);
            assert!((0.0..=1.0).contains(&s), "sample {s} out of [0,1]");
        }
    }
}
