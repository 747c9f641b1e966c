//! Distributions of particle properties (diameter, refractive index).
use crate::error::{Error, Result};
use log::debug;
use rand::Rng;
use rand_distr::Distribution as _;

/// Keeps the inverse CDF away from its singular end points.
const PROBABILITY_CLIP: f64 = 1e-12;

/// A distribution of a scalar particle property, in SI units.
///
/// # Examples
///
/// ```
/// use cytosim::distribution::Distribution;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let diameter = Distribution::Normal { mean: 200e-9, std_dev: 10e-9 };
/// let samples = diameter.generate(100, &mut rng)?;
///
/// assert_eq!(samples.len(), 100);
/// # Ok::<(), cytosim::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Distribution {
    /// Every sample takes the same value.
    Delta(f64),
    Normal { mean: f64, std_dev: f64 },
    /// `ln(x)` is normally distributed with mean `mu` and standard deviation
    /// `sigma`.
    LogNormal { mu: f64, sigma: f64 },
    Uniform { lower: f64, upper: f64 },
    Weibull { shape: f64, scale: f64 },
    /// Rosin-Rammler size distribution, `F(x) = 1 - exp(-(x/d)^k)`, optionally
    /// truncated to `x >= cutoff` through its inverse CDF.
    RosinRammler {
        characteristic: f64,
        spread: f64,
        cutoff: Option<f64>,
    },
    /// Rejection-sampling wrapper that never returns values below `minimum`.
    AtLeast {
        base: Box<Distribution>,
        minimum: f64,
        oversample_factor: usize,
        maximum_rounds: usize,
    },
}

impl Distribution {
    /// Draw `n` samples.
    pub fn generate<R>(&self, n: usize, rng: &mut R) -> Result<Vec<f64>>
    where
        R: Rng + ?Sized,
    {
        if n == 0 {
            return Ok(Vec::new());
        }

        match self {
            Distribution::Delta(value) => Ok(vec![*value; n]),
            Distribution::Normal { mean, std_dev } => {
                let dist = rand_distr::Normal::new(*mean, *std_dev)
                    .map_err(|e| Error::distribution("normal", e))?;
                Ok(dist.sample_iter(rng).take(n).collect())
            }
            Distribution::LogNormal { mu, sigma } => {
                let dist = rand_distr::LogNormal::new(*mu, *sigma)
                    .map_err(|e| Error::distribution("log-normal", e))?;
                Ok(dist.sample_iter(rng).take(n).collect())
            }
            Distribution::Uniform { lower, upper } => {
                let dist = rand_distr::Uniform::new_inclusive(*lower, *upper)
                    .map_err(|e| Error::distribution("uniform", e))?;
                Ok(dist.sample_iter(rng).take(n).collect())
            }
            Distribution::Weibull { shape, scale } => {
                let dist = rand_distr::Weibull::new(*scale, *shape)
                    .map_err(|e| Error::distribution("weibull", e))?;
                Ok(dist.sample_iter(rng).take(n).collect())
            }
            Distribution::RosinRammler {
                characteristic,
                spread,
                cutoff,
            } => rosin_rammler(*characteristic, *spread, *cutoff, n, rng),
            Distribution::AtLeast {
                base,
                minimum,
                oversample_factor,
                maximum_rounds,
            } => {
                let mut accepted = Vec::with_capacity(n);

                for round in 0..*maximum_rounds {
                    let remaining = n - accepted.len();
                    let candidates = base.generate((remaining * oversample_factor).max(1), rng)?;
                    accepted.extend(candidates.into_iter().filter(|v| v >= minimum));

                    if accepted.len() >= n {
                        debug!("fraction selection accepted {n} samples after {} rounds", round + 1);
                        accepted.truncate(n);
                        return Ok(accepted);
                    }
                }

                Err(Error::FractionSelectionExhausted {
                    minimum: *minimum,
                    rounds: *maximum_rounds,
                    missing: n - accepted.len(),
                })
            }
        }
    }

    /// Fraction of the distribution at or above `cutoff`, `P(X >= cutoff)`.
    ///
    /// Only the Rosin-Rammler distribution has a closed form; `None` is
    /// returned for the others.
    pub fn survival_fraction_above(&self, cutoff: f64) -> Option<f64> {
        match self {
            Distribution::RosinRammler {
                characteristic,
                spread,
                ..
            } => {
                if cutoff <= 0.0 {
                    return Some(1.0);
                }
                let survival = (-(cutoff / characteristic).powf(*spread)).exp();
                Some(survival.clamp(0.0, 1.0))
            }
            Distribution::Delta(value) => Some(if *value >= cutoff { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

fn rosin_rammler<R>(
    characteristic: f64,
    spread: f64,
    cutoff: Option<f64>,
    n: usize,
    rng: &mut R,
) -> Result<Vec<f64>>
where
    R: Rng + ?Sized,
{
    if !(spread > 0.0) {
        return Err(Error::distribution("rosin-rammler", "spread must be positive"));
    }
    let cutoff = match cutoff {
        Some(c) if c < 0.0 => {
            return Err(Error::distribution("rosin-rammler", "cutoff must be non negative"))
        }
        Some(c) if c > 0.0 => Some(c),
        _ => None,
    };
    let cdf_at_cutoff = cutoff
        .map(|c| (1.0 - (-(c / characteristic).powf(spread)).exp()).clamp(0.0, 1.0 - 1e-15))
        .unwrap_or(0.0);

    Ok((0..n)
        .map(|_| {
            let u: f64 = rng.random::<f64>().clamp(PROBABILITY_CLIP, 1.0 - PROBABILITY_CLIP);
            let p = (cdf_at_cutoff + u * (1.0 - cdf_at_cutoff))
                .clamp(PROBABILITY_CLIP, 1.0 - PROBABILITY_CLIP);
            let x = characteristic * (-(1.0 - p).ln()).powf(1.0 / spread);
            cutoff.map_or(x, |c| x.max(c))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::raw_moments;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn delta_is_constant() {
        let samples = Distribution::Delta(1.5).generate(10, &mut rng()).unwrap();
        assert_eq!(samples, vec![1.5; 10]);
    }

    #[test]
    fn zero_samples_is_empty() {
        let dist = Distribution::Normal {
            mean: 1.0,
            std_dev: -1.0,
        };
        assert!(dist.generate(0, &mut rng()).unwrap().is_empty());
    }

    #[test]
    fn normal_moments() {
        let dist = Distribution::Normal {
            mean: 10.0,
            std_dev: 1.0,
        };
        let samples = dist.generate(20_000, &mut rng()).unwrap();
        let (mean, _) = raw_moments(&samples).unwrap();
        assert!((mean - 10.0).abs() < 0.05);
    }

    #[test]
    fn invalid_parameters() {
        let dist = Distribution::Normal {
            mean: 1.0,
            std_dev: -1.0,
        };
        assert!(matches!(
            dist.generate(3, &mut rng()),
            Err(Error::InvalidDistribution { .. })
        ));

        let dist = Distribution::Uniform {
            lower: 2.0,
            upper: 1.0,
        };
        assert!(dist.generate(3, &mut rng()).is_err());

        let dist = Distribution::RosinRammler {
            characteristic: 1.0,
            spread: 0.0,
            cutoff: None,
        };
        assert!(dist.generate(3, &mut rng()).is_err());
    }

    #[test]
    fn uniform_within_bounds() {
        let dist = Distribution::Uniform {
            lower: 1.33,
            upper: 1.40,
        };
        let samples = dist.generate(1000, &mut rng()).unwrap();
        assert!(samples.iter().all(|v| (1.33..=1.40).contains(v)));
    }

    #[test]
    fn rosin_rammler_respects_cutoff() {
        let dist = Distribution::RosinRammler {
            characteristic: 100e-9,
            spread: 2.0,
            cutoff: Some(120e-9),
        };
        let samples = dist.generate(5000, &mut rng()).unwrap();
        assert!(samples.iter().all(|&v| v >= 120e-9));
    }

    #[test]
    fn rosin_rammler_survival_fraction() {
        let dist = Distribution::RosinRammler {
            characteristic: 100e-9,
            spread: 1.0,
            cutoff: None,
        };
        let survival = dist.survival_fraction_above(100e-9).unwrap();
        assert!((survival - (-1.0f64).exp()).abs() < 1e-12);
        assert_eq!(dist.survival_fraction_above(0.0), Some(1.0));
        assert_eq!(
            Distribution::Normal {
                mean: 0.0,
                std_dev: 1.0
            }
            .survival_fraction_above(0.0),
            None
        );
    }

    #[test]
    fn at_least_filters() {
        let dist = Distribution::AtLeast {
            base: Box::new(Distribution::Uniform {
                lower: 0.0,
                upper: 1.0,
            }),
            minimum: 0.5,
            oversample_factor: 4,
            maximum_rounds: 50,
        };
        let samples = dist.generate(500, &mut rng()).unwrap();
        assert_eq!(samples.len(), 500);
        assert!(samples.iter().all(|&v| v >= 0.5));
    }

    #[test]
    fn at_least_exhausted() {
        let dist = Distribution::AtLeast {
            base: Box::new(Distribution::Delta(1.0)),
            minimum: 2.0,
            oversample_factor: 4,
            maximum_rounds: 3,
        };
        match dist.generate(10, &mut rng()) {
            Err(Error::FractionSelectionExhausted {
                rounds, missing, ..
            }) => {
                assert_eq!(rounds, 3);
                assert_eq!(missing, 10);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
