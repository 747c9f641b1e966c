use crate::error::{Error, Result};
use num_traits::Float;
use rand::Rng;
use rand_distr::{Distribution, Exp};
use std::cmp::Ordering;
use uom::si::f64::Frequency;
use uom::si::frequency::hertz;

/// Scale factor between the median absolute deviation and the standard
/// deviation of a normal distribution.
const MAD_TO_SIGMA: f64 = 0.6745;

#[derive(Debug)]
/// An iterator over a Poisson process.
///
/// The iterator yields times (in seconds) at which events occur in a Poisson
/// process. Times are guaranteed to be in increasing order and their
/// inter-arrival time follows an exponential distribution with the specified
/// rate parameter.
///
/// # Examples
///
/// ```
/// use cytosim::statistics::PoissonProcess;
/// use rand::{rngs::StdRng, SeedableRng};
/// use uom::si::{f64::Frequency, frequency::kilohertz};
///
/// let rng = StdRng::seed_from_u64(7);
/// let process = PoissonProcess::new(Frequency::new::<kilohertz>(1.0), rng)?;
/// let arrivals: Vec<f64> = process.take_while(|&t| t <= 1.0).collect();
///
/// assert!(arrivals.windows(2).all(|w| w[0] < w[1]));
/// # Ok::<(), cytosim::Error>(())
/// ```
pub struct PoissonProcess<R> {
    time: f64,
    exp: Exp<f64>,
    rng: R,
}

impl<R> PoissonProcess<R>
where
    R: Rng,
{
    /// Create a new Poisson process with the specified rate parameter.
    pub fn new(rate: Frequency, rng: R) -> Result<Self> {
        let lambda = rate.get::<hertz>();

        Ok(Self {
            time: 0.0,
            exp: Exp::new(lambda).map_err(|e| Error::distribution("exponential", e))?,
            rng,
        })
    }
}

impl<R> Iterator for PoissonProcess<R>
where
    R: Rng,
{
    type Item = f64;

    fn next(&mut self) -> Option<Self::Item> {
        let delta_t = self.exp.sample(&mut self.rng);
        self.time += delta_t;

        Some(self.time)
    }
}

fn sorted<T: Float>(values: &[T]) -> Vec<T> {
    let mut values = values.to_vec();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    values
}

/// Median of `values`. Returns `None` for an empty slice.
pub fn median<T: Float>(values: &[T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    let values = sorted(values);
    let mid = values.len() / 2;
    let two = T::one() + T::one();

    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / two)
    } else {
        Some(values[mid])
    }
}

/// Robust estimate of the standard deviation from the median absolute
/// deviation.
pub fn mad_sigma<T: Float>(values: &[T]) -> Option<T> {
    let center = median(values)?;
    let deviations: Vec<T> = values.iter().map(|&v| (v - center).abs()).collect();
    let mad = median(&deviations)?;

    T::from(MAD_TO_SIGMA).map(|scale| mad / scale)
}

/// Mean and mean of squares.
pub fn raw_moments<T: Float>(values: &[T]) -> Option<(T, T)> {
    if values.is_empty() {
        return None;
    }
    let n = T::from(values.len())?;
    let (sum, sum_sq) = values
        .iter()
        .fold((T::zero(), T::zero()), |(s, sq), &v| (s + v, sq + v * v));

    Some((sum / n, sum_sq / n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn poisson_process_increasing() {
        let rng = StdRng::seed_from_u64(1);
        let process = PoissonProcess::new(Frequency::new::<hertz>(100.0), rng).unwrap();
        let times: Vec<f64> = process.take(1000).collect();

        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn poisson_process_rate() {
        let rng = StdRng::seed_from_u64(2);
        let process = PoissonProcess::new(Frequency::new::<hertz>(1000.0), rng).unwrap();
        let count = process.take_while(|&t| t <= 10.0).count();

        // 10_000 expected, standard deviation 100.
        assert!((9_500..10_500).contains(&count), "count = {count}");
    }

    #[test]
    fn poisson_process_invalid_rate() {
        let rng = StdRng::seed_from_u64(3);
        assert!(PoissonProcess::new(Frequency::new::<hertz>(-1.0), rng).is_err());
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median::<f64>(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn mad_sigma_of_constant_is_zero() {
        assert_eq!(mad_sigma(&[5.0; 10]), Some(0.0));
    }

    #[test]
    fn mad_sigma_ignores_outliers() {
        let mut values = vec![0.0, 1.0, -1.0, 1.0, -1.0, 0.0, 1.0, -1.0];
        let baseline = mad_sigma(&values).unwrap();
        values.push(1e6);
        let with_outlier = mad_sigma(&values).unwrap();

        assert!((baseline - 1.0 / 0.6745).abs() < 1e-12);
        assert!((with_outlier - baseline).abs() < 1e-12);
    }

    #[test]
    fn raw_moments_values() {
        let (mean, mean_sq) = raw_moments(&[1.0, 2.0, 3.0]).unwrap();
        assert!((mean - 2.0).abs() < 1e-12);
        assert!((mean_sq - 14.0 / 3.0).abs() < 1e-12);
        assert_eq!(raw_moments::<f64>(&[]), None);
    }
}
