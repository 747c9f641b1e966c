//! Multi-channel signal buffer sharing one time axis.
use crate::error::{Error, Result};
use crate::filter::AnalogFilter;
use crate::numeric::{convolve_same, gaussian_kernel};
use rand::Rng;
use rand_distr::{Distribution, Gamma, Normal, Poisson};

/// Pulses are evaluated within this many standard deviations of their center.
const PULSE_SUPPORT: f64 = 10.0;

/// Named channels of identical length aligned on a shared, non-decreasing
/// time axis.
///
/// Channels are created lazily (zero-initialized) and only modified through
/// additive or element-wise operations.
///
/// # Examples
///
/// ```
/// use cytosim::numeric::linspace;
/// use cytosim::signal::SignalGenerator;
///
/// let mut signal = SignalGenerator::new(linspace(0.0, 1.0, 101))?;
/// signal.create_zero_signal("fsc");
/// signal.add_constant(2.0);
/// signal.generate_pulses_to_signal("fsc", &[0.5], &[0.05], &[1.0], 0.0)?;
///
/// let fsc = signal.get_signal("fsc")?;
/// assert_eq!(fsc.len(), 101);
/// assert!((fsc[50] - 3.0).abs() < 1e-12);
/// # Ok::<(), cytosim::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SignalGenerator {
    time: Vec<f64>,
    channels: Vec<(String, Vec<f64>)>,
}

impl SignalGenerator {
    /// Returns an error if `time` is decreasing anywhere.
    pub fn new(time: Vec<f64>) -> Result<Self> {
        if time.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err(Error::invalid("time", "time axis must be non-decreasing"));
        }
        Ok(Self {
            time,
            channels: Vec::new(),
        })
    }

    /// Number of samples per channel.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn get_time(&self) -> &[f64] {
        &self.time
    }

    /// Channel names, in creation order.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.iter().any(|(name, _)| name == channel)
    }

    pub fn get_signal(&self, channel: &str) -> Result<&[f64]> {
        self.channels
            .iter()
            .find(|(name, _)| name == channel)
            .map(|(_, signal)| signal.as_slice())
            .ok_or_else(|| Error::UnknownChannel(channel.to_string()))
    }

    /// Allocate a zero channel if it does not exist yet.
    pub fn create_zero_signal(&mut self, channel: &str) {
        self.signal_mut(channel);
    }

    fn signal_mut(&mut self, channel: &str) -> &mut Vec<f64> {
        let index = match self.channels.iter().position(|(name, _)| name == channel) {
            Some(index) => index,
            None => {
                self.channels.push((channel.to_string(), vec![0.0; self.time.len()]));
                self.channels.len() - 1
            }
        };
        &mut self.channels[index].1
    }

    fn existing_mut(&mut self, channel: &str) -> Result<&mut Vec<f64>> {
        self.channels
            .iter_mut()
            .find(|(name, _)| name == channel)
            .map(|(_, signal)| signal)
            .ok_or_else(|| Error::UnknownChannel(channel.to_string()))
    }

    /// Mutable access to the selected channel, or to every channel when
    /// `channel` is `None`.
    fn selected_mut(&mut self, channel: Option<&str>) -> Result<Vec<&mut Vec<f64>>> {
        match channel {
            Some(channel) => Ok(vec![self.existing_mut(channel)?]),
            None => Ok(self.channels.iter_mut().map(|(_, signal)| signal).collect()),
        }
    }

    /// Add `value` to every channel.
    pub fn add_constant(&mut self, value: f64) {
        for (_, signal) in &mut self.channels {
            signal.iter_mut().for_each(|x| *x += value);
        }
    }

    pub fn add_constant_to_signal(&mut self, channel: &str, value: f64) {
        self.signal_mut(channel).iter_mut().for_each(|x| *x += value);
    }

    /// Multiply the selected channels by `factor`.
    pub fn multiply(&mut self, factor: f64, channel: Option<&str>) -> Result<()> {
        for signal in self.selected_mut(channel)? {
            signal.iter_mut().for_each(|x| *x *= factor);
        }
        Ok(())
    }

    /// Superpose one Gaussian pulse per `(center, sigma, amplitude)` triple on
    /// `channel`, on top of `base_level`:
    /// `signal[i] += base_level + Σ_p amplitude_p exp(-(t_i - center_p)² / (2 sigma_p²))`.
    pub fn generate_pulses_to_signal(
        &mut self,
        channel: &str,
        centers: &[f64],
        sigmas: &[f64],
        amplitudes: &[f64],
        base_level: f64,
    ) -> Result<()> {
        for other in [sigmas.len(), amplitudes.len()] {
            if other != centers.len() {
                return Err(Error::LengthMismatch {
                    expected: centers.len(),
                    found: other,
                });
            }
        }
        self.create_zero_signal(channel);
        let Self { time, channels } = self;
        let signal = channels
            .iter_mut()
            .find(|(name, _)| name == channel)
            .map(|(_, signal)| signal)
            .ok_or_else(|| Error::UnknownChannel(channel.to_string()))?;
        signal.iter_mut().for_each(|x| *x += base_level);

        for ((&center, &sigma), &amplitude) in centers.iter().zip(sigmas).zip(amplitudes) {
            if !(sigma > 0.0) {
                continue;
            }
            let inv_denom = 1.0 / (2.0 * sigma * sigma);
            let start = time.partition_point(|&t| t < center - PULSE_SUPPORT * sigma);
            let end = time.partition_point(|&t| t <= center + PULSE_SUPPORT * sigma);

            for (x, &t) in signal[start..end].iter_mut().zip(&time[start..end]) {
                let dt = t - center;
                *x += amplitude * (-dt * dt * inv_denom).exp();
            }
        }
        Ok(())
    }

    /// Draw one `Gamma(shape, scale)` sample per time step, smooth it with a
    /// Gaussian kernel of standard deviation `gaussian_sigma` samples, and add
    /// it to `channel`.
    ///
    /// The smoothed trace is returned so it can be rescaled onto other
    /// channels.
    pub fn add_gamma_trace_to_signal<R: Rng + ?Sized>(
        &mut self,
        channel: &str,
        shape: f64,
        scale: f64,
        gaussian_sigma: f64,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let gamma = Gamma::new(shape, scale).map_err(|e| Error::distribution("gamma", e))?;
        let raw: Vec<f64> = (0..self.len()).map(|_| gamma.sample(rng)).collect();
        let trace = convolve_same(&raw, &gaussian_kernel(gaussian_sigma));

        self.add_array_to_signal(channel, &trace)?;
        Ok(trace)
    }

    /// Element-wise add `array` to `channel`. The array must have exactly the
    /// length of the time axis.
    pub fn add_array_to_signal(&mut self, channel: &str, array: &[f64]) -> Result<()> {
        if array.len() != self.len() {
            return Err(Error::LengthMismatch {
                expected: self.len(),
                found: array.len(),
            });
        }
        let signal = self.signal_mut(channel);
        signal.iter_mut().zip(array).for_each(|(x, a)| *x += a);
        Ok(())
    }

    /// Replace `channel` with `array`.
    pub fn set_signal(&mut self, channel: &str, array: Vec<f64>) -> Result<()> {
        if array.len() != self.len() {
            return Err(Error::LengthMismatch {
                expected: self.len(),
                found: array.len(),
            });
        }
        *self.signal_mut(channel) = array;
        Ok(())
    }

    /// Add white Gaussian noise to the selected channels.
    pub fn apply_gaussian_noise<R: Rng + ?Sized>(
        &mut self,
        mean: f64,
        standard_deviation: f64,
        channel: Option<&str>,
        rng: &mut R,
    ) -> Result<()> {
        let normal = Normal::new(mean, standard_deviation)
            .map_err(|e| Error::distribution("normal", e))?;
        for signal in self.selected_mut(channel)? {
            signal.iter_mut().for_each(|x| *x += normal.sample(rng));
        }
        Ok(())
    }

    /// Replace every sample with a Poisson draw of that mean. Negative samples
    /// are an error.
    pub fn apply_poisson_noise<R: Rng + ?Sized>(&mut self, channel: Option<&str>, rng: &mut R) -> Result<()> {
        for signal in self.selected_mut(channel)? {
            if let Some(negative) = signal.iter().find(|&&x| !(x >= 0.0)) {
                return Err(Error::invalid(
                    "signal",
                    format!("Poisson noise requires non negative values, found {negative}"),
                ));
            }
            for x in signal.iter_mut() {
                *x = poisson_draw(*x, rng);
            }
        }
        Ok(())
    }

    /// Subtract the running minimum over the last `window` samples (current
    /// sample included). With `None`, the minimum runs over the whole history
    /// and the first sample is left unchanged.
    pub fn apply_baseline_restoration(&mut self, window: Option<usize>, channel: Option<&str>) -> Result<()> {
        for signal in self.selected_mut(channel)? {
            baseline_restoration(signal, window);
        }
        Ok(())
    }

    /// Filter the selected channels.
    pub fn apply_filter(&mut self, filter: &AnalogFilter, sampling_rate: f64, channel: Option<&str>) -> Result<()> {
        for signal in self.selected_mut(channel)? {
            *signal = filter.apply(signal, sampling_rate)?;
        }
        Ok(())
    }
}

/// Poisson draw of mean `lambda >= 0`; zero mean gives zero.
pub(crate) fn poisson_draw<R: Rng + ?Sized>(lambda: f64, rng: &mut R) -> f64 {
    Poisson::new(lambda).map_or(0.0, |poisson| poisson.sample(rng))
}

fn baseline_restoration(signal: &mut [f64], window: Option<usize>) {
    let original = signal.to_vec();
    match window {
        None => {
            let mut minimum = original.first().copied().unwrap_or(0.0);
            for (x, &o) in signal.iter_mut().zip(&original).skip(1) {
                minimum = minimum.min(o);
                *x = o - minimum;
            }
        }
        Some(window) => {
            for (i, x) in signal.iter_mut().enumerate() {
                let start = i.saturating_sub(window);
                let minimum = original[start..=i].iter().copied().fold(f64::INFINITY, f64::min);
                *x = original[i] - minimum;
            }
        }
    }
}
