//! Analog filters applied in the frequency domain.
//!
//! The signal is transformed with an FFT, multiplied by the filter's transfer
//! function evaluated at every bin, and transformed back. The response is
//! zero-phase for Butterworth filters (magnitude only) and carries the phase
//! of the analog prototype for Bessel filters.
use crate::error::{Error, Result};
use bon::Builder;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

/// Filter family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    /// Maximally flat magnitude, `|H| = 1 / sqrt(1 + (f/fc)^(2n))`.
    Butterworth,
    /// Maximally flat group delay, orders 1 to 4.
    Bessel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Band {
    LowPass,
    HighPass,
}

/// An analog filter of given family, band, cutoff [Hz] and order.
///
/// # Examples
///
/// ```
/// use cytosim::filter::{AnalogFilter, Band, FilterKind};
///
/// let filter = AnalogFilter::builder()
///     .kind(FilterKind::Butterworth)
///     .band(Band::LowPass)
///     .cutoff(1e3)
///     .build();
///
/// let signal = vec![1.0; 64];
/// let filtered = filter.apply(&signal, 10e3)?;
/// assert!((filtered[10] - 1.0).abs() < 1e-9);
///
/// // Cutoff above the Nyquist frequency.
/// assert!(filter.apply(&signal, 1.5e3).is_err());
/// # Ok::<(), cytosim::Error>(())
/// ```
#[derive(Builder, Clone, Copy, Debug, PartialEq)]
pub struct AnalogFilter {
    kind: FilterKind,
    band: Band,
    cutoff: f64,
    #[builder(default = 4)]
    order: u32,
}

impl AnalogFilter {
    /// Filter `signal` sampled at `sampling_rate` [Hz].
    pub fn apply(&self, signal: &[f64], sampling_rate: f64) -> Result<Vec<f64>> {
        let nyquist = sampling_rate / 2.0;
        if !(self.cutoff < nyquist) {
            return Err(Error::NyquistViolation {
                cutoff: self.cutoff,
                nyquist,
            });
        }
        if !(self.cutoff > 0.0) {
            return Err(Error::invalid("cutoff", "must be positive"));
        }
        match (self.kind, self.order) {
            (_, 0) => return Err(Error::invalid("order", "must be at least 1")),
            (FilterKind::Bessel, 5..) => {
                return Err(Error::invalid("order", "Bessel filters support orders 1 to 4"))
            }
            _ => {}
        }

        let n = signal.len();
        if n < 2 {
            return Ok(signal.to_vec());
        }

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);

        let mut spectrum: Vec<Complex64> = signal.iter().map(|&x| Complex64::new(x, 0.0)).collect();
        forward.process(&mut spectrum);

        let df = sampling_rate / n as f64;
        for k in 0..=n / 2 {
            let h = self.response(k as f64 * df);
            spectrum[k] *= h;
            if k != 0 && k != n - k {
                spectrum[n - k] *= h.conj();
            }
        }

        inverse.process(&mut spectrum);
        Ok(spectrum.iter().map(|c| c.re / n as f64).collect())
    }

    /// Transfer function at frequency `f` [Hz].
    pub fn response(&self, f: f64) -> Complex64 {
        let ratio = f / self.cutoff;
        match (self.kind, self.band) {
            (FilterKind::Butterworth, Band::LowPass) => {
                Complex64::new(1.0 / (1.0 + ratio.powi(2 * self.order as i32)).sqrt(), 0.0)
            }
            (FilterKind::Butterworth, Band::HighPass) => {
                if ratio == 0.0 {
                    return Complex64::new(0.0, 0.0);
                }
                Complex64::new(1.0 / (1.0 + ratio.recip().powi(2 * self.order as i32)).sqrt(), 0.0)
            }
            (FilterKind::Bessel, Band::LowPass) => bessel_prototype(Complex64::new(0.0, ratio), self.order),
            (FilterKind::Bessel, Band::HighPass) => {
                if ratio == 0.0 {
                    return Complex64::new(0.0, 0.0);
                }
                // s -> 1/s
                bessel_prototype(Complex64::new(0.0, ratio).inv(), self.order)
            }
        }
    }
}

/// Low-pass Bessel prototype `H(s)` for orders 1 to 4.
fn bessel_prototype(s: Complex64, order: u32) -> Complex64 {
    let one = Complex64::new(1.0, 0.0);
    match order {
        1 => one / (s + 1.0),
        2 => 3.0 / (s * s + 3.0 * s + 3.0),
        3 => 15.0 / (s.powu(3) + 6.0 * s * s + 15.0 * s + 15.0),
        _ => 105.0 / (s.powu(4) + 10.0 * s.powu(3) + 45.0 * s * s + 105.0 * s + 105.0),
    }
}

/// Butterworth low-pass filter of `signal`.
pub fn butterworth_low_pass(signal: &[f64], cutoff: f64, sampling_rate: f64, order: u32) -> Result<Vec<f64>> {
    AnalogFilter {
        kind: FilterKind::Butterworth,
        band: Band::LowPass,
        cutoff,
        order,
    }
    .apply(signal, sampling_rate)
}

/// Butterworth high-pass filter of `signal`.
pub fn butterworth_high_pass(signal: &[f64], cutoff: f64, sampling_rate: f64, order: u32) -> Result<Vec<f64>> {
    AnalogFilter {
        kind: FilterKind::Butterworth,
        band: Band::HighPass,
        cutoff,
        order,
    }
    .apply(signal, sampling_rate)
}

/// Bessel low-pass filter of `signal`.
pub fn bessel_low_pass(signal: &[f64], cutoff: f64, sampling_rate: f64, order: u32) -> Result<Vec<f64>> {
    AnalogFilter {
        kind: FilterKind::Bessel,
        band: Band::LowPass,
        cutoff,
        order,
    }
    .apply(signal, sampling_rate)
}

/// Bessel high-pass filter of `signal`.
pub fn bessel_high_pass(signal: &[f64], cutoff: f64, sampling_rate: f64, order: u32) -> Result<Vec<f64>> {
    AnalogFilter {
        kind: FilterKind::Bessel,
        band: Band::HighPass,
        cutoff,
        order,
    }
    .apply(signal, sampling_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(frequency: f64, sampling_rate: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * frequency * i as f64 / sampling_rate).sin())
            .collect()
    }

    fn rms(signal: &[f64]) -> f64 {
        (signal.iter().map(|x| x * x).sum::<f64>() / signal.len() as f64).sqrt()
    }

    #[test]
    fn nyquist_is_a_hard_limit() {
        let signal = vec![0.0; 16];
        for f in [
            butterworth_low_pass,
            butterworth_high_pass,
            bessel_low_pass,
            bessel_high_pass,
        ] {
            assert!(matches!(
                f(&signal, 500.0, 1000.0, 2),
                Err(Error::NyquistViolation { .. })
            ));
            assert!(f(&signal, 499.0, 1000.0, 2).is_ok());
        }
    }

    #[test]
    fn invalid_order() {
        let signal = vec![0.0; 16];
        assert!(bessel_low_pass(&signal, 10.0, 1000.0, 5).is_err());
        assert!(butterworth_low_pass(&signal, 10.0, 1000.0, 0).is_err());
        assert!(butterworth_low_pass(&signal, 10.0, 1000.0, 8).is_ok());
    }

    #[test]
    fn low_pass_attenuates_high_tone() {
        // 1024 samples at 1024 Hz: integer number of periods for every tone.
        let fs = 1024.0;
        let slow = tone(8.0, fs, 1024);
        let fast = tone(256.0, fs, 1024);

        let kept = butterworth_low_pass(&slow, 32.0, fs, 4).unwrap();
        let removed = butterworth_low_pass(&fast, 32.0, fs, 4).unwrap();

        assert!((rms(&kept) / rms(&slow) - 1.0).abs() < 1e-3);
        assert!(rms(&removed) / rms(&fast) < 1e-3);
    }

    #[test]
    fn high_pass_removes_offset() {
        let fs = 1024.0;
        let signal: Vec<f64> = tone(256.0, fs, 1024).iter().map(|x| x + 5.0).collect();
        let filtered = butterworth_high_pass(&signal, 32.0, fs, 2).unwrap();
        let mean = filtered.iter().sum::<f64>() / filtered.len() as f64;

        assert!(mean.abs() < 1e-9);
        assert!((rms(&filtered) - rms(&tone(256.0, fs, 1024))).abs() < 1e-3);
    }

    #[test]
    fn bessel_unit_dc_gain() {
        for order in 1..=4 {
            let filter = AnalogFilter::builder()
                .kind(FilterKind::Bessel)
                .band(Band::LowPass)
                .cutoff(10.0)
                .order(order)
                .build();
            assert!((filter.response(0.0) - Complex64::new(1.0, 0.0)).norm() < 1e-12);
            assert!(filter.response(1e4).norm() < 1e-2);
        }
    }

    #[test]
    fn short_signals_pass_through() {
        assert_eq!(bessel_low_pass(&[3.0], 10.0, 100.0, 2).unwrap(), vec![3.0]);
        assert!(bessel_low_pass(&[], 10.0, 100.0, 2).unwrap().is_empty());
    }
}
