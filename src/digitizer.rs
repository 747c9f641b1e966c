//! Analog-to-digital conversion of the processed detector signals.
use crate::numeric::linspace;
use crate::settings::SimulationSettings;
use crate::units::{hertz_of, seconds};
use bon::bon;
use log::info;
use uom::si::f64::{Frequency, Time};

/// Number of discrete output levels of a [`Digitizer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitDepth(u64);

impl BitDepth {
    /// Creates a bit depth of `2^bits` levels.
    ///
    /// # Examples
    ///
    /// ```
    /// use cytosim::digitizer::BitDepth;
    ///
    /// assert_eq!(BitDepth::from_bits(10).levels(), 1024);
    /// ```
    pub fn from_bits(bits: u32) -> Self {
        Self(1u64 << bits.clamp(1, 63))
    }
    /// Creates a bit depth with an explicit number of levels. Returns `None`
    /// for fewer than two levels.
    ///
    /// # Examples
    ///
    /// ```
    /// use cytosim::digitizer::BitDepth;
    ///
    /// assert_eq!(BitDepth::from_levels(100).map(|b| b.levels()), Some(100));
    /// assert!(BitDepth::from_levels(1).is_none());
    /// ```
    pub fn from_levels(levels: u64) -> Option<Self> {
        (levels >= 2).then_some(Self(levels))
    }

    pub fn levels(&self) -> u64 {
        self.0
    }
}

impl Default for BitDepth {
    fn default() -> Self {
        Self::from_bits(10)
    }
}

/// Input range of a [`Digitizer`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Saturation {
    /// The range spans the minimum and maximum of each captured signal.
    #[default]
    Auto,
    /// Fixed lower and upper bounds [V].
    Bounds { min: f64, max: f64 },
}

/// What happened while capturing one signal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureMetadata {
    /// Lower saturation level [V].
    pub min: f64,
    /// Upper saturation level [V].
    pub max: f64,
    /// At least one sample fell outside `[min, max]`.
    pub clipped: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Digitizer {
    sampling_rate: f64,
    bit_depth: BitDepth,
    saturation: Saturation,
}

#[bon]
impl Digitizer {
    /// # Examples
    ///
    /// ```
    /// use cytosim::digitizer::{BitDepth, Digitizer};
    /// use uom::si::f64::Frequency;
    /// use uom::si::frequency::megahertz;
    ///
    /// let digitizer = Digitizer::builder()
    ///     .sampling_rate(Frequency::new::<megahertz>(60.0))
    ///     .bit_depth(BitDepth::from_bits(14))
    ///     .build();
    ///
    /// assert_eq!(digitizer.sampling_rate(), 60e6);
    /// assert_eq!(digitizer.bandwidth(), 30e6);
    /// ```
    #[builder]
    pub fn new(
        sampling_rate: Frequency,
        #[builder(default)] bit_depth: BitDepth,
        #[builder(default)] saturation: Saturation,
    ) -> Self {
        Self {
            sampling_rate: hertz_of(sampling_rate),
            bit_depth,
            saturation,
        }
    }
}

impl Digitizer {
    /// Sampling rate [Hz].
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }
    /// Nyquist frequency [Hz].
    pub fn bandwidth(&self) -> f64 {
        self.sampling_rate / 2.0
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }
    /// Sample times of a run of `run_time`: `⌊fs · run_time⌋` points evenly
    /// spaced over `[0, run_time]`.
    pub fn get_time_series(&self, run_time: Time) -> Vec<f64> {
        let run_time = seconds(run_time);
        let n = (self.sampling_rate * run_time).floor().max(0.0) as usize;
        linspace(0.0, run_time, n)
    }
    /// Saturation levels applied to `signal`.
    pub fn saturation_levels(&self, signal: &[f64]) -> (f64, f64) {
        match self.saturation {
            Saturation::Auto => signal
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x))),
            Saturation::Bounds { min, max } => (min, max),
        }
    }
    /// Digitize `signal`.
    ///
    /// Each sample becomes the index `i` of the first of `levels` evenly
    /// spaced bin edges over the saturation range with `edge[i] >= sample`,
    /// i.e. a value in `[0, levels - 1]` once clipped. With
    /// `assume_perfect_digitizer` the signal is clipped but not quantized.
    ///
    /// # Examples
    ///
    /// ```
    /// use cytosim::digitizer::{BitDepth, Digitizer, Saturation};
    /// use cytosim::settings::SimulationSettings;
    /// use uom::si::f64::Frequency;
    /// use uom::si::frequency::hertz;
    ///
    /// let digitizer = Digitizer::builder()
    ///     .sampling_rate(Frequency::new::<hertz>(1.0))
    ///     .bit_depth(BitDepth::from_levels(5).unwrap())
    ///     .saturation(Saturation::Bounds { min: 0.0, max: 4.0 })
    ///     .build();
    ///
    /// let (digitized, metadata) =
    ///     digitizer.capture_signal(&[-1.0, 0.0, 0.5, 2.0, 9.0], &SimulationSettings::default());
    /// assert_eq!(digitized, vec![0.0, 0.0, 1.0, 2.0, 4.0]);
    /// assert!(metadata.clipped);
    /// ```
    pub fn capture_signal(&self, signal: &[f64], settings: &SimulationSettings) -> (Vec<f64>, CaptureMetadata) {
        let (min, max) = self.saturation_levels(signal);
        let clipped = signal.iter().any(|&x| x < min || x > max);
        if clipped {
            info!("signal values have been clipped to the saturation levels [{min}, {max}]");
        }
        let metadata = CaptureMetadata { min, max, clipped };

        let clip = |x: f64| if x < min { min } else if x > max { max } else { x };
        if settings.assume_perfect_digitizer {
            return (signal.iter().map(|&x| clip(x)).collect(), metadata);
        }

        let top = (self.bit_depth.levels() - 1) as f64;
        let step = (max - min) / top;
        let digitized = signal
            .iter()
            .map(|&x| {
                if !(step > 0.0) {
                    return 0.0;
                }
                let position = (clip(x) - min) / step;
                // Absorb rounding noise before taking the ceiling.
                let nearest = position.round();
                let index = if (position - nearest).abs() < 1e-9 {
                    nearest
                } else {
                    position.ceil()
                };
                index.clamp(0.0, top)
            })
            .collect();

        (digitized, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uom::si::frequency::hertz;
    use uom::si::time::second;

    fn digitizer(levels: u64, saturation: Saturation) -> Digitizer {
        Digitizer::builder()
            .sampling_rate(Frequency::new::<hertz>(100.0))
            .bit_depth(BitDepth::from_levels(levels).unwrap())
            .saturation(saturation)
            .build()
    }

    #[test]
    fn bit_depth_levels() {
        assert_eq!(BitDepth::from_bits(1).levels(), 2);
        assert_eq!(BitDepth::from_bits(16).levels(), 65536);
        assert_eq!(BitDepth::default().levels(), 1024);
        assert!(BitDepth::from_levels(0).is_none());
        assert_eq!(BitDepth::from_levels(2), Some(BitDepth::from_bits(1)));
    }

    #[test]
    fn time_series_length() {
        let digitizer = digitizer(4, Saturation::Auto);
        let time = digitizer.get_time_series(Time::new::<second>(0.5));
        assert_eq!(time.len(), 50);
        assert_eq!(time[0], 0.0);
        assert!((time[49] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn auto_saturation_spans_signal() {
        let digitizer = digitizer(1024, Saturation::Auto);
        let signal: Vec<f64> = (0..100).map(|i| (i as f64 * 0.1).sin()).collect();
        let (digitized, metadata) = digitizer.capture_signal(&signal, &SimulationSettings::default());

        assert!(!metadata.clipped);
        assert!(digitized.iter().all(|&x| (0.0..=1023.0).contains(&x)));
        assert!(digitized.iter().all(|x| x.fract() == 0.0));
        assert!(digitized.contains(&0.0));
        assert!(digitized.contains(&1023.0));
    }

    #[test]
    fn bounds_clip_both_ends() {
        let digitizer = digitizer(8, Saturation::Bounds { min: -1.0, max: 1.0 });
        let (digitized, metadata) = digitizer.capture_signal(&[-5.0, 5.0], &SimulationSettings::default());

        assert!(metadata.clipped);
        assert_eq!((metadata.min, metadata.max), (-1.0, 1.0));
        assert_eq!(digitized, vec![0.0, 7.0]);
    }

    #[test]
    fn perfect_digitizer_only_clips() {
        let digitizer = digitizer(8, Saturation::Bounds { min: 0.0, max: 1.0 });
        let settings = SimulationSettings {
            assume_perfect_digitizer: true,
            ..SimulationSettings::default()
        };
        let (digitized, _) = digitizer.capture_signal(&[-0.5, 0.123, 3.0], &settings);
        assert_eq!(digitized, vec![0.0, 0.123, 1.0]);
    }

    #[test]
    fn flat_signal() {
        let digitizer = digitizer(16, Saturation::Auto);
        let (digitized, metadata) = digitizer.capture_signal(&[2.0; 5], &SimulationSettings::default());
        assert_eq!(digitized, vec![0.0; 5]);
        assert!(!metadata.clipped);

        let (digitized, _) = digitizer.capture_signal(&[], &SimulationSettings::default());
        assert!(digitized.is_empty());
    }
}
