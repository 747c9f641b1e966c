//! Segmentation of the acquired signals around threshold crossings.
use crate::error::{Error, Result};
use crate::signal::SignalGenerator;
use crate::statistics::{mad_sigma, median};
use bon::bon;
use log::warn;

/// Trigger level of the reference channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Threshold {
    /// Absolute level, in the units of the signal.
    Absolute(f64),
    /// `median + n · σ`, with `σ` estimated from the median absolute
    /// deviation of the reference signal.
    Sigma(f64),
}

impl Threshold {
    /// Resolve the threshold against `signal`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cytosim::trigger::Threshold;
    ///
    /// let signal = [0.0, 1.0, -1.0, 0.0, 1.0, -1.0, 0.0];
    /// assert_eq!(Threshold::Absolute(0.5).resolve(&signal), 0.5);
    /// assert!((Threshold::Sigma(2.0).resolve(&signal) - 2.0 / 0.6745).abs() < 1e-12);
    /// ```
    pub fn resolve(&self, signal: &[f64]) -> f64 {
        match *self {
            Threshold::Absolute(value) => value,
            Threshold::Sigma(n) => match (median(signal), mad_sigma(signal)) {
                (Some(center), Some(sigma)) => center + n * sigma,
                _ => f64::NAN,
            },
        }
    }
}

/// How a window is built around a rising edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TriggerScheme {
    /// A window of exactly `pre_buffer + post_buffer + 2` samples around the
    /// sample preceding the edge. Windows that do not fit in the signal are
    /// dropped.
    FixedWindow,
    /// The window follows the excursion above the threshold.
    DynamicWindow,
    /// Like `DynamicWindow`, but the excursion ends below a separate lower
    /// threshold, with optional debouncing.
    #[default]
    DoubleThreshold,
}

/// Identifier of a triggered segment, in order of acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub usize);

/// Inclusive sample range `[start, end]` of one triggered window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub id: SegmentId,
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug)]
enum TriggerState {
    Idle,
    // Counting consecutive samples above the upper threshold after an edge.
    Debounce { edge: usize, count: usize },
    // Inside an excursion, waiting for the signal to fall below the lower
    // threshold.
    Active { edge: usize },
}

/// Segments acquired from every channel of a signal buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct TriggeredAcquisition {
    trigger_detector: String,
    threshold: f64,
    time: Vec<f64>,
    channels: Vec<(String, Vec<f64>)>,
    segments: Vec<Segment>,
}

/// Samples of one channel within one segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentView<'a> {
    pub detector: &'a str,
    pub segment: Segment,
    pub time: &'a [f64],
    pub signal: &'a [f64],
}

impl TriggeredAcquisition {
    pub fn trigger_detector(&self) -> &str {
        &self.trigger_detector
    }
    /// Resolved upper threshold of the reference channel.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn detectors(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|(name, _)| name.as_str())
    }
    /// Samples of `detector` within segment `id`.
    pub fn segment(&self, detector: &str, id: SegmentId) -> Result<SegmentView<'_>> {
        let (detector, signal) = self
            .channels
            .iter()
            .find(|(name, _)| name == detector)
            .ok_or_else(|| Error::UnknownChannel(detector.to_string()))?;
        let segment = *self
            .segments
            .get(id.0)
            .ok_or_else(|| Error::invalid("segment", format!("no segment with id {}", id.0)))?;
        let range = segment.start..=segment.end;

        Ok(SegmentView {
            detector,
            segment,
            time: &self.time[range.clone()],
            signal: &signal[range],
        })
    }
    /// The same segments cut from `signal`, which must share the time axis
    /// of this acquisition.
    pub fn apply_to(&self, signal: &SignalGenerator) -> Result<TriggeredAcquisition> {
        if signal.len() != self.time.len() {
            return Err(Error::LengthMismatch {
                expected: self.time.len(),
                found: signal.len(),
            });
        }
        let channels = signal
            .channel_names()
            .map(|name| Ok((name.to_string(), signal.get_signal(name)?.to_vec())))
            .collect::<Result<Vec<_>>>()?;

        Ok(TriggeredAcquisition {
            trigger_detector: self.trigger_detector.clone(),
            threshold: self.threshold,
            time: signal.get_time().to_vec(),
            channels,
            segments: self.segments.clone(),
        })
    }
    /// Every (detector, segment) view, detector-major.
    pub fn views(&self) -> impl Iterator<Item = SegmentView<'_>> {
        self.channels.iter().flat_map(move |(detector, signal)| {
            self.segments.iter().map(move |&segment| SegmentView {
                detector,
                segment,
                time: &self.time[segment.start..=segment.end],
                signal: &signal[segment.start..=segment.end],
            })
        })
    }
}

/// Cuts every channel of a signal buffer into the windows triggered by one
/// reference channel.
#[derive(Clone, Debug, PartialEq)]
pub struct TriggeringSystem {
    trigger_detector: String,
    scheme: TriggerScheme,
    threshold: Threshold,
    lower_threshold: Option<Threshold>,
    pre_buffer: usize,
    post_buffer: usize,
    min_duration: Option<usize>,
    max_triggers: Option<usize>,
}

#[bon]
impl TriggeringSystem {
    /// # Examples
    ///
    /// ```
    /// use cytosim::numeric::linspace;
    /// use cytosim::signal::SignalGenerator;
    /// use cytosim::trigger::{Threshold, TriggeringSystem};
    ///
    /// let mut signal = SignalGenerator::new(linspace(0.0, 1.0, 200))?;
    /// signal.generate_pulses_to_signal("fsc", &[0.25, 0.75], &[0.01, 0.01], &[1.0, 1.0], 0.0)?;
    ///
    /// let acquisition = TriggeringSystem::builder()
    ///     .trigger_detector("fsc")
    ///     .threshold(Threshold::Absolute(0.5))
    ///     .pre_buffer(5)
    ///     .post_buffer(5)
    ///     .build()
    ///     .run(&signal)?;
    ///
    /// assert_eq!(acquisition.len(), 2);
    /// # Ok::<(), cytosim::Error>(())
    /// ```
    #[builder]
    pub fn new(
        #[builder(into)] trigger_detector: String,
        #[builder(default)] scheme: TriggerScheme,
        threshold: Threshold,
        // Only used by `TriggerScheme::DoubleThreshold`; defaults to `threshold`.
        lower_threshold: Option<Threshold>,
        #[builder(default = 64)] pre_buffer: usize,
        #[builder(default = 64)] post_buffer: usize,
        min_duration: Option<usize>,
        max_triggers: Option<usize>,
    ) -> Self {
        Self {
            trigger_detector,
            scheme,
            threshold,
            lower_threshold,
            pre_buffer,
            post_buffer,
            min_duration,
            max_triggers,
        }
    }
}

impl TriggeringSystem {
    pub fn trigger_detector(&self) -> &str {
        &self.trigger_detector
    }
    /// Resolved `(upper, lower)` thresholds for `signal`.
    pub fn thresholds(&self, signal: &[f64]) -> Result<(f64, f64)> {
        let upper = self.threshold.resolve(signal);
        let lower = match (self.scheme, self.lower_threshold) {
            (TriggerScheme::DoubleThreshold, Some(lower)) => lower.resolve(signal),
            _ => upper,
        };
        if lower > upper {
            return Err(Error::invalid(
                "lower_threshold",
                format!("{lower} is above the upper threshold {upper}"),
            ));
        }
        Ok((upper, lower))
    }
    /// Inclusive `[start, end]` windows triggered by `signal`.
    ///
    /// Windows overlapping a previously accepted window are dropped.
    pub fn find_segments(&self, signal: &[f64]) -> Result<Vec<Segment>> {
        let (upper, lower) = self.thresholds(signal)?;
        let windows = match self.scheme {
            TriggerScheme::FixedWindow => self.fixed_windows(signal, upper),
            TriggerScheme::DynamicWindow => self.dynamic_windows(signal, upper, upper, None),
            TriggerScheme::DoubleThreshold => self.dynamic_windows(signal, upper, lower, self.min_duration),
        };

        Ok(windows
            .into_iter()
            .enumerate()
            .map(|(n, (start, end))| Segment {
                id: SegmentId(n),
                start,
                end,
            })
            .collect())
    }
    /// Trigger on the reference channel of `signal` and extract the same
    /// windows from every channel.
    pub fn run(&self, signal: &SignalGenerator) -> Result<TriggeredAcquisition> {
        let reference = signal.get_signal(&self.trigger_detector)?;
        let segments = self.find_segments(reference)?;
        if segments.is_empty() {
            let (min, max) = reference
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
            warn!(
                "no signal met the trigger criteria on `{}`; signal range is [{min}, {max}]",
                self.trigger_detector
            );
        }

        let channels = signal
            .channel_names()
            .map(|name| Ok((name.to_string(), signal.get_signal(name)?.to_vec())))
            .collect::<Result<Vec<_>>>()?;

        Ok(TriggeredAcquisition {
            trigger_detector: self.trigger_detector.clone(),
            threshold: self.threshold.resolve(reference),
            time: signal.get_time().to_vec(),
            channels,
            segments,
        })
    }

    fn is_full(&self, windows: &[(usize, usize)]) -> bool {
        self.max_triggers.is_some_and(|max| windows.len() >= max)
    }

    fn accept(&self, windows: &mut Vec<(usize, usize)>, start: usize, end: usize) {
        match windows.last() {
            Some(&(_, last_end)) if start <= last_end => {}
            _ => windows.push((start, end)),
        }
    }

    fn fixed_windows(&self, signal: &[f64], threshold: f64) -> Vec<(usize, usize)> {
        let mut windows = Vec::new();
        for i in 1..signal.len() {
            if self.is_full(&windows) {
                break;
            }
            if !(signal[i - 1] <= threshold && signal[i] > threshold) {
                continue;
            }
            let index = i - 1;
            let (Some(start), end) = (index.checked_sub(self.pre_buffer + 1), index + self.post_buffer) else {
                continue;
            };
            if end >= signal.len() {
                continue;
            }
            self.accept(&mut windows, start, end);
        }
        windows
    }

    fn dynamic_windows(
        &self,
        signal: &[f64],
        upper: f64,
        lower: f64,
        min_duration: Option<usize>,
    ) -> Vec<(usize, usize)> {
        let n = signal.len();
        let mut windows = Vec::new();
        let mut state = TriggerState::Idle;
        let close = |windows: &mut Vec<(usize, usize)>, edge: usize, fall: usize| {
            let start = edge.saturating_sub(self.pre_buffer);
            let end = (fall - 1 + self.post_buffer).min(n - 1);
            self.accept(windows, start, end);
        };
        let required = min_duration.unwrap_or(0);

        for i in 1..n {
            if self.is_full(&windows) {
                return windows;
            }
            state = match std::mem::replace(&mut state, TriggerState::Idle) {
                TriggerState::Idle => {
                    if signal[i - 1] <= lower && signal[i] > upper {
                        if required > 1 {
                            TriggerState::Debounce { edge: i, count: 1 }
                        } else {
                            TriggerState::Active { edge: i }
                        }
                    } else {
                        TriggerState::Idle
                    }
                }
                TriggerState::Debounce { edge, count } => {
                    if signal[i] > upper {
                        if count + 1 >= required {
                            TriggerState::Active { edge }
                        } else {
                            TriggerState::Debounce { edge, count: count + 1 }
                        }
                    } else {
                        // Too short: resume scanning after this run.
                        TriggerState::Idle
                    }
                }
                TriggerState::Active { edge } => {
                    if signal[i] > lower {
                        TriggerState::Active { edge }
                    } else {
                        close(&mut windows, edge, i);
                        TriggerState::Idle
                    }
                }
            };
        }
        if let (TriggerState::Active { edge }, false) = (state, self.is_full(&windows)) {
            close(&mut windows, edge, n);
        }
        windows
    }
}
