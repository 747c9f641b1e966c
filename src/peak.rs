//! Peak detection on 1-D signals and on triggered acquisitions.
//!
//! Every locator works on a plain signal slice and its time axis and returns
//! the peaks it found, strongest or earliest first depending on the locator.
//! [`PeakLocator::find`] pads that result to a fixed number of slots with
//! `-1` indices and `NaN` metrics; [`PeakLocator::run`] applies the locator to
//! every (detector, segment) pair of a [`TriggeredAcquisition`].
use crate::error::{Error, Result};
use crate::numeric::{argmax, cumulative_trapezoid, interpolate_at};
use crate::trigger::{SegmentId, TriggeredAcquisition};
use bon::Builder;
use std::cmp::Ordering;
use std::ops::Range;

/// Boundaries and integral of a peak, in (fractional) sample positions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakExtent {
    pub left: f64,
    pub right: f64,
    /// Width [samples].
    pub width: f64,
    /// Integral of the signal over `[left, right]`, in signal units times
    /// seconds.
    pub area: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub time: f64,
    pub height: f64,
    pub extent: Option<PeakExtent>,
}

/// Peaks padded to a fixed number of slots. Empty slots hold `-1` in `index`
/// and `NaN` everywhere else.
#[derive(Clone, Debug, PartialEq)]
pub struct PaddedPeaks {
    pub index: Vec<i64>,
    pub height: Vec<f64>,
    pub width: Vec<f64>,
    pub area: Vec<f64>,
}

impl PaddedPeaks {
    pub fn new(peaks: &[Peak], slots: usize) -> Self {
        let slot = |i: usize| peaks.get(i);
        let metric = |i: usize, f: fn(&Peak) -> Option<f64>| slot(i).and_then(f).unwrap_or(f64::NAN);

        Self {
            index: (0..slots).map(|i| slot(i).map_or(-1, |p| p.index as i64)).collect(),
            height: (0..slots).map(|i| metric(i, |p| Some(p.height))).collect(),
            width: (0..slots).map(|i| metric(i, |p| p.extent.map(|e| e.width))).collect(),
            area: (0..slots).map(|i| metric(i, |p| p.extent.map(|e| e.area))).collect(),
        }
    }
    /// Number of non-sentinel slots.
    pub fn count(&self) -> usize {
        self.index.iter().filter(|&&i| i >= 0).count()
    }
}

/// One peak of one detector within one triggered segment.
#[derive(Clone, Debug, PartialEq)]
pub struct PeakRecord {
    pub detector: String,
    pub segment: SegmentId,
    /// Rank of the peak within its segment, in locator order.
    pub peak_id: usize,
    /// Sample index in the full acquisition.
    pub index: usize,
    pub time: f64,
    pub height: f64,
    pub width: Option<f64>,
    pub area: Option<f64>,
}

/// Peaks of every (detector, segment) pair of an acquisition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeakTable {
    records: Vec<PeakRecord>,
}

impl PeakTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PeakRecord> {
        self.records.iter()
    }
    /// Peaks of `detector`, in segment order.
    pub fn detector<'a>(&'a self, detector: &'a str) -> impl Iterator<Item = &'a PeakRecord> + 'a {
        self.records.iter().filter(move |r| r.detector == detector)
    }

    pub fn get(&self, detector: &str, segment: SegmentId, peak_id: usize) -> Option<&PeakRecord> {
        self.records
            .iter()
            .find(|r| r.detector == detector && r.segment == segment && r.peak_id == peak_id)
    }
}

impl<'a> IntoIterator for &'a PeakTable {
    type Item = &'a PeakRecord;
    type IntoIter = std::slice::Iter<'a, PeakRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub trait PeakLocator {
    /// Peaks of `signal` sampled at `time`.
    fn locate(&self, signal: &[f64], time: &[f64]) -> Result<Vec<Peak>>;
    /// Number of slots of the padded output.
    fn max_number_of_peaks(&self) -> usize;
    /// Peaks of `signal` padded to [`PeakLocator::max_number_of_peaks`].
    fn find(&self, signal: &[f64], time: &[f64]) -> Result<PaddedPeaks> {
        let mut peaks = self.locate(signal, time)?;
        peaks.truncate(self.max_number_of_peaks());
        Ok(PaddedPeaks::new(&peaks, self.max_number_of_peaks()))
    }
    /// Locate peaks in every segment of every detector of `acquisition`.
    fn run(&self, acquisition: &TriggeredAcquisition) -> Result<PeakTable> {
        let mut records = Vec::new();
        for view in acquisition.views() {
            let mut peaks = self.locate(view.signal, view.time)?;
            peaks.truncate(self.max_number_of_peaks());
            records.extend(peaks.into_iter().enumerate().map(|(peak_id, peak)| PeakRecord {
                detector: view.detector.to_string(),
                segment: view.segment.id,
                peak_id,
                index: view.segment.start + peak.index,
                time: peak.time,
                height: peak.height,
                width: peak.extent.map(|e| e.width),
                area: peak.extent.map(|e| e.area),
            }));
        }
        Ok(PeakTable { records })
    }
}

fn check_lengths(signal: &[f64], time: &[f64]) -> Result<()> {
    if signal.len() != time.len() {
        return Err(Error::LengthMismatch {
            expected: time.len(),
            found: signal.len(),
        });
    }
    Ok(())
}

fn by_height_descending(a: &Peak, b: &Peak) -> Ordering {
    b.height.partial_cmp(&a.height).unwrap_or(Ordering::Equal)
}

/// Contiguous samples around `peak` at or above `fraction` of its height,
/// without leaving `bounds`.
fn threshold_extent(
    signal: &[f64],
    cumulative: &[f64],
    peak: usize,
    fraction: f64,
    bounds: Range<usize>,
) -> PeakExtent {
    let level = fraction * signal[peak];
    let mut left = peak;
    while left > bounds.start && signal[left - 1] >= level {
        left -= 1;
    }
    let mut right = peak;
    while right + 1 < bounds.end && signal[right + 1] >= level {
        right += 1;
    }

    PeakExtent {
        left: left as f64,
        right: right as f64,
        width: (right - left + 1) as f64,
        area: interpolate_at(cumulative, right as f64) - interpolate_at(cumulative, left as f64),
    }
}

/// The single highest sample, with its extent at `threshold` times its
/// height.
///
/// # Examples
///
/// ```
/// use cytosim::peak::{GlobalPeakLocator, PeakLocator};
///
/// let time = [0.0, 1.0, 2.0, 3.0, 4.0];
/// let signal = [0.0, 1.0, 4.0, 1.0, 0.0];
///
/// let peaks = GlobalPeakLocator::builder().build().locate(&signal, &time)?;
/// assert_eq!(peaks[0].index, 2);
/// assert_eq!(peaks[0].extent.unwrap().width, 1.0);
/// # Ok::<(), cytosim::Error>(())
/// ```
#[derive(Builder, Clone, Copy, Debug, PartialEq)]
pub struct GlobalPeakLocator {
    /// Fraction of the peak height delimiting its extent.
    #[builder(default = 0.5)]
    threshold: f64,
    /// Width of the padded output; only the first slot is ever filled.
    #[builder(default = 1)]
    max_number_of_peaks: usize,
}

impl PeakLocator for GlobalPeakLocator {
    fn locate(&self, signal: &[f64], time: &[f64]) -> Result<Vec<Peak>> {
        check_lengths(signal, time)?;
        if signal.is_empty() {
            return Ok(Vec::new());
        }
        let cumulative = cumulative_trapezoid(signal, time);
        let index = argmax(signal, 0, signal.len());

        Ok(vec![Peak {
            index,
            time: time[index],
            height: signal[index],
            extent: Some(threshold_extent(
                signal,
                &cumulative,
                index,
                self.threshold,
                0..signal.len(),
            )),
        }])
    }

    fn max_number_of_peaks(&self) -> usize {
        self.max_number_of_peaks
    }
}

/// The maximum of each window of `window_size` samples, stepped by
/// `window_step` (defaults to `window_size`), highest first.
#[derive(Builder, Clone, Copy, Debug, PartialEq)]
pub struct SlidingWindowPeakLocator {
    window_size: usize,
    window_step: Option<usize>,
    #[builder(default = 5)]
    max_number_of_peaks: usize,
    /// Compute extents at this fraction of each peak height.
    threshold: Option<f64>,
}

impl PeakLocator for SlidingWindowPeakLocator {
    fn locate(&self, signal: &[f64], time: &[f64]) -> Result<Vec<Peak>> {
        check_lengths(signal, time)?;
        let step = self.window_step.unwrap_or(self.window_size);
        if self.window_size == 0 || step == 0 {
            return Err(Error::invalid("window_size", "windows must hold at least one sample"));
        }
        let cumulative = cumulative_trapezoid(signal, time);

        // A maximum shared by overlapping windows is measured in the first one.
        let mut windows: Vec<(Range<usize>, usize)> = (0..signal.len())
            .step_by(step)
            .map(|start| {
                let window = start..(start + self.window_size).min(signal.len());
                let index = argmax(signal, window.start, window.end);
                (window, index)
            })
            .collect();
        windows.dedup_by_key(|(_, index)| *index);

        let mut peaks: Vec<Peak> = windows
            .into_iter()
            .map(|(window, index)| Peak {
                index,
                time: time[index],
                height: signal[index],
                extent: self
                    .threshold
                    .map(|fraction| threshold_extent(signal, &cumulative, index, fraction, window)),
            })
            .collect();
        peaks.sort_by(by_height_descending);
        peaks.truncate(self.max_number_of_peaks);

        Ok(peaks)
    }

    fn max_number_of_peaks(&self) -> usize {
        self.max_number_of_peaks
    }
}

/// Sign changes of the first difference where the second difference is
/// negative, in index order.
#[derive(Builder, Clone, Copy, Debug, PartialEq)]
pub struct DerivativePeakLocator {
    #[builder(default = 5)]
    max_number_of_peaks: usize,
}

impl PeakLocator for DerivativePeakLocator {
    fn locate(&self, signal: &[f64], time: &[f64]) -> Result<Vec<Peak>> {
        check_lengths(signal, time)?;
        let first: Vec<f64> = signal.windows(2).map(|w| w[1] - w[0]).collect();
        let sign = |x: f64| (x > 0.0) as i8 - (x < 0.0) as i8;

        Ok(first
            .windows(2)
            .enumerate()
            .filter(|(_, d)| sign(d[0]) > sign(d[1]) && d[1] - d[0] < 0.0)
            .map(|(k, _)| k + 1)
            .take(self.max_number_of_peaks)
            .map(|index| Peak {
                index,
                time: time[index],
                height: signal[index],
                extent: None,
            })
            .collect())
    }

    fn max_number_of_peaks(&self) -> usize {
        self.max_number_of_peaks
    }
}

/// Local maxima filtered by height, distance and prominence, with widths
/// measured at `rel_height` of the prominence below each peak.
///
/// # Examples
///
/// ```
/// use cytosim::peak::{PeakLocator, ThresholdPeakLocator};
///
/// let time: Vec<f64> = (0..7).map(f64::from).collect();
/// let signal = [0.0, 2.0, 0.0, 1.0, 0.0, 3.0, 0.0];
///
/// let locator = ThresholdPeakLocator::builder().height(1.5).build();
/// let peaks = locator.locate(&signal, &time)?;
/// assert_eq!(peaks.iter().map(|p| p.index).collect::<Vec<_>>(), vec![1, 5]);
/// # Ok::<(), cytosim::Error>(())
/// ```
#[derive(Builder, Clone, Copy, Debug, PartialEq)]
pub struct ThresholdPeakLocator {
    height: Option<f64>,
    /// Minimum index distance between peaks; higher peaks win.
    distance: Option<usize>,
    prominence: Option<f64>,
    #[builder(default = 0.5)]
    rel_height: f64,
    #[builder(default = 5)]
    max_number_of_peaks: usize,
}

/// Prominence of `peak` and the positions of the minima bounding it.
fn prominence(signal: &[f64], peak: usize) -> (f64, usize, usize) {
    let top = signal[peak];

    let (mut left_min, mut left_base) = (top, peak);
    let mut i = peak;
    loop {
        if signal[i] > top {
            break;
        }
        if signal[i] < left_min {
            left_min = signal[i];
            left_base = i;
        }
        if i == 0 {
            break;
        }
        i -= 1;
    }

    let (mut right_min, mut right_base) = (top, peak);
    for (i, &x) in signal.iter().enumerate().skip(peak) {
        if x > top {
            break;
        }
        if x < right_min {
            right_min = x;
            right_base = i;
        }
    }

    (top - left_min.max(right_min), left_base, right_base)
}

/// Interpolated positions where `signal` crosses `level` on either side of
/// `peak`, searching no further than the bases.
fn crossing_positions(signal: &[f64], peak: usize, level: f64, left_base: usize, right_base: usize) -> (f64, f64) {
    let mut i = peak;
    while left_base < i && level < signal[i] {
        i -= 1;
    }
    let mut left = i as f64;
    if signal[i] < level {
        left += (level - signal[i]) / (signal[i + 1] - signal[i]);
    }

    let mut i = peak;
    while i < right_base && level < signal[i] {
        i += 1;
    }
    let mut right = i as f64;
    if signal[i] < level {
        right -= (level - signal[i]) / (signal[i - 1] - signal[i]);
    }

    (left, right)
}

/// Strict local maxima; the middle sample of flat tops.
fn local_maxima(signal: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    let last = signal.len().saturating_sub(1);
    let mut i = 1;
    while i < last {
        if signal[i - 1] < signal[i] {
            let mut ahead = i + 1;
            while ahead < last && signal[ahead] == signal[i] {
                ahead += 1;
            }
            if signal[ahead] < signal[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

fn select_by_distance(signal: &[f64], peaks: Vec<usize>, distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];
    let mut priority: Vec<usize> = (0..peaks.len()).collect();
    priority.sort_by(|&a, &b| {
        signal[peaks[b]]
            .partial_cmp(&signal[peaks[a]])
            .unwrap_or(Ordering::Equal)
    });

    for j in priority {
        if !keep[j] {
            continue;
        }
        for k in (0..j).rev().take_while(|&k| peaks[j] - peaks[k] < distance) {
            keep[k] = false;
        }
        for k in (j + 1..peaks.len()).take_while(|&k| peaks[k] - peaks[j] < distance) {
            keep[k] = false;
        }
    }

    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(peak, keep)| keep.then_some(peak))
        .collect()
}

impl PeakLocator for ThresholdPeakLocator {
    fn locate(&self, signal: &[f64], time: &[f64]) -> Result<Vec<Peak>> {
        check_lengths(signal, time)?;
        let mut peaks = local_maxima(signal);
        if let Some(height) = self.height {
            peaks.retain(|&p| signal[p] >= height);
        }
        if let Some(distance) = self.distance {
            peaks = select_by_distance(signal, peaks, distance.max(1));
        }

        let cumulative = cumulative_trapezoid(signal, time);
        Ok(peaks
            .into_iter()
            .filter_map(|index| {
                let (prominence, left_base, right_base) = prominence(signal, index);
                if self.prominence.is_some_and(|min| prominence < min) {
                    return None;
                }
                let level = signal[index] - prominence * self.rel_height;
                let (left, right) = crossing_positions(signal, index, level, left_base, right_base);

                Some(Peak {
                    index,
                    time: time[index],
                    height: signal[index],
                    extent: Some(PeakExtent {
                        left,
                        right,
                        width: right - left,
                        area: interpolate_at(&cumulative, right) - interpolate_at(&cumulative, left),
                    }),
                })
            })
            .take(self.max_number_of_peaks)
            .collect())
    }

    fn max_number_of_peaks(&self) -> usize {
        self.max_number_of_peaks
    }
}
