//! Plain-text summaries of simulation results.
use crate::peak::PeakTable;
use crate::population::SamplingMethod;
use crate::statistics::raw_moments;
use crate::timeline::EventCollection;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct PopulationSummary {
    pub name: String,
    pub kind: String,
    pub sampling_method: SamplingMethod,
    pub expected_events: f64,
    pub explicit_events: usize,
    /// Mean diameter of the explicit events [m].
    pub mean_diameter: Option<f64>,
    /// Mean coupled power per detector [W]: over the explicit events, or the
    /// Monte Carlo mean of gamma-sampled populations.
    pub mean_amplitudes: Vec<Option<f64>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventSummary {
    pub detectors: Vec<String>,
    pub populations: Vec<PopulationSummary>,
}

/// Per-population statistics of `events`.
///
/// # Examples
///
/// ```
/// use cytosim::report::event_summary;
/// use cytosim::timeline::EventCollection;
///
/// let summary = event_summary(&EventCollection::new(vec!["fsc".into()]));
/// assert!(summary.populations.is_empty());
/// assert!(summary.to_string().contains("population"));
/// ```
pub fn event_summary(events: &EventCollection) -> EventSummary {
    let populations = events
        .iter()
        .map(|population| {
            let diameters: Vec<f64> = population.events.iter().map(|e| e.diameter).collect();
            let mean_amplitudes = (0..events.detectors.len())
                .map(|j| match &population.aggregate {
                    Some(aggregate) => aggregate.channels.get(j).map(|c| c.mean_amplitude),
                    None => {
                        let amplitudes: Vec<f64> = population.events.iter().map(|e| e.amplitudes[j]).collect();
                        raw_moments(&amplitudes).map(|(mean, _)| mean)
                    }
                })
                .collect();

            PopulationSummary {
                name: population.name.clone(),
                kind: population.kind.clone(),
                sampling_method: population.sampling_method,
                expected_events: population.expected_events,
                explicit_events: population.events.len(),
                mean_diameter: raw_moments(&diameters).map(|(mean, _)| mean),
                mean_amplitudes,
            }
        })
        .collect();

    EventSummary {
        detectors: events.detectors.clone(),
        populations,
    }
}

fn or_dash(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3e}"))
}

impl fmt::Display for EventSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<16} {:<10} {:>12} {:>8} {:>12}", "population", "method", "expected", "events", "diameter")?;
        for detector in &self.detectors {
            write!(f, " {:>12}", detector)?;
        }
        for population in &self.populations {
            let method = match population.sampling_method {
                SamplingMethod::Explicit => "explicit",
                SamplingMethod::Gamma { .. } => "gamma",
            };
            write!(
                f,
                "\n{:<16} {:<10} {:>12.1} {:>8} {:>12}",
                population.name,
                method,
                population.expected_events,
                population.explicit_events,
                or_dash(population.mean_diameter),
            )?;
            for amplitude in &population.mean_amplitudes {
                write!(f, " {:>12}", or_dash(*amplitude))?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorPeakSummary {
    pub detector: String,
    /// Segments with at least one peak.
    pub segments: usize,
    pub peaks: usize,
    pub mean_height: f64,
    pub mean_width: Option<f64>,
    pub mean_area: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeakSummary {
    pub detectors: Vec<DetectorPeakSummary>,
}

/// Per-detector statistics of `peaks`, in order of first appearance.
pub fn peak_summary(peaks: &PeakTable) -> PeakSummary {
    let mut names: Vec<&str> = Vec::new();
    for record in peaks {
        if !names.contains(&record.detector.as_str()) {
            names.push(&record.detector);
        }
    }

    let detectors = names
        .into_iter()
        .map(|name| {
            let mut segments: Vec<_> = peaks.detector(name).map(|r| r.segment).collect();
            segments.dedup();
            let heights: Vec<f64> = peaks.detector(name).map(|r| r.height).collect();
            let widths: Vec<f64> = peaks.detector(name).filter_map(|r| r.width).collect();
            let areas: Vec<f64> = peaks.detector(name).filter_map(|r| r.area).collect();

            DetectorPeakSummary {
                detector: name.to_string(),
                segments: segments.len(),
                peaks: heights.len(),
                mean_height: raw_moments(&heights).map_or(f64::NAN, |(mean, _)| mean),
                mean_width: raw_moments(&widths).map(|(mean, _)| mean),
                mean_area: raw_moments(&areas).map(|(mean, _)| mean),
            }
        })
        .collect();

    PeakSummary { detectors }
}

impl fmt::Display for PeakSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} {:>8} {:>8} {:>12} {:>12} {:>12}",
            "detector", "segments", "peaks", "height", "width", "area"
        )?;
        for detector in &self.detectors {
            write!(
                f,
                "\n{:<12} {:>8} {:>8} {:>12.3e} {:>12} {:>12}",
                detector.detector,
                detector.segments,
                detector.peaks,
                detector.mean_height,
                or_dash(detector.mean_width),
                or_dash(detector.mean_area),
            )?;
        }
        Ok(())
    }
}
