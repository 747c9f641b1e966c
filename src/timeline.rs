//! Particle arrivals over a run, and the event records built from them.
use crate::error::Result;
use crate::flow_cell::{FlowProfile, TransverseSamples};
use crate::population::{ParticleCount, Population, SamplingMethod};
use crate::settings::SimulationSettings;
use log::debug;
use rand::Rng;

/// How the number of explicit events is realized from its expectation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ArrivalScheme {
    /// Round the expected count; spread the arrivals uniformly over the run.
    #[default]
    Rounded,
    /// Arrivals are a Poisson process: exponential inter-arrival times at
    /// the population's particle flux, so the count varies between runs.
    Poisson,
}

/// Arrival times and transverse samples of one population.
#[derive(Clone, Debug, PartialEq)]
pub enum PopulationTimeline {
    /// Nothing to simulate: the expected number of events is zero.
    Skipped { expected_events: f64 },
    /// Discrete arrivals, one per particle.
    Explicit {
        expected_events: f64,
        time: Vec<f64>,
        transverse: TransverseSamples,
    },
    /// Only the expectation is kept; arrivals are drawn bin by bin later.
    Aggregate { expected_events: f64 },
}

impl PopulationTimeline {
    pub fn expected_events(&self) -> f64 {
        match self {
            PopulationTimeline::Skipped { expected_events }
            | PopulationTimeline::Explicit {
                expected_events, ..
            }
            | PopulationTimeline::Aggregate { expected_events } => *expected_events,
        }
    }
}

/// Draws particle arrivals for a run of `run_time` seconds through `flow`.
#[derive(Debug)]
pub struct TimelineGenerator<'a, F> {
    flow: &'a F,
    run_time: f64,
    scheme: ArrivalScheme,
    settings: SimulationSettings,
}

impl<'a, F> TimelineGenerator<'a, F>
where
    F: FlowProfile,
{
    pub fn new(flow: &'a F, run_time: f64, scheme: ArrivalScheme, settings: SimulationSettings) -> Self {
        Self {
            flow,
            run_time,
            scheme,
            settings,
        }
    }

    /// Expected number of particles of `count` crossing during the run.
    pub fn expected_events(&self, count: &ParticleCount) -> f64 {
        count.number_of_events(self.flow.sample_area(), self.flow.mean_speed(), self.run_time)
    }

    pub fn sample<R: Rng + ?Sized>(&self, population: &Population, rng: &mut R) -> Result<PopulationTimeline> {
        let expected_events = self.expected_events(&population.particle_count);
        if !(expected_events > 0.0) {
            debug!("population `{}` expects no events", population.name);
            return Ok(PopulationTimeline::Skipped { expected_events });
        }
        if let SamplingMethod::Gamma { .. } = population.sampling_method {
            return Ok(PopulationTimeline::Aggregate { expected_events });
        }

        let time = match self.scheme {
            ArrivalScheme::Rounded => {
                let n_events = expected_events.round() as usize;
                self.flow.sample_arrival_times(n_events, self.run_time, rng)
            }
            ArrivalScheme::Poisson => {
                let flux = population.particle_count.flux(
                    self.flow.sample_area(),
                    self.flow.mean_speed(),
                    self.run_time,
                );
                self.flow.sample_poisson_arrival_times(self.run_time, flux, rng)?
            }
        };
        if time.is_empty() {
            debug!("population `{}` realized no events", population.name);
            return Ok(PopulationTimeline::Skipped { expected_events });
        }

        let transverse = self.flow.sample_transverse_profile(
            time.len(),
            self.settings.assume_perfect_hydrodynamic_focusing,
            rng,
        );
        Ok(PopulationTimeline::Explicit {
            expected_events,
            time,
            transverse,
        })
    }
}

/// One particle crossing the interrogation region.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Arrival time [s].
    pub time: f64,
    pub y: f64,
    pub z: f64,
    /// Axial velocity [m/s].
    pub velocity: f64,
    /// Pulse standard deviation [s].
    pub width: f64,
    /// Diameter [m].
    pub diameter: f64,
    pub refractive_index: f64,
    /// Coupled power per detector [W], in detector order.
    pub amplitudes: Vec<f64>,
}

/// Gamma distribution matched to the compound Poisson sum of one time bin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BinAmplitude {
    /// Zero mean or variance; every bin is exactly zero.
    Degenerate,
    Gamma { shape: f64, scale: f64 },
}

/// Aggregate description of one detector channel for a gamma-sampled
/// population.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelMoments {
    pub detector: String,
    /// Mean single-particle coupled power [W].
    pub mean_amplitude: f64,
    /// Mean of the squared single-particle coupled power [W²].
    pub mean_square_amplitude: f64,
    pub bin_amplitude: BinAmplitude,
}

/// Gamma model state of one population.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateEvents {
    /// Expected number of particles per sampling interval.
    pub expected_per_bin: f64,
    /// Mean pulse standard deviation [s].
    pub mean_pulse_width: f64,
    pub channels: Vec<ChannelMoments>,
}

/// Events of one population.
#[derive(Clone, Debug, PartialEq)]
pub struct PopulationEvents {
    pub name: String,
    pub kind: String,
    pub sampling_method: SamplingMethod,
    pub particle_count: ParticleCount,
    pub expected_events: f64,
    /// Explicit particles, empty for gamma-sampled populations.
    pub events: Vec<Event>,
    pub aggregate: Option<AggregateEvents>,
}

/// Events of every population of a run, in population order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventCollection {
    /// Detector names, in the order of [`Event::amplitudes`].
    pub detectors: Vec<String>,
    pub populations: Vec<PopulationEvents>,
}

impl EventCollection {
    pub fn new(detectors: Vec<String>) -> Self {
        Self {
            detectors,
            populations: Vec::new(),
        }
    }

    pub fn push(&mut self, population: PopulationEvents) {
        self.populations.push(population);
    }

    pub fn get(&self, name: &str) -> Option<&PopulationEvents> {
        self.populations.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PopulationEvents> {
        self.populations.iter()
    }

    pub fn len(&self) -> usize {
        self.populations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.populations.is_empty()
    }

    /// Number of explicit events over every population.
    pub fn explicit_event_count(&self) -> usize {
        self.populations.iter().map(|p| p.events.len()).sum()
    }

    /// Index of `detector` in [`Event::amplitudes`].
    pub fn detector_index(&self, detector: &str) -> Option<usize> {
        self.detectors.iter().position(|d| d == detector)
    }
}

impl<'a> IntoIterator for &'a EventCollection {
    type Item = &'a PopulationEvents;
    type IntoIter = std::slice::Iter<'a, PopulationEvents>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
