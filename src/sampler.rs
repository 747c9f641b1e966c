//! Coupled amplitudes of sampled populations.
//!
//! Sparse populations are simulated particle by particle ([`ExplicitModel`]).
//! Dense populations are approximated per sampling interval by a gamma
//! distribution matched to the compound Poisson sum of the particles crossing
//! during that interval ([`GammaModel`]).
use crate::coupling::{Coupling, GaussianBeam};
use crate::error::Result;
use crate::flow_cell::{FlowProfile, TransverseSamples};
use crate::population::{Population, SamplingMethod};
use crate::statistics::raw_moments;
use crate::timeline::{
    AggregateEvents, BinAmplitude, ChannelMoments, Event, PopulationEvents, PopulationTimeline,
};
use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Gamma};

/// A named detector channel and the coupling model feeding it.
#[derive(Clone, Copy)]
pub struct Channel<'a> {
    pub name: &'a str,
    pub coupling: &'a dyn Coupling,
}

impl std::fmt::Debug for Channel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("name", &self.name).finish_non_exhaustive()
    }
}

impl BinAmplitude {
    /// Match a gamma distribution to the sum of a Poisson number (mean
    /// `expected_per_bin`) of particles with single-particle amplitude
    /// moments `mean_amplitude` and `mean_square_amplitude`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cytosim::timeline::BinAmplitude;
    ///
    /// assert_eq!(
    ///     BinAmplitude::from_moments(4.0, 2.0, 8.0),
    ///     BinAmplitude::Gamma { shape: 2.0, scale: 4.0 }
    /// );
    /// assert_eq!(BinAmplitude::from_moments(4.0, 2.0, 0.0), BinAmplitude::Degenerate);
    /// ```
    pub fn from_moments(expected_per_bin: f64, mean_amplitude: f64, mean_square_amplitude: f64) -> Self {
        let mean_sum = expected_per_bin * mean_amplitude;
        let var_sum = expected_per_bin * mean_square_amplitude;

        if !(mean_sum > 0.0 && var_sum > 0.0 && mean_sum.is_finite() && var_sum.is_finite()) {
            return BinAmplitude::Degenerate;
        }
        BinAmplitude::Gamma {
            shape: mean_sum * mean_sum / var_sum,
            scale: var_sum / mean_sum,
        }
    }

    /// Draw the summed amplitude of one interval. Degenerate parameters
    /// always yield exactly `0.0`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            BinAmplitude::Degenerate => 0.0,
            BinAmplitude::Gamma { shape, scale } => {
                Gamma::new(*shape, *scale).map_or(0.0, |gamma| gamma.sample(rng))
            }
        }
    }
}

/// Per-particle simulation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExplicitModel;

impl ExplicitModel {
    /// One [`Event`] per arrival, with properties drawn from `population`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        population: &Population,
        time: &[f64],
        transverse: &TransverseSamples,
        context: &SamplingContext<'_>,
        rng: &mut R,
    ) -> Result<Vec<Event>> {
        let n = time.len();
        let diameters = population.diameter.generate(n, rng)?;
        let refractive_indices = population.refractive_index.generate(n, rng)?;

        Ok((0..n)
            .map(|i| {
                let velocity = transverse.velocity[i];
                Event {
                    time: time[i],
                    y: transverse.y[i],
                    z: transverse.z[i],
                    velocity,
                    width: context.beam.pulse_width(velocity),
                    diameter: diameters[i],
                    refractive_index: refractive_indices[i],
                    amplitudes: context
                        .channels
                        .iter()
                        .map(|c| {
                            c.coupling.amplitude(
                                diameters[i],
                                refractive_indices[i],
                                context.medium_refractive_index,
                            )
                        })
                        .collect(),
                }
            })
            .collect())
    }
}

/// Aggregate simulation of dense populations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GammaModel {
    pub mc_samples: usize,
}

impl Default for GammaModel {
    fn default() -> Self {
        Self { mc_samples: 10_000 }
    }
}

impl GammaModel {
    /// Monte Carlo estimate of the mean and mean square single-particle
    /// amplitude on every channel, in channel order.
    pub fn amplitude_moments<R: Rng + ?Sized>(
        &self,
        population: &Population,
        context: &SamplingContext<'_>,
        rng: &mut R,
    ) -> Result<Vec<(f64, f64)>> {
        let diameters = population.diameter.generate(self.mc_samples, rng)?;
        let refractive_indices = population.refractive_index.generate(self.mc_samples, rng)?;

        Ok(context
            .channels
            .iter()
            .map(|c| {
                let amplitudes: Vec<f64> = diameters
                    .iter()
                    .zip(&refractive_indices)
                    .map(|(&d, &n)| c.coupling.amplitude(d, n, context.medium_refractive_index))
                    .collect();
                raw_moments(&amplitudes).unwrap_or((0.0, 0.0))
            })
            .collect())
    }

    /// Gamma parameters of every channel, from the population's particle flux
    /// and the sampling interval.
    pub fn sample<R: Rng + ?Sized, F: FlowProfile>(
        &self,
        population: &Population,
        flow: &F,
        context: &SamplingContext<'_>,
        rng: &mut R,
    ) -> Result<AggregateEvents> {
        let moments = self.amplitude_moments(population, context, rng)?;

        let flux = population
            .particle_count
            .flux(flow.sample_area(), flow.mean_speed(), context.run_time);
        let expected_per_bin = flux / context.sampling_rate;

        let transverse = flow.sample_transverse_profile(
            self.mc_samples,
            context.perfect_focusing,
            rng,
        );
        let widths: Vec<f64> = transverse
            .velocity
            .iter()
            .map(|&v| context.beam.pulse_width(v))
            .collect();
        let mean_pulse_width = raw_moments(&widths).map_or(0.0, |(mean, _)| mean);

        let channels = context
            .channels
            .iter()
            .zip(moments)
            .map(|(c, (mean_amplitude, mean_square_amplitude))| ChannelMoments {
                detector: c.name.to_string(),
                mean_amplitude,
                mean_square_amplitude,
                bin_amplitude: BinAmplitude::from_moments(
                    expected_per_bin,
                    mean_amplitude,
                    mean_square_amplitude,
                ),
            })
            .collect();

        Ok(AggregateEvents {
            expected_per_bin,
            mean_pulse_width,
            channels,
        })
    }
}

/// Everything a sampling model needs besides the population itself.
#[derive(Debug)]
pub struct SamplingContext<'a> {
    pub channels: &'a [Channel<'a>],
    pub beam: &'a GaussianBeam,
    pub medium_refractive_index: f64,
    /// [Hz]
    pub sampling_rate: f64,
    /// [s]
    pub run_time: f64,
    pub perfect_focusing: bool,
}

/// Assign amplitudes to a sampled timeline, dispatching on the population's
/// sampling method.
///
/// Returns `None` for skipped populations.
pub fn sample_population<R, F>(
    population: &Population,
    timeline: PopulationTimeline,
    flow: &F,
    context: &SamplingContext<'_>,
    rng: &mut R,
) -> Result<Option<PopulationEvents>>
where
    R: Rng + ?Sized,
    F: FlowProfile,
{
    let mut events = PopulationEvents {
        name: population.name.clone(),
        kind: population.kind.clone(),
        sampling_method: population.sampling_method,
        particle_count: population.particle_count,
        expected_events: timeline.expected_events(),
        events: Vec::new(),
        aggregate: None,
    };

    match (population.sampling_method, timeline) {
        (_, PopulationTimeline::Skipped { .. }) => return Ok(None),
        (SamplingMethod::Explicit, PopulationTimeline::Explicit { time, transverse, .. }) => {
            events.events = ExplicitModel.sample(population, &time, &transverse, context, rng)?;
        }
        (SamplingMethod::Gamma { mc_samples }, _) => {
            let model = GammaModel { mc_samples };
            events.aggregate = Some(model.sample(population, flow, context, rng)?);
        }
        (SamplingMethod::Explicit, PopulationTimeline::Aggregate { .. }) => {
            debug!("population `{}` has no explicit arrivals", population.name);
            return Ok(None);
        }
    }

    Ok(Some(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Distribution as PropertyDistribution;
    use crate::population::ParticleCount;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uom::si::f64::{Length, Power};
    use uom::si::length::micrometer;
    use uom::si::length::nanometer;
    use uom::si::power::milliwatt;

    struct PlugFlow;

    impl FlowProfile for PlugFlow {
        fn sample_area(&self) -> f64 {
            1e-10
        }

        fn mean_speed(&self) -> f64 {
            2.0
        }

        fn sample_transverse_profile<R: Rng + ?Sized>(
            &self,
            n_events: usize,
            _: bool,
            _: &mut R,
        ) -> TransverseSamples {
            TransverseSamples {
                y: vec![0.0; n_events],
                z: vec![0.0; n_events],
                velocity: vec![2.0; n_events],
            }
        }
    }

    fn beam() -> GaussianBeam {
        GaussianBeam::builder()
            .wavelength(Length::new::<nanometer>(488.0))
            .optical_power(Power::new::<milliwatt>(10.0))
            .waist(Length::new::<micrometer>(10.0))
            .build()
            .unwrap()
    }

    fn population(sampling_method: SamplingMethod) -> Population {
        Population::builder()
            .name("p")
            .diameter(PropertyDistribution::Uniform {
                lower: 1.0,
                upper: 3.0,
            })
            .refractive_index(PropertyDistribution::Delta(1.5))
            .particle_count(ParticleCount::Number(1000.0))
            .sampling_method(sampling_method)
            .build()
    }

    #[test]
    fn degenerate_bin_amplitude_is_zero() {
        let mut rng = StdRng::seed_from_u64(0);
        for (expected, mean, mean_sq) in [(0.0, 1.0, 1.0), (5.0, 0.0, 0.0), (5.0, 1.0, 0.0), (5.0, -1.0, 2.0)] {
            let amplitude = BinAmplitude::from_moments(expected, mean, mean_sq);
            assert_eq!(amplitude, BinAmplitude::Degenerate);
            assert_eq!(amplitude.sample(&mut rng), 0.0);
        }
    }

    #[test]
    fn gamma_matches_compound_poisson_moments() {
        let amplitude = BinAmplitude::from_moments(10.0, 2.0, 5.0);
        let BinAmplitude::Gamma { shape, scale } = amplitude else {
            panic!("expected gamma parameters");
        };
        // mean = 20, variance = 50
        assert!((shape * scale - 20.0).abs() < 1e-12);
        assert!((shape * scale * scale - 50.0).abs() < 1e-12);

        let mut rng = StdRng::seed_from_u64(1);
        let draws: Vec<f64> = (0..20_000).map(|_| amplitude.sample(&mut rng)).collect();
        let (mean, _) = raw_moments(&draws).unwrap();
        assert!((mean - 20.0).abs() < 0.3);
    }

    #[test]
    fn explicit_events_carry_every_channel() {
        let double = |d: f64, _: f64, _: f64| 2.0 * d;
        let unit = |_: f64, _: f64, _: f64| 1.0;
        let channels = [
            Channel {
                name: "a",
                coupling: &double,
            },
            Channel {
                name: "b",
                coupling: &unit,
            },
        ];
        let beam = beam();
        let context = SamplingContext {
            channels: &channels,
            beam: &beam,
            medium_refractive_index: 1.33,
            sampling_rate: 1e6,
            run_time: 1e-3,
            perfect_focusing: false,
        };
        let time = vec![1e-4, 2e-4, 3e-4];
        let transverse = PlugFlow.sample_transverse_profile(3, false, &mut StdRng::seed_from_u64(0));
        let events = ExplicitModel
            .sample(
                &population(SamplingMethod::Explicit),
                &time,
                &transverse,
                &context,
                &mut StdRng::seed_from_u64(2),
            )
            .unwrap();

        assert_eq!(events.len(), 3);
        for event in &events {
            assert_eq!(event.amplitudes, vec![2.0 * event.diameter, 1.0]);
            assert!((event.width - 5e-6).abs() < 1e-18);
            assert_eq!(event.refractive_index, 1.5);
        }
    }

    #[test]
    fn gamma_model_moments_and_rate() {
        let double = |d: f64, _: f64, _: f64| 2.0 * d;
        let zero = |_: f64, _: f64, _: f64| 0.0;
        let channels = [
            Channel {
                name: "a",
                coupling: &double,
            },
            Channel {
                name: "b",
                coupling: &zero,
            },
        ];
        let beam = beam();
        let context = SamplingContext {
            channels: &channels,
            beam: &beam,
            medium_refractive_index: 1.33,
            sampling_rate: 1e6,
            run_time: 1e-3,
            perfect_focusing: true,
        };
        let aggregate = GammaModel { mc_samples: 20_000 }
            .sample(
                &population(SamplingMethod::gamma()),
                &PlugFlow,
                &context,
                &mut StdRng::seed_from_u64(3),
            )
            .unwrap();

        // 1000 particles over 1000 samples.
        assert!((aggregate.expected_per_bin - 1.0).abs() < 1e-12);
        assert!((aggregate.mean_pulse_width - 5e-6).abs() < 1e-18);
        // diameter ~ U(1, 3): mean amplitude 4
        assert!((aggregate.channels[0].mean_amplitude - 4.0).abs() < 0.05);
        assert!(matches!(
            aggregate.channels[0].bin_amplitude,
            BinAmplitude::Gamma { .. }
        ));
        assert_eq!(aggregate.channels[1].bin_amplitude, BinAmplitude::Degenerate);
    }

    #[test]
    fn dispatch_skips_empty_timelines() {
        let unit = |_: f64, _: f64, _: f64| 1.0;
        let channels = [Channel {
            name: "a",
            coupling: &unit,
        }];
        let beam = beam();
        let context = SamplingContext {
            channels: &channels,
            beam: &beam,
            medium_refractive_index: 1.33,
            sampling_rate: 1e6,
            run_time: 1e-3,
            perfect_focusing: false,
        };
        let result = sample_population(
            &population(SamplingMethod::Explicit),
            PopulationTimeline::Skipped {
                expected_events: 0.0,
            },
            &PlugFlow,
            &context,
            &mut StdRng::seed_from_u64(4),
        )
        .unwrap();
        assert!(result.is_none());
    }
}
