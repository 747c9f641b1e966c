//! Particle populations and how many of them cross the interrogation region.
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use bon::Builder;
use uom::si::f64::Length;

/// Quantity of particles of a population, either as a concentration or as a
/// fixed number of particles per run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParticleCount {
    /// Particles per cubic meter.
    Concentration(f64),
    /// Fixed number of particles over the whole run.
    Number(f64),
}

impl ParticleCount {
    /// Expected number of particles crossing a region of cross-section
    /// `flow_area` [m²] at `flow_speed` [m/s] during `run_time` [s].
    pub fn number_of_events(&self, flow_area: f64, flow_speed: f64, run_time: f64) -> f64 {
        match self {
            ParticleCount::Concentration(c) => c * flow_area * flow_speed * run_time,
            ParticleCount::Number(n) => *n,
        }
    }

    /// Expected particle rate [1/s].
    pub fn flux(&self, flow_area: f64, flow_speed: f64, run_time: f64) -> f64 {
        match self {
            ParticleCount::Concentration(c) => c * flow_area * flow_speed,
            ParticleCount::Number(n) if run_time > 0.0 => n / run_time,
            ParticleCount::Number(_) => 0.0,
        }
    }

    /// Same as [`ParticleCount::number_of_events`], clamped to
    /// `[minimum, maximum]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cytosim::population::ParticleCount;
    ///
    /// let count = ParticleCount::Number(500.0);
    /// assert_eq!(count.number_of_events_within(1.0, 1.0, 1.0, 0.0, 100.0)?, 100.0);
    /// assert!(count.number_of_events_within(1.0, 1.0, 1.0, 10.0, 1.0).is_err());
    /// # Ok::<(), cytosim::Error>(())
    /// ```
    pub fn number_of_events_within(
        &self,
        flow_area: f64,
        flow_speed: f64,
        run_time: f64,
        minimum: f64,
        maximum: f64,
    ) -> Result<f64> {
        if !(minimum <= maximum) {
            return Err(Error::invalid(
                "particle count bounds",
                format!("minimum {minimum} is greater than maximum {maximum}"),
            ));
        }
        Ok(self
            .number_of_events(flow_area, flow_speed, run_time)
            .clamp(minimum, maximum))
    }

    /// Scale the count by `factor`.
    pub fn scaled(self, factor: f64) -> Self {
        match self {
            ParticleCount::Concentration(c) => ParticleCount::Concentration(c * factor),
            ParticleCount::Number(n) => ParticleCount::Number(n * factor),
        }
    }
}

/// How a population contributes to the synthesized signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingMethod {
    /// One Gaussian pulse per particle. Suited to rare populations.
    Explicit,
    /// A gamma distributed aggregate trace whose moments are estimated from
    /// `mc_samples` Monte Carlo particles. Suited to dense populations.
    Gamma { mc_samples: usize },
}

impl SamplingMethod {
    /// Gamma model with the default number of Monte Carlo samples.
    pub fn gamma() -> Self {
        SamplingMethod::Gamma { mc_samples: 10_000 }
    }
}

/// A named group of particles sharing diameter and refractive index
/// distributions.
///
/// # Examples
///
/// ```
/// use cytosim::distribution::Distribution;
/// use cytosim::population::{ParticleCount, Population, SamplingMethod};
///
/// let population = Population::builder()
///     .name("beads")
///     .diameter(Distribution::Delta(200e-9))
///     .refractive_index(Distribution::Delta(1.59))
///     .particle_count(ParticleCount::Concentration(1e15))
///     .build();
///
/// assert_eq!(population.sampling_method, SamplingMethod::Explicit);
/// ```
#[derive(Builder, Clone, Debug, PartialEq)]
pub struct Population {
    #[builder(into)]
    pub name: String,
    /// Free-form tag ("sphere", "cell", ...), used in reports only.
    #[builder(into, default = String::from("sphere"))]
    pub kind: String,
    /// Diameter distribution [m].
    pub diameter: Distribution,
    pub refractive_index: Distribution,
    pub particle_count: ParticleCount,
    #[builder(default = SamplingMethod::Explicit)]
    pub sampling_method: SamplingMethod,
}

impl Population {
    /// Divide the particle count by `factor`.
    pub fn dilute(&mut self, factor: f64) {
        self.particle_count = self.particle_count.scaled(1.0 / factor);
    }
}

/// Net effect of a sample cleanup step: an optional concentration scaling
/// and a hard minimum diameter.
///
/// # Examples
///
/// ```
/// use cytosim::distribution::Distribution;
/// use cytosim::population::{FractionSelection, ParticleCount, Population};
/// use rand::{rngs::StdRng, SeedableRng};
/// use uom::si::{f64::Length, length::nanometer};
///
/// let mut population = Population::builder()
///     .name("vesicles")
///     .diameter(Distribution::LogNormal { mu: (80e-9f64).ln(), sigma: 0.4 })
///     .refractive_index(Distribution::Delta(1.40))
///     .particle_count(ParticleCount::Concentration(1e16))
///     .build();
///
/// FractionSelection::builder()
///     .minimum_diameter(Length::new::<nanometer>(70.0))
///     .concentration_multiplier(0.4)
///     .build()
///     .apply(&mut population);
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let diameters = population.diameter.generate(1000, &mut rng)?;
/// assert!(diameters.iter().all(|&d| d >= 70e-9));
/// # Ok::<(), cytosim::Error>(())
/// ```
#[derive(Builder, Clone, Copy, Debug)]
pub struct FractionSelection {
    minimum_diameter: Length,
    concentration_multiplier: Option<f64>,
    #[builder(default = 4)]
    oversample_factor: usize,
    #[builder(default = 50)]
    maximum_rounds: usize,
}

impl FractionSelection {
    /// Apply the selection to `population` in place.
    pub fn apply(&self, population: &mut Population) {
        if let Some(multiplier) = self.concentration_multiplier {
            population.particle_count = population.particle_count.scaled(multiplier);
        }
        let base = std::mem::replace(&mut population.diameter, Distribution::Delta(0.0));
        population.diameter = Distribution::AtLeast {
            base: Box::new(base),
            minimum: crate::units::meters(self.minimum_diameter),
            oversample_factor: self.oversample_factor,
            maximum_rounds: self.maximum_rounds,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uom::si::length::nanometer;

    fn population(count: ParticleCount) -> Population {
        Population::builder()
            .name("p")
            .diameter(Distribution::Delta(100e-9))
            .refractive_index(Distribution::Delta(1.4))
            .particle_count(count)
            .build()
    }

    #[test]
    fn concentration_events_and_flux() {
        let count = ParticleCount::Concentration(1e12);
        let events = count.number_of_events(1e-10, 1.0, 2.0);
        assert!((events - 200.0).abs() < 1e-9);
        assert!((count.flux(1e-10, 1.0, 2.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn number_events_and_flux() {
        let count = ParticleCount::Number(50.0);
        assert_eq!(count.number_of_events(1.0, 1.0, 10.0), 50.0);
        assert_eq!(count.flux(1.0, 1.0, 10.0), 5.0);
        assert_eq!(count.flux(1.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn bounds_must_be_ordered() {
        let count = ParticleCount::Number(5.0);
        assert!(matches!(
            count.number_of_events_within(1.0, 1.0, 1.0, 3.0, 2.0),
            Err(Error::InvalidParameter { .. })
        ));
        assert_eq!(
            count.number_of_events_within(1.0, 1.0, 1.0, 10.0, 20.0).unwrap(),
            10.0
        );
    }

    #[test]
    fn dilution() {
        let mut p = population(ParticleCount::Concentration(1e12));
        p.dilute(4.0);
        assert_eq!(p.particle_count, ParticleCount::Concentration(2.5e11));
    }

    #[test]
    fn fraction_selection_wraps_diameter() {
        let mut p = population(ParticleCount::Number(100.0));
        FractionSelection::builder()
            .minimum_diameter(Length::new::<nanometer>(50.0))
            .concentration_multiplier(0.5)
            .build()
            .apply(&mut p);

        assert_eq!(p.particle_count, ParticleCount::Number(50.0));
        match &p.diameter {
            Distribution::AtLeast {
                base,
                oversample_factor,
                maximum_rounds,
                minimum,
            } => {
                assert_eq!(**base, Distribution::Delta(100e-9));
                assert_eq!(*oversample_factor, 4);
                assert_eq!(*maximum_rounds, 50);
                assert!((minimum - 50e-9).abs() < 1e-20);
            }
            other => panic!("unexpected distribution: {other:?}"),
        }
    }

    #[test]
    fn concentration_events_scale_with_run_time() {
        let count = ParticleCount::Concentration(1e15);
        assert!((count.number_of_events(1e-10, 1.0, 1e-3) - 100.0).abs() < 1e-9);
        assert!((count.flux(1e-10, 1.0, 1e-3) - 1e5).abs() < 1e-6);
    }
}
