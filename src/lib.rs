//! Flow cytometer signal simulation.
//!
//! Particles of one or more [`population::Population`]s cross a focused laser
//! beam inside a [`flow_cell::FlowCell`]. Each crossing produces an optical
//! pulse on every [`detector::Detector`]; the pulses are converted to current,
//! amplified, filtered, digitized and finally segmented by a
//! [`trigger::TriggeringSystem`] for [`peak`] detection.
//!
//! [`cytometer::FlowCytometer`] ties the chain together:
//!
//! ```
//! use cytosim::coupling::{GaussianBeam, UniformCoupling};
//! use cytosim::cytometer::FlowCytometer;
//! use cytosim::detector::{Detector, TransimpedanceAmplifier};
//! use cytosim::digitizer::Digitizer;
//! use cytosim::distribution::Distribution;
//! use cytosim::flow_cell::FlowCell;
//! use cytosim::population::{ParticleCount, Population};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use uom::si::electrical_resistance::ohm;
//! use uom::si::f64::{ElectricalResistance, Frequency, Length, Power, Time, VolumeRate};
//! use uom::si::frequency::megahertz;
//! use uom::si::length::{micrometer, nanometer};
//! use uom::si::power::milliwatt;
//! use uom::si::time::millisecond;
//! use uom::si::volume_rate::cubic_meter_per_second;
//!
//! let mut cytometer = FlowCytometer::builder()
//!     .add_population(
//!         Population::builder()
//!             .name("beads")
//!             .diameter(Distribution::Delta(200e-9))
//!             .refractive_index(Distribution::Delta(1.59))
//!             .particle_count(ParticleCount::Number(10.0))
//!             .build(),
//!     )
//!     .add_detector(
//!         Detector::builder()
//!             .name("side")
//!             .coupling(UniformCoupling::new(Power::new::<milliwatt>(1.0)))
//!             .build(),
//!     )
//!     .flow_cell(
//!         FlowCell::builder()
//!             .width(Length::new::<micrometer>(100.0))
//!             .height(Length::new::<micrometer>(100.0))
//!             .sample_volume_flow(VolumeRate::new::<cubic_meter_per_second>(1.7e-11))
//!             .sheath_volume_flow(VolumeRate::new::<cubic_meter_per_second>(1.7e-10))
//!             .build()?,
//!     )
//!     .beam(
//!         GaussianBeam::builder()
//!             .wavelength(Length::new::<nanometer>(488.0))
//!             .optical_power(Power::new::<milliwatt>(20.0))
//!             .waist(Length::new::<micrometer>(5.0))
//!             .build()?,
//!     )
//!     .amplifier(
//!         TransimpedanceAmplifier::builder()
//!             .gain(ElectricalResistance::new::<ohm>(1e3))
//!             .bandwidth(Frequency::new::<megahertz>(1.0))
//!             .build(),
//!     )
//!     .digitizer(
//!         Digitizer::builder()
//!             .sampling_rate(Frequency::new::<megahertz>(1.0))
//!             .build(),
//!     )
//!     .observer(())
//!     .build()?;
//!
//! let acquisition = cytometer.run(Time::new::<millisecond>(1.0), &mut StdRng::seed_from_u64(0))?;
//! assert_eq!(acquisition.events.explicit_event_count(), 10);
//! # Ok::<(), cytosim::Error>(())
//! ```

/// Gaussian beam and detector coupling models.
pub mod coupling;
/// Acquisition chain and its observer.
pub mod cytometer;
/// Photodetectors and transimpedance amplifier.
pub mod detector;
/// Analog-to-digital conversion.
pub mod digitizer;
/// Particle property distributions.
pub mod distribution;
mod error;
/// Frequency-domain analog filters.
pub mod filter;
/// Laminar flow through a rectangular channel.
pub mod flow_cell;
pub mod numeric;
/// Textual shorthands for thresholds and bit depths.
pub mod parse;
/// Peak locators.
pub mod peak;
/// Particle populations.
pub mod population;
/// Summaries of events and peaks.
pub mod report;
/// Amplitude sampling models.
pub mod sampler;
/// Noise and processing switches.
pub mod settings;
/// Multi-channel signal buffer.
pub mod signal;
pub mod statistics;
/// Particle arrivals and event records.
pub mod timeline;
/// Triggering system.
pub mod trigger;
pub mod units;

pub use error::{Error, Result};
