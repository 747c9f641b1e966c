//! Rectangular flow cell with a hydrodynamically focused sample stream.
use crate::error::{Error, Result};
use crate::statistics::PoissonProcess;
use crate::units::{cubic_meters_per_second, meters, positive};
use bon::bon;
use rand::Rng;
use std::f64::consts::PI;
use uom::si::dynamic_viscosity::pascal_second;
use uom::si::f64::{DynamicViscosity, Frequency, Length, VolumeRate};
use uom::si::frequency::hertz;

/// Pressure gradient used to normalize the velocity profile [Pa/m].
const REFERENCE_PRESSURE_GRADIENT: f64 = -1.0;

/// Transverse positions and velocities of particles crossing the
/// interrogation region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransverseSamples {
    /// Position across the channel width [m].
    pub y: Vec<f64>,
    /// Position across the channel height [m].
    pub z: Vec<f64>,
    /// Axial velocity [m/s].
    pub velocity: Vec<f64>,
}

/// Source of particle arrival times and transverse positions.
pub trait FlowProfile {
    /// Cross-section of the region particles travel through [m²].
    fn sample_area(&self) -> f64;
    /// Mean axial speed within that region [m/s].
    fn mean_speed(&self) -> f64;
    /// `n_events` sorted arrival times, uniformly spread over `[0, run_time]`.
    fn sample_arrival_times<R: Rng + ?Sized>(
        &self,
        n_events: usize,
        run_time: f64,
        rng: &mut R,
    ) -> Vec<f64> {
        let mut times: Vec<f64> = (0..n_events)
            .map(|_| rng.random::<f64>() * run_time)
            .collect();
        times.sort_by(f64::total_cmp);
        times
    }
    /// Arrival times of a Poisson process with rate `particle_flux` [1/s],
    /// truncated to `run_time` [s].
    fn sample_poisson_arrival_times<R: Rng + ?Sized>(
        &self,
        run_time: f64,
        particle_flux: f64,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        if !(particle_flux > 0.0) {
            return Ok(Vec::new());
        }
        let process = PoissonProcess::new(Frequency::new::<hertz>(particle_flux), rng)?;
        Ok(process.take_while(|&t| t <= run_time).collect())
    }
    /// Positions and velocities of `n_events` particles.
    fn sample_transverse_profile<R: Rng + ?Sized>(
        &self,
        n_events: usize,
        perfect_focusing: bool,
        rng: &mut R,
    ) -> TransverseSamples;
}

/// Extent and flow of one fluid region (sample or sheath).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidRegion {
    pub width: f64,
    pub height: f64,
    pub volume_flow: f64,
    pub max_flow_speed: f64,
    pub average_flow_speed: f64,
}

impl FluidRegion {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Laminar pressure-driven flow in a rectangular channel.
///
/// The axial velocity is the Fourier series solution of the Poisson equation
/// on a `width` by `height` cross-section. The pressure gradient is scaled so
/// that the integrated flow matches the total (sample plus sheath) volume
/// flow. The focused sample region is centered on the channel, has the aspect
/// ratio of the channel, and carries the sample flow at the centre velocity.
///
/// # Examples
///
/// ```
/// use cytosim::flow_cell::{FlowCell, FlowProfile};
/// use uom::si::f64::{Length, VolumeRate};
/// use uom::si::length::micrometer;
/// use uom::si::volume_rate::cubic_meter_per_second;
///
/// let flow_cell = FlowCell::builder()
///     .width(Length::new::<micrometer>(100.0))
///     .height(Length::new::<micrometer>(100.0))
///     .sample_volume_flow(VolumeRate::new::<cubic_meter_per_second>(5e-12))
///     .sheath_volume_flow(VolumeRate::new::<cubic_meter_per_second>(5e-11))
///     .build()?;
///
/// assert!(flow_cell.sample.width < flow_cell.sheath.width);
/// assert!(flow_cell.mean_speed() > 0.0);
/// # Ok::<(), cytosim::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct FlowCell {
    width: f64,
    height: f64,
    viscosity: f64,
    n_terms: usize,
    pressure_gradient: f64,
    /// Velocity on the channel axis [m/s].
    pub center_velocity: f64,
    pub sample: FluidRegion,
    pub sheath: FluidRegion,
}

#[bon]
impl FlowCell {
    #[builder]
    pub fn new(
        width: Length,
        height: Length,
        sample_volume_flow: VolumeRate,
        sheath_volume_flow: VolumeRate,
        #[builder(default = DynamicViscosity::new::<pascal_second>(1e-3))] viscosity: DynamicViscosity,
        #[builder(default = 25)] n_terms: usize,
        #[builder(default = 200)] n_int: usize,
    ) -> Result<Self> {
        let width = meters(width);
        let height = meters(height);
        let sample_flow = cubic_meters_per_second(sample_volume_flow);
        let sheath_flow = cubic_meters_per_second(sheath_volume_flow);
        let viscosity = viscosity.get::<pascal_second>();

        for (name, value) in [
            ("width", width),
            ("height", height),
            ("sample_volume_flow", sample_flow),
            ("viscosity", viscosity),
        ] {
            positive(name, value)?;
        }
        if !(sheath_flow >= 0.0) {
            return Err(Error::invalid("sheath_volume_flow", "must be non negative"));
        }
        if n_terms == 0 || n_int < 2 {
            return Err(Error::invalid(
                "n_terms/n_int",
                "need at least one series term and two quadrature points",
            ));
        }

        let mut cell = Self {
            width,
            height,
            viscosity,
            n_terms,
            pressure_gradient: REFERENCE_PRESSURE_GRADIENT,
            center_velocity: 0.0,
            sample: FluidRegion {
                width: 0.0,
                height: 0.0,
                volume_flow: sample_flow,
                max_flow_speed: 0.0,
                average_flow_speed: 0.0,
            },
            sheath: FluidRegion {
                width,
                height,
                volume_flow: sheath_flow,
                max_flow_speed: 0.0,
                average_flow_speed: 0.0,
            },
        };

        let total_flow = sample_flow + sheath_flow;
        let reference_flow = cell.channel_flow(REFERENCE_PRESSURE_GRADIENT, n_int);
        cell.pressure_gradient = REFERENCE_PRESSURE_GRADIENT * total_flow / reference_flow;
        cell.center_velocity = cell.velocity(0.0, 0.0);

        let sample_area = sample_flow / cell.center_velocity;
        let sample_height = 2.0 * (sample_area * height / (4.0 * width)).sqrt();
        let sample_width = width / height * sample_height;
        cell.sample = FluidRegion {
            width: sample_width,
            height: sample_height,
            volume_flow: sample_flow,
            max_flow_speed: cell.center_velocity,
            average_flow_speed: sample_flow / sample_area,
        };
        cell.sheath.max_flow_speed = cell.center_velocity;
        cell.sheath.average_flow_speed = total_flow / (width * height);

        Ok(cell)
    }
}

impl FlowCell {
    /// Axial velocity at `(y, z)` [m/s], with the channel centered on the
    /// origin.
    pub fn velocity(&self, y: f64, z: f64) -> f64 {
        self.velocity_with_gradient(y, z, self.pressure_gradient)
    }

    fn velocity_with_gradient(&self, y: f64, z: f64, pressure_gradient: f64) -> f64 {
        let (w, h) = (self.width, self.height);
        let prefactor = 4.0 * h * h / (PI.powi(3) * self.viscosity) * -pressure_gradient;

        let sum: f64 = (1..2 * self.n_terms)
            .step_by(2)
            .map(|n| {
                let n = n as f64;
                let term_y = 1.0 - (n * PI * y / h).cosh() / (n * PI * w / (2.0 * h)).cosh();
                let term_z = (n * PI * (z + h / 2.0) / h).sin();
                term_y * term_z / n.powi(3)
            })
            .sum();

        prefactor * sum
    }

    /// Volume flow for a given pressure gradient, by grid quadrature.
    fn channel_flow(&self, pressure_gradient: f64, n_int: usize) -> f64 {
        let dy = self.width / (n_int - 1) as f64;
        let dz = self.height / (n_int - 1) as f64;
        let mut sum = 0.0;
        for i in 0..n_int {
            let y = -self.width / 2.0 + i as f64 * dy;
            for j in 0..n_int {
                let z = -self.height / 2.0 + j as f64 * dz;
                sum += self.velocity_with_gradient(y, z, pressure_gradient);
            }
        }
        sum * dy * dz
    }
}

impl FlowProfile for FlowCell {
    fn sample_area(&self) -> f64 {
        self.sample.area()
    }

    fn mean_speed(&self) -> f64 {
        self.sample.average_flow_speed
    }

    fn sample_transverse_profile<R: Rng + ?Sized>(
        &self,
        n_events: usize,
        perfect_focusing: bool,
        rng: &mut R,
    ) -> TransverseSamples {
        let mut samples = TransverseSamples {
            y: Vec::with_capacity(n_events),
            z: Vec::with_capacity(n_events),
            velocity: Vec::with_capacity(n_events),
        };
        for _ in 0..n_events {
            let y = (rng.random::<f64>() - 0.5) * self.sample.width;
            let z = (rng.random::<f64>() - 0.5) * self.sample.height;
            let velocity = if perfect_focusing {
                self.center_velocity
            } else {
                self.velocity(y, z)
            };
            samples.y.push(y);
            samples.z.push(z);
            samples.velocity.push(velocity);
        }
        samples
    }
}
