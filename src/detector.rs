//! Photodetectors and the transimpedance amplifier that reads them out.
use crate::coupling::Coupling;
use crate::error::{Error, Result};
use crate::filter::{AnalogFilter, Band, FilterKind};
use crate::settings::SimulationSettings;
use crate::signal::{poisson_draw, SignalGenerator};
use crate::units::{hertz_of, ELEMENTARY_CHARGE, PLANCK, SPEED_OF_LIGHT};
use bon::bon;
use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::fmt;
use uom::si::electric_current::ampere;
use uom::si::electrical_resistance::ohm;
use uom::si::f64::{ElectricCurrent, ElectricalResistance, Frequency};

/// A photodetector converting optical power into photocurrent.
///
/// # Examples
///
/// ```
/// use cytosim::coupling::UniformCoupling;
/// use cytosim::detector::Detector;
/// use cytosim::numeric::linspace;
/// use cytosim::settings::SimulationSettings;
/// use cytosim::signal::SignalGenerator;
/// use rand::{rngs::StdRng, SeedableRng};
/// use uom::si::f64::Power;
/// use uom::si::power::milliwatt;
///
/// let detector = Detector::builder()
///     .name("side")
///     .responsivity(0.5)
///     .coupling(UniformCoupling::new(Power::new::<milliwatt>(1.0)))
///     .build();
///
/// let mut signal = SignalGenerator::new(linspace(0.0, 1e-3, 100))?;
/// signal.add_constant_to_signal("side", 2e-3);
///
/// let mut rng = StdRng::seed_from_u64(0);
/// detector.transform_power_to_current(&mut signal, 488e-9, 1e6, &SimulationSettings::noiseless(), &mut rng)?;
/// assert!((signal.get_signal("side")?[0] - 1e-3).abs() < 1e-15);
/// # Ok::<(), cytosim::Error>(())
/// ```
pub struct Detector {
    name: String,
    /// [A/W]
    responsivity: f64,
    /// [A]
    dark_current: f64,
    coupling: Box<dyn Coupling>,
}

#[bon]
impl Detector {
    #[builder]
    pub fn new<C>(
        #[builder(into)] name: String,
        #[builder(default = 1.0)] responsivity: f64,
        #[builder(default = ElectricCurrent::new::<ampere>(0.0))] dark_current: ElectricCurrent,
        coupling: C,
    ) -> Self
    where
        C: Coupling + 'static,
    {
        Self {
            name,
            responsivity,
            dark_current: dark_current.get::<ampere>(),
            coupling: Box::new(coupling),
        }
    }
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector")
            .field("name", &self.name)
            .field("responsivity", &self.responsivity)
            .field("dark_current", &self.dark_current)
            .finish_non_exhaustive()
    }
}

impl Detector {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coupling(&self) -> &dyn Coupling {
        self.coupling.as_ref()
    }

    /// Convert this detector's channel from optical power [W] to
    /// photocurrent [A], in place.
    ///
    /// With shot noise enabled, the power of every sample is turned into a
    /// photon count over one sampling interval `1 / (2 bandwidth)`, redrawn
    /// from a Poisson distribution and turned back into power.
    pub fn transform_power_to_current<R: Rng + ?Sized>(
        &self,
        signal: &mut SignalGenerator,
        wavelength: f64,
        bandwidth: f64,
        settings: &SimulationSettings,
        rng: &mut R,
    ) -> Result<()> {
        if settings.shot_noise() {
            let photon_energy = PLANCK * SPEED_OF_LIGHT / wavelength;
            let interval = 1.0 / (2.0 * bandwidth);
            let photons_per_watt = interval / photon_energy;
            if !photons_per_watt.is_finite() || photons_per_watt <= 0.0 {
                return Err(Error::invalid("bandwidth", "shot noise needs a positive bandwidth and wavelength"));
            }

            let noisy: Vec<f64> = signal
                .get_signal(&self.name)?
                .iter()
                .map(|&power| poisson_draw(power.max(0.0) * photons_per_watt, rng) / photons_per_watt)
                .collect();
            signal.set_signal(&self.name, noisy)?;
        }

        signal.multiply(self.responsivity, Some(&self.name))
    }

    /// Add dark current with its shot noise, `N(I_d, sqrt(2 q I_d B))`.
    /// Does nothing unless dark current noise is enabled.
    pub fn apply_dark_current_noise<R: Rng + ?Sized>(
        &self,
        signal: &mut SignalGenerator,
        bandwidth: f64,
        settings: &SimulationSettings,
        rng: &mut R,
    ) -> Result<()> {
        if !settings.dark_current_noise() {
            return Ok(());
        }
        let std_dev = (2.0 * ELEMENTARY_CHARGE * self.dark_current * bandwidth).sqrt();
        signal.apply_gaussian_noise(self.dark_current, std_dev, Some(&self.name), rng)
    }
}

/// Relative intensity noise of the light source: every sample of `channel`
/// gets Gaussian noise of standard deviation `x sqrt(rin B)`, `rin` in 1/Hz.
pub fn apply_source_noise<R: Rng + ?Sized>(
    signal: &mut SignalGenerator,
    channel: &str,
    rin: f64,
    bandwidth: f64,
    settings: &SimulationSettings,
    rng: &mut R,
) -> Result<()> {
    if !settings.source_noise() || rin <= 0.0 {
        return Ok(());
    }
    let relative = (rin * bandwidth).sqrt();
    let noisy: Vec<f64> = signal
        .get_signal(channel)?
        .iter()
        .map(|&power| {
            Normal::new(power, (power * relative).abs()).map_or(power, |normal| normal.sample(rng))
        })
        .collect();
    signal.set_signal(channel, noisy)
}

/// Converts photocurrent into voltage, adding input-referred noise.
///
/// # Examples
///
/// ```
/// use cytosim::detector::TransimpedanceAmplifier;
/// use uom::si::electrical_resistance::ohm;
/// use uom::si::f64::{ElectricalResistance, Frequency};
/// use uom::si::frequency::megahertz;
///
/// let amplifier = TransimpedanceAmplifier::builder()
///     .gain(ElectricalResistance::new::<ohm>(1e4))
///     .bandwidth(Frequency::new::<megahertz>(1.0))
///     .voltage_noise_density(3e-9)
///     .current_noise_density(0.0)
///     .build();
///
/// assert!((amplifier.total_output_noise() - 3e-6).abs() < 1e-15);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransimpedanceAmplifier {
    /// [V/A]
    gain: f64,
    /// -3 dB bandwidth [Hz].
    bandwidth: f64,
    /// [V/√Hz]
    voltage_noise_density: f64,
    /// [A/√Hz]
    current_noise_density: f64,
    filter_order: Option<u32>,
}

#[bon]
impl TransimpedanceAmplifier {
    #[builder]
    pub fn new(
        gain: ElectricalResistance,
        bandwidth: Frequency,
        #[builder(default = 0.0)] voltage_noise_density: f64,
        #[builder(default = 0.0)] current_noise_density: f64,
        // Butterworth low-pass at the bandwidth; unset means no filtering.
        filter_order: Option<u32>,
    ) -> Self {
        Self {
            gain: gain.get::<ohm>(),
            bandwidth: hertz_of(bandwidth),
            voltage_noise_density,
            current_noise_density,
            filter_order,
        }
    }
}

impl TransimpedanceAmplifier {
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Total RMS output noise [V] over the bandwidth.
    pub fn total_output_noise(&self) -> f64 {
        let sqrt_bandwidth = self.bandwidth.sqrt();
        let voltage = self.voltage_noise_density * sqrt_bandwidth;
        let current = self.current_noise_density * sqrt_bandwidth * self.gain;
        voltage.hypot(current)
    }

    /// Convert every channel from current [A] to voltage [V], in place.
    pub fn amplify<R: Rng + ?Sized>(
        &self,
        signal: &mut SignalGenerator,
        sampling_rate: f64,
        settings: &SimulationSettings,
        rng: &mut R,
    ) -> Result<()> {
        signal.multiply(self.gain, None)?;

        let noise = self.total_output_noise();
        if settings.amplifier_noise() && noise > 0.0 {
            signal.apply_gaussian_noise(0.0, noise, None, rng)?;
        }

        if let Some(order) = self.filter_order {
            if self.bandwidth < sampling_rate / 2.0 {
                let filter = AnalogFilter::builder()
                    .kind(FilterKind::Butterworth)
                    .band(Band::LowPass)
                    .cutoff(self.bandwidth)
                    .order(order)
                    .build();
                signal.apply_filter(&filter, sampling_rate, None)?;
            } else {
                debug!("amplifier bandwidth above Nyquist, skipping its low-pass");
            }
        }
        Ok(())
    }
}
