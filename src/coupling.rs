//! Optical power a single particle couples into a detector.
use crate::error::{Error, Result};
use crate::units::{meters, positive, watts};
use bon::bon;
use std::f64::consts::PI;
use uom::si::angle::radian;
use uom::si::f64::{Angle, Length, Power};

/// Maps particle properties to the optical power it couples into one
/// detector [W].
///
/// Closures taking `(diameter, refractive_index, medium_refractive_index)`
/// implement this trait.
///
/// # Examples
///
/// ```
/// use cytosim::coupling::Coupling;
///
/// let coupling = |diameter: f64, _: f64, _: f64| diameter * 2.0;
/// assert_eq!(coupling.amplitude(2e-6, 1.4, 1.33), 4e-6);
/// ```
pub trait Coupling {
    fn amplitude(&self, diameter: f64, refractive_index: f64, medium_refractive_index: f64) -> f64;
}

impl<F> Coupling for F
where
    F: Fn(f64, f64, f64) -> f64,
{
    fn amplitude(&self, diameter: f64, refractive_index: f64, medium_refractive_index: f64) -> f64 {
        self(diameter, refractive_index, medium_refractive_index)
    }
}

/// Every particle couples the same power.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformCoupling {
    power: f64,
}

impl UniformCoupling {
    pub fn new(power: Power) -> Self {
        Self {
            power: watts(power),
        }
    }
}

impl Coupling for UniformCoupling {
    fn amplitude(&self, _: f64, _: f64, _: f64) -> f64 {
        self.power
    }
}

/// Focused Gaussian laser beam illuminating the interrogation region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianBeam {
    /// Vacuum wavelength [m].
    pub wavelength: f64,
    /// Total optical power [W].
    pub optical_power: f64,
    /// 1/e² intensity radius at the focus [m].
    pub waist: f64,
}

#[bon]
impl GaussianBeam {
    /// A beam is described either by its waist or by the numerical aperture
    /// of the focusing optics, `waist = λ / (π NA)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cytosim::coupling::GaussianBeam;
    /// use uom::si::f64::{Length, Power};
    /// use uom::si::length::{micrometer, nanometer};
    /// use uom::si::power::milliwatt;
    ///
    /// let beam = GaussianBeam::builder()
    ///     .wavelength(Length::new::<nanometer>(488.0))
    ///     .optical_power(Power::new::<milliwatt>(20.0))
    ///     .waist(Length::new::<micrometer>(10.0))
    ///     .build()?;
    ///
    /// assert!((beam.peak_intensity() - 2.0 * 20e-3 / (std::f64::consts::PI * 1e-10)).abs() < 1.0);
    /// # Ok::<(), cytosim::Error>(())
    /// ```
    #[builder]
    pub fn new(
        wavelength: Length,
        optical_power: Power,
        waist: Option<Length>,
        numerical_aperture: Option<f64>,
    ) -> Result<Self> {
        let wavelength = meters(wavelength);
        let waist = match (waist, numerical_aperture) {
            (Some(waist), _) => meters(waist),
            (None, Some(na)) if na > 0.0 => wavelength / (PI * na),
            _ => {
                return Err(Error::invalid(
                    "waist",
                    "either a waist or a positive numerical aperture is required",
                ))
            }
        };
        Ok(Self {
            wavelength: positive("wavelength", wavelength)?.get(),
            optical_power: watts(optical_power),
            waist: positive("waist", waist)?.get(),
        })
    }
}

impl GaussianBeam {
    /// Intensity on the beam axis at the focus [W/m²].
    pub fn peak_intensity(&self) -> f64 {
        2.0 * self.optical_power / (PI * self.waist * self.waist)
    }

    /// Transit time scale of a particle crossing the beam at `velocity`
    /// [m/s], used as the pulse standard deviation [s].
    pub fn pulse_width(&self, velocity: f64) -> f64 {
        self.waist / velocity
    }
}

/// Small-particle (Rayleigh) scattering into a detector of numerical
/// aperture `numerical_aperture` observing at angle `phi`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayleighCoupling {
    beam: GaussianBeam,
    numerical_aperture: f64,
    phi: f64,
}

impl RayleighCoupling {
    pub fn new(beam: GaussianBeam, numerical_aperture: f64, phi: Angle) -> Self {
        Self {
            beam,
            numerical_aperture,
            phi: phi.get::<radian>(),
        }
    }

    /// Angle dependent scattering cross-section [m²].
    pub fn cross_section(&self, diameter: f64, refractive_index: f64, medium_refractive_index: f64) -> f64 {
        let m = refractive_index / medium_refractive_index;
        let k = 2.0 * PI * medium_refractive_index / self.beam.wavelength;
        let polarizability = (m * m - 1.0) / (m * m + 2.0);
        let radius = diameter / 2.0;
        let sigma_0 = 8.0 * PI / 3.0 * k.powi(4) * polarizability.powi(2) * radius.powi(6);

        sigma_0 * self.phi.sin().powi(2)
    }
}

impl Coupling for RayleighCoupling {
    fn amplitude(&self, diameter: f64, refractive_index: f64, medium_refractive_index: f64) -> f64 {
        let scattered = self.cross_section(diameter, refractive_index, medium_refractive_index)
            * self.beam.peak_intensity();
        let solid_angle_fraction = self.numerical_aperture.powi(2) / (4.0 * PI);

        scattered * solid_angle_fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uom::si::angle::degree;
    use uom::si::length::{micrometer, nanometer};
    use uom::si::power::milliwatt;

    fn beam() -> GaussianBeam {
        GaussianBeam::builder()
            .wavelength(Length::new::<nanometer>(488.0))
            .optical_power(Power::new::<milliwatt>(100.0))
            .waist(Length::new::<micrometer>(5.0))
            .build()
            .unwrap()
    }

    #[test]
    fn uniform_is_constant() {
        let coupling = UniformCoupling::new(Power::new::<milliwatt>(1.0));
        assert_eq!(coupling.amplitude(1e-7, 1.4, 1.33), 1e-3);
        assert_eq!(coupling.amplitude(5e-7, 1.6, 1.33), 1e-3);
    }

    #[test]
    fn beam_from_numerical_aperture() {
        let beam = GaussianBeam::builder()
            .wavelength(Length::new::<nanometer>(500.0))
            .optical_power(Power::new::<milliwatt>(1.0))
            .numerical_aperture(0.1)
            .build()
            .unwrap();
        assert!((beam.waist - 500e-9 / (PI * 0.1)).abs() < 1e-15);
        assert_eq!(beam.pulse_width(2.0), beam.waist / 2.0);

        let missing = GaussianBeam::builder()
            .wavelength(Length::new::<nanometer>(500.0))
            .optical_power(Power::new::<milliwatt>(1.0))
            .build();
        assert!(missing.is_err());
    }

    #[test]
    fn rayleigh_scales_with_sixth_power() {
        let coupling = RayleighCoupling::new(beam(), 0.2, Angle::new::<degree>(90.0));
        let small = coupling.amplitude(100e-9, 1.45, 1.33);
        let large = coupling.amplitude(200e-9, 1.45, 1.33);

        assert!(small > 0.0);
        assert!((large / small - 64.0).abs() < 1e-9);
    }

    #[test]
    fn rayleigh_index_matched_particle_is_invisible() {
        let coupling = RayleighCoupling::new(beam(), 0.2, Angle::new::<degree>(90.0));
        assert_eq!(coupling.amplitude(100e-9, 1.33, 1.33), 0.0);
    }

    #[test]
    fn rayleigh_forward_angle_is_dark() {
        let coupling = RayleighCoupling::new(beam(), 0.2, Angle::new::<degree>(0.0));
        assert_eq!(coupling.amplitude(100e-9, 1.45, 1.33), 0.0);
    }
}
