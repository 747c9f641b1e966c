//! Dimensioned inputs.
//!
//! Quantities cross the public API as [`uom`] types and are converted to plain
//! SI `f64` values right away; every numeric routine in this crate works on
//! SI-normalized floats.
use crate::error::{Error, Result};
use num_traits::Zero;
use std::fmt::Display;
use uom::si::f64::{Frequency, Length, Power, Time, VolumeRate};
use uom::si::frequency::hertz;
use uom::si::length::meter;
use uom::si::power::watt;
use uom::si::time::second;
use uom::si::volume_rate::cubic_meter_per_second;

/// A strictly positive value.
///
/// # Examples
///
/// ```
/// use cytosim::units::Positive;
///
/// assert!(Positive::new(1.5).is_some());
/// assert!(Positive::new(0.0).is_none());
/// assert!(Positive::new(-3).is_none());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Positive<T>(T);

impl<T> Positive<T>
where
    T: Zero + PartialOrd,
{
    /// Returns `None` if `value` is not strictly greater than zero (NaN
    /// included).
    pub fn new(value: T) -> Option<Self> {
        if value > T::zero() {
            Some(Self(value))
        } else {
            None
        }
    }
}

impl<T> Positive<T> {
    /// Returns a reference to the wrapped value.
    pub fn inner(&self) -> &T {
        &self.0
    }
    /// Consumes the wrapper, returning the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Positive<f64> {
    pub fn get(&self) -> f64 {
        self.0
    }
}

/// Checks that the parameter `name` is strictly positive.
pub(crate) fn positive<T>(name: &'static str, value: T) -> Result<Positive<T>>
where
    T: Zero + PartialOrd + Display,
{
    let shown = value.to_string();
    Positive::new(value).ok_or_else(|| Error::invalid(name, format!("must be positive, got {shown}")))
}

pub(crate) fn seconds(time: Time) -> f64 {
    time.get::<second>()
}

pub(crate) fn hertz_of(frequency: Frequency) -> f64 {
    frequency.get::<hertz>()
}

pub(crate) fn meters(length: Length) -> f64 {
    length.get::<meter>()
}

pub(crate) fn watts(power: Power) -> f64 {
    power.get::<watt>()
}

pub(crate) fn cubic_meters_per_second(flow: VolumeRate) -> f64 {
    flow.get::<cubic_meter_per_second>()
}

/// Planck constant [J s].
pub const PLANCK: f64 = 6.626_070_15e-34;
/// Speed of light in vacuum [m/s].
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
/// Elementary charge [C].
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;
