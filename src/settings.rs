use serde::{Deserialize, Serialize};

/// Switches controlling which stochastic contributions are simulated.
///
/// Every specific noise source is only active when both its own flag and the
/// global `include_noises` flag are set. The settings are passed explicitly to
/// each stage of the detector chain, so independent runs never share state.
///
/// # Examples
///
/// ```
/// use cytosim::settings::SimulationSettings;
///
/// let settings = SimulationSettings::noiseless();
/// assert!(!settings.shot_noise());
///
/// let settings = SimulationSettings::default();
/// assert!(settings.dark_current_noise());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub include_noises: bool,
    pub include_shot_noise: bool,
    pub include_dark_current_noise: bool,
    pub include_source_noise: bool,
    pub include_amplifier_noise: bool,
    /// Every particle travels at the centre velocity of the sample stream.
    pub assume_perfect_hydrodynamic_focusing: bool,
    /// The digitizer only clips to its saturation levels, without quantizing.
    pub assume_perfect_digitizer: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            include_noises: true,
            include_shot_noise: true,
            include_dark_current_noise: true,
            include_source_noise: true,
            include_amplifier_noise: true,
            assume_perfect_hydrodynamic_focusing: false,
            assume_perfect_digitizer: false,
        }
    }
}

impl SimulationSettings {
    /// Settings with every noise source disabled.
    pub fn noiseless() -> Self {
        Self {
            include_noises: false,
            ..Self::default()
        }
    }

    pub fn shot_noise(&self) -> bool {
        self.include_noises && self.include_shot_noise
    }

    pub fn dark_current_noise(&self) -> bool {
        self.include_noises && self.include_dark_current_noise
    }

    pub fn source_noise(&self) -> bool {
        self.include_noises && self.include_source_noise
    }

    pub fn amplifier_noise(&self) -> bool {
        self.include_noises && self.include_amplifier_noise
    }
}
