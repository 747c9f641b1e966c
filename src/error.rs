use thiserror::Error;

/// Errors returned when a precondition of the simulation pipeline is violated.
///
/// Degenerate-but-valid inputs (e.g. a population with zero expected particles)
/// are never reported through this type; they are skipped instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A filter cutoff at or above half the sampling rate.
    #[error("cutoff frequency {cutoff} Hz must be below the Nyquist frequency {nyquist} Hz")]
    NyquistViolation { cutoff: f64, nyquist: f64 },
    /// Two arrays that must share the time axis have different lengths.
    #[error("array of length {found} does not match signal length {expected}")]
    LengthMismatch { expected: usize, found: usize },
    /// A channel (detector) name that is not present in a buffer.
    #[error("unknown channel `{0}`")]
    UnknownChannel(String),
    /// A parameter outside of its valid domain.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    /// Rejection sampling ran out of rounds before accepting enough samples.
    #[error(
        "too few samples above minimum diameter {minimum} m after {rounds} rounds \
         ({missing} missing); lower the cutoff or increase oversample_factor or maximum_rounds"
    )]
    FractionSelectionExhausted {
        minimum: f64,
        rounds: usize,
        missing: usize,
    },
    /// A probability distribution could not be constructed.
    #[error("invalid {distribution} distribution: {reason}")]
    InvalidDistribution {
        distribution: &'static str,
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn distribution(distribution: &'static str, reason: impl ToString) -> Self {
        Error::InvalidDistribution {
            distribution,
            reason: reason.to_string(),
        }
    }
}

/// A specialized [`Result`](std::result::Result) for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = Error::NyquistViolation {
            cutoff: 600.0,
            nyquist: 500.0,
        };
        assert_eq!(
            err.to_string(),
            "cutoff frequency 600 Hz must be below the Nyquist frequency 500 Hz"
        );

        let err = Error::LengthMismatch {
            expected: 10,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "array of length 3 does not match signal length 10"
        );

        let err = Error::FractionSelectionExhausted {
            minimum: 1e-7,
            rounds: 50,
            missing: 4,
        };
        assert!(err.to_string().contains("increase oversample_factor"));
    }
}
