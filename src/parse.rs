//! Textual shorthands accepted by the configuration surface.
//!
//! Thresholds are written either as an absolute level (`"0.25"`) or relative to
//! the robust noise level of the trigger channel (`"3sigma"`, `"2.5 sigma"`).
//! Digitizer resolutions are written as a bit depth (`"10bit"`) or as an
//! explicit number of levels (`"1024"`).
use crate::digitizer::BitDepth;
use crate::trigger::Threshold;
use std::fmt;
use winnow::ascii::{dec_uint, float, space0};
use winnow::combinator::{delimited, opt, terminated};
use winnow::error::ContextError;
use winnow::Parser;

fn parse_threshold(input: &mut &str) -> winnow::Result<Threshold> {
    let value: f64 = delimited(space0, float, space0).parse_next(input)?;
    let sigma = terminated(opt("sigma"), space0).parse_next(input)?;

    Ok(match sigma {
        Some(_) => Threshold::Sigma(value),
        None => Threshold::Absolute(value),
    })
}

fn parse_bit_depth(input: &mut &str) -> winnow::Result<BitDepth> {
    let n: u32 = delimited(space0, dec_uint, space0).parse_next(input)?;
    let bits = terminated(opt("bit"), space0).parse_next(input)?;

    match bits {
        Some(_) => {
            let bits = (1..=32).contains(&n).then_some(n).ok_or_else(ContextError::new)?;
            Ok(BitDepth::from_bits(bits))
        }
        None => BitDepth::from_levels(u64::from(n)).ok_or_else(ContextError::new),
    }
}

/// The error type returned when parsing a [`Threshold`] or [`BitDepth`] fails.
#[derive(Debug)]
pub struct ParseError {
    input: String,
    span: std::ops::Range<usize>,
}

impl ParseError {
    fn from_parse(error: winnow::error::ParseError<&str, ContextError>) -> Self {
        let input = error.input().to_string();
        let span = error.char_span();
        Self { input, span }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = annotate_snippets::Level::Error
            .title("invalid value starting here")
            .snippet(
                annotate_snippets::Snippet::source(&self.input)
                    .fold(true)
                    .annotation(annotate_snippets::Level::Error.span(self.span.clone())),
            );
        let renderer = annotate_snippets::Renderer::plain();
        let rendered = renderer.render(message);
        rendered.fmt(f)
    }
}

impl std::error::Error for ParseError {}

impl std::str::FromStr for Threshold {
    type Err = ParseError;

    /// Parse a [`Threshold`] from a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use cytosim::trigger::Threshold;
    ///
    /// assert_eq!("3sigma".parse::<Threshold>()?, Threshold::Sigma(3.0));
    /// assert_eq!("2.5 sigma".parse::<Threshold>()?, Threshold::Sigma(2.5));
    /// assert_eq!("0.1".parse::<Threshold>()?, Threshold::Absolute(0.1));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_threshold.parse(input).map_err(ParseError::from_parse)
    }
}

impl std::str::FromStr for BitDepth {
    type Err = ParseError;

    /// Parse a [`BitDepth`] from a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use cytosim::digitizer::BitDepth;
    ///
    /// assert_eq!("10bit".parse::<BitDepth>()?.levels(), 1024);
    /// assert_eq!("4096".parse::<BitDepth>()?.levels(), 4096);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_bit_depth.parse(input).map_err(ParseError::from_parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn threshold_from_str() {
        assert_eq!(Threshold::from_str("3sigma").unwrap(), Threshold::Sigma(3.0));
        assert_eq!(
            Threshold::from_str(" 4.5 sigma ").unwrap(),
            Threshold::Sigma(4.5)
        );
        assert_eq!(
            Threshold::from_str("1e-3").unwrap(),
            Threshold::Absolute(1e-3)
        );
        assert_eq!(Threshold::from_str("-2").unwrap(), Threshold::Absolute(-2.0));
    }

    #[test]
    fn threshold_from_str_invalid() {
        assert!(Threshold::from_str("").is_err());
        assert!(Threshold::from_str("sigma").is_err());
        assert!(Threshold::from_str("3 sigmas").is_err());
        assert!(Threshold::from_str("3 volt").is_err());
    }

    #[test]
    fn bit_depth_from_str() {
        assert_eq!(BitDepth::from_str("10bit").unwrap().levels(), 1024);
        assert_eq!(BitDepth::from_str("1bit").unwrap().levels(), 2);
        assert_eq!(BitDepth::from_str("256").unwrap().levels(), 256);
    }

    #[test]
    fn bit_depth_from_str_invalid() {
        assert!(BitDepth::from_str("0bit").is_err());
        assert!(BitDepth::from_str("33bit").is_err());
        assert!(BitDepth::from_str("1").is_err());
        assert!(BitDepth::from_str("ten bit").is_err());
    }

    #[test]
    fn parse_error_points_at_input() {
        let err = Threshold::from_str("3 volt").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("invalid value starting here"));
        assert!(rendered.contains("3 volt"));
    }
}
