use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, time::Duration};

/// A non-negative duration written in Go's `time.Duration` syntax, e.g. `10s`
/// or `1m30s`.
///
/// The API server uses this syntax for the `timeout` query parameter it
/// appends to webhook URLs; the controller uses it for its own flags.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct K8sDuration(Duration);

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("invalid unit: {}", EXPECTED_UNITS)]
    InvalidUnit,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("durations must not be negative")]
    Negative,

    #[error("invalid floating-point number: {}", .0)]
    NotANumber(#[from] std::num::ParseFloatError),
}

const EXPECTED_UNITS: &str = "expected one of 'ns', 'us', '\u{00b5}s', 'ms', 's', 'm', or 'h'";

impl From<Duration> for K8sDuration {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl From<K8sDuration> for Duration {
    fn from(K8sDuration(duration): K8sDuration) -> Self {
        duration
    }
}

impl K8sDuration {
    #[inline]
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl fmt::Debug for K8sDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for K8sDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl FromStr for K8sDuration {
    type Err = ParseError;

    fn from_str(mut s: &str) -> Result<Self, Self::Err> {
        // Same grammar as Go's time.ParseDuration, minus negative values.
        fn duration_from_units(val: f64, unit: &str) -> Result<Duration, ParseError> {
            const MINUTE: Duration = Duration::from_secs(60);
            let base = match unit {
                "ns" => Duration::from_nanos(1),
                // U+00B5 is the "micro sign" while U+03BC is "Greek letter mu"
                "us" | "\u{00b5}s" | "\u{03bc}s" => Duration::from_micros(1),
                "ms" => Duration::from_millis(1),
                "s" => Duration::from_secs(1),
                "m" => MINUTE,
                "h" => MINUTE * 60,
                _ => return Err(ParseError::InvalidUnit),
            };
            Ok(base.mul_f64(val))
        }

        s = s.trim();
        if s.starts_with('-') {
            return Err(ParseError::Negative);
        }
        s = s.trim_start_matches('+');

        let mut total = Duration::ZERO;
        while !s.is_empty() {
            if let Some(unit_start) = s.find(|c: char| c.is_alphabetic()) {
                let (val, rest) = s.split_at(unit_start);
                let val = val.parse::<f64>()?;
                let unit = match rest.find(|c: char| !c.is_alphabetic()) {
                    Some(next_numeric_start) => {
                        let (unit, rest) = rest.split_at(next_numeric_start);
                        s = rest;
                        unit
                    }
                    None => {
                        s = "";
                        rest
                    }
                };
                total += duration_from_units(val, unit)?;
            } else if s == "0" {
                return Ok(Self(Duration::ZERO));
            } else {
                return Err(ParseError::NoUnit);
            }
        }

        Ok(Self(total))
    }
}

impl Serialize for K8sDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for K8sDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = K8sDuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string in Go `time.Duration.String()` format")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<K8sDuration>().map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn parses_go_durations() {
        let cases: &[(&str, Duration)] = &[
            ("0", Duration::ZERO),
            ("10s", Duration::from_secs(10)),
            ("+5s", Duration::from_secs(5)),
            ("5.6s", Duration::from_millis(5600)),
            (".5s", Duration::from_millis(500)),
            ("250ms", Duration::from_millis(250)),
            ("12µs", Duration::from_micros(12)),
            ("15m", 15 * MINUTE),
            ("1m30s", MINUTE + Duration::from_secs(30)),
            ("2h", 120 * MINUTE),
        ];

        for (input, expected) in cases {
            let parsed = input.parse::<K8sDuration>().unwrap();
            assert_eq!(parsed.as_duration(), *expected, "{input}");
        }
    }

    #[test]
    fn rejects_invalid_durations() {
        assert_eq!("-5s".parse::<K8sDuration>(), Err(ParseError::Negative));
        assert_eq!("10".parse::<K8sDuration>(), Err(ParseError::NoUnit));
        assert_eq!("10d".parse::<K8sDuration>(), Err(ParseError::InvalidUnit));
        assert!(matches!(
            "x1s".parse::<K8sDuration>(),
            Err(ParseError::NotANumber(_))
        ));
    }

    #[test]
    fn deserializes_from_json_string() {
        let d: K8sDuration = serde_json::from_str(r#""30s""#).unwrap();
        assert_eq!(Duration::from(d), Duration::from_secs(30));
    }
}
