use std::{fmt, str::FromStr};

/// Determines how the admission webhook acts on a scan result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AdmissionMode {
    /// Every request is admitted; failing scans are only reported.
    Permissive,

    /// Requests are denied unless the scan passes.
    Enforcing,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("invalid admission mode {0:?}: expected 'permissive' or 'enforcing'")]
    InvalidMode(String),

    #[error("scan API endpoint must be set")]
    MissingEndpoint,

    #[error("invalid scan API endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl FromStr for AdmissionMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("permissive") {
            return Ok(Self::Permissive);
        }
        if s.eq_ignore_ascii_case("enforcing") {
            return Ok(Self::Enforcing);
        }
        Err(ConfigurationError::InvalidMode(s.to_string()))
    }
}

impl fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permissive => f.write_str("permissive"),
            Self::Enforcing => f.write_str("enforcing"),
        }
    }
}
