use scan_controller_core::AdmissionMode;

/// The outcome of an admission review.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The scan passed.
    AllowPassed,
    /// The scan failed but the controller is permissive.
    AllowPermittedFail,
    /// No scan result was obtained in permissive mode.
    AllowDefault,
    /// The scan failed and the controller is enforcing.
    DenyFailed,
    /// No scan result was obtained in enforcing mode.
    DenyDefault,
}

impl Verdict {
    /// The verdict used whenever no scan result is available.
    pub fn default_for(mode: AdmissionMode) -> Self {
        match mode {
            AdmissionMode::Permissive => Self::AllowDefault,
            AdmissionMode::Enforcing => Self::DenyDefault,
        }
    }

    pub fn scanned(mode: AdmissionMode, passed: bool) -> Self {
        match (mode, passed) {
            (_, true) => Self::AllowPassed,
            (AdmissionMode::Permissive, false) => Self::AllowPermittedFail,
            (AdmissionMode::Enforcing, false) => Self::DenyFailed,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(
            self,
            Self::AllowPassed | Self::AllowPermittedFail | Self::AllowDefault
        )
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::AllowPassed => "PASSED MONDOO SCAN",
            Self::AllowPermittedFail => "PERMITTING FAILED SCAN",
            Self::AllowDefault => "DEFAULT MONDOO PASSED",
            Self::DenyFailed => "FAILED MONDOO SCAN",
            Self::DenyDefault => "DEFAULT MONDOO FAILED",
        }
    }

    pub(crate) fn metric_label(&self) -> &'static str {
        match self {
            Self::AllowPassed => "allow_passed",
            Self::AllowPermittedFail => "allow_permitted_fail",
            Self::AllowDefault => "allow_default",
            Self::DenyFailed => "deny_failed",
            Self::DenyDefault => "deny_default",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_and_result_table() {
        use AdmissionMode::*;
        assert_eq!(Verdict::scanned(Permissive, true), Verdict::AllowPassed);
        assert_eq!(Verdict::scanned(Permissive, false), Verdict::AllowPermittedFail);
        assert_eq!(Verdict::scanned(Enforcing, true), Verdict::AllowPassed);
        assert_eq!(Verdict::scanned(Enforcing, false), Verdict::DenyFailed);
        assert_eq!(Verdict::default_for(Permissive), Verdict::AllowDefault);
        assert_eq!(Verdict::default_for(Enforcing), Verdict::DenyDefault);

        assert!(Verdict::AllowPermittedFail.is_allowed());
        assert!(!Verdict::DenyDefault.is_allowed());
        assert_eq!(Verdict::DenyDefault.reason(), "DEFAULT MONDOO FAILED");
    }
}
