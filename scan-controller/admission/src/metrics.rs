use crate::Verdict;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AdmissionMetrics {
    reviews: Family<VerdictLabels, Counter>,
    scan_duration: Histogram,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct VerdictLabels {
    verdict: &'static str,
}

impl Default for AdmissionMetrics {
    fn default() -> Self {
        Self {
            reviews: Family::default(),
            // Scans are bounded by the webhook timeout, which is at most 30s.
            scan_duration: Histogram::new([0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        }
    }
}

impl AdmissionMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "reviews",
            "Count of admission reviews by verdict",
            metrics.reviews.clone(),
        );
        reg.register_with_unit(
            "scan_duration",
            "Histogram of admission scan latency",
            Unit::Seconds,
            metrics.scan_duration.clone(),
        );
        metrics
    }

    pub(crate) fn verdict(&self, verdict: Verdict) {
        self.reviews
            .get_or_create(&VerdictLabels {
                verdict: verdict.metric_label(),
            })
            .inc();
    }

    pub(crate) fn scanned(&self, elapsed: Duration) {
        self.scan_duration.observe(elapsed.as_secs_f64());
    }

    #[cfg(test)]
    pub(crate) fn reviews(&self, verdict: Verdict) -> u64 {
        self.reviews
            .get_or_create(&VerdictLabels {
                verdict: verdict.metric_label(),
            })
            .get()
    }
}
