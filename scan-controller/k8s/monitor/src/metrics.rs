use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct DebounceMetrics {
    pub(crate) adds: Counter,
    pub(crate) fires: Counter,
    pub(crate) forced_fires: Counter,
    pub(crate) panics: Counter,
    pub(crate) pending: Gauge,
}

#[derive(Clone, Debug, Default)]
pub struct DispatchMetrics {
    requests: Family<RequestLabels, Counter>,
    skipped: Family<SkipLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    result: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SkipLabels {
    reason: &'static str,
}

// === impl DebounceMetrics ===

impl DebounceMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "adds",
            "Count of resource changes registered with the debouncer",
            metrics.adds.clone(),
        );
        reg.register(
            "fires",
            "Count of debounced keys handed to the dispatcher",
            metrics.fires.clone(),
        );
        reg.register(
            "forced_fires",
            "Count of keys fired because the maximum delay elapsed under sustained churn",
            metrics.forced_fires.clone(),
        );
        reg.register(
            "panics",
            "Count of dispatches that panicked",
            metrics.panics.clone(),
        );
        reg.register(
            "pending",
            "Gauge of keys waiting for their quiet period to elapse",
            metrics.pending.clone(),
        );
        metrics
    }
}

// === impl DispatchMetrics ===

impl DispatchMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "requests",
            "Count of scan requests sent to tenant scan APIs",
            metrics.requests.clone(),
        );
        reg.register(
            "skipped",
            "Count of dispatches or tenants skipped without sending a scan request",
            metrics.skipped.clone(),
        );
        metrics
    }

    pub(crate) fn request_ok(&self) {
        self.requests
            .get_or_create(&RequestLabels { result: "ok" })
            .inc();
    }

    pub(crate) fn request_error(&self) {
        self.requests
            .get_or_create(&RequestLabels { result: "error" })
            .inc();
    }

    pub(crate) fn skipped(&self, reason: &'static str) {
        self.skipped.get_or_create(&SkipLabels { reason }).inc();
    }

    #[cfg(test)]
    pub(crate) fn requests(&self, result: &'static str) -> u64 {
        self.requests.get_or_create(&RequestLabels { result }).get()
    }

    #[cfg(test)]
    pub(crate) fn skips(&self, reason: &'static str) -> u64 {
        self.skipped.get_or_create(&SkipLabels { reason }).get()
    }
}
