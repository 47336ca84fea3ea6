use crate::{
    decode, filter, labels,
    review::{Operation, Review},
    AdmissionMetrics, Verdict,
};
use scan_controller_core::{
    namespaces::allow_namespace,
    scan::{AdmissionReviewJob, Discovery, ReportType, ADMISSION_DISCOVERY_TARGETS},
    AdmissionMode, ScanApi,
};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::time;
use tracing::{debug, info, warn};

/// Discovers the admission review itself as an asset.
const ADMISSION_REVIEW_TARGET: &str = "admissionreviews";

/// Time reserved within a request deadline for answering the API server after
/// the scan gives up. Capped at a quarter of the deadline.
const RESPONSE_MARGIN: Duration = Duration::from_secs(1);

/// Fixed for the lifetime of the engine.
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: AdmissionMode,
    pub include_namespaces: Vec<String>,
    pub exclude_namespaces: Vec<String>,
    pub cluster_id: String,
    pub integration_mrn: Option<String>,
    pub review_discovery: bool,
    pub scan_timeout: Duration,
}

#[derive(Clone)]
pub struct AdmissionEngine {
    config: Arc<Config>,
    scanner: Arc<dyn ScanApi>,
    metrics: AdmissionMetrics,
}

// === impl AdmissionEngine ===

impl AdmissionEngine {
    pub fn new(config: Config, scanner: Arc<dyn ScanApi>, metrics: AdmissionMetrics) -> Self {
        Self {
            config: Arc::new(config),
            scanner,
            metrics,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn default_verdict(&self) -> Verdict {
        Verdict::default_for(self.config.mode)
    }

    /// Decides a single review. The scan is bounded by the configured scan
    /// timeout and ends early enough to answer within `deadline`.
    pub async fn admit(&self, review: &Review, deadline: Option<Duration>) -> Verdict {
        let verdict = self.decide(review, deadline).await;
        self.record(verdict)
    }

    /// Counts a verdict that was reached outside of [`AdmissionEngine::admit`].
    pub fn record(&self, verdict: Verdict) -> Verdict {
        self.metrics.verdict(verdict);
        verdict
    }

    async fn decide(&self, review: &Review, deadline: Option<Duration>) -> Verdict {
        let req = review.request();
        let default = self.default_verdict();
        let obj = match decode::decode(&req.kind, req.object.as_ref()) {
            Ok(obj) => obj,
            Err(error) => {
                warn!(%error, "Failed to decode admitted object");
                return default;
            }
        };

        if let Some(owner) = filter::scanned_parent(&obj.metadata) {
            info!(owner_kind = %owner.kind, owner_name = %owner.name, "Skipping because the resource has a scanned parent");
            return default;
        }

        let namespace = obj
            .metadata
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .or_else(|| req.namespace.clone())
            .unwrap_or_default();
        if !allow_namespace(
            &namespace,
            &self.config.include_namespaces,
            &self.config.exclude_namespaces,
        ) {
            info!(%namespace, "Skipping based on namespace filtering");
            return default;
        }

        if let (Operation::Update, Some(new), Some(old)) =
            (&req.operation, &req.object, &req.old_object)
        {
            match filter::only_apply_noise(old, new) {
                Ok(true) => {
                    debug!("Skipping update that only changes server-side apply metadata");
                    return default;
                }
                Ok(false) => {}
                Err(error) => warn!(%error, "Failed to compare old and new objects"),
            }
        }

        let job = AdmissionReviewJob {
            data: review.data().clone(),
            labels: labels::scan_labels(
                req,
                &obj,
                &namespace,
                &self.config.cluster_id,
                self.config.integration_mrn.as_deref(),
            ),
            report_type: ReportType::Error,
            discovery: self.discovery(),
            options: BTreeMap::from([("all-namespaces".to_string(), "true".to_string())]),
        };

        let timeout = scan_timeout(deadline, self.config.scan_timeout);
        let start = time::Instant::now();
        let result = time::timeout(timeout, self.scanner.run_admission_review(&job)).await;
        self.metrics.scanned(start.elapsed());

        let result = match result {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                warn!(error = %format_args!("{error:#}"), "Admission scan failed");
                return default;
            }
            Err(_) => {
                warn!(?timeout, "Admission scan timed out");
                return default;
            }
        };

        let passed = result.passed();
        info!(passed, worst_score = ?result.worst_score, "Scan result");
        Verdict::scanned(self.config.mode, passed)
    }

    fn discovery(&self) -> Discovery {
        let mut targets = ADMISSION_DISCOVERY_TARGETS
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        if self.config.review_discovery {
            targets.push(ADMISSION_REVIEW_TARGET.to_string());
        }
        Discovery { targets }
    }
}

/// Bounds a scan so that the review is answered before the API server's
/// deadline passes.
fn scan_timeout(deadline: Option<Duration>, limit: Duration) -> Duration {
    match deadline {
        Some(deadline) => deadline
            .saturating_sub(RESPONSE_MARGIN.min(deadline / 4))
            .min(limit),
        None => limit,
    }
}
