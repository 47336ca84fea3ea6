//! The scan backend API.
//!
//! These types mirror the JSON bodies accepted and returned by the scan
//! backend. The transport lives in a separate crate so that the dispatch and
//! admission logic can be exercised against in-memory fakes.

use crate::ClientConfiguration;
use anyhow::Result;
use serde::{Deserialize, Serialize, Serializer};
use std::{collections::BTreeMap, sync::Arc};

/// The score type reported for a completed, valid scan.
pub const VALID_SCORE_TYPE: u32 = 2;

/// The score value reported when every check passed.
pub const PASSING_SCORE: u32 = 100;

/// Labels scanned assets with the console integration that owns them.
pub const INTEGRATION_MRN_LABEL: &str = "mondoo.com/integration-mrn";

/// Discovery targets for admission reviews. Auto discovery is never used
/// here, since it would scan the whole cluster.
pub const ADMISSION_DISCOVERY_TARGETS: [&str; 7] = [
    "pods",
    "deployments",
    "daemonsets",
    "statefulsets",
    "replicasets",
    "jobs",
    "cronjobs",
];

#[async_trait::async_trait]
pub trait ScanApi: Send + Sync {
    async fn health_check(&self) -> Result<HealthCheckResponse>;

    async fn run_admission_review(&self, job: &AdmissionReviewJob) -> Result<ScanResult>;

    async fn scan_kubernetes_resources(
        &self,
        opts: &ScanKubernetesResourcesOpts,
    ) -> Result<ScanResult>;

    async fn schedule_kubernetes_resource_scan(
        &self,
        integration_mrn: Option<&str>,
        resource_key: &str,
        managed_by: Option<&str>,
    ) -> Result<()>;

    async fn garbage_collect_assets(&self, opts: &GarbageCollectOptions) -> Result<()>;
}

/// Builds a scan backend client for a tenant's configuration.
pub trait NewScanApi: Send + Sync {
    fn new_scan_api(&self, config: &ClientConfiguration) -> Result<Arc<dyn ScanApi>>;
}

impl<F> NewScanApi for F
where
    F: Fn(&ClientConfiguration) -> Result<Arc<dyn ScanApi>> + Send + Sync,
{
    fn new_scan_api(&self, config: &ClientConfiguration) -> Result<Arc<dyn ScanApi>> {
        (self)(config)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ReportType {
    None,
    #[default]
    Error,
    Full,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewJob {
    /// The complete `admission.k8s.io/v1` AdmissionReview.
    pub data: serde_json::Value,
    pub labels: BTreeMap<String, String>,
    pub report_type: ReportType,
    pub discovery: Discovery,
    pub options: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    pub targets: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    #[serde(default)]
    pub worst_score: Option<Score>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    #[serde(default)]
    pub qr_id: String,

    #[serde(rename = "type", default)]
    pub score_type: u32,

    #[serde(default)]
    pub value: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct HealthCheckResponse {
    #[serde(default)]
    pub status: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanKubernetesResourcesOpts {
    pub integration_mrn: Option<String>,
    pub include_namespaces: Vec<String>,
    pub exclude_namespaces: Vec<String>,
    pub scan_container_images: bool,
    pub managed_by: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GarbageCollectOptions {
    /// Assets not scanned within this Go-style duration are removed.
    pub older_than: String,
    pub managed_by: String,
    pub platform_runtime: String,
    pub labels: BTreeMap<String, String>,
}

/// A request to scan cluster resources.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    pub inventory: Inventory,
    pub report_type: ReportType,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Inventory {
    pub spec: InventorySpec,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InventorySpec {
    pub assets: Vec<Asset>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub connections: Vec<Connection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Connection {
    #[serde(rename = "type")]
    pub connection_type: &'static str,
    pub options: BTreeMap<String, String>,
    pub discover: Discovery,
}

// === impl ReportType ===

impl Serialize for ReportType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = match self {
            Self::None => 0,
            Self::Error => 1,
            Self::Full => 2,
        };
        serializer.serialize_u8(value)
    }
}

// === impl ScanResult ===

impl ScanResult {
    /// Returns true if the worst score is a valid, perfect score.
    pub fn passed(&self) -> bool {
        matches!(
            self.worst_score,
            Some(Score { score_type: VALID_SCORE_TYPE, value: PASSING_SCORE, .. })
        )
    }
}

// === impl ScanJob ===

impl ScanJob {
    /// Scans a single resource, identified by a `kind:namespace:name` key.
    pub fn resource(
        resource_key: &str,
        integration_mrn: Option<&str>,
        managed_by: Option<&str>,
    ) -> Self {
        let options = BTreeMap::from([("k8s-resources".to_string(), resource_key.to_string())]);
        Self::kubernetes(options, vec!["auto".to_string()], integration_mrn, managed_by)
    }

    /// Scans every resource in the allowed namespaces.
    pub fn cluster(opts: &ScanKubernetesResourcesOpts) -> Self {
        let options = BTreeMap::from([
            ("namespaces".to_string(), opts.include_namespaces.join(",")),
            (
                "namespaces-exclude".to_string(),
                opts.exclude_namespaces.join(","),
            ),
        ]);
        let target = if opts.scan_container_images {
            "container-images"
        } else {
            "auto"
        };
        Self::kubernetes(
            options,
            vec![target.to_string()],
            opts.integration_mrn.as_deref(),
            opts.managed_by.as_deref(),
        )
    }

    fn kubernetes(
        options: BTreeMap<String, String>,
        targets: Vec<String>,
        integration_mrn: Option<&str>,
        managed_by: Option<&str>,
    ) -> Self {
        let labels = integration_mrn
            .filter(|mrn| !mrn.is_empty())
            .map(|mrn| (INTEGRATION_MRN_LABEL.to_string(), mrn.to_string()))
            .into_iter()
            .collect();
        let asset = Asset {
            connections: vec![Connection {
                connection_type: "k8s",
                options,
                discover: Discovery { targets },
            }],
            managed_by: managed_by
                .filter(|m| !m.is_empty())
                .map(ToString::to_string),
            labels,
        };
        Self {
            inventory: Inventory {
                spec: InventorySpec {
                    assets: vec![asset],
                },
            },
            report_type: ReportType::Error,
        }
    }
}
