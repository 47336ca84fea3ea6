//! A JSON-over-HTTP client for the scan backend.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

use bytes::Bytes;
use reqwest::{header, StatusCode, Url};
use scan_controller_core::{
    scan::{
        AdmissionReviewJob, GarbageCollectOptions, HealthCheckResponse, ScanJob,
        ScanKubernetesResourcesOpts,
    },
    ClientConfiguration, ConfigurationError, NewScanApi, ScanApi, ScanResult,
};
use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, trace};

pub const HEALTH_CHECK_ENDPOINT: &str = "/Health/Check";
pub const RUN_ADMISSION_REVIEW_ENDPOINT: &str = "/Scan/RunAdmissionReview";
pub const SCAN_KUBERNETES_RESOURCES_ENDPOINT: &str = "/Scan/Run";
pub const SCHEDULE_KUBERNETES_RESOURCE_SCAN_ENDPOINT: &str = "/Scan/Schedule";
pub const GARBAGE_COLLECT_ASSETS_ENDPOINT: &str = "/Scan/GarbageCollectAssets";

/// Error bodies are truncated to this many bytes before being logged.
const MAX_ERROR_BODY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with {status}: {body}")]
    Status {
        url: Url,
        status: StatusCode,
        body: String,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: Url,
        #[source]
        source: serde_json::Error,
    },
}

/// Talks to a single tenant's scan backend.
#[derive(Clone, Debug)]
pub struct ScanApiClient {
    endpoint: Url,
    token: String,
    http: reqwest::Client,
}

/// Builds [`ScanApiClient`]s that share one connection pool.
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    http: reqwest::Client,
}

// === impl ClientBuilder ===

impl ClientBuilder {
    /// Every request made by the built clients is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Client)?;
        Ok(Self { http })
    }

    pub fn build(&self, endpoint: &str, token: impl ToString) -> Result<ScanApiClient, Error> {
        ScanApiClient::with_http(self.http.clone(), endpoint, token)
    }
}

impl NewScanApi for ClientBuilder {
    fn new_scan_api(&self, config: &ClientConfiguration) -> anyhow::Result<Arc<dyn ScanApi>> {
        let client = self.build(&config.endpoint, &config.token)?;
        Ok(Arc::new(client))
    }
}

// === impl ScanApiClient ===

impl ScanApiClient {
    fn with_http(
        http: reqwest::Client,
        endpoint: &str,
        token: impl ToString,
    ) -> Result<Self, Error> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(ConfigurationError::MissingEndpoint.into());
        }
        let endpoint = Url::parse(endpoint).map_err(|error| ConfigurationError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: error.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigurationError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "scheme must be http or https".to_string(),
            }
            .into());
        }
        Ok(Self {
            endpoint,
            token: token.to_string(),
            http,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.endpoint.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}{path}"));
        url
    }

    async fn request<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Bytes, Error> {
        let url = self.url(path);
        let body = serde_json::to_vec(body).map_err(Error::Encode)?;
        trace!(%url, bytes = body.len(), "Sending scan API request");

        let rsp = self
            .http
            .post(url.clone())
            .bearer_auth(&self.token)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|source| Error::Transport {
                url: url.clone(),
                source,
            })?;

        let status = rsp.status();
        let bytes = rsp.bytes().await.map_err(|source| Error::Transport {
            url: url.clone(),
            source,
        })?;
        if !status.is_success() {
            let end = bytes.len().min(MAX_ERROR_BODY);
            let body = String::from_utf8_lossy(&bytes[..end]).into_owned();
            return Err(Error::Status { url, status, body });
        }
        debug!(%url, %status, "Scan API request succeeded");
        Ok(bytes)
    }

    async fn call<T, U>(&self, path: &str, body: &T) -> Result<U, Error>
    where
        T: Serialize + ?Sized,
        U: DeserializeOwned,
    {
        let bytes = self.request(path, body).await?;
        self.decode(path, &bytes)
    }

    /// Calls an endpoint whose response carries no data.
    async fn call_empty<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), Error> {
        let bytes = self.request(path, body).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        self.decode::<IgnoredAny>(path, &bytes).map(|_| ())
    }

    fn decode<U: DeserializeOwned>(&self, path: &str, bytes: &[u8]) -> Result<U, Error> {
        serde_json::from_slice(bytes).map_err(|source| Error::Decode {
            url: self.url(path),
            source,
        })
    }
}

#[async_trait::async_trait]
impl ScanApi for ScanApiClient {
    async fn health_check(&self) -> anyhow::Result<HealthCheckResponse> {
        let rsp = self
            .call(HEALTH_CHECK_ENDPOINT, &serde_json::json!({}))
            .await?;
        Ok(rsp)
    }

    async fn run_admission_review(&self, job: &AdmissionReviewJob) -> anyhow::Result<ScanResult> {
        let rsp = self.call(RUN_ADMISSION_REVIEW_ENDPOINT, job).await?;
        Ok(rsp)
    }

    async fn scan_kubernetes_resources(
        &self,
        opts: &ScanKubernetesResourcesOpts,
    ) -> anyhow::Result<ScanResult> {
        let job = ScanJob::cluster(opts);
        let rsp = self.call(SCAN_KUBERNETES_RESOURCES_ENDPOINT, &job).await?;
        Ok(rsp)
    }

    async fn schedule_kubernetes_resource_scan(
        &self,
        integration_mrn: Option<&str>,
        resource_key: &str,
        managed_by: Option<&str>,
    ) -> anyhow::Result<()> {
        let job = ScanJob::resource(resource_key, integration_mrn, managed_by);
        self.call_empty(SCHEDULE_KUBERNETES_RESOURCE_SCAN_ENDPOINT, &job)
            .await?;
        Ok(())
    }

    async fn garbage_collect_assets(&self, opts: &GarbageCollectOptions) -> anyhow::Result<()> {
        self.call_empty(GARBAGE_COLLECT_ASSETS_ENDPOINT, opts).await?;
        Ok(())
    }
}
