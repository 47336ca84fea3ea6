use crate::{debounce::Dispatch, metrics::DispatchMetrics};
use futures::future;
use kubert::lease::Claim;
use scan_controller_core::{ClientConfiguration, NewScanApi, SharedStore};
use scan_controller_k8s_api::ResourceKey;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, time};
use tracing::{debug, info, warn};

/// Fans a settled resource key out to every registered tenant's scan backend.
///
/// Tenants are read from the store when the key fires, not when it was first
/// observed, so tenants registered or removed while the key was pending are
/// honored. A failure for one tenant is logged and counted; it never prevents
/// the other tenants from being asked. Failed requests are not retried, since
/// the next change to the resource schedules another scan.
pub struct Dispatcher<N> {
    store: SharedStore,
    clients: N,
    timeout: Duration,
    leader: Option<Leader>,
    metrics: DispatchMetrics,
}

/// Restricts dispatch to the replica holding the dispatch lease.
struct Leader {
    claimant: String,
    claims: watch::Receiver<Arc<Claim>>,
}

// === impl Dispatcher ===

impl<N: NewScanApi> Dispatcher<N> {
    pub fn new(store: SharedStore, clients: N, timeout: Duration, metrics: DispatchMetrics) -> Self {
        Self {
            store,
            clients,
            timeout,
            leader: None,
            metrics,
        }
    }

    /// Only dispatches while `claimant` holds the current claim.
    pub fn with_leader(
        mut self,
        claimant: impl ToString,
        claims: watch::Receiver<Arc<Claim>>,
    ) -> Self {
        self.leader = Some(Leader {
            claimant: claimant.to_string(),
            claims,
        });
        self
    }

    fn is_leader(&self) -> bool {
        match &self.leader {
            None => true,
            Some(Leader { claimant, claims }) => claims.borrow().is_current_for(claimant),
        }
    }

    async fn schedule(&self, config: Arc<ClientConfiguration>, key: &str) {
        let tenant = &config.tenant_id;
        let client = match self.clients.new_scan_api(&config) {
            Ok(client) => client,
            Err(error) => {
                warn!(%tenant, %key, %error, "Failed to create scan API client");
                self.metrics.request_error();
                return;
            }
        };

        let scheduled = client.schedule_kubernetes_resource_scan(
            config.integration_mrn.as_deref(),
            key,
            config.managed_by.as_deref(),
        );
        match time::timeout(self.timeout, scheduled).await {
            Ok(Ok(())) => {
                debug!(%tenant, %key, "Scheduled scan");
                self.metrics.request_ok();
            }
            Ok(Err(error)) => {
                warn!(%tenant, %key, error = %format_args!("{error:#}"), "Failed to schedule scan");
                self.metrics.request_error();
            }
            Err(_) => {
                warn!(%tenant, %key, timeout = ?self.timeout, "Timed out scheduling scan");
                self.metrics.request_error();
            }
        }
    }
}

#[async_trait::async_trait]
impl<N: NewScanApi + 'static> Dispatch for Dispatcher<N> {
    async fn dispatch(&self, key: String) {
        let resource = match key.parse::<ResourceKey>() {
            Ok(resource) => resource,
            Err(error) => {
                warn!(%key, %error, "Dropping malformed resource key");
                self.metrics.skipped("malformed_key");
                return;
            }
        };

        if !self.is_leader() {
            debug!(%key, "Not holding the dispatch lease; skipping");
            self.metrics.skipped("not_leader");
            return;
        }

        let tenants = self.store.get_all();
        if tenants.is_empty() {
            debug!(%key, "No scan API clients registered");
            self.metrics.skipped("no_tenants");
            return;
        }

        let requests = tenants
            .into_iter()
            .filter(|config| {
                // Cluster-scoped resources are not subject to namespace filters.
                let allowed =
                    resource.namespace.is_empty() || config.allows_namespace(&resource.namespace);
                if !allowed {
                    debug!(tenant = %config.tenant_id, %key, "Namespace filtered by tenant");
                    self.metrics.skipped("namespace");
                }
                allowed
            })
            .map(|config| self.schedule(config, &key))
            .collect::<Vec<_>>();

        info!(%key, tenants = requests.len(), "Dispatching scan");
        future::join_all(requests).await;
    }
}
