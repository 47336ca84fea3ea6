use crate::namespaces;
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::{fmt, sync::Arc};

/// Identifies a tenant, i.e. an independent consumer of scan results.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(String);

/// Describes how to reach a tenant's scan backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientConfiguration {
    pub tenant_id: TenantId,
    pub endpoint: String,
    pub token: String,

    /// Labels scanned assets with the tenant's console integration.
    pub integration_mrn: Option<String>,

    /// Marks scanned assets as managed by this controller instance.
    pub managed_by: Option<String>,

    pub include_namespaces: Vec<String>,
    pub exclude_namespaces: Vec<String>,
}

pub type SharedStore = Arc<ScanApiStore>;

/// A registry of tenant scan backends.
///
/// Written by whatever reconciles tenant configuration and read by every
/// resource monitor and by the scan dispatcher. Configurations are stored
/// behind an `Arc` and replaced whole, so readers never observe a partially
/// written entry.
#[derive(Debug, Default)]
pub struct ScanApiStore {
    clients: RwLock<HashMap<TenantId, Arc<ClientConfiguration>>>,
}

// === impl TenantId ===

impl TenantId {
    pub fn new(id: impl ToString) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// === impl ClientConfiguration ===

impl ClientConfiguration {
    /// Returns true if the tenant wants resources in `namespace` scanned.
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        namespaces::allow_namespace(
            namespace,
            &self.include_namespaces,
            &self.exclude_namespaces,
        )
    }
}

// === impl ScanApiStore ===

impl ScanApiStore {
    pub fn shared() -> SharedStore {
        Arc::new(Self::default())
    }

    /// Registers or replaces the configuration for `tenant`.
    pub fn set(&self, tenant: TenantId, config: ClientConfiguration) {
        let config = Arc::new(config);
        if let Some(prior) = self.clients.write().insert(tenant.clone(), config.clone()) {
            if prior != config {
                tracing::debug!(%tenant, "Updated scan API client configuration");
            }
            return;
        }
        tracing::info!(%tenant, endpoint = %config.endpoint, "Registered scan API client");
    }

    pub fn remove(&self, tenant: &TenantId) {
        if self.clients.write().remove(tenant).is_some() {
            tracing::info!(%tenant, "Removed scan API client");
        }
    }

    pub fn get(&self, tenant: &TenantId) -> Option<Arc<ClientConfiguration>> {
        self.clients.read().get(tenant).cloned()
    }

    /// Returns a point-in-time snapshot of all registered configurations.
    pub fn get_all(&self) -> Vec<Arc<ClientConfiguration>> {
        self.clients.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
