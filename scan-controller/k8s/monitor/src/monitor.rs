use crate::debounce::Debounce;
use parking_lot::RwLock;
use scan_controller_core::SharedStore;
use scan_controller_k8s_api::{Resource, ResourceExt, ResourceKey};
use std::{marker::PhantomData, sync::Arc};

pub type SharedMonitor<R> = Arc<RwLock<ResourceMonitor<R>>>;

/// Turns create and update events for one kind of resource into debounced
/// scan requests.
///
/// The monitor does not check whether the resource still exists; the scan
/// backend resolves the key when the scan runs.
pub struct ResourceMonitor<R> {
    kind: String,
    store: SharedStore,
    debouncer: Arc<dyn Debounce>,
    _resource: PhantomData<fn() -> R>,
}

// === impl ResourceMonitor ===

impl<R> ResourceMonitor<R>
where
    R: Resource<DynamicType = ()>,
{
    pub fn new(store: SharedStore, debouncer: Arc<dyn Debounce>) -> Self {
        Self {
            kind: R::kind(&()).to_ascii_lowercase(),
            store,
            debouncer,
            _resource: PhantomData,
        }
    }

    pub fn shared(store: SharedStore, debouncer: Arc<dyn Debounce>) -> SharedMonitor<R> {
        Arc::new(RwLock::new(Self::new(store, debouncer)))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Requests a scan of the named resource unless no tenant is registered.
    pub fn reconcile(&self, namespace: &str, name: &str) {
        if self.store.is_empty() {
            tracing::trace!(kind = %self.kind, %namespace, %name, "No scan API clients registered");
            return;
        }
        let key = ResourceKey::new(&self.kind, namespace, name);
        tracing::debug!(%key, "Resource changed");
        self.debouncer.add(key.to_string());
    }
}

impl<R> kubert::index::IndexNamespacedResource<R> for ResourceMonitor<R>
where
    R: Resource<DynamicType = ()> + ResourceExt,
{
    fn apply(&mut self, resource: R) {
        if resource.meta().deletion_timestamp.is_some() {
            return;
        }
        let namespace = resource.namespace().unwrap_or_default();
        self.reconcile(&namespace, &resource.name_unchecked());
    }

    fn delete(&mut self, _namespace: String, _name: String) {}
}
