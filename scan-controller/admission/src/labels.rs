//! Labels attached to admission scans so results can be traced back to the
//! admitted object.

use crate::{
    review::{operation_str, AdmissionRequest},
    Decoded,
};
use scan_controller_core::scan::INTEGRATION_MRN_LABEL;
use scan_controller_k8s_api::controller_of;
use std::collections::BTreeMap;

pub const NAMESPACE: &str = "k8s.mondoo.com/namespace";
pub const UID: &str = "k8s.mondoo.com/uid";
pub const RESOURCE_VERSION: &str = "k8s.mondoo.com/resource-version";
pub const NAME: &str = "k8s.mondoo.com/name";
pub const KIND: &str = "k8s.mondoo.com/kind";
pub const OWNER_NAME: &str = "k8s.mondoo.com/owner-name";
pub const OWNER_KIND: &str = "k8s.mondoo.com/owner-kind";
pub const OWNER_UID: &str = "k8s.mondoo.com/owner-uid";
pub const AUTHOR: &str = "k8s.mondoo.com/author";
pub const OPERATION: &str = "k8s.mondoo.com/operation";
pub const CLUSTER_ID: &str = "k8s.mondoo.com/cluster-id";

pub(crate) fn scan_labels(
    req: &AdmissionRequest,
    obj: &Decoded,
    namespace: &str,
    cluster_id: &str,
    integration_mrn: Option<&str>,
) -> BTreeMap<String, String> {
    let meta = &obj.metadata;
    let name = meta
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| req.name.clone());

    let mut labels = BTreeMap::new();
    let mut set = |key: &str, value: String| {
        labels.insert(key.to_string(), value);
    };
    set(NAMESPACE, namespace.to_string());
    set(UID, meta.uid.clone().unwrap_or_default());
    set(RESOURCE_VERSION, meta.resource_version.clone().unwrap_or_default());
    set(NAME, name);
    set(KIND, obj.kind.clone());
    set(AUTHOR, req.user_info.username.clone().unwrap_or_default());
    set(OPERATION, operation_str(&req.operation).to_string());
    set(CLUSTER_ID, cluster_id.to_string());

    if let Some(owner) = controller_of(meta) {
        set(OWNER_NAME, owner.name.clone());
        set(OWNER_KIND, owner.kind.clone());
        set(OWNER_UID, owner.uid.clone());
    }

    if let Some(mrn) = integration_mrn.filter(|mrn| !mrn.is_empty()) {
        set(INTEGRATION_MRN_LABEL, mrn.to_string());
    }

    labels
}
