#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod duration;
mod resource_key;

pub use self::{
    duration::K8sDuration,
    resource_key::{ParseKeyError, ResourceKey},
};
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        batch::v1::{CronJob, Job},
        core::v1::{Namespace, Pod, Secret},
    },
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time},
    ByteString,
};
pub use kube::{
    api::{Api, ResourceExt},
    runtime::watcher,
    Client, Error, Resource,
};

/// Kinds whose children are never scanned on their own, since the parent
/// workload has already been scanned.
pub const SCANNED_PARENT_KINDS: [&str; 6] = [
    "Deployment",
    "ReplicaSet",
    "DaemonSet",
    "StatefulSet",
    "CronJob",
    "Job",
];

/// Returns the owner reference that is marked as the object's controller, if any.
pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|owner| owner.controller == Some(true))
}
