//! Elects the replica that dispatches scans.
//!
//! Every replica serves admission reviews, but only the holder of the
//! dispatch Lease schedules scans, so that running several replicas does not
//! multiply the requests sent to the scan backends.

use crate::k8s::{self, api::apps::v1::Deployment, ObjectMeta, OwnerReference, Resource};
use anyhow::{Context, Result};
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::PostParams;
use kubert::lease::{Claim, ClaimParams, LeaseManager};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const LEASE_NAME: &str = "scan-controller-dispatch";
const FIELD_MANAGER: &str = "scan-controller";

/// Where the dispatch Lease lives and how it is held.
#[derive(Clone, Debug)]
pub struct DispatchLease {
    pub namespace: String,
    /// The controller's own Deployment, which owns the Lease so that it is
    /// deleted along with the controller.
    pub deployment_name: String,
    pub claimant: String,
    pub params: ClaimParams,
}

// === impl DispatchLease ===

impl DispatchLease {
    /// Creates the Lease if needed and starts contending for it.
    pub async fn spawn<S>(
        self,
        runtime: &kubert::Runtime<S>,
    ) -> Result<watch::Receiver<Arc<Claim>>> {
        let owner = self.owner(runtime.client()).await?;
        let api = k8s::Api::<Lease>::namespaced(runtime.client(), &self.namespace);

        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        match api.create(&params, &self.lease(owner)).await {
            Ok(_) => info!(ns = %self.namespace, name = LEASE_NAME, "Created dispatch Lease"),
            Err(k8s::Error::Api(error)) if error.code == 409 => {
                debug!(ns = %self.namespace, name = LEASE_NAME, "Dispatch Lease already exists")
            }
            Err(error) => return Err(error).context("failed to create the dispatch Lease"),
        }

        let (claims, _task) = LeaseManager::init(api, LEASE_NAME)
            .await?
            .with_field_manager(FIELD_MANAGER)
            .spawn(&self.claimant, self.params)
            .await?;
        Ok(claims)
    }

    /// Looks up the controller's Deployment. The Lease is still created, just
    /// without an owner, when the Deployment cannot be found.
    async fn owner(&self, client: k8s::Client) -> Result<Option<OwnerReference>> {
        let api = k8s::Api::<Deployment>::namespaced(client, &self.namespace);
        let deployment = api
            .get_opt(&self.deployment_name)
            .await
            .with_context(|| format!("failed to get deployment {}", self.deployment_name))?;
        let owner = deployment.and_then(|deploy| deploy.controller_owner_ref(&()));
        if owner.is_none() {
            warn!(
                ns = %self.namespace,
                deployment = %self.deployment_name,
                "Controller deployment not found; the dispatch Lease will outlive it",
            );
        }
        Ok(owner)
    }

    fn lease(&self, owner: Option<OwnerReference>) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(LEASE_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                owner_references: owner.map(|owner| vec![owner]),
                labels: Some(BTreeMap::from([
                    (
                        "app.kubernetes.io/name".to_string(),
                        "scan-controller".to_string(),
                    ),
                    ("app.kubernetes.io/part-of".to_string(), "mondoo".to_string()),
                ])),
                ..Default::default()
            },
            spec: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn dispatch_lease() -> DispatchLease {
        DispatchLease {
            namespace: "mondoo-operator".to_string(),
            deployment_name: "mondoo-scan-controller".to_string(),
            claimant: "mondoo-scan-controller-5d8f7-abcde".to_string(),
            params: ClaimParams {
                lease_duration: Duration::from_secs(30),
                renew_grace_period: Duration::from_secs(1),
            },
        }
    }

    #[test]
    fn lease_is_owned_by_the_deployment() {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("mondoo-scan-controller".to_string()),
                namespace: Some("mondoo-operator".to_string()),
                uid: Some("0b4e5c2a-0000-4000-8000-000000000001".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let owner = deployment.controller_owner_ref(&());
        let lease = dispatch_lease().lease(owner);

        assert_eq!(lease.metadata.name.as_deref(), Some(LEASE_NAME));
        assert_eq!(lease.metadata.namespace.as_deref(), Some("mondoo-operator"));
        assert_eq!(lease.metadata.resource_version, None);
        assert!(lease.spec.is_none());

        let owners = lease.metadata.owner_references.expect("lease must be owned");
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Deployment");
        assert_eq!(owners[0].name, "mondoo-scan-controller");
        assert_eq!(owners[0].uid, "0b4e5c2a-0000-4000-8000-000000000001");
        assert_eq!(owners[0].controller, Some(true));

        let labels = lease.metadata.labels.expect("lease must be labeled");
        assert_eq!(labels["app.kubernetes.io/name"], "scan-controller");
        assert_eq!(labels["app.kubernetes.io/part-of"], "mondoo");
    }

    #[test]
    fn lease_without_deployment_has_no_owner() {
        let lease = dispatch_lease().lease(None);
        assert_eq!(lease.metadata.owner_references, None);
        assert_eq!(lease.metadata.name.as_deref(), Some(LEASE_NAME));
    }
}
