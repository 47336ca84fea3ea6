use crate::{
    core::SharedStore,
    k8s::{self, watcher, Resource},
    monitor::{Debounce, ResourceMonitor},
};
use serde::de::DeserializeOwned;
use std::{fmt, str::FromStr, sync::Arc};
use tracing::{info_span, Instrument};

/// A workload kind whose changes trigger scans.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MonitoredKind {
    Pods,
    Deployments,
    DaemonSets,
    StatefulSets,
    ReplicaSets,
    Jobs,
    CronJobs,
}

/// A comma-separated list of monitored kinds, e.g. `pods,deployments`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitoredKinds(pub Vec<MonitoredKind>);

#[derive(Debug, thiserror::Error)]
#[error("unknown monitored kind: {0:?}")]
pub struct UnknownKind(String);

pub const DEFAULT_MONITORED_KINDS: &str =
    "pods,deployments,daemonsets,statefulsets,replicasets,jobs,cronjobs";

// === impl MonitoredKind ===

impl MonitoredKind {
    /// Watches all resources of this kind, feeding changes to the debouncer.
    pub fn spawn<S: 'static>(
        self,
        runtime: &mut kubert::Runtime<S>,
        store: &SharedStore,
        debouncer: &Arc<dyn Debounce>,
    ) {
        match self {
            Self::Pods => spawn::<k8s::Pod, S>(runtime, store, debouncer),
            Self::Deployments => spawn::<k8s::Deployment, S>(runtime, store, debouncer),
            Self::DaemonSets => spawn::<k8s::DaemonSet, S>(runtime, store, debouncer),
            Self::StatefulSets => spawn::<k8s::StatefulSet, S>(runtime, store, debouncer),
            Self::ReplicaSets => spawn::<k8s::ReplicaSet, S>(runtime, store, debouncer),
            Self::Jobs => spawn::<k8s::Job, S>(runtime, store, debouncer),
            Self::CronJobs => spawn::<k8s::CronJob, S>(runtime, store, debouncer),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pods => "pods",
            Self::Deployments => "deployments",
            Self::DaemonSets => "daemonsets",
            Self::StatefulSets => "statefulsets",
            Self::ReplicaSets => "replicasets",
            Self::Jobs => "jobs",
            Self::CronJobs => "cronjobs",
        }
    }
}

impl FromStr for MonitoredKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pods" | "pod" => Ok(Self::Pods),
            "deployments" | "deployment" => Ok(Self::Deployments),
            "daemonsets" | "daemonset" => Ok(Self::DaemonSets),
            "statefulsets" | "statefulset" => Ok(Self::StatefulSets),
            "replicasets" | "replicaset" => Ok(Self::ReplicaSets),
            "jobs" | "job" => Ok(Self::Jobs),
            "cronjobs" | "cronjob" => Ok(Self::CronJobs),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for MonitoredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl MonitoredKinds ===

impl FromStr for MonitoredKinds {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut kinds = Vec::new();
        for kind in s.split(',').filter(|k| !k.trim().is_empty()) {
            let kind = kind.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(Self(kinds))
    }
}

fn spawn<R, S: 'static>(runtime: &mut kubert::Runtime<S>, store: &SharedStore, debouncer: &Arc<dyn Debounce>)
where
    R: Resource<DynamicType = ()>
        + DeserializeOwned
        + Clone
        + fmt::Debug
        + Send
        + Sync
        + 'static,
{
    let monitor = ResourceMonitor::<R>::shared(store.clone(), debouncer.clone());
    let kind = monitor.read().kind().to_string();
    let events = runtime.watch_all::<R>(watcher::Config::default());
    tokio::spawn(
        kubert::index::namespaced(monitor, events).instrument(info_span!("monitor", %kind)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_default_kinds() {
        let MonitoredKinds(kinds) = DEFAULT_MONITORED_KINDS.parse().unwrap();
        assert_eq!(
            kinds,
            vec![
                MonitoredKind::Pods,
                MonitoredKind::Deployments,
                MonitoredKind::DaemonSets,
                MonitoredKind::StatefulSets,
                MonitoredKind::ReplicaSets,
                MonitoredKind::Jobs,
                MonitoredKind::CronJobs,
            ]
        );
    }

    #[test]
    fn parses_singular_and_mixed_case() {
        let MonitoredKinds(kinds) = " Pod, deployments,,pods ".parse().unwrap();
        assert_eq!(kinds, vec![MonitoredKind::Pods, MonitoredKind::Deployments]);
    }

    #[test]
    fn rejects_unknown_kinds() {
        let error = "pods,services".parse::<MonitoredKinds>().unwrap_err();
        assert_eq!(error.to_string(), "unknown monitored kind: \"services\"");
    }
}
