use kube::core::{DynamicObject, GroupVersionKind};
use scan_controller_k8s_api::{
    CronJob, DaemonSet, Deployment, Job, ObjectMeta, Pod, ReplicaSet, Resource, StatefulSet,
};
use serde::de::DeserializeOwned;

/// The parts of an admitted object that drive the decision.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Decoded {
    pub kind: String,
    pub metadata: ObjectMeta,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("admission request has no object")]
    MissingObject,

    #[error("admitted object has no kind")]
    MissingKind,
}

/// Decodes an admitted object.
///
/// Well-known workload kinds are decoded into their API types first. Any
/// object that is not a well-known kind, or that does not match its API type,
/// is decoded structurally so that only its kind and metadata must be valid.
pub fn decode(gvk: &GroupVersionKind, obj: Option<&DynamicObject>) -> Result<Decoded, DecodeError> {
    let obj = obj.ok_or(DecodeError::MissingObject)?;

    match typed(gvk, obj) {
        Some(Ok(metadata)) => {
            return Ok(Decoded {
                kind: gvk.kind.clone(),
                metadata,
            })
        }
        Some(Err(error)) => {
            tracing::debug!(%error, kind = %gvk.kind, "Falling back to structural decoding");
        }
        None => {}
    }

    let kind = obj
        .types
        .as_ref()
        .map(|types| types.kind.as_str())
        .filter(|kind| !kind.is_empty())
        .unwrap_or(&gvk.kind);
    if kind.is_empty() {
        return Err(DecodeError::MissingKind);
    }
    Ok(Decoded {
        kind: kind.to_string(),
        metadata: obj.metadata.clone(),
    })
}

fn typed(
    gvk: &GroupVersionKind,
    obj: &DynamicObject,
) -> Option<Result<ObjectMeta, serde_json::Error>> {
    let metadata = match (gvk.group.as_str(), gvk.version.as_str(), gvk.kind.as_str()) {
        ("", "v1", "Pod") => metadata_of::<Pod>(obj),
        ("apps", "v1", "Deployment") => metadata_of::<Deployment>(obj),
        ("apps", "v1", "ReplicaSet") => metadata_of::<ReplicaSet>(obj),
        ("apps", "v1", "DaemonSet") => metadata_of::<DaemonSet>(obj),
        ("apps", "v1", "StatefulSet") => metadata_of::<StatefulSet>(obj),
        ("batch", "v1", "Job") => metadata_of::<Job>(obj),
        ("batch", "v1", "CronJob") => metadata_of::<CronJob>(obj),
        _ => return None,
    };
    Some(metadata)
}

fn metadata_of<R>(obj: &DynamicObject) -> Result<ObjectMeta, serde_json::Error>
where
    R: Resource + DeserializeOwned,
{
    let mut resource = serde_json::to_value(obj).and_then(serde_json::from_value::<R>)?;
    Ok(std::mem::take(resource.meta_mut()))
}
