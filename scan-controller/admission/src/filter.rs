use kube::core::DynamicObject;
use scan_controller_k8s_api::{controller_of, ObjectMeta, OwnerReference, SCANNED_PARENT_KINDS};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("failed to encode object for comparison: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("object has no metadata")]
    MissingMetadata,
}

/// Returns the controlling owner if it is a workload that is scanned itself.
pub(crate) fn scanned_parent(meta: &ObjectMeta) -> Option<&OwnerReference> {
    controller_of(meta).filter(|owner| SCANNED_PARENT_KINDS.contains(&owner.kind.as_str()))
}

/// Returns true if two versions of an object differ only in the metadata that
/// server-side apply rewrites on no-op updates.
pub(crate) fn only_apply_noise(
    old: &DynamicObject,
    new: &DynamicObject,
) -> Result<bool, FilterError> {
    let old = without_apply_noise(serde_json::to_value(old)?)?;
    let new = without_apply_noise(serde_json::to_value(new)?)?;
    Ok(old == new)
}

fn without_apply_noise(mut obj: Value) -> Result<Value, FilterError> {
    let meta = obj
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or(FilterError::MissingMetadata)?;
    meta.insert("resourceVersion".to_string(), Value::String(String::new()));
    meta.insert("managedFields".to_string(), Value::String(String::new()));
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owned_by(kind: &str) -> ObjectMeta {
        ObjectMeta {
            owner_references: Some(vec![OwnerReference {
                kind: kind.to_string(),
                name: "parent".to_string(),
                controller: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    fn object(value: &Value) -> DynamicObject {
        serde_json::from_value(value.clone()).unwrap()
    }

    #[test]
    fn children_of_workloads_are_skipped() {
        for kind in SCANNED_PARENT_KINDS {
            assert!(scanned_parent(&owned_by(kind)).is_some(), "{kind}");
        }
        assert!(scanned_parent(&owned_by("Node")).is_none());
        assert!(scanned_parent(&ObjectMeta::default()).is_none());
    }

    #[test]
    fn apply_noise_is_ignored() {
        let old = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "web",
                "resourceVersion": "100",
                "managedFields": [{"manager": "kubectl", "operation": "Apply"}],
            },
            "spec": {"replicas": 2},
        });
        let mut new = old.clone();
        new["metadata"]["resourceVersion"] = json!("101");
        new["metadata"]["managedFields"] = json!([{"manager": "helm", "operation": "Apply"}]);
        assert!(only_apply_noise(&object(&old), &object(&new)).unwrap());

        new["metadata"]["labels"] = json!({"app": "web"});
        assert!(!only_apply_noise(&object(&old), &object(&new)).unwrap());

        new["metadata"]["labels"] = json!(null);
        new["spec"]["replicas"] = json!(3);
        assert!(!only_apply_noise(&object(&old), &object(&new)).unwrap());
    }

    #[test]
    fn comparison_requires_metadata() {
        assert!(matches!(
            without_apply_noise(json!({"kind": "Pod"})),
            Err(FilterError::MissingMetadata)
        ));
        assert!(matches!(
            without_apply_noise(json!({"kind": "Pod", "metadata": "web"})),
            Err(FilterError::MissingMetadata)
        ));
    }
}
