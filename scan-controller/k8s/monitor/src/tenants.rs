//! Indexes tenant Secrets into the scan API store.
//!
//! Each Secret labeled as a scan API tenant describes one tenant's scan
//! backend. The tenant is identified by the Secret's `namespace/name`.

use parking_lot::RwLock;
use scan_controller_core::{ClientConfiguration, SharedStore, TenantId};
use scan_controller_k8s_api::{ResourceExt, Secret};
use std::sync::Arc;

/// Selects the Secrets that describe tenants.
pub const TENANT_SELECTOR: &str = "k8s.mondoo.com/scan-api-tenant=true";

pub const ENDPOINT_KEY: &str = "endpoint";
pub const TOKEN_KEY: &str = "token";
pub const INTEGRATION_MRN_KEY: &str = "integration-mrn";
pub const MANAGED_BY_KEY: &str = "managed-by";
pub const INCLUDE_NAMESPACES_KEY: &str = "include-namespaces";
pub const EXCLUDE_NAMESPACES_KEY: &str = "exclude-namespaces";

#[derive(Debug)]
pub struct TenantIndex {
    store: SharedStore,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidTenant {
    #[error("missing required key {0:?}")]
    MissingKey(&'static str),

    #[error("value of {0:?} is not valid UTF-8")]
    NotUtf8(String),
}

// === impl TenantIndex ===

impl TenantIndex {
    pub fn shared(store: SharedStore) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(Self { store }))
    }
}

impl kubert::index::IndexNamespacedResource<Secret> for TenantIndex {
    fn apply(&mut self, secret: Secret) {
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_unchecked();
        let tenant = tenant_id(&namespace, &name);

        match client_configuration(tenant.clone(), &secret) {
            Ok(config) => self.store.set(tenant, config),
            Err(error) => {
                tracing::warn!(%tenant, %error, "Ignoring invalid tenant secret");
                self.store.remove(&tenant);
            }
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.store.remove(&tenant_id(&namespace, &name));
    }
}

fn tenant_id(namespace: &str, name: &str) -> TenantId {
    TenantId::new(format!("{namespace}/{name}"))
}

/// Reads a tenant's scan backend configuration from a Secret.
///
/// Values are read from `data`, with `stringData` taking precedence for
/// Secrets that have not yet been normalized by the API server.
pub fn client_configuration(
    tenant_id: TenantId,
    secret: &Secret,
) -> Result<ClientConfiguration, InvalidTenant> {
    let value = |key: &'static str| -> Result<Option<String>, InvalidTenant> {
        if let Some(v) = secret.string_data.as_ref().and_then(|d| d.get(key)) {
            return Ok(Some(v.trim().to_string()));
        }
        match secret.data.as_ref().and_then(|d| d.get(key)) {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes.0.clone())
                .map(|v| Some(v.trim().to_string()))
                .map_err(|_| InvalidTenant::NotUtf8(key.to_string())),
        }
    };
    let required = |key: &'static str| {
        value(key)?
            .filter(|v| !v.is_empty())
            .ok_or(InvalidTenant::MissingKey(key))
    };
    let optional = |key: &'static str| Ok::<_, InvalidTenant>(value(key)?.filter(|v| !v.is_empty()));
    let list = |key: &'static str| {
        Ok::<_, InvalidTenant>(
            value(key)?
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|ns| !ns.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        )
    };

    Ok(ClientConfiguration {
        tenant_id,
        endpoint: required(ENDPOINT_KEY)?,
        token: required(TOKEN_KEY)?,
        integration_mrn: optional(INTEGRATION_MRN_KEY)?,
        managed_by: optional(MANAGED_BY_KEY)?,
        include_namespaces: list(INCLUDE_NAMESPACES_KEY)?,
        exclude_namespaces: list(EXCLUDE_NAMESPACES_KEY)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubert::index::IndexNamespacedResource;
    use maplit::{btreemap, convert_args};
    use pretty_assertions::assert_eq;
    use scan_controller_core::ScanApiStore;
    use scan_controller_k8s_api::{ByteString, ObjectMeta};
    use std::collections::BTreeMap;

    fn secret(name: &str, data: BTreeMap<String, &str>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                namespace: Some("mondoo-operator".to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            data: Some(
                data.into_iter()
                    .map(|(k, v)| (k, ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn parses_all_keys() {
        let secret = secret(
            "tenant-a",
            convert_args!(keys = String::from, btreemap!(
                "endpoint" => "http://scan-api.mondoo-operator.svc:8080\n",
                "token" => "s3cr3t",
                "integration-mrn" => "//integration/a",
                "include-namespaces" => "apps, web ,",
                "exclude-namespaces" => "",
            )),
        );

        let config = client_configuration(TenantId::new("t"), &secret).unwrap();
        assert_eq!(
            config,
            ClientConfiguration {
                tenant_id: TenantId::new("t"),
                endpoint: "http://scan-api.mondoo-operator.svc:8080".to_string(),
                token: "s3cr3t".to_string(),
                integration_mrn: Some("//integration/a".to_string()),
                managed_by: None,
                include_namespaces: vec!["apps".to_string(), "web".to_string()],
                exclude_namespaces: vec![],
            }
        );
    }

    #[test]
    fn requires_endpoint_and_token() {
        let no_token = secret(
            "tenant-a",
            convert_args!(keys = String::from, btreemap!("endpoint" => "http://a")),
        );
        assert_eq!(
            client_configuration(TenantId::new("t"), &no_token),
            Err(InvalidTenant::MissingKey(TOKEN_KEY))
        );

        let mut string_data = no_token.clone();
        string_data.string_data = Some(convert_args!(btreemap!("token" => "t")));
        assert!(client_configuration(TenantId::new("t"), &string_data).is_ok());
    }

    #[test]
    fn index_tracks_secret_lifecycle() {
        let store = ScanApiStore::shared();
        let index = TenantIndex::shared(store.clone());
        let tenant = TenantId::new("mondoo-operator/tenant-a");

        index.write().apply(secret(
            "tenant-a",
            convert_args!(keys = String::from, btreemap!(
                "endpoint" => "http://a",
                "token" => "t",
            )),
        ));
        assert_eq!(store.get(&tenant).unwrap().endpoint, "http://a");

        // An update that breaks the secret removes the tenant.
        index.write().apply(secret(
            "tenant-a",
            convert_args!(keys = String::from, btreemap!("endpoint" => "http://a")),
        ));
        assert!(store.get(&tenant).is_none());

        index.write().apply(secret(
            "tenant-a",
            convert_args!(keys = String::from, btreemap!(
                "endpoint" => "http://a2",
                "token" => "t",
            )),
        ));
        assert_eq!(store.len(), 1);

        index
            .write()
            .delete("mondoo-operator".to_string(), "tenant-a".to_string());
        assert!(store.is_empty());
    }
}
