use std::{fmt, str::FromStr};

/// Identifies a watched resource as `{kind}:{namespace}:{name}`.
///
/// The kind is always lowercased. Cluster-scoped resources have an empty
/// namespace.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum ParseKeyError {
    #[error("resource key must have the form kind:namespace:name: {0:?}")]
    Malformed(String),

    #[error("resource key has an empty {0}")]
    Empty(&'static str),
}

impl ResourceKey {
    pub fn new(kind: impl AsRef<str>, namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            kind: kind.as_ref().to_ascii_lowercase(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.namespace, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (kind, namespace, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(kind), Some(ns), Some(name)) => (kind, ns, name),
            _ => return Err(ParseKeyError::Malformed(s.to_string())),
        };
        if name.contains(':') {
            return Err(ParseKeyError::Malformed(s.to_string()));
        }
        if kind.is_empty() {
            return Err(ParseKeyError::Empty("kind"));
        }
        if name.is_empty() {
            return Err(ParseKeyError::Empty("name"));
        }
        Ok(Self::new(kind, namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_lowercase_kind() {
        let key = ResourceKey::new("Pod", "default", "web-0");
        assert_eq!(key.to_string(), "pod:default:web-0");
    }

    #[test]
    fn parses_display_output() {
        let key = ResourceKey::new("StatefulSet", "db", "postgres");
        assert_eq!(key.to_string().parse::<ResourceKey>(), Ok(key));

        let cluster_scoped = "namespace::kube-system".parse::<ResourceKey>().unwrap();
        assert_eq!(cluster_scoped.namespace, "");
        assert_eq!(cluster_scoped.name, "kube-system");
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(
            "pod:default".parse::<ResourceKey>(),
            Err(ParseKeyError::Malformed(_))
        ));
        assert!(matches!(
            "pod:default:a:b".parse::<ResourceKey>(),
            Err(ParseKeyError::Malformed(_))
        ));
        assert_eq!(
            ":default:web".parse::<ResourceKey>(),
            Err(ParseKeyError::Empty("kind"))
        );
        assert_eq!(
            "pod:default:".parse::<ResourceKey>(),
            Err(ParseKeyError::Empty("name"))
        );
    }
}
