/// Returns true if resources in `namespace` may be scanned.
///
/// A non-empty include list must contain the namespace. The exclude list is
/// checked independently, so a namespace on both lists is excluded.
pub fn allow_namespace(namespace: &str, include: &[String], exclude: &[String]) -> bool {
    if !include.is_empty() && !include.iter().any(|ns| ns == namespace) {
        return false;
    }
    !exclude.iter().any(|ns| ns == namespace)
}
