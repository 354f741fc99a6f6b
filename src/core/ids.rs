use chrono::Utc;
use uuid::Uuid;

/// Prefix used when naming cloud resources that belong to an installation.
///
/// Changing this value breaks the link to cloud resources of existing
/// installations.
pub const CLOUD_ID_PREFIX: &str = "cloud-";

/// Generates a new opaque entity id (32 lowercase hex characters).
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Canonical cloud resource name for the given installation id.
pub fn cloud_id(id: &str) -> String {
    format!("{CLOUD_ID_PREFIX}{id}")
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique_and_hex() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn cloud_id_is_prefixed() {
        assert_eq!(cloud_id("abc"), "cloud-abc");
    }
}
