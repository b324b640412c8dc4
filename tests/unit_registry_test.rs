use hostplane::core::endpoint::{Endpoint, MacAddr, suffix_for};
use hostplane::core::registry::EndpointRegistry;

fn endpoint(id: &str) -> Endpoint {
    let mac: MacAddr = "aa:bb:cc:00:00:01".parse().unwrap();
    Endpoint::new(id.to_string(), mac)
}

#[test]
fn test_suffix_derivation() {
    // Short ids are used whole; long ids keep their unique tail.
    assert_eq!(suffix_for("short"), "short");
    assert_eq!(suffix_for("0123456789abcdef"), "56789abcdef");
    assert_eq!(suffix_for(""), "");
}

#[test]
fn test_insert_and_remove() {
    let mut registry = EndpointRegistry::new();
    assert!(registry.is_empty());

    registry.insert(endpoint("e1"));
    registry.insert(endpoint("e2"));
    assert_eq!(registry.len(), 2);
    assert!(registry.contains("e1"));
    assert!(registry.get("e2").is_some());

    let removed = registry.remove("e1").unwrap();
    assert_eq!(removed.id, "e1");
    assert!(!registry.contains("e1"));
    assert!(registry.remove("e1").is_none());
}

#[test]
fn test_suffixes_follow_registry() {
    let mut registry = EndpointRegistry::new();
    registry.insert(endpoint("0123456789abcdef"));
    registry.insert(endpoint("tiny"));

    let suffixes = registry.suffixes();
    assert!(suffixes.contains("56789abcdef"));
    assert!(suffixes.contains("tiny"));
    assert_eq!(suffixes.len(), 2);
}

#[test]
fn test_pending_resync_marking() {
    let mut registry = EndpointRegistry::new();
    registry.insert(endpoint("e1"));
    registry.insert(endpoint("e2"));
    assert!(registry.pending_ids().is_empty());

    registry.mark_all_pending();
    let mut pending = registry.pending_ids();
    pending.sort();
    assert_eq!(pending, vec!["e1".to_string(), "e2".to_string()]);

    registry.get_mut("e1").unwrap().pending_resync = false;
    assert_eq!(registry.pending_ids(), vec!["e2".to_string()]);
}

#[test]
fn test_new_endpoint_needs_acls() {
    let ep = endpoint("e1");
    assert!(ep.need_acls);
    assert!(!ep.pending_resync);
    assert!(ep.acls.is_none());
    assert!(ep.addresses.is_empty());
}
