// tests/unit_refs_test.rs

use topicmirror::MirrorError;
use topicmirror::core::upstream::refs::{ChatRef, normalize_ref};

#[test]
fn test_internal_message_link_becomes_peer_id() {
    let normalized = normalize_ref("https://t.me/c/3301983683/879/9606").unwrap();
    assert_eq!(normalized, ChatRef::Id(-1003301983683));
}

#[test]
fn test_username_link_becomes_handle() {
    let normalized = normalize_ref("https://t.me/example_group/123").unwrap();
    assert_eq!(normalized, ChatRef::Username("@example_group".to_string()));
}

#[test]
fn test_numeric_input_passes_through() {
    assert_eq!(normalize_ref("-1001234567").unwrap(), ChatRef::Id(-1001234567));
    assert_eq!(normalize_ref("42").unwrap(), ChatRef::Id(42));
}

#[test]
fn test_bare_name_gets_handle_prefix() {
    assert_eq!(
        normalize_ref("example_group").unwrap(),
        ChatRef::Username("@example_group".to_string())
    );
    assert_eq!(
        normalize_ref("@already").unwrap(),
        ChatRef::Username("@already".to_string())
    );
}

#[test]
fn test_plain_link_without_message_suffix() {
    assert_eq!(
        normalize_ref("t.me/example_group").unwrap(),
        ChatRef::Username("@example_group".to_string())
    );
}

#[test]
fn test_empty_input_is_invalid() {
    assert!(matches!(
        normalize_ref(""),
        Err(MirrorError::InvalidInput(_))
    ));
    assert!(matches!(
        normalize_ref("   "),
        Err(MirrorError::InvalidInput(_))
    ));
}

#[test]
fn test_bad_internal_id_is_invalid() {
    assert!(matches!(
        normalize_ref("t.me/c/notanumber/1"),
        Err(MirrorError::InvalidInput(_))
    ));
}

#[test]
fn test_normalization_is_idempotent() {
    for input in [
        "https://t.me/c/3301983683/879/9606",
        "https://t.me/example_group/123",
        "example_group",
        "@already",
        "-1001234567",
    ] {
        let first = normalize_ref(input).unwrap();
        let second = normalize_ref(&first.to_string()).unwrap();
        assert_eq!(first, second, "not idempotent for {input:?}");
    }
}
