// tests/unit_store_test.rs

mod common;

use common::temp_store;
use topicmirror::MirrorError;
use topicmirror::core::store::TopicUpsert;

#[tokio::test]
async fn test_binding_upsert_flips_channel_state() {
    let (store, _dir) = temp_store().await;

    let group = store.upsert_source_group(-10011, "sg").await.unwrap();
    store
        .upsert_topics(
            group.id,
            vec![TopicUpsert {
                topic_id: 100,
                title: "topic-100".to_string(),
            }],
        )
        .await
        .unwrap();

    store
        .upsert_channel(-10021, "c1", true, false, None)
        .await
        .unwrap();
    let binding = store.upsert_binding(group.id, 100, -10021).await.unwrap();
    assert_eq!(binding.channel_chat_id, -10021);

    let standby = store.list_standby_channels().await.unwrap();
    assert!(standby.is_empty());

    // Bound channels satisfy the channel-state invariant.
    let channel = store.get_channel(-10021).await.unwrap().unwrap();
    assert!(channel.in_use);
    assert!(!channel.is_standby);
}

#[tokio::test]
async fn test_channel_state_exclusion_holds() {
    let (store, _dir) = temp_store().await;

    store
        .upsert_channel(-20001, "standby", true, false, None)
        .await
        .unwrap();
    store
        .upsert_channel(-20002, "bound", false, true, None)
        .await
        .unwrap();
    store
        .upsert_channel(-20003, "tracked", false, false, None)
        .await
        .unwrap();

    for channel in store.list_channels().await.unwrap() {
        assert!(
            !(channel.is_standby && channel.in_use),
            "channel {} is both standby and in use",
            channel.chat_id
        );
    }
}

#[tokio::test]
async fn test_admin_check_timestamp_is_merged() {
    let (store, _dir) = temp_store().await;

    store
        .upsert_channel(-20010, "c", true, false, Some("2026-01-01T00:00:00Z".to_string()))
        .await
        .unwrap();

    // A later upsert without a check timestamp keeps the recorded one.
    let row = store
        .upsert_channel(-20010, "c-renamed", true, false, None)
        .await
        .unwrap();
    assert_eq!(row.admin_check_at.as_deref(), Some("2026-01-01T00:00:00Z"));
    assert_eq!(row.title, "c-renamed");

    let row = store
        .upsert_channel(-20010, "c-renamed", true, false, Some("2026-02-02T00:00:00Z".to_string()))
        .await
        .unwrap();
    assert_eq!(row.admin_check_at.as_deref(), Some("2026-02-02T00:00:00Z"));
}

#[tokio::test]
async fn test_banned_channel_rows_collapse() {
    let (store, _dir) = temp_store().await;

    store.add_banned_channel(1, 10, -5000, "first").await.unwrap();
    store.add_banned_channel(1, 10, -5000, "second").await.unwrap();
    store.add_banned_channel(1, 11, -5000, "other topic").await.unwrap();

    let banned = store.list_banned_channels().await.unwrap();
    let for_triple: Vec<_> = banned
        .iter()
        .filter(|row| row.source_group_id == 1 && row.topic_id == 10 && row.channel_chat_id == -5000)
        .collect();
    assert_eq!(for_triple.len(), 1);
    assert_eq!(for_triple[0].reason.as_deref(), Some("second"));
    assert_eq!(banned.len(), 2);

    store.remove_banned_channel(1, 10, -5000).await.unwrap();
    assert_eq!(store.list_banned_channels().await.unwrap().len(), 1);

    assert_eq!(store.clear_banned_channels().await.unwrap(), 1);
    assert!(store.list_banned_channels().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_source_group_cascade_and_precondition() {
    let (store, _dir) = temp_store().await;

    let group = store.upsert_source_group(-30001, "sg").await.unwrap();
    store
        .upsert_topics(
            group.id,
            vec![
                TopicUpsert {
                    topic_id: 1,
                    title: "a".to_string(),
                },
                TopicUpsert {
                    topic_id: 2,
                    title: "b".to_string(),
                },
            ],
        )
        .await
        .unwrap();
    store
        .upsert_channel(-30002, "target", true, false, None)
        .await
        .unwrap();
    store.upsert_binding(group.id, 1, -30002).await.unwrap();
    store.add_banned_channel(group.id, 1, -30003, "dead").await.unwrap();

    let job_id = store
        .enqueue_recovery(group.id, 1, -30003, "dead")
        .await
        .unwrap();
    assert!(store.claim_next_recovery().await.unwrap().is_some());

    // Running job blocks the delete.
    assert!(matches!(
        store.delete_source_group(group.id).await,
        Err(MirrorError::Precondition(_))
    ));

    store
        .mark_recovery_failed(job_id, 2, "gone", 3)
        .await
        .unwrap();
    let report = store.delete_source_group(group.id).await.unwrap();
    assert_eq!(report.topics, 2);
    assert_eq!(report.bindings, 1);
    assert_eq!(report.banned, 1);
    assert_eq!(report.jobs, 1);
    assert_eq!(report.channels_released, 1);

    // The released channel stays tracked but is no longer bound.
    let channel = store.get_channel(-30002).await.unwrap().unwrap();
    assert!(!channel.in_use);
    assert!(!channel.is_standby);

    assert!(store.get_source_group_by_id(group.id).await.unwrap().is_none());
    assert!(store.list_topics(Some(group.id)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_missing_source_group_is_precondition() {
    let (store, _dir) = temp_store().await;
    assert!(matches!(
        store.delete_source_group(404).await,
        Err(MirrorError::Precondition(_))
    ));
}

#[tokio::test]
async fn test_clear_unused_channels() {
    let (store, _dir) = temp_store().await;

    store
        .upsert_channel(-40001, "standby", true, false, None)
        .await
        .unwrap();
    store
        .upsert_channel(-40002, "tracked", false, false, None)
        .await
        .unwrap();
    store
        .upsert_channel(-40003, "bound", false, true, None)
        .await
        .unwrap();

    assert_eq!(store.clear_unused_channels().await.unwrap(), 2);
    let remaining = store.list_channels().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].chat_id, -40003);
}

#[tokio::test]
async fn test_detach_and_release_bindings() {
    let (store, _dir) = temp_store().await;

    let group = store.upsert_source_group(-50001, "sg").await.unwrap();
    store
        .upsert_topics(
            group.id,
            vec![
                TopicUpsert {
                    topic_id: 5,
                    title: "x".to_string(),
                },
                TopicUpsert {
                    topic_id: 6,
                    title: "y".to_string(),
                },
            ],
        )
        .await
        .unwrap();
    store.upsert_binding(group.id, 5, -50002).await.unwrap();
    store.upsert_binding(group.id, 6, -50002).await.unwrap();

    assert_eq!(store.get_bindings_by_channel(-50002).await.unwrap().len(), 2);
    store.detach_channel_bindings(-50002).await.unwrap();
    assert!(store.get_bindings_by_channel(-50002).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_topic_sync_keeps_enabled_flag() {
    let (store, _dir) = temp_store().await;

    let group = store.upsert_source_group(-60001, "sg").await.unwrap();
    store
        .upsert_topics(
            group.id,
            vec![TopicUpsert {
                topic_id: 3,
                title: "old title".to_string(),
            }],
        )
        .await
        .unwrap();

    // Topics are disabled by default; the operator opts in.
    let topic = store.get_topic(group.id, 3).await.unwrap().unwrap();
    assert!(!topic.enabled);
    store.set_topic_enabled(group.id, 3, true).await.unwrap();

    // Re-sync refreshes the title without clearing the opt-in.
    store
        .upsert_topics(
            group.id,
            vec![TopicUpsert {
                topic_id: 3,
                title: "new title".to_string(),
            }],
        )
        .await
        .unwrap();
    let topic = store.get_topic(group.id, 3).await.unwrap().unwrap();
    assert!(topic.enabled);
    assert_eq!(topic.title, "new title");
}

#[tokio::test]
async fn test_settings_round_trip() {
    let (store, _dir) = temp_store().await;

    assert!(store.get_setting("missing").await.unwrap().is_none());
    store.set_setting("cursor", "41").await.unwrap();
    store.set_setting("cursor", "42").await.unwrap();
    assert_eq!(store.get_setting("cursor").await.unwrap().as_deref(), Some("42"));
}

#[tokio::test]
async fn test_active_bindings_expose_enabled_flags() {
    let (store, _dir) = temp_store().await;

    let group = store.upsert_source_group(-70001, "sg").await.unwrap();
    store
        .upsert_topics(
            group.id,
            vec![TopicUpsert {
                topic_id: 9,
                title: "t".to_string(),
            }],
        )
        .await
        .unwrap();
    store.upsert_binding(group.id, 9, -70002).await.unwrap();
    store.set_source_group_enabled(group.id, false).await.unwrap();

    let active = store.list_active_bindings().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].source_chat_id, -70001);
    assert!(!active[0].source_enabled);
    assert!(!active[0].topic_enabled);
}
