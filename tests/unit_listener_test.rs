// tests/unit_listener_test.rs

mod common;

use common::{MemoryTransport, SentItem, gateway_with, temp_store, text_message};
use std::sync::Arc;
use topicmirror::core::clone::CloneEngine;
use topicmirror::core::listener::LiveListener;
use topicmirror::core::store::{JobStatus, Store, TopicUpsert};
use topicmirror::core::upstream::UpstreamErrorKind;

const SOURCE_CHAT: i64 = -2001;
const TARGET: i64 = -2002;
const TOPIC: i64 = 30;

struct Fixture {
    store: Store,
    _dir: tempfile::TempDir,
    writer: Arc<MemoryTransport>,
    listener: LiveListener,
    source_group_id: i64,
}

async fn fixture() -> Fixture {
    let (store, dir) = temp_store().await;
    let reader = MemoryTransport::new();
    let writer = MemoryTransport::new();
    let gateway = gateway_with(reader, writer.clone());
    let clone_engine = Arc::new(CloneEngine::new(gateway.clone()));
    let listener = LiveListener::new(store.clone(), gateway, clone_engine);

    let group = store.upsert_source_group(SOURCE_CHAT, "sg").await.unwrap();
    store
        .upsert_topics(
            group.id,
            vec![TopicUpsert {
                topic_id: TOPIC,
                title: "live topic".to_string(),
            }],
        )
        .await
        .unwrap();
    store.set_topic_enabled(group.id, TOPIC, true).await.unwrap();
    store.upsert_binding(group.id, TOPIC, TARGET).await.unwrap();

    Fixture {
        store,
        _dir: dir,
        writer,
        listener,
        source_group_id: group.id,
    }
}

#[tokio::test]
async fn test_live_message_is_routed_to_binding() {
    let f = fixture().await;

    f.listener
        .on_new_message(text_message(SOURCE_CHAT, 31, TOPIC, "live"))
        .await;

    assert_eq!(
        f.writer.sent(),
        vec![SentItem::Forward {
            target: TARGET,
            from: SOURCE_CHAT,
            ids: vec![31],
            drop_author: true,
        }]
    );
}

#[tokio::test]
async fn test_unknown_chat_is_dropped() {
    let f = fixture().await;

    f.listener
        .on_new_message(text_message(-9999, 31, TOPIC, "stranger"))
        .await;
    assert!(f.writer.sent().is_empty());
}

#[tokio::test]
async fn test_disabled_source_group_is_dropped() {
    let f = fixture().await;
    f.store
        .set_source_group_enabled(f.source_group_id, false)
        .await
        .unwrap();

    f.listener
        .on_new_message(text_message(SOURCE_CHAT, 31, TOPIC, "muted"))
        .await;
    assert!(f.writer.sent().is_empty());
}

#[tokio::test]
async fn test_disabled_topic_is_dropped() {
    let f = fixture().await;
    f.store
        .set_topic_enabled(f.source_group_id, TOPIC, false)
        .await
        .unwrap();

    f.listener
        .on_new_message(text_message(SOURCE_CHAT, 31, TOPIC, "muted"))
        .await;
    assert!(f.writer.sent().is_empty());
}

#[tokio::test]
async fn test_unknown_topic_is_dropped() {
    let f = fixture().await;

    f.listener
        .on_new_message(text_message(SOURCE_CHAT, 31, 777, "no such topic"))
        .await;
    assert!(f.writer.sent().is_empty());
}

#[tokio::test]
async fn test_inactive_binding_is_dropped() {
    let f = fixture().await;
    f.store
        .set_binding_active(f.source_group_id, TOPIC, false)
        .await
        .unwrap();

    f.listener
        .on_new_message(text_message(SOURCE_CHAT, 31, TOPIC, "unbound"))
        .await;
    assert!(f.writer.sent().is_empty());
}

#[tokio::test]
async fn test_dead_target_bans_and_enqueues_once() {
    let f = fixture().await;
    f.writer
        .break_channel(TARGET, UpstreamErrorKind::ChannelPrivate);

    f.listener
        .on_new_message(text_message(SOURCE_CHAT, 31, TOPIC, "into the void"))
        .await;
    f.listener
        .on_new_message(text_message(SOURCE_CHAT, 32, TOPIC, "still down"))
        .await;

    let banned = f.store.list_banned_channels().await.unwrap();
    assert_eq!(banned.len(), 1);
    assert_eq!(banned[0].channel_chat_id, TARGET);

    // The second failure deduplicated against the open job.
    let open: Vec<_> = f
        .store
        .list_recovery_queue()
        .await
        .unwrap()
        .into_iter()
        .filter(|job| job.status == JobStatus::Pending)
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].old_channel_chat_id, TARGET);
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_keeps_subscription_alive() {
    let f = fixture().await;
    // Force the copy path into a plain upstream error (not an unavailability).
    f.writer.fail_forwards_to(TARGET);
    f.writer.schedule_flood("send_message", 0);
    f.writer.schedule_flood("send_message", 0);

    // Swallowed: no ban, no queue entry, no panic.
    f.listener
        .on_new_message(text_message(SOURCE_CHAT, 31, TOPIC, "flaky"))
        .await;
    assert!(f.store.list_banned_channels().await.unwrap().is_empty());
    assert!(f.store.list_recovery_queue().await.unwrap().is_empty());
}
