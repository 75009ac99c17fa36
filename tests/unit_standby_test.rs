// tests/unit_standby_test.rs

mod common;

use common::{MemoryTransport, broadcast_peer, gateway_with, supergroup_peer, temp_store};
use std::sync::Arc;
use topicmirror::core::standby::StandbyPool;
use topicmirror::core::store::Store;
use topicmirror::core::upstream::UpstreamErrorKind;
use topicmirror::core::upstream::transport::MemberUpdate;

fn member_update(update_id: i64, chat_id: i64, title: &str, status: &str) -> MemberUpdate {
    MemberUpdate {
        update_id,
        chat_id,
        chat_kind: "channel".to_string(),
        title: title.to_string(),
        new_status: status.to_string(),
    }
}

struct Fixture {
    store: Store,
    _dir: tempfile::TempDir,
    reader: Arc<MemoryTransport>,
    writer: Arc<MemoryTransport>,
    pool: StandbyPool,
}

async fn fixture() -> Fixture {
    let (store, dir) = temp_store().await;
    let reader = MemoryTransport::new();
    let writer = MemoryTransport::new();
    let gateway = gateway_with(reader.clone(), writer.clone());
    let pool = StandbyPool::new(store.clone(), gateway);
    Fixture {
        store,
        _dir: dir,
        reader,
        writer,
        pool,
    }
}

#[tokio::test]
async fn test_first_sync_fast_forwards_without_replay() {
    let f = fixture().await;
    f.writer
        .push_member_update(member_update(5, -900, "old grant", "administrator"));
    f.writer
        .push_member_update(member_update(6, -901, "old grant 2", "administrator"));

    let report = f.pool.sync_member_updates().await.unwrap();
    assert!(report.bootstrap);
    assert_eq!(report.tracked_channels, 0);

    // Historical admin grants were not replayed into the pool.
    assert!(f.store.list_standby_channels().await.unwrap().is_empty());
    assert_eq!(
        f.store.get_setting("bot_updates_offset").await.unwrap().as_deref(),
        Some("7")
    );
}

#[tokio::test]
async fn test_admin_grant_admits_and_loss_removes() {
    let f = fixture().await;
    f.store.set_setting("bot_updates_offset", "10").await.unwrap();

    f.writer
        .push_member_update(member_update(10, -910, "Pool A", "administrator"));
    let report = f.pool.sync_member_updates().await.unwrap();
    assert_eq!(report.received, 1);
    assert_eq!(report.tracked_channels, 1);

    let standby = f.store.list_standby_channels().await.unwrap();
    assert_eq!(standby.len(), 1);
    assert_eq!(standby[0].chat_id, -910);
    assert_eq!(standby[0].title, "Pool A");

    // Losing the grant removes the unbound channel.
    f.writer
        .push_member_update(member_update(11, -910, "Pool A", "kicked"));
    f.pool.sync_member_updates().await.unwrap();
    assert!(f.store.get_channel(-910).await.unwrap().is_none());
    assert_eq!(
        f.store.get_setting("bot_updates_offset").await.unwrap().as_deref(),
        Some("12")
    );
}

#[tokio::test]
async fn test_bound_channel_reflects_in_use_on_events() {
    let f = fixture().await;
    f.store.set_setting("bot_updates_offset", "1").await.unwrap();

    let group = f.store.upsert_source_group(-1000, "sg").await.unwrap();
    f.store.upsert_binding(group.id, 3, -920).await.unwrap();

    // Admin grant on a bound channel lands as in-use, not standby.
    f.writer
        .push_member_update(member_update(1, -920, "Bound", "administrator"));
    f.pool.sync_member_updates().await.unwrap();
    let channel = f.store.get_channel(-920).await.unwrap().unwrap();
    assert!(channel.in_use);
    assert!(!channel.is_standby);

    // Losing admin on a bound channel keeps the row (history is still live).
    f.writer
        .push_member_update(member_update(2, -920, "Bound", "left"));
    f.pool.sync_member_updates().await.unwrap();
    let channel = f.store.get_channel(-920).await.unwrap().unwrap();
    assert!(channel.in_use);
    assert!(!channel.is_standby);
}

#[tokio::test]
async fn test_non_channel_updates_only_advance_the_cursor() {
    let f = fixture().await;
    f.store.set_setting("bot_updates_offset", "1").await.unwrap();

    f.writer.push_member_update(MemberUpdate {
        update_id: 1,
        chat_id: -50,
        chat_kind: "supergroup".to_string(),
        title: "not a channel".to_string(),
        new_status: "administrator".to_string(),
    });
    let report = f.pool.sync_member_updates().await.unwrap();
    assert_eq!(report.tracked_channels, 0);
    assert_eq!(
        f.store.get_setting("bot_updates_offset").await.unwrap().as_deref(),
        Some("2")
    );
}

#[tokio::test]
async fn test_batch_admission_checks_kind_and_rights() {
    let f = fixture().await;
    f.writer.add_peer(broadcast_peer(-930, "Good"));
    f.writer.set_admin(-930, true);
    f.writer.add_peer(broadcast_peer(-931, "No rights"));
    f.writer.add_peer(supergroup_peer(-932, "Not a channel"));

    let report = f
        .pool
        .admit_channels(&[
            "-930".to_string(),
            "-931".to_string(),
            "-932".to_string(),
            "-933".to_string(),
        ])
        .await
        .unwrap();

    assert_eq!(report.admitted, vec![-930]);
    assert_eq!(report.rejected.len(), 3);

    let standby = f.store.list_standby_channels().await.unwrap();
    assert_eq!(standby.len(), 1);
    assert_eq!(standby[0].chat_id, -930);
}

#[tokio::test]
async fn test_refresh_verifies_only_the_pool() {
    let f = fixture().await;

    f.store
        .upsert_channel(-940, "keeps rights", true, false, None)
        .await
        .unwrap();
    f.store
        .upsert_channel(-941, "lost rights", true, false, None)
        .await
        .unwrap();
    // A tracked-but-unavailable row must not be pulled back into the pool.
    f.store
        .upsert_channel(-942, "tracked only", false, false, None)
        .await
        .unwrap();

    f.writer.set_admin(-940, true);
    f.writer.set_admin(-941, false);

    let report = f.pool.refresh().await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.kept, 1);
    assert_eq!(report.removed, 1);

    let standby: Vec<i64> = f
        .store
        .list_standby_channels()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.chat_id)
        .collect();
    assert_eq!(standby, vec![-940]);
    assert!(f.store.get_channel(-941).await.unwrap().is_none());
    assert!(f.store.get_channel(-942).await.unwrap().is_some());
}

#[tokio::test]
async fn test_consume_is_fifo_and_atomic_flip() {
    let f = fixture().await;
    f.store
        .upsert_channel(-950, "first", true, false, None)
        .await
        .unwrap();
    f.store
        .upsert_channel(-951, "second", true, false, None)
        .await
        .unwrap();

    let first = f.store.consume_next_standby().await.unwrap().unwrap();
    assert_eq!(first.chat_id, -950);
    assert!(first.in_use);
    assert!(!first.is_standby);
    assert!(first.consumed_at.is_some());

    let second = f.store.consume_next_standby().await.unwrap().unwrap();
    assert_eq!(second.chat_id, -951);
    assert!(f.store.consume_next_standby().await.unwrap().is_none());

    let row = f.store.get_channel(-950).await.unwrap().unwrap();
    assert!(row.in_use && !row.is_standby);
}

#[tokio::test]
async fn test_access_check_requires_both_actors() {
    let f = fixture().await;
    f.writer.add_peer(broadcast_peer(-960, "target"));
    f.reader.add_peer(broadcast_peer(-960, "target"));
    f.writer.set_admin(-960, true);
    f.reader.set_admin(-960, true);

    assert!(f.pool.check_channel_access(-960).await.is_ok());

    // The reader losing access fails the check even though the writer is fine.
    f.reader.set_admin(-960, false);
    let error = f.pool.check_channel_access(-960).await.unwrap_err();
    assert!(error.is_channel_unavailable());
    assert!(error.to_string().contains("reader"));
    assert!(error.to_string().contains("not admin"));
}

#[tokio::test]
async fn test_access_check_maps_upstream_kinds() {
    let f = fixture().await;
    f.writer.add_peer(broadcast_peer(-961, "target"));
    f.writer.set_admin(-961, true);
    f.writer
        .break_channel(-961, UpstreamErrorKind::ChannelPrivate);

    let error = f.pool.check_channel_access(-961).await.unwrap_err();
    assert!(error.to_string().contains("inaccessible"));
}

#[tokio::test(start_paused = true)]
async fn test_access_check_absorbs_short_flood() {
    let f = fixture().await;
    for transport in [&f.writer, &f.reader] {
        transport.add_peer(broadcast_peer(-962, "target"));
        transport.set_admin(-962, true);
    }
    f.writer.schedule_flood("get_permissions", 5);

    assert!(f.pool.check_channel_access(-962).await.is_ok());
}

#[tokio::test]
async fn test_access_check_surfaces_long_flood() {
    let f = fixture().await;
    f.writer.add_peer(broadcast_peer(-963, "target"));
    f.writer.set_admin(-963, true);
    f.writer.schedule_flood("get_permissions", 30);

    assert!(f.pool.check_channel_access(-963).await.is_err());
}

#[tokio::test]
async fn test_rename_truncates_and_falls_back() {
    let f = fixture().await;

    f.pool.rename_channel(-970, "").await.unwrap();
    assert_eq!(f.writer.title_of(-970).as_deref(), Some("未命名话题"));

    let long_title = "x".repeat(300);
    f.pool.rename_channel(-970, &long_title).await.unwrap();
    assert_eq!(f.writer.title_of(-970).unwrap().chars().count(), 128);
}
