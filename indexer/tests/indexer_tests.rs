//! Indexer behavior against the in-memory ledger and store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gatepass_core::environment::Clock;
use gatepass_core::ledger::{LedgerError, RawLog};
use gatepass_core::store::{CursorStore, EventRecordStore, PurchaseStore};
use gatepass_core::{
    BlockRange, EventKind, EventRecord, IndexerCursor, LedgerTicket, LedgerTicketState,
    PurchaseRecord, PurchaseStatus, TicketId,
};
use gatepass_indexer::{Indexer, IndexerConfig, IndexerError, StartBlock};
use gatepass_testing::{fixtures, test_clock, InMemoryLedger, InMemoryStore};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    ledger: Arc<InMemoryLedger>,
    store: Arc<InMemoryStore>,
    indexer: Indexer,
}

fn harness(config: IndexerConfig) -> Harness {
    let ledger = Arc::new(InMemoryLedger::new());
    let store = Arc::new(InMemoryStore::new());
    let indexer = Indexer::new(
        ledger.clone(),
        store.clone(),
        Arc::new(test_clock()),
        config,
    );
    Harness {
        ledger,
        store,
        indexer,
    }
}

fn restart(h: &Harness, config: IndexerConfig) -> Indexer {
    Indexer::new(
        h.ledger.clone(),
        h.store.clone(),
        Arc::new(test_clock()),
        config,
    )
}

async fn seed_cursor(store: &InMemoryStore, block: u64) {
    store
        .save(IndexerCursor::new(block, test_clock().now()))
        .await
        .unwrap();
}

async fn seed_purchase(store: &InMemoryStore, ticket: u64, tx: u64, buyer: u8) -> PurchaseRecord {
    let record = PurchaseRecord::new(
        TicketId::new(ticket),
        fixtures::tx(tx),
        fixtures::address(buyer),
        "Concert",
        test_clock().now(),
    );
    store.insert(record.clone()).await.unwrap();
    record
}

#[tokio::test]
async fn poll_at_head_is_noop() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 100).await;
    h.ledger.set_head(100);

    let report = h.indexer.poll().await.unwrap();

    assert_eq!(report.range, None);
    assert_eq!(report.batches, 0);
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 100);
    assert!(h.ledger.queries().is_empty());
}

#[tokio::test]
async fn purchase_event_corrects_ticket_id_found_by_tx_hash() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 100).await;
    let stored = seed_purchase(&h.store, 8, 0xabc, 1).await;
    h.ledger
        .push_event(fixtures::purchased(9, fixtures::tx(0xabc), 1, 105, 0));

    let report = h.indexer.poll().await.unwrap();

    assert_eq!(report.events.corrected, 1);
    let purchases = h.store.purchases();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].purchase_id, stored.purchase_id);
    assert_eq!(purchases[0].ticket_id, TicketId::new(9));
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 105);
}

#[tokio::test]
async fn self_healing_is_not_repeated_on_replay() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 100).await;
    seed_purchase(&h.store, 6, 0x7e, 1).await;
    h.ledger
        .push_event(fixtures::purchased(7, fixtures::tx(0x7e), 1, 120, 3));

    let first = h.indexer.poll().await.unwrap();
    assert_eq!(first.events.corrected, 1);

    let replay = h.indexer.rescan(101, 120).await.unwrap();
    assert_eq!(replay.corrected, 0);
    assert_eq!(replay.skipped, 1);

    let records = h.store.find_by_tx_hash(&fixtures::tx(0x7e)).await.unwrap();
    assert_eq!(records.unwrap().ticket_id, TicketId::new(7));
    assert_eq!(h.store.purchases().len(), 1);
}

#[tokio::test]
async fn replaying_a_range_leaves_store_unchanged() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 0).await;
    h.store
        .upsert(EventRecord::new(TicketId::new(3), "Concert"))
        .await
        .unwrap();
    seed_purchase(&h.store, 3, 0x33, 2).await;

    h.ledger
        .push_event(fixtures::event(EventKind::Created, 3, fixtures::tx(0x30), 9, 10, 0));
    h.ledger
        .push_event(fixtures::purchased(3, fixtures::tx(0x33), 2, 11, 0));
    h.ledger
        .push_event(fixtures::event(EventKind::Downloaded, 3, fixtures::tx(0x34), 2, 12, 0));

    let first = h.indexer.poll().await.unwrap();
    assert_eq!(first.events.applied, 2);
    let purchases = h.store.purchases();
    let listing = h.store.listing(TicketId::new(3));
    let cursor = h.store.cursor();

    let replay = h.indexer.rescan(1, 12).await.unwrap();
    assert_eq!(replay.applied, 0);
    assert_eq!(replay.skipped, 3);

    assert_eq!(h.store.purchases(), purchases);
    assert_eq!(h.store.listing(TicketId::new(3)), listing);
    assert_eq!(h.store.cursor(), cursor);
    assert_eq!(purchases[0].status, PurchaseStatus::Downloaded);
    assert_eq!(listing.unwrap().confirmed_block, Some(10));
}

#[tokio::test]
async fn events_apply_in_ledger_order_across_kinds() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 0).await;
    seed_purchase(&h.store, 4, 0x40, 1).await;

    // Refund logged after the download in the same block
    h.ledger
        .push_event(fixtures::event(EventKind::Refunded, 4, fixtures::tx(0x42), 1, 20, 5));
    h.ledger
        .push_event(fixtures::event(EventKind::Downloaded, 4, fixtures::tx(0x41), 1, 20, 2));

    let report = h.indexer.poll().await.unwrap();

    assert_eq!(report.events.applied, 2);
    assert_eq!(h.store.purchases()[0].status, PurchaseStatus::Refunded);
}

#[tokio::test]
async fn older_event_never_regresses_status() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 0).await;
    let record = seed_purchase(&h.store, 5, 0x50, 1).await;
    h.store
        .update_status(
            record.purchase_id,
            PurchaseStatus::Purchased,
            PurchaseStatus::Refunded,
            test_clock().now(),
        )
        .await
        .unwrap();
    h.ledger
        .push_event(fixtures::event(EventKind::Downloaded, 5, fixtures::tx(0x51), 1, 30, 0));

    let report = h.indexer.poll().await.unwrap();

    assert_eq!(report.events.skipped, 1);
    assert_eq!(h.store.purchases()[0].status, PurchaseStatus::Refunded);
}

#[tokio::test]
async fn concurrent_rescans_never_regress_status() {
    let h = harness(IndexerConfig::default());
    seed_purchase(&h.store, 5, 0x50, 1).await;
    h.ledger
        .push_event(fixtures::event(EventKind::Downloaded, 5, fixtures::tx(0x51), 1, 20, 0));
    h.ledger
        .push_event(fixtures::event(EventKind::Refunded, 5, fixtures::tx(0x52), 1, 30, 0));
    h.store
        .delay_status_writes_to(PurchaseStatus::Downloaded, Duration::from_millis(50));

    let (download, refund) = tokio::join!(h.indexer.rescan(20, 20), h.indexer.rescan(30, 30));

    let (download, refund) = (download.unwrap(), refund.unwrap());
    assert_eq!(download.failed + refund.failed, 0);
    assert_eq!(refund.applied, 1);
    assert_eq!(h.store.purchases()[0].status, PurchaseStatus::Refunded);
}

#[tokio::test]
async fn rescan_racing_refresh_keeps_the_newer_status() {
    let h = harness(IndexerConfig::default());
    seed_purchase(&h.store, 5, 0x50, 1).await;
    h.ledger
        .push_event(fixtures::event(EventKind::Downloaded, 5, fixtures::tx(0x51), 1, 20, 0));
    h.ledger.set_ticket(LedgerTicket {
        ticket_id: TicketId::new(5),
        owner: fixtures::address(1),
        price: 1_000,
        state: LedgerTicketState::Refunded,
    });
    h.store
        .delay_status_writes_to(PurchaseStatus::Downloaded, Duration::from_millis(50));

    let (rescan, refresh) = tokio::join!(
        h.indexer.rescan(20, 20),
        h.indexer.refresh_ticket(TicketId::new(5))
    );

    rescan.unwrap();
    assert_eq!(refresh.unwrap(), 1);
    assert_eq!(h.store.purchases()[0].status, PurchaseStatus::Refunded);
}

#[tokio::test]
async fn failed_write_is_counted_and_the_rest_of_the_batch_lands() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 0).await;
    seed_purchase(&h.store, 5, 0x50, 1).await;
    seed_purchase(&h.store, 6, 0x60, 1).await;
    seed_purchase(&h.store, 7, 0x70, 1).await;
    h.ledger
        .push_event(fixtures::event(EventKind::Downloaded, 5, fixtures::tx(0x51), 1, 10, 0));
    h.ledger
        .push_event(fixtures::event(EventKind::Downloaded, 6, fixtures::tx(0x61), 1, 11, 0));
    h.ledger
        .push_event(fixtures::event(EventKind::Refunded, 7, fixtures::tx(0x71), 1, 12, 0));
    h.store.fail_purchase_writes_for(Some(TicketId::new(6)));

    let report = h.indexer.poll().await.unwrap();

    assert_eq!(report.events.failed, 1);
    assert_eq!(report.events.applied, 2);
    let status_of = |ticket| {
        h.store
            .purchases()
            .iter()
            .find(|p| p.ticket_id == TicketId::new(ticket))
            .map(|p| p.status)
            .unwrap()
    };
    assert_eq!(status_of(5), PurchaseStatus::Downloaded);
    assert_eq!(status_of(6), PurchaseStatus::Purchased);
    assert_eq!(status_of(7), PurchaseStatus::Refunded);
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 12);
}

#[tokio::test]
async fn unmatched_events_never_fabricate_records() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 0).await;
    h.ledger
        .push_event(fixtures::purchased(11, fixtures::tx(0x11), 1, 5, 0));
    h.ledger
        .push_event(fixtures::event(EventKind::Created, 11, fixtures::tx(0x10), 9, 4, 0));

    let report = h.indexer.poll().await.unwrap();

    assert_eq!(report.events.unmatched, 2);
    assert!(h.store.purchases().is_empty());
    assert!(h.store.listing(TicketId::new(11)).is_none());
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 5);
}

#[tokio::test]
async fn ledger_outage_leaves_cursor_untouched() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 100).await;
    seed_purchase(&h.store, 8, 0xabc, 1).await;
    h.ledger
        .push_event(fixtures::purchased(9, fixtures::tx(0xabc), 1, 200, 0));
    h.ledger.set_available(false);

    let result = h.indexer.poll().await;
    assert!(matches!(
        result,
        Err(IndexerError::Ledger(LedgerError::Unavailable(_)))
    ));
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 100);

    h.ledger.set_available(true);
    h.indexer.poll().await.unwrap();
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 200);
    assert_eq!(h.store.purchases()[0].ticket_id, TicketId::new(9));
}

#[tokio::test]
async fn failing_log_query_aborts_batch_before_any_write() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 100).await;
    seed_purchase(&h.store, 8, 0xabc, 1).await;
    h.ledger
        .push_event(fixtures::purchased(9, fixtures::tx(0xabc), 1, 150, 0));
    h.ledger.fail_logs_for(Some(EventKind::Refunded));

    assert!(h.indexer.poll().await.is_err());
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 100);
    assert_eq!(h.store.purchases()[0].ticket_id, TicketId::new(8));
}

#[tokio::test]
async fn malformed_log_is_skipped_and_cursor_advances() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 100).await;
    seed_purchase(&h.store, 8, 0xabc, 1).await;
    h.ledger.push_raw_log(
        EventKind::Purchased,
        RawLog {
            topics: vec!["0xdeadbeef".to_string()],
            data: "0x".to_string(),
            block_number: 140,
            log_index: 0,
            tx_hash: "0x99".to_string(),
            block_timestamp: None,
        },
    );
    h.ledger
        .push_event(fixtures::purchased(9, fixtures::tx(0xabc), 1, 141, 0));

    let report = h.indexer.poll().await.unwrap();

    assert_eq!(report.events.malformed, 1);
    assert_eq!(report.events.corrected, 1);
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 141);
}

#[tokio::test]
async fn large_ranges_are_split_into_batches() {
    let h = harness(IndexerConfig::default().with_batch_size(1000));
    seed_cursor(&h.store, 100).await;
    h.ledger.set_head(2600);

    let report = h.indexer.poll().await.unwrap();

    assert_eq!(report.range, BlockRange::new(101, 2600));
    assert_eq!(report.batches, 3);
    let ranges: Vec<_> = h
        .ledger
        .queries()
        .into_iter()
        .filter(|(kind, _)| *kind == EventKind::Purchased)
        .map(|(_, range)| (range.from, range.to))
        .collect();
    assert_eq!(ranges, vec![(101, 1100), (1101, 2100), (2101, 2600)]);
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 2600);
}

#[tokio::test]
async fn restart_resumes_from_persisted_cursor() {
    let config = IndexerConfig::default().with_start_block(StartBlock::Block(1));
    let h = harness(config.clone());
    h.ledger.set_head(50);
    h.indexer.poll().await.unwrap();
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 50);

    // Blocks produced while the indexer was down
    seed_purchase(&h.store, 8, 0xabc, 1).await;
    h.ledger
        .push_event(fixtures::purchased(9, fixtures::tx(0xabc), 1, 60, 0));

    let restarted = restart(&h, config);
    let report = restarted.poll().await.unwrap();

    assert_eq!(report.range, BlockRange::new(51, 60));
    assert_eq!(report.events.corrected, 1);
}

#[tokio::test]
async fn fresh_start_at_head_persists_cursor() {
    let h = harness(IndexerConfig::default().with_start_block(StartBlock::Head));
    h.ledger.set_head(500);

    let report = h.indexer.poll().await.unwrap();

    assert_eq!(report.range, BlockRange::new(500, 500));
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 500);
}

#[tokio::test]
async fn slow_ledger_times_out_without_advancing() {
    let config = IndexerConfig::default().with_rpc_timeout(Duration::from_millis(20));
    let h = harness(config);
    seed_cursor(&h.store, 10).await;
    h.ledger.set_head(20);
    h.ledger.set_delay(Some(Duration::from_millis(500)));

    let result = h.indexer.poll().await;

    assert!(matches!(
        result,
        Err(IndexerError::Ledger(LedgerError::Timeout(_)))
    ));
    assert_eq!(h.store.cursor().unwrap().last_processed_block, 10);
}

#[tokio::test]
async fn start_stop_lifecycle() {
    let config = IndexerConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_start_block(StartBlock::Block(1));
    let h = harness(config);
    h.ledger.set_head(40);
    h.ledger.set_available(false);

    // Unreachable ledger at startup is not fatal
    h.indexer.start().await.unwrap();
    assert!(matches!(
        h.indexer.start().await,
        Err(IndexerError::AlreadyRunning)
    ));
    assert!(h.indexer.status().await.running);

    h.ledger.set_available(true);
    let mut progress = h.indexer.progress();
    tokio::time::timeout(
        Duration::from_secs(5),
        progress.wait_for(|block| *block == Some(40)),
    )
    .await
    .expect("indexer should catch up")
    .unwrap();

    h.indexer.stop().await.unwrap();
    let status = h.indexer.status().await;
    assert!(!status.running);
    assert_eq!(status.last_processed_block, Some(40));
    assert_eq!(status.ledger_endpoint, "memory://ledger");
}

#[tokio::test]
async fn status_reports_persisted_cursor_before_first_poll() {
    let h = harness(IndexerConfig::default());
    seed_cursor(&h.store, 77).await;

    let status = h.indexer.status().await;

    assert!(!status.running);
    assert_eq!(status.last_processed_block, Some(77));
}

#[tokio::test]
async fn refresh_ticket_applies_ledger_state_to_owner_records() {
    let h = harness(IndexerConfig::default());
    let owned = seed_purchase(&h.store, 5, 0x55, 1).await;
    let stale = seed_purchase(&h.store, 5, 0x56, 2).await;
    h.ledger.set_ticket(LedgerTicket {
        ticket_id: TicketId::new(5),
        owner: fixtures::address(1),
        price: 1_000,
        state: LedgerTicketState::Refunded,
    });

    let updated = h.indexer.refresh_ticket(TicketId::new(5)).await.unwrap();

    assert_eq!(updated, 1);
    let purchases = h.store.purchases();
    let status_of = |id| {
        purchases
            .iter()
            .find(|p| p.purchase_id == id)
            .map(|p| p.status)
            .unwrap()
    };
    assert_eq!(status_of(owned.purchase_id), PurchaseStatus::Refunded);
    assert_eq!(status_of(stale.purchase_id), PurchaseStatus::Purchased);
    assert!(h.store.cursor().is_none());
}

#[tokio::test]
async fn refresh_unknown_ticket_is_noop() {
    let h = harness(IndexerConfig::default());
    assert_eq!(h.indexer.refresh_ticket(TicketId::new(404)).await.unwrap(), 0);
}

#[tokio::test]
async fn rescan_rejects_inverted_range() {
    let h = harness(IndexerConfig::default());
    assert!(matches!(
        h.indexer.rescan(10, 5).await,
        Err(IndexerError::InvalidRange { from: 10, to: 5 })
    ));
}
