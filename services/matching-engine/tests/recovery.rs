//! Restart tests for the matching engine
//!
//! A run that checkpoints and restarts halfway must leave the same output log
//! and book as one uninterrupted run, including when the process died after
//! appending events but before the next snapshot.

use std::sync::Arc;

use matching_engine::{EngineConfig, EngineError, EnginePhase, MatchingEngine};
use persistence::{
    FileLog, FileSnapshotStore, MemoryLog, MemorySnapshotStore, ReadFrom, SequencedLog,
    SnapshotStore,
};
use tempfile::TempDir;
use types::events::LogEvent;
use types::ids::{OrderId, ProductId};
use types::numeric::{Price, Quantity};
use types::order::{CancelOrder, Command, Order, Side};

fn product() -> ProductId {
    ProductId::new("BTC-USDT")
}

fn limit(id: u64, side: Side, price: u64, size: u64) -> Command {
    Command::Place(Order::limit(
        OrderId::new(id),
        product(),
        side,
        Price::from_u64(price),
        Quantity::from_u64(size),
        1_700_000_000_000_000_000 + id as i64,
    ))
}

fn market(id: u64, side: Side, size: u64) -> Command {
    Command::Place(Order::market(
        OrderId::new(id),
        product(),
        side,
        Quantity::from_u64(size),
        1_700_000_000_000_000_000 + id as i64,
    ))
}

fn cancel(id: u64, at: u64) -> Command {
    Command::Cancel(CancelOrder {
        order_id: OrderId::new(id),
        product_id: product(),
        time: 1_700_000_000_000_000_000 + at as i64,
    })
}

/// Ten commands with resting orders, partial fills, a cancel and a market sweep
fn commands() -> Vec<Command> {
    vec![
        limit(1, Side::Sell, 101, 5),
        limit(2, Side::Sell, 102, 3),
        limit(3, Side::Buy, 99, 4),
        limit(4, Side::Buy, 101, 2),
        cancel(3, 5),
        limit(6, Side::Buy, 100, 1),
        market(7, Side::Buy, 4),
        limit(8, Side::Sell, 100, 2),
        cancel(2, 9),
        limit(10, Side::Buy, 105, 1),
    ]
}

fn engine(
    input: Arc<dyn SequencedLog<Command>>,
    output: Arc<dyn SequencedLog<LogEvent>>,
    snapshots: Arc<dyn SnapshotStore>,
) -> MatchingEngine {
    let config = EngineConfig {
        checkpoint_every_commands: 0,
        checkpoint_interval: None,
    };
    MatchingEngine::new(product(), input, output, snapshots, config)
}

fn read_all(log: &dyn SequencedLog<LogEvent>) -> Vec<LogEvent> {
    let mut cursor = log.read(ReadFrom::START);
    std::iter::from_fn(|| cursor.try_next().map(|(event, _)| event)).collect()
}

async fn fill_input(input: &dyn SequencedLog<Command>) {
    for command in commands() {
        input.append(command).await.unwrap();
    }
}

/// Process input offsets `range` in order.
async fn process_range(engine: &mut MatchingEngine, range: std::ops::Range<usize>) {
    let all = commands();
    for offset in range {
        engine.process(&all[offset], offset as u64).await.unwrap();
    }
}

/// Output log and final book of an uninterrupted run
async fn reference_run() -> (Vec<LogEvent>, Vec<u8>) {
    let input: Arc<MemoryLog<Command>> = Arc::new(MemoryLog::new());
    let output: Arc<MemoryLog<LogEvent>> = Arc::new(MemoryLog::new());
    fill_input(input.as_ref()).await;

    let mut engine = engine(input, output.clone(), Arc::new(MemorySnapshotStore::new()));
    engine.recover().await.unwrap();
    process_range(&mut engine, 0..10).await;
    (read_all(output.as_ref()), engine.book().to_bytes().unwrap())
}

fn assert_gap_free(events: &[LogEvent]) {
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence(), i as u64 + 1);
    }
}

#[tokio::test]
async fn test_restart_from_checkpoint_matches_uninterrupted_run() {
    let (expected, expected_book) = reference_run().await;
    assert_gap_free(&expected);

    let input: Arc<MemoryLog<Command>> = Arc::new(MemoryLog::new());
    let output: Arc<MemoryLog<LogEvent>> = Arc::new(MemoryLog::new());
    let snapshots = Arc::new(MemorySnapshotStore::new());
    fill_input(input.as_ref()).await;

    let mut first = engine(input.clone(), output.clone(), snapshots.clone());
    first.recover().await.unwrap();
    process_range(&mut first, 0..5).await;
    first.checkpoint().await.unwrap();
    drop(first);

    let mut second = engine(input, output.clone(), snapshots);
    let report = second.recover().await.unwrap();
    assert!(report.from_snapshot);
    assert_eq!(report.resume_offset, 5);
    assert_eq!(report.snapshot_sequence, report.committed_sequence);
    process_range(&mut second, 5..10).await;

    assert_eq!(read_all(output.as_ref()), expected);
    assert_eq!(second.book().to_bytes().unwrap(), expected_book);
}

#[tokio::test]
async fn test_crash_after_append_does_not_duplicate_events() {
    let (expected, expected_book) = reference_run().await;

    let input: Arc<MemoryLog<Command>> = Arc::new(MemoryLog::new());
    let output: Arc<MemoryLog<LogEvent>> = Arc::new(MemoryLog::new());
    let snapshots = Arc::new(MemorySnapshotStore::new());
    fill_input(input.as_ref()).await;

    let mut first = engine(input.clone(), output.clone(), snapshots.clone());
    first.recover().await.unwrap();
    process_range(&mut first, 0..5).await;
    first.checkpoint().await.unwrap();
    // Events for offsets 5 and 6 reach the output, the snapshot never does.
    process_range(&mut first, 5..7).await;
    drop(first);

    let mut second = engine(input, output.clone(), snapshots);
    let report = second.recover().await.unwrap();
    assert_eq!(report.resume_offset, 5);
    assert!(report.committed_sequence > report.snapshot_sequence);

    let replayed = second.process(&commands()[5], 5).await.unwrap();
    assert!(!replayed.is_empty());
    process_range(&mut second, 6..10).await;

    let actual = read_all(output.as_ref());
    assert_gap_free(&actual);
    assert_eq!(actual, expected);
    assert_eq!(second.book().to_bytes().unwrap(), expected_book);
}

#[tokio::test]
async fn test_file_backed_restart_matches_uninterrupted_run() {
    let (expected, _) = reference_run().await;
    let tmp = TempDir::new().unwrap();
    let input_dir = tmp.path().join("input");
    let output_dir = tmp.path().join("output");
    let snapshot_dir = tmp.path().join("snapshots");

    let committed_before = {
        let input: Arc<FileLog<Command>> = Arc::new(FileLog::open_dir(&input_dir).unwrap());
        fill_input(input.as_ref()).await;
        let output: Arc<FileLog<LogEvent>> = Arc::new(FileLog::open_dir(&output_dir).unwrap());
        let snapshots = Arc::new(FileSnapshotStore::new(&snapshot_dir, true));

        let mut first = engine(input.clone(), output.clone(), snapshots);
        first.recover().await.unwrap();
        process_range(&mut first, 0..4).await;
        first.checkpoint().await.unwrap();
        process_range(&mut first, 4..6).await;
        input.sync().unwrap();
        output.sync().unwrap();
        output.len()
    };

    let input: Arc<FileLog<Command>> = Arc::new(FileLog::open_dir(&input_dir).unwrap());
    let output: Arc<FileLog<LogEvent>> = Arc::new(FileLog::open_dir(&output_dir).unwrap());
    assert_eq!(input.len(), 10);
    assert_eq!(output.len(), committed_before);

    let snapshots = Arc::new(FileSnapshotStore::new(&snapshot_dir, true));
    let handle = engine(input, output.clone(), snapshots).spawn();
    assert!(handle.wait_for_phase(EnginePhase::Live).await);
    handle.abort();

    assert_eq!(read_all(output.as_ref()), expected);
}

#[tokio::test]
async fn test_truncated_output_log_fails_recovery() {
    let input: Arc<MemoryLog<Command>> = Arc::new(MemoryLog::new());
    let output: Arc<MemoryLog<LogEvent>> = Arc::new(MemoryLog::new());
    let snapshots = Arc::new(MemorySnapshotStore::new());
    fill_input(input.as_ref()).await;

    let mut first = engine(input.clone(), output, snapshots.clone());
    first.recover().await.unwrap();
    process_range(&mut first, 0..3).await;
    first.checkpoint().await.unwrap();

    let handle = engine(input, Arc::new(MemoryLog::<LogEvent>::new()), snapshots).spawn();
    let result = handle.join().await.unwrap();
    assert!(matches!(result, Err(EngineError::LogBehindSnapshot { .. })));
}

#[tokio::test]
async fn test_output_ahead_of_input_stops_instead_of_going_live() {
    let output: Arc<MemoryLog<LogEvent>> = Arc::new(MemoryLog::new());
    let snapshots = Arc::new(MemorySnapshotStore::new());
    {
        let input: Arc<MemoryLog<Command>> = Arc::new(MemoryLog::new());
        input.append(limit(1, Side::Sell, 10, 1)).await.unwrap();
        input.append(limit(2, Side::Sell, 11, 1)).await.unwrap();
        let mut first = engine(input, output.clone(), snapshots.clone());
        first.recover().await.unwrap();
        first.process(&limit(1, Side::Sell, 10, 1), 0).await.unwrap();
        first.process(&limit(2, Side::Sell, 11, 1), 1).await.unwrap();
    }
    assert_eq!(output.len(), 2);

    // Same output log, but the input that produced it is gone.
    let input: Arc<MemoryLog<Command>> = Arc::new(MemoryLog::new());
    let handle = engine(input.clone(), output.clone(), snapshots).spawn();
    assert!(!handle.wait_for_phase(EnginePhase::Live).await);
    assert_eq!(handle.phase(), EnginePhase::Stopped);

    input.append(limit(3, Side::Buy, 10, 1)).await.unwrap();
    let result = handle.join().await.unwrap();
    assert!(matches!(
        result,
        Err(EngineError::InputBehindOutput { committed: 2, replayed: 0, .. })
    ));
    assert_eq!(output.len(), 2);
}

#[tokio::test]
async fn test_snapshot_past_end_of_input_fails_recovery() {
    let input: Arc<MemoryLog<Command>> = Arc::new(MemoryLog::new());
    let output: Arc<MemoryLog<LogEvent>> = Arc::new(MemoryLog::new());
    let snapshots = Arc::new(MemorySnapshotStore::new());
    fill_input(input.as_ref()).await;

    let mut first = engine(input, output.clone(), snapshots.clone());
    first.recover().await.unwrap();
    process_range(&mut first, 0..3).await;
    first.checkpoint().await.unwrap();

    let short_input: Arc<MemoryLog<Command>> = Arc::new(MemoryLog::new());
    short_input.append(commands()[0].clone()).await.unwrap();
    let mut restarted = engine(short_input, output, snapshots);
    assert!(matches!(
        restarted.recover().await,
        Err(EngineError::InputBehindSnapshot { resume_offset: 3, input_len: 1, .. })
    ));
}
