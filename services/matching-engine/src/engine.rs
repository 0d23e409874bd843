//! Matching engine core
//!
//! One engine owns one product: it reads the product's input command log,
//! drives the order book, stamps sequence numbers and appends the results to
//! the product's output log, checkpointing to the snapshot store between
//! commands.
//!
//! Lifecycle: `Cold → Recovering → Live`, or `Stopped` after a fatal error.
//! During recovery the commands after the snapshot are replayed; events whose
//! sequence is already in the output log were committed before the restart
//! and are not appended again.

use std::sync::Arc;
use std::time::Duration;

use persistence::{
    CheckpointPolicy, LogCursor, ReadFrom, SequencedLog, Snapshot, SnapshotStore,
};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use types::events::LogEvent;
use types::ids::ProductId;
use types::order::Command;

use crate::book::OrderBook;
use crate::error::EngineError;
use crate::matching::Sequencer;
use crate::recovery::{RecoveryPoint, RecoveryReport};

/// Where an engine is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Cold,
    Recovering,
    Live,
    Stopped,
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Snapshot after this many commands (0 disables the count trigger)
    pub checkpoint_every_commands: u64,
    /// Snapshot when this much time passed with unsnapshotted commands
    pub checkpoint_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkpoint_every_commands: 1_000,
            checkpoint_interval: Some(Duration::from_secs(60)),
        }
    }
}

/// Matching engine for a single product
pub struct MatchingEngine {
    product_id: ProductId,
    book: OrderBook,
    sequencer: Sequencer,
    input: Arc<dyn SequencedLog<Command>>,
    output: Arc<dyn SequencedLog<LogEvent>>,
    snapshots: Arc<dyn SnapshotStore>,
    policy: CheckpointPolicy,
    last_input_offset: Option<u64>,
    last_command_time: i64,
    /// Highest sequence present in the output log
    committed_sequence: u64,
    phase: watch::Sender<EnginePhase>,
}

impl MatchingEngine {
    pub fn new(
        product_id: ProductId,
        input: Arc<dyn SequencedLog<Command>>,
        output: Arc<dyn SequencedLog<LogEvent>>,
        snapshots: Arc<dyn SnapshotStore>,
        config: EngineConfig,
    ) -> Self {
        let (phase, _) = watch::channel(EnginePhase::Cold);
        Self {
            book: OrderBook::new(product_id.clone()),
            product_id,
            sequencer: Sequencer::default(),
            input,
            output,
            snapshots,
            policy: CheckpointPolicy::new(
                config.checkpoint_every_commands,
                config.checkpoint_interval,
            ),
            last_input_offset: None,
            last_command_time: 0,
            committed_sequence: 0,
            phase,
        }
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn phase(&self) -> EnginePhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions
    pub fn subscribe_phase(&self) -> watch::Receiver<EnginePhase> {
        self.phase.subscribe()
    }

    /// Sequence of the last event produced
    pub fn last_sequence(&self) -> u64 {
        self.sequencer.last_sequence()
    }

    /// First input offset not yet consumed
    pub fn resume_offset(&self) -> u64 {
        self.last_input_offset.map_or(0, |offset| offset + 1)
    }

    fn set_phase(&self, phase: EnginePhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            info!(product = %self.product_id, from = ?previous, to = ?phase, "Engine phase changed");
        }
    }

    /// Restore the latest snapshot and line up with the output log.
    pub async fn recover(&mut self) -> Result<RecoveryReport, EngineError> {
        self.set_phase(EnginePhase::Recovering);

        let point = RecoveryPoint::load(self.snapshots.as_ref(), &self.product_id).await?;
        let committed = self.output.last().map_or(0, |(event, _)| event.sequence());
        if committed < point.last_sequence {
            return Err(EngineError::LogBehindSnapshot {
                product: self.product_id.clone(),
                snapshot: point.last_sequence,
                log: committed,
            });
        }
        let input_len = self.input.len();
        if point.resume_offset() > input_len {
            return Err(EngineError::InputBehindSnapshot {
                product: self.product_id.clone(),
                resume_offset: point.resume_offset(),
                input_len,
            });
        }

        let report = RecoveryReport {
            product_id: self.product_id.clone(),
            from_snapshot: point.from_snapshot,
            resume_offset: point.resume_offset(),
            snapshot_sequence: point.last_sequence,
            committed_sequence: committed,
            resting_orders: point.book.order_count(),
        };

        self.book = point.book;
        self.sequencer = Sequencer::new(point.last_sequence, point.last_trade_seq);
        self.last_input_offset = point.last_input_offset;
        self.last_command_time = point.time;
        self.committed_sequence = committed;

        info!(
            product = %self.product_id,
            resume_offset = report.resume_offset,
            snapshot_sequence = report.snapshot_sequence,
            committed_sequence = report.committed_sequence,
            "Recovery point restored"
        );
        Ok(report)
    }

    /// Apply one input command and commit its events.
    ///
    /// The consumed offset only advances after every event is in the output
    /// log. Returns the events the command produced, including re-derived
    /// ones that were already committed.
    pub async fn process(
        &mut self,
        command: &Command,
        offset: u64,
    ) -> Result<Vec<LogEvent>, EngineError> {
        if self.last_input_offset.is_some_and(|last| offset <= last) {
            warn!(product = %self.product_id, offset, "Input offset already consumed, skipping");
            return Ok(Vec::new());
        }

        let time = command.time();
        let book_events = self.book.apply(command);
        let mut emitted = Vec::with_capacity(book_events.len());

        for event in book_events {
            let event = self.sequencer.stamp(&self.product_id, event, time);
            if event.sequence() <= self.committed_sequence {
                debug!(sequence = event.sequence(), "Event committed before restart");
            } else {
                self.output
                    .append(event.clone())
                    .await
                    .map_err(EngineError::Output)?;
                self.committed_sequence = event.sequence();
            }
            emitted.push(event);
        }

        self.last_input_offset = Some(offset);
        self.last_command_time = time;
        self.policy.record_command();
        Ok(emitted)
    }

    /// Write the current book and progress to the snapshot store.
    pub async fn checkpoint(&mut self) -> Result<(), EngineError> {
        let state = self
            .book
            .to_bytes()
            .map_err(|e| EngineError::BookState(e.to_string()))?;
        let snapshot = Snapshot::new(
            self.product_id.clone(),
            state,
            self.last_input_offset,
            self.sequencer.last_sequence(),
            self.sequencer.last_trade_seq(),
            self.last_command_time,
        );
        self.snapshots.put(&snapshot).await?;
        self.policy.record_checkpoint();

        info!(
            product = %self.product_id,
            sequence = snapshot.last_sequence,
            input_offset = ?snapshot.last_input_offset,
            "Checkpoint written"
        );
        Ok(())
    }

    async fn checkpoint_or_warn(&mut self) {
        if let Err(err) = self.checkpoint().await {
            self.policy.defer();
            warn!(product = %self.product_id, error = %err, "Checkpoint failed, retrying on next trigger");
        }
    }

    /// Replay must have re-derived every committed event, otherwise new
    /// events would reuse committed sequences and never be appended.
    fn go_live(&self) -> Result<(), EngineError> {
        let replayed = self.sequencer.last_sequence();
        if self.committed_sequence > replayed {
            return Err(EngineError::InputBehindOutput {
                product: self.product_id.clone(),
                committed: self.committed_sequence,
                replayed,
            });
        }
        self.set_phase(EnginePhase::Live);
        Ok(())
    }

    /// Recover if needed, then consume the input log until a fatal error.
    pub async fn run(mut self) -> Result<(), EngineError> {
        let result = self.consume().await;
        if let Err(err) = &result {
            error!(product = %self.product_id, error = %err, "Matching engine stopped");
        }
        self.set_phase(EnginePhase::Stopped);
        result
    }

    async fn consume(&mut self) -> Result<(), EngineError> {
        if self.phase() == EnginePhase::Cold {
            self.recover().await?;
        }

        let mut cursor: LogCursor<Command> =
            self.input.read(ReadFrom::Offset(self.resume_offset()));

        loop {
            if self.phase() == EnginePhase::Recovering && cursor.is_caught_up() {
                self.go_live()?;
            }

            let deadline = self.policy.deadline();
            let next = tokio::select! {
                next = cursor.next() => next,
                _ = wait_until(deadline) => {
                    self.checkpoint_or_warn().await;
                    continue;
                }
            };

            let (command, offset) = next.map_err(EngineError::Input)?;
            self.process(&command, offset).await?;

            if self.policy.should_checkpoint() {
                self.checkpoint_or_warn().await;
            }
        }
    }

    /// Run on its own task.
    pub fn spawn(self) -> EngineHandle {
        let product_id = self.product_id.clone();
        let phase = self.subscribe_phase();
        let span = info_span!("matching_engine", product = %product_id);
        let task = tokio::spawn(self.run().instrument(span));
        EngineHandle {
            product_id,
            phase,
            task,
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// A running engine
pub struct EngineHandle {
    product_id: ProductId,
    phase: watch::Receiver<EnginePhase>,
    task: JoinHandle<Result<(), EngineError>>,
}

impl EngineHandle {
    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn phase(&self) -> EnginePhase {
        *self.phase.borrow()
    }

    /// Wait until the engine reaches `phase`; false if the engine went away first.
    pub async fn wait_for_phase(&self, phase: EnginePhase) -> bool {
        let mut watcher = self.phase.clone();
        let reached = watcher.wait_for(|current| *current == phase).await.is_ok();
        reached
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the engine task to end.
    pub async fn join(self) -> Result<Result<(), EngineError>, JoinError> {
        self.task.await
    }
}
