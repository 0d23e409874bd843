//! Log fan-out
//!
//! Any number of [`LogReader`]s can consume the same log, each at its own
//! position. A reader drives exactly one [`Observer`] with every record in log
//! order; readers never coordinate with each other or with the writer.

use crate::log::{LogCursor, LogError, LogRecord, ReadFrom, SequencedLog};
use async_trait::async_trait;
use tracing::{debug, info, info_span, Instrument};

/// Consumer of log records.
#[async_trait]
pub trait Observer<T>: Send {
    async fn on_record(&mut self, record: &T, offset: u64);
}

/// A named cursor bound to one log.
pub struct LogReader<T> {
    name: String,
    cursor: LogCursor<T>,
}

impl<T: LogRecord> LogReader<T> {
    /// Position a reader on `log`. The start point is fixed here, so tail mode
    /// covers everything appended after this call returns.
    pub fn new(name: impl Into<String>, log: &dyn SequencedLog<T>, from: ReadFrom) -> Self {
        Self {
            name: name.into(),
            cursor: log.read(from),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Deliver records to `observer` until the log fails.
    pub async fn run<O: Observer<T>>(mut self, mut observer: O) -> Result<(), LogError> {
        let span = info_span!("log_reader", reader = %self.name);
        async move {
            info!(start = self.cursor.position(), "Log reader started");
            loop {
                let (record, offset) = self.cursor.next().await?;
                debug!(offset, kind = record.kind(), "Delivering record");
                observer.on_record(&record, offset).await;
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use types::events::{LogEvent, OpenLog};
    use types::ids::{OrderId, ProductId};
    use types::numeric::{Price, Quantity};
    use types::order::Side;

    fn open(sequence: u64) -> LogEvent {
        LogEvent::Open(OpenLog {
            sequence,
            product_id: ProductId::new("BTC-USDT"),
            order_id: OrderId::new(sequence),
            side: Side::Sell,
            price: Price::from_u64(10),
            remaining_size: Quantity::from_u64(1),
            time: 0,
        })
    }

    struct Forward(mpsc::UnboundedSender<(u64, u64)>);

    #[async_trait]
    impl Observer<LogEvent> for Forward {
        async fn on_record(&mut self, record: &LogEvent, offset: u64) {
            let _ = self.0.send((record.sequence(), offset));
        }
    }

    /// Observer that never returns, to show other readers are unaffected.
    struct Stuck;

    #[async_trait]
    impl Observer<LogEvent> for Stuck {
        async fn on_record(&mut self, _record: &LogEvent, _offset: u64) {
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn test_readers_at_independent_offsets() {
        let log: Arc<MemoryLog<LogEvent>> = Arc::new(MemoryLog::new());
        for seq in 1..=3 {
            log.append(open(seq)).await.unwrap();
        }

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let reader_a = LogReader::new("a", log.as_ref(), ReadFrom::START);
        let reader_b = LogReader::new("b", log.as_ref(), ReadFrom::Offset(2));
        let stuck = LogReader::new("stuck", log.as_ref(), ReadFrom::START);
        tokio::spawn(reader_a.run(Forward(tx_a)));
        tokio::spawn(reader_b.run(Forward(tx_b)));
        tokio::spawn(stuck.run(Stuck));

        for seq in 4..=6 {
            log.append(open(seq)).await.unwrap();
        }

        let mut seen_a = Vec::new();
        while seen_a.len() < 6 {
            let item = tokio::time::timeout(Duration::from_secs(1), rx_a.recv()).await.unwrap();
            seen_a.push(item.unwrap());
        }
        let mut seen_b = Vec::new();
        while seen_b.len() < 4 {
            let item = tokio::time::timeout(Duration::from_secs(1), rx_b.recv()).await.unwrap();
            seen_b.push(item.unwrap());
        }

        assert_eq!(seen_a, (1..=6).map(|s| (s, s - 1)).collect::<Vec<_>>());
        assert_eq!(seen_b, (3..=6).map(|s| (s, s - 1)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_tail_reader_only_sees_new_records() {
        let log: Arc<MemoryLog<LogEvent>> = Arc::new(MemoryLog::new());
        log.append(open(1)).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let reader = LogReader::new("tail", log.as_ref(), ReadFrom::Tail);
        assert_eq!(reader.position(), 1);
        tokio::spawn(reader.run(Forward(tx)));

        log.append(open(2)).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(first, Some((2, 1)));
    }
}
