//! Recovery point loading
//!
//! Restores the state an engine resumes from: the latest snapshot if there is
//! one, otherwise an empty book that has consumed nothing.

use persistence::SnapshotStore;
use tracing::info;
use types::ids::ProductId;

use crate::book::OrderBook;
use crate::error::EngineError;

/// State restored from the snapshot store
#[derive(Debug, Clone)]
pub struct RecoveryPoint {
    pub book: OrderBook,
    pub last_input_offset: Option<u64>,
    pub last_sequence: u64,
    pub last_trade_seq: u64,
    pub time: i64,
    pub from_snapshot: bool,
}

impl RecoveryPoint {
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            book: OrderBook::new(product_id),
            last_input_offset: None,
            last_sequence: 0,
            last_trade_seq: 0,
            time: 0,
            from_snapshot: false,
        }
    }

    pub async fn load(
        store: &dyn SnapshotStore,
        product_id: &ProductId,
    ) -> Result<Self, EngineError> {
        let Some(snapshot) = store.get_latest(product_id).await? else {
            info!(product = %product_id, "No snapshot found, starting from an empty book");
            return Ok(Self::empty(product_id.clone()));
        };

        let book = OrderBook::from_bytes(&snapshot.book_state)
            .map_err(|e| EngineError::BookState(e.to_string()))?;
        if book.product_id() != product_id {
            return Err(EngineError::BookState(format!(
                "snapshot book belongs to {}, expected {}",
                book.product_id(),
                product_id
            )));
        }

        info!(
            product = %product_id,
            sequence = snapshot.last_sequence,
            input_offset = ?snapshot.last_input_offset,
            resting_orders = book.order_count(),
            "Loaded snapshot"
        );

        Ok(Self {
            book,
            last_input_offset: snapshot.last_input_offset,
            last_sequence: snapshot.last_sequence,
            last_trade_seq: snapshot.last_trade_seq,
            time: snapshot.time,
            from_snapshot: true,
        })
    }

    /// First input offset not reflected in the book
    pub fn resume_offset(&self) -> u64 {
        self.last_input_offset.map_or(0, |offset| offset + 1)
    }
}

/// Summary of a completed recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub product_id: ProductId,
    pub from_snapshot: bool,
    /// Input offset reading resumes at
    pub resume_offset: u64,
    /// Last sequence the restored book accounts for
    pub snapshot_sequence: u64,
    /// Last sequence already present in the output log
    pub committed_sequence: u64,
    pub resting_orders: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::{MemorySnapshotStore, Snapshot};
    use types::ids::OrderId;
    use types::numeric::{Price, Quantity};
    use types::order::{Command, Order, Side};

    #[tokio::test]
    async fn test_missing_snapshot_is_empty_point() {
        let store = MemorySnapshotStore::new();
        let point = RecoveryPoint::load(&store, &ProductId::new("BTC-USDT")).await.unwrap();
        assert!(!point.from_snapshot);
        assert_eq!(point.resume_offset(), 0);
        assert_eq!(point.last_sequence, 0);
        assert_eq!(point.book.order_count(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_restores_book() {
        let product = ProductId::new("BTC-USDT");
        let mut book = OrderBook::new(product.clone());
        book.apply(&Command::Place(Order::limit(
            OrderId::new(1),
            product.clone(),
            Side::Buy,
            Price::from_u64(10),
            Quantity::from_u64(1),
            0,
        )));

        let store = MemorySnapshotStore::new();
        store
            .put(&Snapshot::new(product.clone(), book.to_bytes().unwrap(), Some(4), 9, 2, 77))
            .await
            .unwrap();

        let point = RecoveryPoint::load(&store, &product).await.unwrap();
        assert!(point.from_snapshot);
        assert_eq!(point.book, book);
        assert_eq!(point.resume_offset(), 5);
        assert_eq!(point.last_sequence, 9);
        assert_eq!(point.last_trade_seq, 2);
    }

    #[tokio::test]
    async fn test_garbage_book_state_is_error() {
        let product = ProductId::new("BTC-USDT");
        let store = MemorySnapshotStore::new();
        store
            .put(&Snapshot::new(product.clone(), vec![0xFF; 3], None, 0, 0, 0))
            .await
            .unwrap();

        let result = RecoveryPoint::load(&store, &product).await;
        assert!(matches!(result, Err(EngineError::BookState(_))));
    }
}
