//! Projections on independent readers of one log.

use std::sync::Arc;
use std::time::Duration;

use market_data::{
    MarketCache, MatchProjection, OrderBookConfig, OrderBookProjection, PushMessage, Topic,
    TopicBus,
};
use persistence::{LogReader, MemoryLog, ReadFrom, SequencedLog};
use rust_decimal::Decimal;
use types::events::{LogEvent, MatchLog, OpenLog};
use types::ids::{OrderId, ProductId};
use types::numeric::{Price, Quantity};
use types::order::Side;

fn product() -> ProductId {
    ProductId::new("BTC-USDT")
}

fn open(sequence: u64, id: u64, price: u64) -> LogEvent {
    LogEvent::Open(OpenLog {
        sequence,
        product_id: product(),
        order_id: OrderId::new(id),
        side: Side::Sell,
        price: Price::from_u64(price),
        remaining_size: Quantity::from_u64(3),
        time: 0,
    })
}

fn trade(sequence: u64, maker: u64, price: u64) -> LogEvent {
    LogEvent::Match(MatchLog {
        sequence,
        trade_seq: sequence,
        product_id: product(),
        taker_order_id: OrderId::new(99),
        maker_order_id: OrderId::new(maker),
        side: Side::Buy,
        price: Price::from_u64(price),
        size: Quantity::from_u64(1),
        time: 0,
    })
}

#[tokio::test]
async fn test_tail_and_offset_readers_see_their_own_ranges() {
    let log: Arc<MemoryLog<LogEvent>> = Arc::new(MemoryLog::new());
    log.append(open(1, 1, 100)).await.unwrap();
    log.append(trade(2, 1, 100)).await.unwrap();

    let bus = Arc::new(TopicBus::new(64));
    let cache = Arc::new(MarketCache::new());
    let mut trades = bus.subscribe(&Topic::matches(&product()));
    let mut book = bus.subscribe(&Topic::order_book(&product()));

    let match_reader = LogReader::new("match", log.as_ref(), ReadFrom::Tail);
    let book_reader = LogReader::new("orderbook", log.as_ref(), ReadFrom::START);
    assert_eq!(match_reader.position(), 2);
    assert_eq!(book_reader.position(), 0);

    let config = OrderBookConfig {
        depth: 10,
        snapshot_every: 1_000,
    };
    let match_task = tokio::spawn(match_reader.run(MatchProjection::new(&product(), bus.clone())));
    let book_task = tokio::spawn(book_reader.run(OrderBookProjection::new(
        product(),
        bus.clone(),
        cache,
        config,
    )));

    log.append(trade(3, 1, 100)).await.unwrap();

    // The tail reader only sees the trade appended after it was created.
    let first = tokio::time::timeout(Duration::from_secs(1), trades.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first.as_ref(), PushMessage::Match(m) if m.sequence == 3));

    // The offset reader replays history: open, first fill, second fill.
    let mut sizes = Vec::new();
    for _ in 0..3 {
        let message = tokio::time::timeout(Duration::from_secs(1), book.recv())
            .await
            .unwrap()
            .unwrap();
        match message.as_ref() {
            PushMessage::Level2Update(update) => sizes.push(update.size),
            other => panic!("unexpected message {:?}", other),
        }
    }
    assert_eq!(sizes, vec![Decimal::from(3), Decimal::from(2), Decimal::from(1)]);

    match_task.abort();
    book_task.abort();
}
