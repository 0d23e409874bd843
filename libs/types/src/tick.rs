//! OHLCV buckets

use crate::ids::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Granularities (minutes) candles are maintained for
pub const CANDLE_GRANULARITIES: [u32; 6] = [1, 5, 15, 60, 360, 1440];

/// One OHLCV bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub product_id: ProductId,
    /// Bucket width in minutes
    pub granularity: u32,
    /// Bucket start, Unix nanos
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Tick {
    /// Bucket width in nanoseconds
    pub fn width_nanos(granularity: u32) -> i64 {
        i64::from(granularity) * 60 * 1_000_000_000
    }

    /// Start of the bucket containing `time`
    pub fn bucket_start(time: i64, granularity: u32) -> i64 {
        let width = Self::width_nanos(granularity);
        time - time.rem_euclid(width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_start_alignment() {
        let minute = 60 * 1_000_000_000;
        assert_eq!(Tick::bucket_start(minute * 7 + 5, 5), minute * 5);
        assert_eq!(Tick::bucket_start(minute * 60, 60), minute * 60);
        assert_eq!(Tick::bucket_start(-1, 1), -minute);
    }
}
