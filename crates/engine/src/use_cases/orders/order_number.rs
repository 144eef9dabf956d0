//! Order number reservation.
//!
//! Numbers are reserved before the conversion transaction opens so the
//! collision-retry loop never holds the transaction. The unique constraint
//! on `Order.number` backstops the check under a race; the loser's insert
//! fails and rolls its transaction back.

use chrono::Datelike;
use std::sync::Arc;

use crate::infrastructure::ports::{ClockPort, OrderRepo, RandomPort, RepoError};

const MAX_ATTEMPTS: u32 = 10;

pub struct OrderNumberGenerator {
    orders: Arc<dyn OrderRepo>,
    random: Arc<dyn RandomPort>,
    clock: Arc<dyn ClockPort>,
}

impl OrderNumberGenerator {
    pub fn new(
        orders: Arc<dyn OrderRepo>,
        random: Arc<dyn RandomPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            orders,
            random,
            clock,
        }
    }

    /// Reserve a number of the form `{prefix}-{year}-{6 digits}`.
    pub async fn reserve(&self, prefix: &str) -> Result<String, RepoError> {
        let year = self.clock.now().year();
        for attempt in 0..MAX_ATTEMPTS {
            let n = self.random.gen_range(0, 999_999);
            let candidate = format!("{prefix}-{year}-{n:06}");
            if !self.orders.number_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!(candidate, attempt, "order number collision; retrying");
        }
        Err(RepoError::constraint(format!(
            "could not reserve a unique order number after {MAX_ATTEMPTS} attempts"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::{MockOrderRepo, MockRandomPort};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn formats_prefix_year_and_padded_number() {
        let mut orders = MockOrderRepo::new();
        orders.expect_number_exists().returning(|_| Ok(false));
        let mut random = MockRandomPort::new();
        random.expect_gen_range().returning(|_, _| 42);

        let generator = OrderNumberGenerator::new(Arc::new(orders), Arc::new(random), clock());
        let number = generator.reserve("SO").await.unwrap();
        assert_eq!(number, "SO-2025-000042");
    }

    #[tokio::test]
    async fn retries_until_a_free_number_is_found() {
        let mut orders = MockOrderRepo::new();
        orders
            .expect_number_exists()
            .returning(|number| Ok(number.ends_with("000001")));
        let mut random = MockRandomPort::new();
        let counter = AtomicU32::new(1);
        random
            .expect_gen_range()
            .returning(move |_, _| counter.fetch_add(1, Ordering::SeqCst));

        let generator = OrderNumberGenerator::new(Arc::new(orders), Arc::new(random), clock());
        let number = generator.reserve("SO").await.unwrap();
        assert_eq!(number, "SO-2025-000002");
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let mut orders = MockOrderRepo::new();
        orders.expect_number_exists().returning(|_| Ok(true));
        let mut random = MockRandomPort::new();
        random.expect_gen_range().returning(|_, _| 7);

        let generator = OrderNumberGenerator::new(Arc::new(orders), Arc::new(random), clock());
        assert!(generator.reserve("SO").await.is_err());
    }
}
