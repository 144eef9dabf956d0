//! Quote-to-order conversion.
//!
//! Validates that a quote is convertible, then atomically creates the
//! order, its line items, promoted parts (with migrated assets and version
//! history) and migrated attachments/notes. The quote's
//! `converted_to_order_id` is taken with a storage-level compare-and-swap,
//! so two concurrent requests produce exactly one order and the loser gets
//! a typed "already converted" error.

use std::sync::Arc;

use quoteforge_domain::{
    ConversionStatus, DomainEvent, Order, OrderLineItem, Part, Quote, QuoteId, QuoteLineItem,
    QuotePart, QuoteStatus,
};

use crate::infrastructure::ports::{
    ClockPort, ConversionTxn, ConversionUowPort, EventBusPort, QuoteRepo, RepoError, SettingsRepo,
};
use crate::use_cases::migration::AssetMigrator;
use crate::use_cases::orders::order_number::OrderNumberGenerator;

/// Summary returned to the caller after a successful conversion.
#[derive(Debug, Clone)]
pub struct ConvertedQuote {
    pub order_id: quoteforge_domain::OrderId,
    pub order_number: String,
    pub part_count: u32,
    pub line_item_count: u32,
    pub attachment_count: u32,
    pub note_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertQuoteError {
    #[error("Quote not found: {0}")]
    QuoteNotFound(QuoteId),

    #[error("Quote in status {0} cannot be converted")]
    NotConvertible(QuoteStatus),

    /// Expected under concurrent submission: someone else already
    /// converted this quote. Not a bug, not a retryable failure.
    #[error("Quote has already been converted to an order")]
    AlreadyConverted,

    #[error("Quote has no line items")]
    NoLineItems,

    #[error("Line item '{description}': {reason}")]
    InvalidLineItem { description: String, reason: String },

    #[error("Quote total must be greater than zero")]
    ZeroTotal,

    #[error("{blocking} part(s) still have conversions outstanding")]
    ConversionsOutstanding { blocking: usize },

    #[error("Quote part '{name}': {reason}")]
    InvalidPart { name: String, reason: String },

    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct ConvertQuoteToOrder {
    quotes: Arc<dyn QuoteRepo>,
    uow: Arc<dyn ConversionUowPort>,
    migrator: Arc<AssetMigrator>,
    numbers: Arc<OrderNumberGenerator>,
    settings: Arc<dyn SettingsRepo>,
    events: Arc<dyn EventBusPort>,
    clock: Arc<dyn ClockPort>,
}

impl ConvertQuoteToOrder {
    pub fn new(
        quotes: Arc<dyn QuoteRepo>,
        uow: Arc<dyn ConversionUowPort>,
        migrator: Arc<AssetMigrator>,
        numbers: Arc<OrderNumberGenerator>,
        settings: Arc<dyn SettingsRepo>,
        events: Arc<dyn EventBusPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            quotes,
            uow,
            migrator,
            numbers,
            settings,
            events,
            clock,
        }
    }

    pub async fn execute(&self, quote_id: QuoteId) -> Result<ConvertedQuote, ConvertQuoteError> {
        let quote = self
            .quotes
            .get(quote_id)
            .await?
            .ok_or(ConvertQuoteError::QuoteNotFound(quote_id))?;
        let line_items = self.quotes.list_line_items(quote_id).await?;
        let parts = self.quotes.list_parts(quote_id).await?;

        // All preconditions checked before any mutation.
        validate(&quote, &line_items, &parts)?;

        // Number reservation has its own collision-retry loop and must not
        // hold the transaction open.
        let prefix = match self.settings.get().await? {
            Some(settings) => settings.order_number_prefix,
            None => crate::infrastructure::app_settings::AppSettings::default().order_number_prefix,
        };
        let number = self.numbers.reserve(&prefix).await?;

        // Total is re-summed server-side; a client-supplied total is never
        // trusted.
        let total: i64 = line_items.iter().map(QuoteLineItem::total_cents).sum();
        let now = self.clock.now();
        let order = Order::new(number.clone(), quote.customer_id(), Some(quote_id), total, now);

        let mut txn = self.uow.begin().await?;
        let result = self
            .run_in_txn(txn.as_mut(), &quote, &order, &line_items, &parts)
            .await;

        let summary = match result {
            Ok(summary) => {
                txn.commit().await?;
                summary
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!(quote_id = %quote_id, error = %rollback_err, "rollback failed");
                }
                return Err(e);
            }
        };

        // Post-commit, best-effort audit events.
        self.publish(DomainEvent::OrderCreated {
            order_id: order.id(),
            order_number: number.clone(),
            total_cents: total,
        })
        .await;
        self.publish(DomainEvent::QuoteConverted {
            quote_id,
            order_id: order.id(),
            part_count: summary.part_count,
        })
        .await;

        tracing::info!(
            quote_id = %quote_id,
            order_id = %order.id(),
            order_number = %number,
            parts = summary.part_count,
            "quote converted to order"
        );
        Ok(summary)
    }

    async fn run_in_txn(
        &self,
        txn: &mut dyn ConversionTxn,
        quote: &Quote,
        order: &Order,
        line_items: &[QuoteLineItem],
        parts: &[QuotePart],
    ) -> Result<ConvertedQuote, ConvertQuoteError> {
        txn.insert_order(order).await?;

        // The compare-and-swap: zero affected rows means a concurrent
        // request won; abort with the expected error.
        if !txn.claim_quote(quote.id(), order.id()).await? {
            return Err(ConvertQuoteError::AlreadyConverted);
        }

        let now = self.clock.now();
        let mut line_item_count: u32 = 0;

        for quote_part in parts {
            let part = Part::promoted_from(
                quote_part.name().clone(),
                order.id(),
                quote_part.id(),
                quote_part.conversion().clone(),
                now,
            );
            txn.insert_part(&part).await?;

            // Byte copies degrade to original references on failure;
            // record failures below abort the whole unit.
            let assets = self
                .migrator
                .migrate_part_assets(quote_part, part.id().to_uuid())
                .await?;
            txn.update_part_files(part.id(), &assets.refs).await?;
            for version in &assets.versions {
                txn.insert_cad_version(version).await?;
            }

            for item in line_items
                .iter()
                .filter(|item| item.quote_part_id == Some(quote_part.id()))
            {
                txn.insert_order_line_item(&OrderLineItem::new(
                    order.id(),
                    Some(part.id()),
                    item.description.clone(),
                    item.quantity,
                    item.unit_price_cents,
                ))
                .await?;
                line_item_count += 1;
            }
        }

        // Free-text line items carry over without asset migration.
        for item in line_items.iter().filter(|item| item.quote_part_id.is_none()) {
            txn.insert_order_line_item(&OrderLineItem::new(
                order.id(),
                None,
                item.description.clone(),
                item.quantity,
                item.unit_price_cents,
            ))
            .await?;
            line_item_count += 1;
        }

        let attachment_count = txn.copy_attachments(quote.id(), order.id()).await?;
        let note_count = txn.copy_notes(quote.id(), order.id()).await?;

        Ok(ConvertedQuote {
            order_id: order.id(),
            order_number: order.number().to_string(),
            part_count: parts.len() as u32,
            line_item_count,
            attachment_count,
            note_count,
        })
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(error = %e, "failed to publish domain event");
        }
    }
}

/// All conversion preconditions, checked before any mutation.
fn validate(
    quote: &Quote,
    line_items: &[QuoteLineItem],
    parts: &[QuotePart],
) -> Result<(), ConvertQuoteError> {
    if !quote.status().is_convertible() {
        return Err(ConvertQuoteError::NotConvertible(quote.status()));
    }
    if quote.is_converted() {
        return Err(ConvertQuoteError::AlreadyConverted);
    }
    if line_items.is_empty() {
        return Err(ConvertQuoteError::NoLineItems);
    }
    for item in line_items {
        if item.quantity == 0 {
            return Err(ConvertQuoteError::InvalidLineItem {
                description: item.description.clone(),
                reason: "quantity must be greater than zero".to_string(),
            });
        }
        if item.unit_price_cents < 0 {
            return Err(ConvertQuoteError::InvalidLineItem {
                description: item.description.clone(),
                reason: "price cannot be negative".to_string(),
            });
        }
    }
    if line_items.iter().map(QuoteLineItem::total_cents).sum::<i64>() <= 0 {
        return Err(ConvertQuoteError::ZeroTotal);
    }

    // Conversion must be resolved one way or the other before parts become
    // permanent: running pipelines block, as does a pending part that owns
    // a source file (conversion was expected but hasn't run).
    let blocking = parts
        .iter()
        .filter(|part| {
            let status = part.conversion().status();
            status.is_in_flight()
                || (status == ConversionStatus::Pending && part.source_file_key().is_some())
        })
        .count();
    if blocking > 0 {
        return Err(ConvertQuoteError::ConversionsOutstanding { blocking });
    }

    for part in parts {
        // Failed mesh previews don't block revenue; the part converts with
        // its CAD file and no mesh.
        if part.conversion().status() == ConversionStatus::Failed {
            tracing::warn!(
                quote_id = %quote.id(),
                quote_part_id = %part.id(),
                part_name = %part.name(),
                error = part.conversion().error().unwrap_or_default(),
                "converting quote with a failed mesh conversion"
            );
        }
        // An orphaned part is a data-integrity violation; abort rather
        // than silently dropping it from the order.
        if !line_items
            .iter()
            .any(|item| item.quote_part_id == Some(part.id()))
        {
            return Err(ConvertQuoteError::InvalidPart {
                name: part.name().to_string(),
                reason: "has no associated line item".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::app_settings::AppSettings;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::{
        MockCadVersionRepo, MockConversionTxn, MockConversionUowPort, MockEventBusPort,
        MockObjectStorePort, MockOrderRepo, MockQuoteRepo, MockRandomPort, MockSettingsRepo,
        ObjectStoreError, PartFileRefs,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use quoteforge_domain::{
        CadVersion, CustomerId, EntityKind, PartName, QuotePartId,
    };
    use std::sync::Mutex;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 20, 9, 15, 0).unwrap()
    }

    fn sent_quote() -> Quote {
        Quote::new(CustomerId::new(), "Q-2041", QuoteStatus::Sent, fixed_now())
    }

    fn part_named(quote: &Quote, name: &str) -> QuotePart {
        QuotePart::new(quote.id(), PartName::new(name).unwrap(), fixed_now())
    }

    /// A quote part whose conversion already completed.
    fn completed_part(quote: &Quote, name: &str) -> QuotePart {
        let mut part = part_named(quote, name);
        let id = part.id().to_uuid();
        part.replace_source_file(
            EntityKind::QuotePart.source_key(id, "part.step"),
            "part.step",
            fixed_now(),
        );
        let mut state = part.conversion().clone();
        state.mark_queued(fixed_now()).unwrap();
        state.mark_in_progress("job-1").unwrap();
        state
            .complete(EntityKind::QuotePart.mesh_key(id, "part.glb"), fixed_now())
            .unwrap();
        part.set_conversion(state, fixed_now());
        part
    }

    fn failed_part(quote: &Quote, name: &str) -> QuotePart {
        let mut part = part_named(quote, name);
        let id = part.id().to_uuid();
        part.replace_source_file(
            EntityKind::QuotePart.source_key(id, "part.step"),
            "part.step",
            fixed_now(),
        );
        let mut state = part.conversion().clone();
        state.mark_queued(fixed_now()).unwrap();
        state.fail("tessellation blew up", fixed_now()).unwrap();
        part.set_conversion(state, fixed_now());
        part
    }

    fn in_progress_part(quote: &Quote, name: &str) -> QuotePart {
        let mut part = part_named(quote, name);
        let id = part.id().to_uuid();
        part.replace_source_file(
            EntityKind::QuotePart.source_key(id, "part.step"),
            "part.step",
            fixed_now(),
        );
        let mut state = part.conversion().clone();
        state.mark_queued(fixed_now()).unwrap();
        state.mark_in_progress("job-9").unwrap();
        part.set_conversion(state, fixed_now());
        part
    }

    fn line_for(quote: &Quote, part: Option<QuotePartId>, qty: u32, price: i64) -> QuoteLineItem {
        QuoteLineItem::new(quote.id(), part, "CNC machining", qty, price)
    }

    struct TestBed {
        quotes: MockQuoteRepo,
        uow: MockConversionUowPort,
        object_store: MockObjectStorePort,
        cad_versions: MockCadVersionRepo,
        settings: MockSettingsRepo,
        events: MockEventBusPort,
    }

    impl TestBed {
        fn new(quote: Quote, line_items: Vec<QuoteLineItem>, parts: Vec<QuotePart>) -> Self {
            let mut quotes = MockQuoteRepo::new();
            let q = quote.clone();
            quotes.expect_get().returning(move |_| Ok(Some(q.clone())));
            quotes
                .expect_list_line_items()
                .returning(move |_| Ok(line_items.clone()));
            quotes
                .expect_list_parts()
                .returning(move |_| Ok(parts.clone()));

            let mut settings = MockSettingsRepo::new();
            settings
                .expect_get()
                .returning(|| Ok(Some(AppSettings::default())));

            let mut events = MockEventBusPort::new();
            events.expect_publish().returning(|_| Ok(()));

            Self {
                quotes,
                uow: MockConversionUowPort::new(),
                object_store: MockObjectStorePort::new(),
                cad_versions: MockCadVersionRepo::new(),
                settings,
                events,
            }
        }

        fn build(self) -> ConvertQuoteToOrder {
            let clock = Arc::new(FixedClock(fixed_now()));
            let migrator = Arc::new(AssetMigrator::new(
                Arc::new(self.object_store),
                Arc::new(self.cad_versions),
                clock.clone(),
            ));
            let mut orders = MockOrderRepo::new();
            orders.expect_number_exists().returning(|_| Ok(false));
            let mut random = MockRandomPort::new();
            random.expect_gen_range().returning(|_, _| 99);
            let numbers = Arc::new(OrderNumberGenerator::new(
                Arc::new(orders),
                Arc::new(random),
                clock.clone(),
            ));
            ConvertQuoteToOrder::new(
                Arc::new(self.quotes),
                Arc::new(self.uow),
                migrator,
                numbers,
                Arc::new(self.settings),
                Arc::new(self.events),
                clock,
            )
        }
    }

    /// A transaction mock that accepts everything and records what landed.
    #[derive(Default)]
    struct TxnRecorder {
        orders: Arc<Mutex<Vec<Order>>>,
        parts: Arc<Mutex<Vec<Part>>>,
        part_files: Arc<Mutex<Vec<PartFileRefs>>>,
        line_items: Arc<Mutex<Vec<OrderLineItem>>>,
        cad_versions: Arc<Mutex<Vec<CadVersion>>>,
        committed: Arc<Mutex<bool>>,
    }

    impl TxnRecorder {
        fn into_txn(self, claim_result: bool) -> MockConversionTxn {
            let mut txn = MockConversionTxn::new();
            let orders = self.orders.clone();
            txn.expect_insert_order().returning(move |order| {
                orders.lock().unwrap().push(order.clone());
                Ok(())
            });
            txn.expect_claim_quote()
                .returning(move |_, _| Ok(claim_result));
            let parts = self.parts.clone();
            txn.expect_insert_part().returning(move |part| {
                parts.lock().unwrap().push(part.clone());
                Ok(())
            });
            let part_files = self.part_files.clone();
            txn.expect_update_part_files().returning(move |_, refs| {
                part_files.lock().unwrap().push(refs.clone());
                Ok(())
            });
            let line_items = self.line_items.clone();
            txn.expect_insert_order_line_item().returning(move |item| {
                line_items.lock().unwrap().push(item.clone());
                Ok(())
            });
            let cad_versions = self.cad_versions.clone();
            txn.expect_insert_cad_version().returning(move |version| {
                cad_versions.lock().unwrap().push(version.clone());
                Ok(())
            });
            txn.expect_copy_attachments().returning(|_, _| Ok(2));
            txn.expect_copy_notes().returning(|_, _| Ok(1));
            let committed = self.committed.clone();
            txn.expect_commit().returning(move || {
                *committed.lock().unwrap() = true;
                Ok(())
            });
            txn.expect_rollback().returning(|| Ok(()));
            txn
        }
    }

    // =========================================================================
    // Precondition validation
    // =========================================================================

    #[tokio::test]
    async fn rejects_quote_in_wrong_status() {
        let mut quote = sent_quote();
        quote.set_status(QuoteStatus::Draft, fixed_now());
        let lines = vec![line_for(&quote, None, 1, 10_000)];
        // No uow expectations: beginning a transaction would panic the mock.
        let bed = TestBed::new(quote.clone(), lines, vec![]);

        let err = bed.build().execute(quote.id()).await.unwrap_err();
        assert!(matches!(
            err,
            ConvertQuoteError::NotConvertible(QuoteStatus::Draft)
        ));
    }

    #[tokio::test]
    async fn rejects_previously_converted_quote() {
        let source = sent_quote();
        let quote = Quote::reconstruct(
            source.id(),
            source.customer_id(),
            source.number().to_string(),
            QuoteStatus::Accepted,
            Some(quoteforge_domain::OrderId::new()),
            fixed_now(),
            fixed_now(),
        );
        let lines = vec![line_for(&quote, None, 1, 10_000)];
        let bed = TestBed::new(quote.clone(), lines, vec![]);

        let err = bed.build().execute(quote.id()).await.unwrap_err();
        assert!(matches!(err, ConvertQuoteError::AlreadyConverted));
    }

    #[tokio::test]
    async fn rejects_quote_without_line_items() {
        let quote = sent_quote();
        let bed = TestBed::new(quote.clone(), vec![], vec![]);
        let err = bed.build().execute(quote.id()).await.unwrap_err();
        assert!(matches!(err, ConvertQuoteError::NoLineItems));
    }

    #[tokio::test]
    async fn rejects_zero_quantity_line_item() {
        let quote = sent_quote();
        let lines = vec![
            line_for(&quote, None, 5, 10_000),
            line_for(&quote, None, 0, 2_000),
        ];
        let bed = TestBed::new(quote.clone(), lines, vec![]);

        let err = bed.build().execute(quote.id()).await.unwrap_err();
        assert!(matches!(err, ConvertQuoteError::InvalidLineItem { .. }));
    }

    #[tokio::test]
    async fn rejects_negative_price_and_zero_total() {
        let quote = sent_quote();
        let bed = TestBed::new(quote.clone(), vec![line_for(&quote, None, 1, -5)], vec![]);
        assert!(matches!(
            bed.build().execute(quote.id()).await.unwrap_err(),
            ConvertQuoteError::InvalidLineItem { .. }
        ));

        let bed = TestBed::new(quote.clone(), vec![line_for(&quote, None, 3, 0)], vec![]);
        assert!(matches!(
            bed.build().execute(quote.id()).await.unwrap_err(),
            ConvertQuoteError::ZeroTotal
        ));
    }

    #[tokio::test]
    async fn outstanding_conversions_block_with_count() {
        let quote = sent_quote();
        let busy = in_progress_part(&quote, "Busy bracket");
        let done = completed_part(&quote, "Done bracket");
        let lines = vec![
            line_for(&quote, Some(busy.id()), 2, 5_000),
            line_for(&quote, Some(done.id()), 2, 5_000),
        ];
        let bed = TestBed::new(quote.clone(), lines, vec![busy, done]);

        let err = bed.build().execute(quote.id()).await.unwrap_err();
        match err {
            ConvertQuoteError::ConversionsOutstanding { blocking } => assert_eq!(blocking, 1),
            other => panic!("expected ConversionsOutstanding, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pending_part_with_source_file_blocks() {
        let quote = sent_quote();
        let mut pending = part_named(&quote, "Unconverted");
        pending.replace_source_file("quote-parts/x/source/a.step", "a.step", fixed_now());
        let lines = vec![line_for(&quote, Some(pending.id()), 1, 5_000)];
        let bed = TestBed::new(quote.clone(), lines, vec![pending]);

        let err = bed.build().execute(quote.id()).await.unwrap_err();
        assert!(matches!(
            err,
            ConvertQuoteError::ConversionsOutstanding { blocking: 1 }
        ));
    }

    #[tokio::test]
    async fn orphaned_part_aborts() {
        let quote = sent_quote();
        let orphan = part_named(&quote, "Orphan");
        let lines = vec![line_for(&quote, None, 1, 5_000)];
        let bed = TestBed::new(quote.clone(), lines, vec![orphan]);

        let err = bed.build().execute(quote.id()).await.unwrap_err();
        match err {
            ConvertQuoteError::InvalidPart { name, .. } => assert_eq!(name, "Orphan"),
            other => panic!("expected InvalidPart, got {other:?}"),
        }
    }

    // =========================================================================
    // Execution
    // =========================================================================

    #[tokio::test]
    async fn happy_path_creates_order_with_recomputed_total() {
        let quote = sent_quote();
        let part = completed_part(&quote, "Flange");
        let lines = vec![
            line_for(&quote, Some(part.id()), 25, 1_200),
            line_for(&quote, None, 1, 7_500),
        ];
        let mut bed = TestBed::new(quote.clone(), lines, vec![part]);
        bed.object_store.expect_copy().returning(|_, _| Ok(()));
        bed.cad_versions
            .expect_list_for_entity()
            .returning(|_, _| Ok(Vec::new()));

        let recorder = TxnRecorder::default();
        let orders = recorder.orders.clone();
        let parts = recorder.parts.clone();
        let line_items = recorder.line_items.clone();
        let committed = recorder.committed.clone();
        let txn = recorder.into_txn(true);
        bed.uow.expect_begin().return_once(move || Ok(Box::new(txn)));

        let summary = bed.build().execute(quote.id()).await.unwrap();

        assert_eq!(summary.order_number, "SO-2025-000099");
        assert_eq!(summary.part_count, 1);
        assert_eq!(summary.line_item_count, 2);
        assert_eq!(summary.attachment_count, 2);
        assert_eq!(summary.note_count, 1);
        assert!(*committed.lock().unwrap());

        // 25 * 1200 + 1 * 7500, summed server-side.
        let inserted_orders = orders.lock().unwrap();
        assert_eq!(inserted_orders.len(), 1);
        assert_eq!(inserted_orders[0].total_cents(), 37_500);
        assert_eq!(
            inserted_orders[0].status(),
            quoteforge_domain::OrderStatus::Pending
        );

        let inserted_parts = parts.lock().unwrap();
        assert_eq!(inserted_parts.len(), 1);
        assert_eq!(inserted_parts[0].name().as_str(), "Flange");

        let items = line_items.lock().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().any(|i| i.part_id.is_some() && i.quantity == 25));
        assert!(items.iter().any(|i| i.part_id.is_none() && i.unit_price_cents == 7_500));
    }

    #[tokio::test]
    async fn failed_conversion_is_allowed_through() {
        let quote = sent_quote();
        let part = failed_part(&quote, "Rough casting");
        let lines = vec![line_for(&quote, Some(part.id()), 10, 3_000)];
        let mut bed = TestBed::new(quote.clone(), lines, vec![part]);
        bed.object_store.expect_copy().returning(|_, _| Ok(()));
        bed.cad_versions
            .expect_list_for_entity()
            .returning(|_, _| Ok(Vec::new()));

        let recorder = TxnRecorder::default();
        let committed = recorder.committed.clone();
        let txn = recorder.into_txn(true);
        bed.uow.expect_begin().return_once(move || Ok(Box::new(txn)));

        let summary = bed.build().execute(quote.id()).await.unwrap();
        assert_eq!(summary.part_count, 1);
        assert!(*committed.lock().unwrap());
    }

    #[tokio::test]
    async fn concurrent_claim_loser_gets_already_converted() {
        let quote = sent_quote();
        let part = completed_part(&quote, "Flange");
        let lines = vec![line_for(&quote, Some(part.id()), 2, 9_000)];
        let mut bed = TestBed::new(quote.clone(), lines, vec![part]);

        let mut txn = MockConversionTxn::new();
        txn.expect_insert_order().returning(|_| Ok(()));
        // The CAS matched zero rows: another request got there first.
        txn.expect_claim_quote().returning(|_, _| Ok(false));
        let rolled_back = Arc::new(Mutex::new(false));
        let flag = rolled_back.clone();
        txn.expect_rollback().return_once(move || {
            *flag.lock().unwrap() = true;
            Ok(())
        });
        // No commit expectation: committing would panic the mock.
        bed.uow.expect_begin().return_once(move || Ok(Box::new(txn)));

        let err = bed.build().execute(quote.id()).await.unwrap_err();
        assert!(matches!(err, ConvertQuoteError::AlreadyConverted));
        assert!(*rolled_back.lock().unwrap());
    }

    #[tokio::test]
    async fn record_failure_mid_migration_rolls_everything_back() {
        let quote = sent_quote();
        let part = completed_part(&quote, "Flange");
        let lines = vec![line_for(&quote, Some(part.id()), 2, 9_000)];
        let mut bed = TestBed::new(quote.clone(), lines, vec![part]);
        bed.object_store.expect_copy().returning(|_, _| Ok(()));
        bed.cad_versions
            .expect_list_for_entity()
            .returning(|_, _| Ok(Vec::new()));

        let mut txn = MockConversionTxn::new();
        txn.expect_insert_order().returning(|_| Ok(()));
        txn.expect_claim_quote().returning(|_, _| Ok(true));
        txn.expect_insert_part()
            .returning(|_| Err(RepoError::database("query", "node store offline")));
        let rolled_back = Arc::new(Mutex::new(false));
        let flag = rolled_back.clone();
        txn.expect_rollback().return_once(move || {
            *flag.lock().unwrap() = true;
            Ok(())
        });
        bed.uow.expect_begin().return_once(move || Ok(Box::new(txn)));

        let err = bed.build().execute(quote.id()).await.unwrap_err();
        assert!(matches!(err, ConvertQuoteError::Repo(_)));
        assert!(*rolled_back.lock().unwrap());
    }

    #[tokio::test]
    async fn asset_copy_failure_falls_back_and_still_converts() {
        let quote = sent_quote();
        let part = completed_part(&quote, "Flange");
        let original_source = part.source_file_key().unwrap().to_string();
        let lines = vec![line_for(&quote, Some(part.id()), 2, 9_000)];
        let mut bed = TestBed::new(quote.clone(), lines, vec![part]);
        // Every byte copy fails; references must degrade, not the order.
        bed.object_store
            .expect_copy()
            .returning(|key, _| Err(ObjectStoreError::io(key, "bucket unreachable")));
        bed.cad_versions
            .expect_list_for_entity()
            .returning(|_, _| Ok(Vec::new()));

        let recorder = TxnRecorder::default();
        let part_files = recorder.part_files.clone();
        let committed = recorder.committed.clone();
        let txn = recorder.into_txn(true);
        bed.uow.expect_begin().return_once(move || Ok(Box::new(txn)));

        let summary = bed.build().execute(quote.id()).await.unwrap();

        assert_eq!(summary.part_count, 1);
        assert!(*committed.lock().unwrap());
        let refs = part_files.lock().unwrap();
        assert_eq!(refs.len(), 1);
        // Fallback: the part references the original quote-part object.
        assert_eq!(refs[0].source_file_key.as_deref(), Some(original_source.as_str()));
    }

    #[tokio::test]
    async fn version_history_round_trips_through_migration() {
        let quote = sent_quote();
        let part = completed_part(&quote, "Flange");
        let source_id = part.id().to_uuid();
        let lines = vec![line_for(&quote, Some(part.id()), 2, 9_000)];
        let mut bed = TestBed::new(quote.clone(), lines, vec![part]);
        bed.object_store.expect_copy().returning(|_, _| Ok(()));
        let history: Vec<CadVersion> = (1..=3)
            .map(|n| {
                CadVersion::new(
                    EntityKind::QuotePart,
                    source_id,
                    n,
                    format!("quote-parts/{source_id}/source/v{n}/flange.step"),
                    "flange.step",
                    n == 3,
                    fixed_now(),
                )
            })
            .collect();
        bed.cad_versions
            .expect_list_for_entity()
            .returning(move |_, _| Ok(history.clone()));

        let recorder = TxnRecorder::default();
        let versions = recorder.cad_versions.clone();
        let txn = recorder.into_txn(true);
        bed.uow.expect_begin().return_once(move || Ok(Box::new(txn)));

        bed.build().execute(quote.id()).await.unwrap();

        let inserted = versions.lock().unwrap();
        assert_eq!(inserted.len(), 3);
        let numbers: Vec<u32> = inserted.iter().map(|v| v.version()).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(inserted.iter().filter(|v| v.is_current()).count(), 1);
        assert!(inserted.iter().all(|v| v.entity_kind() == EntityKind::Part));
    }
}
