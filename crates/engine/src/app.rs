//! Application state and composition.

use std::sync::Arc;

use quoteforge_domain::EntityKind;

use crate::infrastructure::{
    clock::{SystemClock, SystemRandom},
    events::BroadcastEventBus,
    neo4j::Neo4jRepositories,
    ports::{
        AttachmentRepo, CadVersionRepo, ClockPort, ConversionServicePort, ConvertibleRepo,
        EventBusPort, NoteRepo, ObjectStorePort, OrderRepo, PartRepo, QuotePartRepo, QuoteRepo,
        RandomPort, SettingsRepo,
    },
};
use crate::use_cases::{
    cad::{ReplaceCadFile, RestoreCadVersion},
    conversion::ConvertCadFile,
    migration::AssetMigrator,
    orders::{ConvertQuoteToOrder, OrderNumberGenerator},
};

/// Main application state.
///
/// Holds repositories and use cases; passed to HTTP handlers via Axum state.
pub struct App {
    pub repositories: Repositories,
    pub use_cases: UseCases,
    pub events: Arc<BroadcastEventBus>,
    pub clock: Arc<dyn ClockPort>,
}

/// Port traits injected directly; only per-kind pairs need the accessors.
pub struct Repositories {
    pub quote: Arc<dyn QuoteRepo>,
    pub quote_part: Arc<dyn QuotePartRepo>,
    pub part: Arc<dyn PartRepo>,
    pub order: Arc<dyn OrderRepo>,
    pub cad_version: Arc<dyn CadVersionRepo>,
    pub attachment: Arc<dyn AttachmentRepo>,
    pub note: Arc<dyn NoteRepo>,
    pub settings: Arc<dyn SettingsRepo>,
    convertible_parts: Arc<dyn ConvertibleRepo>,
    convertible_quote_parts: Arc<dyn ConvertibleRepo>,
}

impl Repositories {
    pub fn convertibles_for(&self, kind: EntityKind) -> &Arc<dyn ConvertibleRepo> {
        match kind {
            EntityKind::Part => &self.convertible_parts,
            EntityKind::QuotePart => &self.convertible_quote_parts,
        }
    }
}

/// Container for all use cases. The conversion pipeline and CAD lifecycle
/// exist once per entity kind, wired to that kind's state store.
pub struct UseCases {
    pub convert_quote: Arc<ConvertQuoteToOrder>,
    parts_conversion: Arc<ConvertCadFile>,
    quote_parts_conversion: Arc<ConvertCadFile>,
    parts_replace_file: Arc<ReplaceCadFile>,
    quote_parts_replace_file: Arc<ReplaceCadFile>,
    parts_restore_version: Arc<RestoreCadVersion>,
    quote_parts_restore_version: Arc<RestoreCadVersion>,
}

impl UseCases {
    pub fn conversion_for(&self, kind: EntityKind) -> &Arc<ConvertCadFile> {
        match kind {
            EntityKind::Part => &self.parts_conversion,
            EntityKind::QuotePart => &self.quote_parts_conversion,
        }
    }

    pub fn replace_file_for(&self, kind: EntityKind) -> &Arc<ReplaceCadFile> {
        match kind {
            EntityKind::Part => &self.parts_replace_file,
            EntityKind::QuotePart => &self.quote_parts_replace_file,
        }
    }

    pub fn restore_version_for(&self, kind: EntityKind) -> &Arc<RestoreCadVersion> {
        match kind {
            EntityKind::Part => &self.parts_restore_version,
            EntityKind::QuotePart => &self.quote_parts_restore_version,
        }
    }
}

impl App {
    /// Create a new App with all dependencies wired up.
    pub fn new(
        repos: Neo4jRepositories,
        object_store: Arc<dyn ObjectStorePort>,
        conversion_service: Arc<dyn ConversionServicePort>,
        settings_repo: Arc<dyn SettingsRepo>,
        events: Arc<BroadcastEventBus>,
    ) -> Self {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
        let random: Arc<dyn RandomPort> = Arc::new(SystemRandom::new());
        let event_port: Arc<dyn EventBusPort> = events.clone();

        let quote_repo: Arc<dyn QuoteRepo> = repos.quote.clone();
        let order_repo: Arc<dyn OrderRepo> = repos.order.clone();
        let cad_version_repo: Arc<dyn CadVersionRepo> = repos.cad_version.clone();
        let convertible_parts: Arc<dyn ConvertibleRepo> = repos.convertible_parts.clone();
        let convertible_quote_parts: Arc<dyn ConvertibleRepo> =
            repos.convertible_quote_parts.clone();

        let conversion_for = |convertibles: &Arc<dyn ConvertibleRepo>| {
            Arc::new(ConvertCadFile::new(
                convertibles.clone(),
                object_store.clone(),
                conversion_service.clone(),
                settings_repo.clone(),
                event_port.clone(),
                clock.clone(),
            ))
        };
        let replace_for = |convertibles: &Arc<dyn ConvertibleRepo>| {
            Arc::new(ReplaceCadFile::new(
                convertibles.clone(),
                cad_version_repo.clone(),
                object_store.clone(),
                clock.clone(),
            ))
        };
        let restore_for = |convertibles: &Arc<dyn ConvertibleRepo>| {
            Arc::new(RestoreCadVersion::new(
                convertibles.clone(),
                cad_version_repo.clone(),
                clock.clone(),
            ))
        };

        let migrator = Arc::new(AssetMigrator::new(
            object_store.clone(),
            cad_version_repo.clone(),
            clock.clone(),
        ));
        let numbers = Arc::new(OrderNumberGenerator::new(
            order_repo.clone(),
            random,
            clock.clone(),
        ));
        let convert_quote = Arc::new(ConvertQuoteToOrder::new(
            quote_repo.clone(),
            repos.conversion_uow.clone(),
            migrator,
            numbers,
            settings_repo.clone(),
            event_port.clone(),
            clock.clone(),
        ));

        Self {
            use_cases: UseCases {
                convert_quote,
                parts_conversion: conversion_for(&convertible_parts),
                quote_parts_conversion: conversion_for(&convertible_quote_parts),
                parts_replace_file: replace_for(&convertible_parts),
                quote_parts_replace_file: replace_for(&convertible_quote_parts),
                parts_restore_version: restore_for(&convertible_parts),
                quote_parts_restore_version: restore_for(&convertible_quote_parts),
            },
            clock: clock.clone(),
            repositories: Repositories {
                quote: quote_repo,
                quote_part: repos.quote_part.clone(),
                part: repos.part.clone(),
                order: order_repo,
                cad_version: cad_version_repo,
                attachment: repos.attachment.clone(),
                note: repos.note.clone(),
                settings: settings_repo,
                convertible_parts,
                convertible_quote_parts,
            },
            events,
        }
    }
}
