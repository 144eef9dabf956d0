//! CAD-to-mesh conversion orchestration.
//!
//! One orchestrator instance is wired per entity kind over its
//! `ConvertibleRepo`; the pipeline itself is identical for parts and quote
//! parts. Per entity, steps run strictly in order: fetch source, submit,
//! poll, download, store. Batches run entities concurrently inside a
//! bounded group and sequentially across groups.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use quoteforge_domain::{
    ConversionState, ConversionStatus, DomainError, DomainEvent, EntityKind, SkipReason,
};
use tokio::time::sleep;
use uuid::Uuid;

use crate::infrastructure::app_settings::AppSettings;
use crate::infrastructure::ports::{
    ClockPort, ConversionOptions, ConversionServicePort, ConvertibleRecord, ConvertibleRepo,
    EventBusPort, JobStatus, ObjectStorePort, RepoError, SettingsRepo,
};
use crate::use_cases::conversion::format_guard::FormatGuard;

/// Terminal result of one conversion attempt.
///
/// `Skipped` and `Failed` are outcomes, not errors: the pipeline ran and
/// recorded a terminal state. `ConversionError` is reserved for the cases
/// where the pipeline itself couldn't run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Completed { mesh_file_key: String },
    Skipped { reason: SkipReason },
    Failed { error: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("{kind} not found: {id}")]
    EntityNotFound { kind: EntityKind, id: Uuid },

    #[error("A conversion for this entity is already running")]
    AlreadyRunning,

    #[error("Conversion can only be retried from failed, current status is {0}")]
    NotRetryable(ConversionStatus),

    #[error(transparent)]
    InvalidState(#[from] DomainError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Drives one entity kind through the conversion pipeline.
pub struct ConvertCadFile {
    convertibles: Arc<dyn ConvertibleRepo>,
    object_store: Arc<dyn ObjectStorePort>,
    service: Arc<dyn ConversionServicePort>,
    settings: Arc<dyn SettingsRepo>,
    events: Arc<dyn EventBusPort>,
    clock: Arc<dyn ClockPort>,
    /// Entities with a pipeline running in this process. Two tabs retrying
    /// the same part should queue one job, not two.
    in_flight: DashMap<Uuid, ()>,
}

impl ConvertCadFile {
    pub fn new(
        convertibles: Arc<dyn ConvertibleRepo>,
        object_store: Arc<dyn ObjectStorePort>,
        service: Arc<dyn ConversionServicePort>,
        settings: Arc<dyn SettingsRepo>,
        events: Arc<dyn EventBusPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            convertibles,
            object_store,
            service,
            settings,
            events,
            clock,
            in_flight: DashMap::new(),
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.convertibles.entity_kind()
    }

    /// Run the full pipeline for one entity.
    ///
    /// The entity must be in `pending` state (fresh upload or explicit
    /// retry reset). Every terminal transition is persisted before this
    /// returns; an abandoned request can cancel the local poll loop but
    /// never leaves the record `in_progress` past a terminal poll result.
    pub async fn convert(&self, id: Uuid) -> Result<ConversionOutcome, ConversionError> {
        if self.in_flight.insert(id, ()).is_some() {
            return Err(ConversionError::AlreadyRunning);
        }
        let result = self.run_pipeline(id).await;
        self.in_flight.remove(&id);
        result
    }

    /// Retry a failed conversion against the entity's *current* source file
    /// (which may have been replaced since the original submission).
    pub async fn retry(&self, id: Uuid) -> Result<ConversionOutcome, ConversionError> {
        let record = self.load(id).await?;

        let mut state = record.conversion.clone();
        state
            .reset_for_retry()
            .map_err(|_| ConversionError::NotRetryable(record.conversion.status()))?;
        self.convertibles.save_state(id, &state).await?;

        self.convert(id).await
    }

    /// Convert a set of entities with bounded concurrency.
    ///
    /// Entities run concurrently within a group of `max_concurrent_conversions`
    /// and sequentially across groups; one entity's failure never aborts the
    /// others. Returns a per-id result map.
    pub async fn convert_batch(
        &self,
        ids: &[Uuid],
    ) -> HashMap<Uuid, Result<ConversionOutcome, ConversionError>> {
        let group_size = self
            .load_settings()
            .await
            .max_concurrent_conversions
            .max(1);

        let mut results = HashMap::with_capacity(ids.len());
        for group in ids.chunks(group_size) {
            let outcomes = join_all(group.iter().map(|&id| async move {
                (id, self.convert(id).await)
            }))
            .await;
            results.extend(outcomes);
        }
        results
    }

    // --- pipeline internals ---

    async fn load(&self, id: Uuid) -> Result<ConvertibleRecord, ConversionError> {
        self.convertibles
            .get(id)
            .await?
            .ok_or(ConversionError::EntityNotFound {
                kind: self.entity_kind(),
                id,
            })
    }

    /// Settings are read fresh on every attempt so the toggle and limits
    /// apply without a restart. A missing row means defaults.
    async fn load_settings(&self) -> AppSettings {
        match self.settings.get().await {
            Ok(Some(settings)) => settings,
            Ok(None) => AppSettings::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load settings; using defaults");
                AppSettings::default()
            }
        }
    }

    async fn run_pipeline(&self, id: Uuid) -> Result<ConversionOutcome, ConversionError> {
        let settings = self.load_settings().await;
        let record = self.load(id).await?;
        let kind = self.entity_kind();
        let mut state = record.conversion.clone();

        // Disabled subsystem: a typed no-op, not a failure.
        if !settings.conversion_enabled {
            state.skip(SkipReason::ConversionDisabled, self.clock.now())?;
            self.convertibles.save_state(id, &state).await?;
            self.publish(DomainEvent::ConversionSkipped {
                entity_kind: kind,
                entity_id: id,
                reason: SkipReason::ConversionDisabled.to_string(),
            })
            .await;
            tracing::info!(entity_kind = %kind, entity_id = %id, "conversion skipped: subsystem disabled");
            return Ok(ConversionOutcome::Skipped {
                reason: SkipReason::ConversionDisabled,
            });
        }

        // Enter the pipeline.
        state.mark_queued(self.clock.now())?;
        self.convertibles.save_state(id, &state).await?;

        let Some(filename) = record.effective_file_name() else {
            return self
                .fail(id, state, "Entity has no source CAD file to convert")
                .await;
        };
        let Some(source_key) = record.source_file_key.clone() else {
            return self
                .fail(id, state, "Entity has no source CAD file to convert")
                .await;
        };

        // A conversion request for a non-brep file is a caller contract
        // violation, distinct from a service failure.
        let format = FormatGuard::classify(&filename);
        if !FormatGuard::needs_conversion(format) {
            return self
                .fail(
                    id,
                    state,
                    format!(
                        "Conversion requested for '{filename}' which does not require it (classified as {format})"
                    ),
                )
                .await;
        }

        // Fetch the source before submitting; don't burn a service slot on
        // an unreadable input.
        let bytes = match self.object_store.get(&source_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return self
                    .fail(id, state, format!("Failed to read source file: {e}"))
                    .await;
            }
        };

        if let Err(e) = FormatGuard::validate_size(bytes.len() as u64, &settings) {
            return self.fail(id, state, e.to_string()).await;
        }

        let options = ConversionOptions {
            output_format: FormatGuard::recommended_output_format(&settings),
            chordal_deflection_mm: settings.chordal_deflection_mm,
            angular_deflection_rad: settings.angular_deflection_rad,
            run_async: true,
        };
        let job_id = match self.service.submit(bytes, &filename, options).await {
            Ok(job_id) => job_id,
            Err(e) => {
                return self
                    .fail(id, state, format!("Failed to submit conversion job: {e}"))
                    .await;
            }
        };

        state.mark_in_progress(job_id.clone())?;
        self.convertibles.save_state(id, &state).await?;
        self.publish(DomainEvent::ConversionQueued {
            entity_kind: kind,
            entity_id: id,
            job_id: Some(job_id.clone()),
        })
        .await;
        tracing::info!(entity_kind = %kind, entity_id = %id, job_id = %job_id, "conversion job submitted");

        // Poll until the job terminates or the budget runs out. The service
        // is untrusted and may never terminate; exhausting the budget is a
        // distinct timeout failure, not the service's own "failed".
        let interval = Duration::from_millis(settings.poll_interval_ms);
        let mut completed = false;
        for attempt in 0..settings.poll_max_attempts {
            match self.service.poll(&job_id).await {
                Ok(JobStatus::Completed) => {
                    completed = true;
                    break;
                }
                Ok(JobStatus::Failed { error }) => {
                    return self
                        .fail(id, state, format!("Conversion service failed: {error}"))
                        .await;
                }
                Ok(JobStatus::Queued | JobStatus::InProgress) => {}
                Err(e) => {
                    // Transient poll errors count against the budget rather
                    // than failing outright; the job may still finish.
                    tracing::warn!(job_id = %job_id, attempt, error = %e, "poll failed");
                }
            }
            sleep(interval).await;
        }

        if !completed {
            let budget_secs =
                (u64::from(settings.poll_max_attempts) * settings.poll_interval_ms) / 1_000;
            return self
                .fail(
                    id,
                    state,
                    format!("Conversion timed out after {budget_secs}s waiting for job {job_id}"),
                )
                .await;
        }

        // The job succeeded; anything failing from here still terminates in
        // `failed` (a human retries), never a dangling `in_progress`.
        let converted = match self.service.download(&job_id).await {
            Ok(file) => file,
            Err(e) => {
                return self
                    .fail(id, state, format!("Failed to download conversion result: {e}"))
                    .await;
            }
        };

        let mesh_key = kind.mesh_key(id, &converted.filename);
        let content_type = mesh_content_type(&converted.filename);
        if let Err(e) = self
            .object_store
            .put(&mesh_key, converted.bytes, content_type)
            .await
        {
            return self
                .fail(id, state, format!("Failed to store converted mesh: {e}"))
                .await;
        }

        state.complete(mesh_key.clone(), self.clock.now())?;
        self.convertibles.save_state(id, &state).await?;
        self.publish(DomainEvent::ConversionCompleted {
            entity_kind: kind,
            entity_id: id,
            mesh_file_key: mesh_key.clone(),
        })
        .await;
        tracing::info!(entity_kind = %kind, entity_id = %id, mesh_key = %mesh_key, "conversion completed");

        Ok(ConversionOutcome::Completed {
            mesh_file_key: mesh_key,
        })
    }

    /// Record a terminal failure and surface it as an outcome.
    async fn fail(
        &self,
        id: Uuid,
        mut state: ConversionState,
        error: impl Into<String>,
    ) -> Result<ConversionOutcome, ConversionError> {
        let error = error.into();
        state.fail(error.clone(), self.clock.now())?;
        self.convertibles.save_state(id, &state).await?;
        self.publish(DomainEvent::ConversionFailed {
            entity_kind: self.entity_kind(),
            entity_id: id,
            error: error.clone(),
        })
        .await;
        tracing::warn!(entity_kind = %self.entity_kind(), entity_id = %id, error = %error, "conversion failed");
        Ok(ConversionOutcome::Failed { error })
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(error = %e, "failed to publish domain event");
        }
    }
}

fn mesh_content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "glb" => "model/gltf-binary",
        Some(ext) if ext == "gltf" => "model/gltf+json",
        Some(ext) if ext == "stl" => "model/stl",
        Some(ext) if ext == "obj" => "model/obj",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{
        ConversionServiceError, ConvertedFile, MockClockPort, MockConversionServicePort,
        MockConvertibleRepo, MockEventBusPort, MockObjectStorePort, MockSettingsRepo,
        ObjectStoreError,
    };
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, 8, 30, 0).unwrap()
    }

    fn fast_settings() -> AppSettings {
        AppSettings {
            poll_interval_ms: 1,
            poll_max_attempts: 3,
            ..AppSettings::default()
        }
    }

    fn pending_record(id: Uuid, kind: EntityKind, filename: &str) -> ConvertibleRecord {
        ConvertibleRecord {
            id,
            kind,
            source_file_key: Some(kind.source_key(id, filename)),
            source_file_name: Some(filename.to_string()),
            conversion: ConversionState::pending(),
        }
    }

    /// Mocks wired for one pipeline run; customize before `build`.
    struct Harness {
        convertibles: MockConvertibleRepo,
        object_store: MockObjectStorePort,
        service: MockConversionServicePort,
        settings: MockSettingsRepo,
        events: MockEventBusPort,
        clock: MockClockPort,
    }

    impl Harness {
        fn new(settings: AppSettings) -> Self {
            let mut harness = Self {
                convertibles: MockConvertibleRepo::new(),
                object_store: MockObjectStorePort::new(),
                service: MockConversionServicePort::new(),
                settings: MockSettingsRepo::new(),
                events: MockEventBusPort::new(),
                clock: MockClockPort::new(),
            };
            harness
                .settings
                .expect_get()
                .returning(move || Ok(Some(settings.clone())));
            harness.events.expect_publish().returning(|_| Ok(()));
            harness.clock.expect_now().returning(fixed_now);
            harness
                .convertibles
                .expect_entity_kind()
                .return_const(EntityKind::QuotePart);
            harness
        }

        /// Record every saved state so tests can assert the transition path.
        fn capture_states(&mut self) -> Arc<Mutex<Vec<ConversionState>>> {
            let saved = Arc::new(Mutex::new(Vec::new()));
            let sink = saved.clone();
            self.convertibles
                .expect_save_state()
                .returning(move |_, state| {
                    sink.lock().unwrap().push(state.clone());
                    Ok(())
                });
            saved
        }

        fn build(self) -> ConvertCadFile {
            ConvertCadFile::new(
                Arc::new(self.convertibles),
                Arc::new(self.object_store),
                Arc::new(self.service),
                Arc::new(self.settings),
                Arc::new(self.events),
                Arc::new(self.clock),
            )
        }
    }

    #[tokio::test]
    async fn skips_when_subsystem_disabled() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(AppSettings {
            conversion_enabled: false,
            ..fast_settings()
        });
        harness
            .convertibles
            .expect_get()
            .returning(move |id| Ok(Some(pending_record(id, EntityKind::QuotePart, "a.step"))));
        let saved = harness.capture_states();

        let outcome = harness.build().convert(id).await.unwrap();

        assert_eq!(
            outcome,
            ConversionOutcome::Skipped {
                reason: SkipReason::ConversionDisabled
            }
        );
        let states = saved.lock().unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].status(), ConversionStatus::Skipped);
    }

    #[tokio::test]
    async fn fails_when_file_does_not_need_conversion() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(fast_settings());
        harness
            .convertibles
            .expect_get()
            .returning(move |id| Ok(Some(pending_record(id, EntityKind::QuotePart, "a.stl"))));
        let saved = harness.capture_states();

        // No object-store or service expectations: reaching them would
        // panic the mock and fail the test.
        let outcome = harness.build().convert(id).await.unwrap();

        match outcome {
            ConversionOutcome::Failed { error } => {
                assert!(error.contains("does not require"), "{error}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
        let states = saved.lock().unwrap();
        assert_eq!(
            states.last().unwrap().status(),
            ConversionStatus::Failed
        );
    }

    #[tokio::test]
    async fn fails_when_source_fetch_fails_without_submitting() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(fast_settings());
        harness
            .convertibles
            .expect_get()
            .returning(move |id| Ok(Some(pending_record(id, EntityKind::QuotePart, "a.step"))));
        harness
            .object_store
            .expect_get()
            .returning(|key| Err(ObjectStoreError::NotFound(key.to_string())));
        let saved = harness.capture_states();

        let outcome = harness.build().convert(id).await.unwrap();

        match outcome {
            ConversionOutcome::Failed { error } => {
                assert!(error.contains("Failed to read source file"), "{error}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(
            saved.lock().unwrap().last().unwrap().status(),
            ConversionStatus::Failed
        );
    }

    #[tokio::test]
    async fn fails_terminally_when_oversized() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(AppSettings {
            max_cad_file_bytes: 4,
            ..fast_settings()
        });
        harness
            .convertibles
            .expect_get()
            .returning(move |id| Ok(Some(pending_record(id, EntityKind::QuotePart, "a.step"))));
        harness
            .object_store
            .expect_get()
            .returning(|_| Ok(vec![0u8; 5]));
        let saved = harness.capture_states();

        let outcome = harness.build().convert(id).await.unwrap();

        match outcome {
            ConversionOutcome::Failed { error } => {
                assert!(error.contains("above the 4 byte conversion limit"), "{error}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(
            saved.lock().unwrap().last().unwrap().status(),
            ConversionStatus::Failed
        );
    }

    #[tokio::test]
    async fn fails_when_submission_fails() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(fast_settings());
        harness
            .convertibles
            .expect_get()
            .returning(move |id| Ok(Some(pending_record(id, EntityKind::QuotePart, "a.step"))));
        harness
            .object_store
            .expect_get()
            .returning(|_| Ok(b"solid".to_vec()));
        harness
            .service
            .expect_submit()
            .returning(|_, _, _| Err(ConversionServiceError::Unavailable));
        let saved = harness.capture_states();

        let outcome = harness.build().convert(id).await.unwrap();

        match outcome {
            ConversionOutcome::Failed { error } => {
                assert!(error.contains("Failed to submit"), "{error}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(
            saved.lock().unwrap().last().unwrap().status(),
            ConversionStatus::Failed
        );
    }

    #[tokio::test]
    async fn happy_path_stores_mesh_under_entity_namespace() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(fast_settings());
        harness
            .convertibles
            .expect_get()
            .returning(move |id| Ok(Some(pending_record(id, EntityKind::QuotePart, "bracket.step"))));
        harness
            .object_store
            .expect_get()
            .returning(|_| Ok(b"solid".to_vec()));
        harness
            .service
            .expect_submit()
            .withf(|_, filename, options| filename == "bracket.step" && options.run_async)
            .returning(|_, _, _| Ok("job-9".to_string()));
        harness
            .service
            .expect_poll()
            .withf(|job_id| job_id == "job-9")
            .returning(|_| Ok(JobStatus::Completed));
        harness
            .service
            .expect_download()
            .withf(|job_id| job_id == "job-9")
            .returning(|_| {
                Ok(ConvertedFile {
                    filename: "bracket.glb".to_string(),
                    bytes: b"mesh".to_vec(),
                })
            });
        let expected_key = EntityKind::QuotePart.mesh_key(id, "bracket.glb");
        let key_check = expected_key.clone();
        harness
            .object_store
            .expect_put()
            .withf(move |key, _, content_type| key == key_check && content_type == "model/gltf-binary")
            .returning(|key, _, _| Ok(key.to_string()));
        let saved = harness.capture_states();

        let outcome = harness.build().convert(id).await.unwrap();

        assert_eq!(
            outcome,
            ConversionOutcome::Completed {
                mesh_file_key: expected_key.clone()
            }
        );
        let states = saved.lock().unwrap();
        let statuses: Vec<_> = states.iter().map(|s| s.status()).collect();
        assert_eq!(
            statuses,
            vec![
                ConversionStatus::Queued,
                ConversionStatus::InProgress,
                ConversionStatus::Completed
            ]
        );
        assert_eq!(states.last().unwrap().mesh_file_key(), Some(expected_key.as_str()));
        assert_eq!(states[1].job_id(), Some("job-9"));
    }

    #[tokio::test]
    async fn service_reported_failure_keeps_service_message() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(fast_settings());
        harness
            .convertibles
            .expect_get()
            .returning(move |id| Ok(Some(pending_record(id, EntityKind::QuotePart, "a.step"))));
        harness
            .object_store
            .expect_get()
            .returning(|_| Ok(b"solid".to_vec()));
        harness
            .service
            .expect_submit()
            .returning(|_, _, _| Ok("job-1".to_string()));
        harness.service.expect_poll().returning(|_| {
            Ok(JobStatus::Failed {
                error: "self-intersecting shell".to_string(),
            })
        });
        let saved = harness.capture_states();

        let outcome = harness.build().convert(id).await.unwrap();

        match outcome {
            ConversionOutcome::Failed { error } => {
                assert!(error.contains("self-intersecting shell"), "{error}");
                assert!(!error.contains("timed out"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(
            saved.lock().unwrap().last().unwrap().status(),
            ConversionStatus::Failed
        );
    }

    #[tokio::test]
    async fn exhausted_poll_budget_fails_with_timeout_message() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(fast_settings());
        harness
            .convertibles
            .expect_get()
            .returning(move |id| Ok(Some(pending_record(id, EntityKind::QuotePart, "a.step"))));
        harness
            .object_store
            .expect_get()
            .returning(|_| Ok(b"solid".to_vec()));
        harness
            .service
            .expect_submit()
            .returning(|_, _, _| Ok("job-stuck".to_string()));
        // The job never terminates; only the local budget stops the loop.
        harness
            .service
            .expect_poll()
            .times(3)
            .returning(|_| Ok(JobStatus::InProgress));
        let saved = harness.capture_states();

        let outcome = harness.build().convert(id).await.unwrap();

        match outcome {
            ConversionOutcome::Failed { error } => {
                assert!(error.contains("timed out"), "{error}");
                assert!(error.contains("job-stuck"), "{error}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(
            saved.lock().unwrap().last().unwrap().status(),
            ConversionStatus::Failed
        );
    }

    #[tokio::test]
    async fn storage_failure_after_job_success_still_fails_terminally() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(fast_settings());
        harness
            .convertibles
            .expect_get()
            .returning(move |id| Ok(Some(pending_record(id, EntityKind::QuotePart, "a.step"))));
        harness
            .object_store
            .expect_get()
            .returning(|_| Ok(b"solid".to_vec()));
        harness
            .service
            .expect_submit()
            .returning(|_, _, _| Ok("job-2".to_string()));
        harness
            .service
            .expect_poll()
            .returning(|_| Ok(JobStatus::Completed));
        harness.service.expect_download().returning(|_| {
            Ok(ConvertedFile {
                filename: "a.glb".to_string(),
                bytes: b"mesh".to_vec(),
            })
        });
        harness
            .object_store
            .expect_put()
            .returning(|key, _, _| Err(ObjectStoreError::io(key, "disk full")));
        let saved = harness.capture_states();

        let outcome = harness.build().convert(id).await.unwrap();

        match outcome {
            ConversionOutcome::Failed { error } => {
                assert!(error.contains("Failed to store converted mesh"), "{error}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // Never left dangling in in_progress after the terminal poll.
        let states = saved.lock().unwrap();
        assert_eq!(states.last().unwrap().status(), ConversionStatus::Failed);
    }

    #[tokio::test]
    async fn retry_rejected_unless_failed() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(fast_settings());
        harness.convertibles.expect_get().returning(move |id| {
            let mut record = pending_record(id, EntityKind::QuotePart, "a.step");
            let now = fixed_now();
            record.conversion.mark_queued(now).unwrap();
            record.conversion.mark_in_progress("job-1").unwrap();
            record.conversion.complete("mesh-key", now).unwrap();
            Ok(Some(record))
        });

        let err = harness.build().retry(id).await.unwrap_err();
        assert!(matches!(
            err,
            ConversionError::NotRetryable(ConversionStatus::Completed)
        ));
    }

    #[tokio::test]
    async fn retry_resets_to_pending_and_reruns_pipeline() {
        let id = Uuid::new_v4();
        let mut harness = Harness::new(fast_settings());
        let call_count = Arc::new(AtomicUsize::new(0));
        let calls = call_count.clone();
        harness.convertibles.expect_get().returning(move |id| {
            let mut record = pending_record(id, EntityKind::QuotePart, "a.step");
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                // First load: the failed conversion being retried.
                record.conversion.mark_queued(fixed_now()).unwrap();
                record
                    .conversion
                    .fail("first attempt broke", fixed_now())
                    .unwrap();
            }
            Ok(Some(record))
        });
        harness
            .object_store
            .expect_get()
            .returning(|_| Ok(b"solid".to_vec()));
        harness
            .service
            .expect_submit()
            .returning(|_, _, _| Ok("job-retry".to_string()));
        harness
            .service
            .expect_poll()
            .returning(|_| Ok(JobStatus::Completed));
        harness.service.expect_download().returning(|_| {
            Ok(ConvertedFile {
                filename: "a.glb".to_string(),
                bytes: b"mesh".to_vec(),
            })
        });
        harness
            .object_store
            .expect_put()
            .returning(|key, _, _| Ok(key.to_string()));
        let saved = harness.capture_states();

        let outcome = harness.build().retry(id).await.unwrap();

        assert!(matches!(outcome, ConversionOutcome::Completed { .. }));
        // Full path re-ran: pending reset, then queued -> in_progress ->
        // completed. Never straight to completed.
        let statuses: Vec<_> = saved.lock().unwrap().iter().map(|s| s.status()).collect();
        assert_eq!(
            statuses,
            vec![
                ConversionStatus::Pending,
                ConversionStatus::Queued,
                ConversionStatus::InProgress,
                ConversionStatus::Completed
            ]
        );
    }

    // =========================================================================
    // Concurrency tests against hand-rolled fakes
    // =========================================================================

    struct FakeConvertibles {
        kind: EntityKind,
        records: Mutex<HashMap<Uuid, ConvertibleRecord>>,
    }

    #[async_trait]
    impl ConvertibleRepo for FakeConvertibles {
        fn entity_kind(&self) -> EntityKind {
            self.kind
        }

        async fn get(&self, id: Uuid) -> Result<Option<ConvertibleRecord>, RepoError> {
            Ok(self.records.lock().unwrap().get(&id).cloned())
        }

        async fn save_state(&self, id: Uuid, state: &ConversionState) -> Result<(), RepoError> {
            let mut records = self.records.lock().unwrap();
            let record = records
                .get_mut(&id)
                .ok_or_else(|| RepoError::not_found("QuotePart", id))?;
            record.conversion = state.clone();
            Ok(())
        }

        async fn set_source_file(
            &self,
            id: Uuid,
            file_key: &str,
            file_name: &str,
        ) -> Result<(), RepoError> {
            let mut records = self.records.lock().unwrap();
            let record = records
                .get_mut(&id)
                .ok_or_else(|| RepoError::not_found("QuotePart", id))?;
            record.source_file_key = Some(file_key.to_string());
            record.source_file_name = Some(file_name.to_string());
            Ok(())
        }
    }

    struct FakeStore;

    #[async_trait]
    impl ObjectStorePort for FakeStore {
        async fn get(&self, _key: &str) -> Result<Vec<u8>, ObjectStoreError> {
            Ok(b"solid".to_vec())
        }

        async fn put(
            &self,
            key: &str,
            _bytes: Vec<u8>,
            _content_type: &str,
        ) -> Result<String, ObjectStoreError> {
            Ok(key.to_string())
        }

        async fn copy(&self, _source: &str, _dest: &str) -> Result<(), ObjectStoreError> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> Result<(), ObjectStoreError> {
            Ok(())
        }
    }

    /// Tracks how many conversions are between submit and download at once.
    struct GaugeService {
        current: AtomicUsize,
        peak: AtomicUsize,
        poll_delay: Duration,
    }

    impl GaugeService {
        fn new(poll_delay: Duration) -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                poll_delay,
            }
        }
    }

    #[async_trait]
    impl ConversionServicePort for GaugeService {
        async fn submit(
            &self,
            _bytes: Vec<u8>,
            _filename: &str,
            _options: ConversionOptions,
        ) -> Result<String, ConversionServiceError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            Ok(Uuid::new_v4().to_string())
        }

        async fn poll(&self, _job_id: &str) -> Result<JobStatus, ConversionServiceError> {
            // Hold the job open briefly so overlap is observable.
            sleep(self.poll_delay).await;
            Ok(JobStatus::Completed)
        }

        async fn download(&self, job_id: &str) -> Result<ConvertedFile, ConversionServiceError> {
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(ConvertedFile {
                filename: format!("{job_id}.glb"),
                bytes: b"mesh".to_vec(),
            })
        }

        async fn check_health(&self) -> Result<bool, ConversionServiceError> {
            Ok(true)
        }
    }

    struct NoopEvents;

    #[async_trait]
    impl EventBusPort for NoopEvents {
        async fn publish(
            &self,
            _event: DomainEvent,
        ) -> Result<(), crate::infrastructure::ports::EventBusError> {
            Ok(())
        }
    }

    struct FixedSettings(AppSettings);

    #[async_trait]
    impl SettingsRepo for FixedSettings {
        async fn get(&self) -> Result<Option<AppSettings>, RepoError> {
            Ok(Some(self.0.clone()))
        }

        async fn save(&self, _settings: &AppSettings) -> Result<(), RepoError> {
            Ok(())
        }
    }

    fn fake_orchestrator(
        ids: &[Uuid],
        settings: AppSettings,
        service: Arc<dyn ConversionServicePort>,
    ) -> ConvertCadFile {
        let records: HashMap<Uuid, ConvertibleRecord> = ids
            .iter()
            .map(|&id| (id, pending_record(id, EntityKind::QuotePart, "part.step")))
            .collect();
        ConvertCadFile::new(
            Arc::new(FakeConvertibles {
                kind: EntityKind::QuotePart,
                records: Mutex::new(records),
            }),
            Arc::new(FakeStore),
            service,
            Arc::new(FixedSettings(settings)),
            Arc::new(NoopEvents),
            Arc::new(crate::infrastructure::clock::FixedClock(fixed_now())),
        )
    }

    #[tokio::test]
    async fn batch_of_seven_completes_all_without_exceeding_cap() {
        let ids: Vec<Uuid> = (0..7).map(|_| Uuid::new_v4()).collect();
        let service = Arc::new(GaugeService::new(Duration::from_millis(5)));
        let orchestrator = fake_orchestrator(
            &ids,
            AppSettings {
                poll_interval_ms: 1,
                poll_max_attempts: 5,
                max_concurrent_conversions: 3,
                ..AppSettings::default()
            },
            service.clone(),
        );

        let results = orchestrator.convert_batch(&ids).await;

        assert_eq!(results.len(), 7);
        for (id, result) in &results {
            match result {
                Ok(ConversionOutcome::Completed { .. }) => {}
                other => panic!("entity {id} did not complete: {other:?}"),
            }
        }
        let peak = service.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {peak}");
        assert!(peak >= 2, "group members should overlap, peak was {peak}");
    }

    #[tokio::test]
    async fn second_concurrent_convert_for_same_entity_is_rejected() {
        let id = Uuid::new_v4();
        let service = Arc::new(GaugeService::new(Duration::from_millis(100)));
        let orchestrator = Arc::new(fake_orchestrator(
            &[id],
            AppSettings {
                poll_interval_ms: 20,
                poll_max_attempts: 10,
                ..AppSettings::default()
            },
            service,
        ));

        let first = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.convert(id).await })
        };
        // Give the first call time to take the in-flight slot.
        sleep(Duration::from_millis(5)).await;

        let second = orchestrator.convert(id).await;
        assert!(matches!(second, Err(ConversionError::AlreadyRunning)));

        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, ConversionOutcome::Completed { .. }));
    }
}
