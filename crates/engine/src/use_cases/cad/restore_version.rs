//! Explicit restore of an archived CAD revision.
//!
//! Restoring moves the current flag (atomically at the repository) and
//! points the entity back at the archived object. The mesh belonged to a
//! different revision of the geometry, so conversion resets to pending
//! exactly as a file replacement does.

use std::sync::Arc;

use quoteforge_domain::{ConversionState, SkipReason};
use uuid::Uuid;

use crate::infrastructure::ports::{CadVersionRepo, ClockPort, ConvertibleRepo};
use crate::use_cases::cad::replace_file::CadFileError;
use crate::use_cases::conversion::FormatGuard;

#[derive(Debug, Clone)]
pub struct RestoredCadVersion {
    pub version: u32,
    pub file_key: String,
    pub conversion_required: bool,
}

pub struct RestoreCadVersion {
    convertibles: Arc<dyn ConvertibleRepo>,
    cad_versions: Arc<dyn CadVersionRepo>,
    clock: Arc<dyn ClockPort>,
}

impl RestoreCadVersion {
    pub fn new(
        convertibles: Arc<dyn ConvertibleRepo>,
        cad_versions: Arc<dyn CadVersionRepo>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            convertibles,
            cad_versions,
            clock,
        }
    }

    pub async fn execute(
        &self,
        id: Uuid,
        version: u32,
    ) -> Result<RestoredCadVersion, CadFileError> {
        let kind = self.convertibles.entity_kind();
        if self.convertibles.get(id).await?.is_none() {
            return Err(CadFileError::EntityNotFound { kind, id });
        }

        let versions = self.cad_versions.list_for_entity(kind, id).await?;
        let target = versions
            .iter()
            .find(|v| v.version() == version)
            .ok_or(CadFileError::VersionNotFound { version })?;

        self.cad_versions.set_current(kind, id, version).await?;
        self.convertibles
            .set_source_file(id, target.file_key(), target.file_name())
            .await?;

        let mut state = ConversionState::pending();
        let format = FormatGuard::classify(target.file_name());
        let conversion_required = FormatGuard::needs_conversion(format);
        if !conversion_required {
            state.skip(SkipReason::NotRequired, self.clock.now())?;
        }
        self.convertibles.save_state(id, &state).await?;

        tracing::info!(
            entity_kind = %kind,
            entity_id = %id,
            version,
            "CAD version restored"
        );
        Ok(RestoredCadVersion {
            version,
            file_key: target.file_key().to_string(),
            conversion_required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::{
        ConvertibleRecord, MockCadVersionRepo, MockConvertibleRepo,
    };
    use chrono::{TimeZone, Utc};
    use mockall::predicate::*;
    use quoteforge_domain::{CadVersion, ConversionStatus, EntityKind};
    use std::sync::Mutex;

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 2, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn restore_moves_current_flag_and_resets_conversion() {
        let id = Uuid::new_v4();
        let mut convertibles = MockConvertibleRepo::new();
        convertibles
            .expect_entity_kind()
            .return_const(EntityKind::Part);
        convertibles.expect_get().returning(move |id| {
            Ok(Some(ConvertibleRecord {
                id,
                kind: EntityKind::Part,
                source_file_key: Some(format!("parts/{id}/source/v2/b.step")),
                source_file_name: Some("b.step".to_string()),
                conversion: ConversionState::pending(),
            }))
        });
        convertibles
            .expect_set_source_file()
            .withf(|_, key, name| key.contains("/v1/") && name == "a.step")
            .returning(|_, _, _| Ok(()));
        let saved_state = Arc::new(Mutex::new(None));
        let sink = saved_state.clone();
        convertibles.expect_save_state().returning(move |_, state| {
            *sink.lock().unwrap() = Some(state.clone());
            Ok(())
        });

        let mut cad_versions = MockCadVersionRepo::new();
        let history = vec![
            CadVersion::new(
                EntityKind::Part,
                id,
                1,
                format!("parts/{id}/source/v1/a.step"),
                "a.step",
                false,
                fixed_now(),
            ),
            CadVersion::new(
                EntityKind::Part,
                id,
                2,
                format!("parts/{id}/source/v2/b.step"),
                "b.step",
                true,
                fixed_now(),
            ),
        ];
        cad_versions
            .expect_list_for_entity()
            .returning(move |_, _| Ok(history.clone()));
        cad_versions
            .expect_set_current()
            .with(eq(EntityKind::Part), eq(id), eq(1u32))
            .returning(|_, _, _| Ok(()));

        let restored = RestoreCadVersion::new(
            Arc::new(convertibles),
            Arc::new(cad_versions),
            Arc::new(FixedClock(fixed_now())),
        )
        .execute(id, 1)
        .await
        .unwrap();

        assert_eq!(restored.version, 1);
        assert!(restored.conversion_required);
        assert_eq!(
            saved_state.lock().unwrap().as_ref().unwrap().status(),
            ConversionStatus::Pending
        );
    }

    #[tokio::test]
    async fn missing_version_is_a_typed_error() {
        let id = Uuid::new_v4();
        let mut convertibles = MockConvertibleRepo::new();
        convertibles
            .expect_entity_kind()
            .return_const(EntityKind::Part);
        convertibles.expect_get().returning(move |id| {
            Ok(Some(ConvertibleRecord {
                id,
                kind: EntityKind::Part,
                source_file_key: None,
                source_file_name: None,
                conversion: ConversionState::pending(),
            }))
        });
        let mut cad_versions = MockCadVersionRepo::new();
        cad_versions
            .expect_list_for_entity()
            .returning(|_, _| Ok(Vec::new()));

        let err = RestoreCadVersion::new(
            Arc::new(convertibles),
            Arc::new(cad_versions),
            Arc::new(FixedClock(fixed_now())),
        )
        .execute(id, 7)
        .await
        .unwrap_err();

        assert!(matches!(err, CadFileError::VersionNotFound { version: 7 }));
    }
}
