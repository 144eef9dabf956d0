//! Asset migration between object-store namespaces.
//!
//! When a quote part becomes a permanent part its CAD file, mesh,
//! thumbnail and version history move into the part namespace. Byte
//! copying follows a degrade-not-fail policy: a failed copy falls back to
//! referencing the original object (still viewable from the quote-part
//! namespace) instead of sinking the whole conversion. Record creation is
//! the transaction's business, not ours - this type never touches the
//! database except to read version history.

use std::sync::Arc;

use quoteforge_domain::{CadVersion, EntityKind, QuotePart};
use uuid::Uuid;

use crate::infrastructure::ports::{
    CadVersionRepo, ClockPort, ObjectStorePort, PartFileRefs, RepoError,
};

/// Result of migrating one quote part's binary assets.
#[derive(Debug, Clone)]
pub struct MigratedAssets {
    /// File references for the new part; each either points into the part
    /// namespace or, after a failed copy, at the original object.
    pub refs: PartFileRefs,
    /// Version rows to insert for the destination entity.
    pub versions: Vec<CadVersion>,
}

pub struct AssetMigrator {
    object_store: Arc<dyn ObjectStorePort>,
    cad_versions: Arc<dyn CadVersionRepo>,
    clock: Arc<dyn ClockPort>,
}

impl AssetMigrator {
    pub fn new(
        object_store: Arc<dyn ObjectStorePort>,
        cad_versions: Arc<dyn CadVersionRepo>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            object_store,
            cad_versions,
            clock,
        }
    }

    /// Copy one object, falling back to the source key when the copy fails.
    ///
    /// The fallback keeps the file viewable by reference; relocation can be
    /// reconciled later. See the tradeoff note in DESIGN.md.
    pub async fn copy_asset(&self, source_key: &str, dest_key: &str) -> String {
        match self.object_store.copy(source_key, dest_key).await {
            Ok(()) => dest_key.to_string(),
            Err(e) => {
                tracing::warn!(
                    source_key,
                    dest_key,
                    error = %e,
                    "asset copy failed; falling back to original reference"
                );
                source_key.to_string()
            }
        }
    }

    /// Relocate a quote part's current assets and version history into a
    /// new part's namespace.
    pub async fn migrate_part_assets(
        &self,
        quote_part: &QuotePart,
        part_id: Uuid,
    ) -> Result<MigratedAssets, RepoError> {
        let dest_kind = EntityKind::Part;
        let mut refs = PartFileRefs::default();

        if let Some(source_key) = quote_part.source_file_key() {
            let file_name = quote_part
                .source_file_name()
                .map(|s| s.to_string())
                .unwrap_or_else(|| basename(source_key));
            let dest_key = dest_kind.source_key(part_id, &file_name);
            refs.source_file_key = Some(self.copy_asset(source_key, &dest_key).await);
            refs.source_file_name = Some(file_name);
        }

        if let Some(mesh_key) = quote_part.conversion().mesh_file_key() {
            let dest_key = dest_kind.mesh_key(part_id, &basename(mesh_key));
            refs.mesh_file_key = Some(self.copy_asset(mesh_key, &dest_key).await);
        }

        if let Some(thumb_key) = quote_part.thumbnail_key() {
            let dest_key = dest_kind.thumbnail_key(part_id, &basename(thumb_key));
            refs.thumbnail_key = Some(self.copy_asset(thumb_key, &dest_key).await);
        }

        let versions = self
            .copy_version_history(
                EntityKind::QuotePart,
                quote_part.id().to_uuid(),
                dest_kind,
                part_id,
            )
            .await?;

        Ok(MigratedAssets { refs, versions })
    }

    /// Copy every CAD revision of the source entity to versioned paths
    /// under the destination and return the destination rows, preserving
    /// version numbers and the current flag.
    ///
    /// Individual copy failures are logged and that version skipped; a
    /// partial history must not abort the surrounding part migration.
    pub async fn copy_version_history(
        &self,
        source_kind: EntityKind,
        source_id: Uuid,
        dest_kind: EntityKind,
        dest_id: Uuid,
    ) -> Result<Vec<CadVersion>, RepoError> {
        let source_versions = self
            .cad_versions
            .list_for_entity(source_kind, source_id)
            .await?;

        let now = self.clock.now();
        let mut migrated = Vec::with_capacity(source_versions.len());
        for version in &source_versions {
            let dest_key = dest_kind.versioned_source_key(
                dest_id,
                version.version(),
                version.file_name(),
            );
            if let Err(e) = self.object_store.copy(version.file_key(), &dest_key).await {
                tracing::warn!(
                    source_key = version.file_key(),
                    dest_key,
                    version = version.version(),
                    error = %e,
                    "version copy failed; skipping this revision"
                );
                continue;
            }
            migrated.push(version.rehomed(dest_kind, dest_id, dest_key, now));
        }

        Ok(migrated)
    }
}

fn basename(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::{
        MockCadVersionRepo, MockObjectStorePort, ObjectStoreError,
    };
    use chrono::{TimeZone, Utc};
    use mockall::predicate::*;
    use quoteforge_domain::{PartName, QuoteId, QuotePartId};

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 14, 0, 0).unwrap()
    }

    fn quote_part_with_assets() -> QuotePart {
        let now = fixed_now();
        let mut part = QuotePart::new(QuoteId::new(), PartName::new("Flange").unwrap(), now);
        let qp = part.id().to_uuid();
        part.replace_source_file(
            EntityKind::QuotePart.source_key(qp, "flange.step"),
            "flange.step",
            now,
        );
        part.set_thumbnail(EntityKind::QuotePart.thumbnail_key(qp, "flange.png"), now);
        let mut state = part.conversion().clone();
        state.mark_queued(now).unwrap();
        state.mark_in_progress("job-1").unwrap();
        state
            .complete(EntityKind::QuotePart.mesh_key(qp, "flange.glb"), now)
            .unwrap();
        part.set_conversion(state, now);
        part
    }

    fn migrator(
        object_store: MockObjectStorePort,
        cad_versions: MockCadVersionRepo,
    ) -> AssetMigrator {
        AssetMigrator::new(
            Arc::new(object_store),
            Arc::new(cad_versions),
            Arc::new(FixedClock(fixed_now())),
        )
    }

    #[tokio::test]
    async fn successful_migration_points_into_part_namespace() {
        let quote_part = quote_part_with_assets();
        let part_id = Uuid::new_v4();

        let mut object_store = MockObjectStorePort::new();
        object_store.expect_copy().times(3).returning(|_, _| Ok(()));
        let mut cad_versions = MockCadVersionRepo::new();
        cad_versions
            .expect_list_for_entity()
            .returning(|_, _| Ok(Vec::new()));

        let migrated = migrator(object_store, cad_versions)
            .migrate_part_assets(&quote_part, part_id)
            .await
            .unwrap();

        assert_eq!(
            migrated.refs.source_file_key.as_deref(),
            Some(EntityKind::Part.source_key(part_id, "flange.step").as_str())
        );
        assert_eq!(
            migrated.refs.mesh_file_key.as_deref(),
            Some(EntityKind::Part.mesh_key(part_id, "flange.glb").as_str())
        );
        assert_eq!(
            migrated.refs.thumbnail_key.as_deref(),
            Some(
                EntityKind::Part
                    .thumbnail_key(part_id, "flange.png")
                    .as_str()
            )
        );
    }

    #[tokio::test]
    async fn failed_copy_falls_back_to_original_key() {
        let quote_part = quote_part_with_assets();
        let part_id = Uuid::new_v4();
        let original_source = quote_part.source_file_key().unwrap().to_string();

        let mut object_store = MockObjectStorePort::new();
        // Source copy fails; mesh and thumbnail succeed.
        object_store
            .expect_copy()
            .withf(move |source, _| source.contains("/source/"))
            .returning(|key, _| Err(ObjectStoreError::io(key, "connection reset")));
        object_store
            .expect_copy()
            .returning(|_, _| Ok(()));
        let mut cad_versions = MockCadVersionRepo::new();
        cad_versions
            .expect_list_for_entity()
            .returning(|_, _| Ok(Vec::new()));

        let migrated = migrator(object_store, cad_versions)
            .migrate_part_assets(&quote_part, part_id)
            .await
            .unwrap();

        // Degraded but usable: the reference still resolves to the
        // original quote-part object.
        assert_eq!(migrated.refs.source_file_key.as_deref(), Some(original_source.as_str()));
        assert_eq!(
            migrated.refs.mesh_file_key.as_deref(),
            Some(EntityKind::Part.mesh_key(part_id, "flange.glb").as_str())
        );
    }

    #[tokio::test]
    async fn version_history_preserves_numbers_and_currency() {
        let source_id = Uuid::new_v4();
        let dest_id = Uuid::new_v4();
        let now = fixed_now();

        let history: Vec<CadVersion> = (1..=3)
            .map(|n| {
                CadVersion::new(
                    EntityKind::QuotePart,
                    source_id,
                    n,
                    EntityKind::QuotePart.versioned_source_key(source_id, n, "flange.step"),
                    "flange.step",
                    n == 3,
                    now,
                )
            })
            .collect();

        let mut object_store = MockObjectStorePort::new();
        object_store.expect_copy().times(3).returning(|_, _| Ok(()));
        let mut cad_versions = MockCadVersionRepo::new();
        cad_versions
            .expect_list_for_entity()
            .with(eq(EntityKind::QuotePart), eq(source_id))
            .returning(move |_, _| Ok(history.clone()));

        let migrated = migrator(object_store, cad_versions)
            .copy_version_history(EntityKind::QuotePart, source_id, EntityKind::Part, dest_id)
            .await
            .unwrap();

        assert_eq!(migrated.len(), 3);
        let versions: Vec<u32> = migrated.iter().map(|v| v.version()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        let current: Vec<bool> = migrated.iter().map(|v| v.is_current()).collect();
        assert_eq!(current.iter().filter(|&&c| c).count(), 1);
        assert!(migrated[2].is_current());
        assert!(migrated
            .iter()
            .all(|v| v.file_key().starts_with(&format!("parts/{dest_id}/source/v"))));
    }

    #[tokio::test]
    async fn version_copy_failure_skips_that_revision_only() {
        let source_id = Uuid::new_v4();
        let dest_id = Uuid::new_v4();
        let now = fixed_now();

        let history: Vec<CadVersion> = (1..=3)
            .map(|n| {
                CadVersion::new(
                    EntityKind::QuotePart,
                    source_id,
                    n,
                    format!("quote-parts/{source_id}/source/v{n}/flange.step"),
                    "flange.step",
                    n == 3,
                    now,
                )
            })
            .collect();

        let mut object_store = MockObjectStorePort::new();
        object_store
            .expect_copy()
            .returning(|source, _| {
                if source.contains("/v2/") {
                    Err(ObjectStoreError::io(source, "timeout"))
                } else {
                    Ok(())
                }
            });
        let mut cad_versions = MockCadVersionRepo::new();
        cad_versions
            .expect_list_for_entity()
            .returning(move |_, _| Ok(history.clone()));

        let migrated = migrator(object_store, cad_versions)
            .copy_version_history(EntityKind::QuotePart, source_id, EntityKind::Part, dest_id)
            .await
            .unwrap();

        let versions: Vec<u32> = migrated.iter().map(|v| v.version()).collect();
        assert_eq!(versions, vec![1, 3]);
    }
}
