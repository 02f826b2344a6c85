//! Tests for context merging and reset rules.

#[cfg(test)]
mod tests {
    use crate::context::{ContextDelta, PersistedContext};
    use crate::core::{
        AddOnReport, ArtifactCoordinate, ArtifactRef, BuildStatus, ComponentBuild, ContextField,
        DocumentArtifact, DocumentKind, ImportResult, RepositoryManifest, RepositorySource,
        StageId,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn context() -> PersistedContext {
        PersistedContext::new("/releases/product", "sig")
    }

    fn import_result() -> ImportResult {
        ImportResult {
            product_id: "p1".to_string(),
            version_id: "v1".to_string(),
            milestone_id: "m1".to_string(),
            milestone_name: "CR1".to_string(),
            group_id: "g1".to_string(),
            components: BTreeMap::new(),
        }
    }

    fn manifest(location: &str) -> RepositoryManifest {
        RepositoryManifest {
            location: location.into(),
            source: RepositorySource::Remote,
            deduplicated: false,
            artifacts: vec![ArtifactRef::new(
                ArtifactCoordinate::new("g", "a", "1.0", "jar"),
                "https://repo/g/a/1.0/a-1.0.jar",
            )],
        }
    }

    /// Context with every stage up to and including the repository completed.
    fn populated() -> PersistedContext {
        let mut ctx = context();
        ctx.apply(
            ContextDelta::new()
                .with_full_version("1.0.0.CR1")
                .with_import_result(import_result()),
        )
        .unwrap();
        ctx.mark_completed(StageId::Configure);
        ctx.apply(ContextDelta::new().with_builds("group", vec![ComponentBuild::success("a", "1", "d")]))
            .unwrap();
        ctx.mark_completed(StageId::Build);
        ctx.apply(ContextDelta::new().with_repository_manifest(manifest("/r/m.json")))
            .unwrap();
        ctx.mark_completed(StageId::RepositoryGeneration);
        ctx
    }

    #[test]
    fn test_new_context_is_empty() {
        let ctx = context();
        assert_eq!(ctx.schema_version(), crate::context::SCHEMA_VERSION);
        assert_eq!(ctx.revision(), 0);
        assert!(ctx.completed_stages().is_empty());
        assert!(!ctx.has(ContextField::FullVersion));
        assert!(!ctx.is_released());
    }

    #[test]
    fn test_full_version_is_set_once() {
        let mut ctx = context();
        ctx.apply(ContextDelta::new().with_full_version("1.0.0.CR1")).unwrap();
        ctx.apply(ContextDelta::new().with_full_version("1.0.0.CR1")).unwrap();

        let err = ctx
            .apply(ContextDelta::new().with_full_version("1.0.0.CR2"))
            .unwrap_err();
        assert_eq!(err.field, "full_version");
        assert_eq!(ctx.full_version(), Some("1.0.0.CR1"));
    }

    #[test]
    fn test_conflicting_delta_changes_nothing() {
        let mut ctx = context();
        ctx.apply(ContextDelta::new().with_full_version("1.0")).unwrap();

        let delta = ContextDelta::new()
            .with_full_version("2.0")
            .with_import_result(import_result());
        assert!(ctx.apply(delta).is_err());
        assert!(ctx.import_result().is_none());
    }

    #[test]
    fn test_builds_are_append_only() {
        let mut ctx = context();
        ctx.apply(ContextDelta::new().with_builds("group", vec![ComponentBuild::success("a", "1", "d")]))
            .unwrap();
        ctx.apply(ContextDelta::new().with_builds("group", vec![ComponentBuild::success("b", "2", "d")]))
            .unwrap();
        ctx.apply(ContextDelta::new().with_builds("group", vec![ComponentBuild::success("a", "3", "d")]))
            .unwrap();

        let result = ctx.build_group_result().unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("a").unwrap().build_id, "3");
        assert_eq!(result.superseded.len(), 1);
        assert_eq!(result.get("b").unwrap().status, BuildStatus::Success);
    }

    #[test]
    fn test_builds_from_other_group_conflict() {
        let mut ctx = context();
        ctx.apply(ContextDelta::new().with_builds("group", vec![])).unwrap();
        let err = ctx
            .apply(ContextDelta::new().with_builds("other", vec![ComponentBuild::success("a", "1", "d")]))
            .unwrap_err();
        assert_eq!(err.field, "build_group_result.group");
    }

    #[test]
    fn test_add_on_reports_replace_by_name() {
        let mut ctx = context();
        ctx.apply(ContextDelta::new().with_add_on_reports(vec![AddOnReport::failure("notes", "boom")]))
            .unwrap();
        ctx.apply(ContextDelta::new().with_add_on_reports(vec![AddOnReport::success("notes", "ok")]))
            .unwrap();

        assert_eq!(ctx.add_on_reports(), &[AddOnReport::success("notes", "ok")]);
    }

    #[test]
    fn test_mark_completed_only_grows() {
        let mut ctx = context();
        ctx.mark_completed(StageId::Configure);
        ctx.mark_completed(StageId::Build);
        ctx.mark_completed(StageId::Configure);
        assert_eq!(ctx.completed_stages(), &[StageId::Configure, StageId::Build]);
    }

    #[test]
    fn test_reset_from_build_keeps_configure_outputs() {
        let mut ctx = populated();
        let run_id = ctx.run_id();
        ctx.reset_from(StageId::Build);

        assert_eq!(ctx.completed_stages(), &[StageId::Configure]);
        assert_eq!(ctx.full_version(), Some("1.0.0.CR1"));
        assert!(ctx.build_group_result().is_none());
        assert!(ctx.repository_manifest().is_none());
        assert_eq!(ctx.run_id(), run_id);
    }

    #[test]
    fn test_reset_from_configure_yields_fresh_context() {
        let mut ctx = populated();
        let run_id = ctx.run_id();
        ctx.reset_from(StageId::Configure);

        assert!(ctx.completed_stages().is_empty());
        assert!(ctx.full_version().is_none());
        assert_ne!(ctx.run_id(), run_id);
        assert_eq!(ctx.signature(), "sig");
    }

    #[test]
    fn test_clear_outputs_keeps_builds() {
        let mut ctx = populated();
        ctx.clear_outputs_of(StageId::Build);
        ctx.clear_outputs_of(StageId::RepositoryGeneration);

        assert!(ctx.build_group_result().is_some());
        assert!(ctx.repository_manifest().is_none());
        assert!(ctx.is_completed(StageId::RepositoryGeneration));
    }

    #[test]
    fn test_documents_are_keyed_by_kind() {
        let mut ctx = context();
        ctx.apply(ContextDelta::new().with_document(DocumentArtifact::new(DocumentKind::Licenses, "/a", 1)))
            .unwrap();
        ctx.apply(ContextDelta::new().with_document(DocumentArtifact::new(DocumentKind::Licenses, "/b", 2)))
            .unwrap();

        assert_eq!(ctx.documents().len(), 1);
        assert_eq!(ctx.document(DocumentKind::Licenses).unwrap().entries, 2);
    }

    #[test]
    fn test_progress_reports_next_stage() {
        let mut ctx = populated();
        ctx.next_revision();
        let progress = ctx.progress();

        assert_eq!(progress.revision, 1);
        assert_eq!(progress.full_version.as_deref(), Some("1.0.0.CR1"));
        assert_eq!(progress.next_stage(), Some(StageId::SourcesGeneration));
    }

    #[test]
    fn test_context_survives_serialization() {
        let ctx = populated();
        let json = serde_json::to_string(&ctx).unwrap();
        let restored: PersistedContext = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ctx);
    }

    #[test]
    fn test_empty_delta() {
        assert!(ContextDelta::new().is_empty());
        assert!(ContextDelta::new().with_builds("g", vec![]).is_empty());
        assert!(!ContextDelta::new().with_full_version("1").is_empty());
    }
}
