//! Document stages: sources, javadoc, licenses, shared content and documents.

use super::{StageContext, StageRunner};
use crate::context::ContextDelta;
use crate::core::{DocumentKind, StageId};
use crate::errors::{FailureKind, StageFailure};
use crate::remote::{DocumentGenerator, DocumentRequest};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Produces one kind of document through its registered generator.
pub struct DocumentStage {
    kind: DocumentKind,
    generator: Option<Arc<dyn DocumentGenerator>>,
}

impl fmt::Debug for DocumentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStage")
            .field("kind", &self.kind)
            .field("has_generator", &self.generator.is_some())
            .finish()
    }
}

impl DocumentStage {
    /// Creates the stage for a document kind.
    #[must_use]
    pub fn new(kind: DocumentKind, generator: Option<Arc<dyn DocumentGenerator>>) -> Self {
        Self { kind, generator }
    }

    /// The document kind produced.
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }
}

#[async_trait]
impl StageRunner for DocumentStage {
    fn stage(&self) -> StageId {
        self.kind.stage()
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<ContextDelta, StageFailure> {
        let stage = self.stage();
        let generator = self.generator.as_ref().ok_or_else(|| {
            StageFailure::configuration(
                stage,
                format!("no generator registered for {} documents", self.kind),
            )
        })?;
        let full_version = ctx.full_version(stage)?;
        let output_dir = ctx.config.release_path(full_version);
        let prefix = ctx.config.release_dir_name(full_version);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|err| StageFailure::io(stage, &output_dir, &err))?;

        let request = DocumentRequest {
            kind: self.kind,
            full_version,
            builds: ctx.context.build_group_result(),
            manifest: ctx.context.repository_manifest(),
            output_dir: &output_dir,
            prefix: &prefix,
        };
        let document = generator
            .generate(&request)
            .await
            .map_err(|err| StageFailure::remote(stage, err))?;
        if document.kind != self.kind {
            return Err(StageFailure::new(
                stage,
                FailureKind::Integrity,
                format!("generator returned a {} document instead of {}", document.kind, self.kind),
            ));
        }
        info!(
            kind = %self.kind,
            location = %document.location.display(),
            entries = document.entries,
            "Document generated"
        );
        Ok(ContextDelta::new().with_document(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::config::RunOptions;
    use crate::core::DocumentArtifact;
    use crate::remote::RemoteError;
    use crate::testing::{built_context, sample_config, FakeDocumentGenerator};
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct WrongKind;

    #[async_trait]
    impl DocumentGenerator for WrongKind {
        async fn generate(&self, request: &DocumentRequest<'_>) -> Result<DocumentArtifact, RemoteError> {
            Ok(DocumentArtifact::new(DocumentKind::Sources, request.output_dir, 0))
        }
    }

    async fn run(stage: &DocumentStage) -> (Result<ContextDelta, StageFailure>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config(dir.path()).unwrap();
        let context = built_context(&config);
        let options = RunOptions::new();
        let token = CancellationToken::new();
        let ctx = StageContext {
            context: &context,
            config: &config,
            options: &options,
            policy: options.rebuild_mode,
            cancellation: &token,
        };
        (stage.execute(&ctx).await, dir)
    }

    #[tokio::test]
    async fn test_generates_document_into_release_dir() {
        let generator = Arc::new(FakeDocumentGenerator::new());
        let stage = DocumentStage::new(DocumentKind::Javadoc, Some(generator.clone()));

        let (result, dir) = run(&stage).await;

        let delta = result.unwrap();
        assert_eq!(stage.stage(), StageId::JavadocGeneration);
        let document = &delta.documents[0];
        assert_eq!(document.kind, DocumentKind::Javadoc);
        assert!(document.location.starts_with(dir.path()));
        assert!(document.location.exists());
        assert_eq!(generator.calls(), vec![DocumentKind::Javadoc]);
    }

    #[tokio::test]
    async fn test_missing_generator_is_configuration_error() {
        let stage = DocumentStage::new(DocumentKind::Licenses, None);

        let (result, _dir) = run(&stage).await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, FailureKind::Configuration);
        assert_eq!(err.stage, StageId::LicensesGeneration);
    }

    #[tokio::test]
    async fn test_wrong_document_kind_is_integrity_error() {
        let stage = DocumentStage::new(DocumentKind::Documents, Some(Arc::new(WrongKind)));

        let (result, _dir) = run(&stage).await;

        assert_eq!(result.unwrap_err().kind, FailureKind::Integrity);
    }
}
