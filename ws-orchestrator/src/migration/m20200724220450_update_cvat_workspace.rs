use super::{Migration, MigrationContext};
use crate::error::Result;
use crate::template::upsert_template_version;
use async_trait::async_trait;
use tracing::{debug, info};

pub const CVAT_TEMPLATE_NAME: &str = "CVAT";

/// Placeholder in the manifest fixture replaced by the namespace's storage backend.
pub const ARTIFACT_REPOSITORY_PLACEHOLDER: &str = "{{.ArtifactRepositoryType}}";

const CVAT_WORKSPACE_TEMPLATE_V4: &str = include_str!("manifests/cvat_v4.yaml");

/// Render the CVAT v4 manifest for a storage backend (`s3` or `gcs`).
///
/// Always rendered from the fixture, never from a stored manifest, so the
/// output only depends on `artifact_repository_type`.
pub fn cvat_manifest(artifact_repository_type: &str) -> String {
    CVAT_WORKSPACE_TEMPLATE_V4.replace(ARTIFACT_REPOSITORY_PLACEHOLDER, artifact_repository_type)
}

/// Moves every enabled namespace's CVAT template to v4 with a filesyncer image
/// matching its artifact repository.
pub struct UpdateCvatWorkspace;

#[async_trait]
impl Migration for UpdateCvatWorkspace {
    fn id(&self) -> i64 {
        20200724220450
    }

    fn description(&self) -> &'static str {
        "Update the CVAT workspace template to v4"
    }

    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let namespaces = ctx.namespaces.list_enabled_namespaces().await?;

        for namespace in namespaces {
            let config = ctx.namespaces.namespace_config(&namespace.name).await?;
            let repository_type = config.artifact_repository.repository_type();

            let upsert = upsert_template_version(
                &mut *ctx.conn,
                &namespace.name,
                CVAT_TEMPLATE_NAME,
                &cvat_manifest(repository_type),
            )
            .await?;

            if upsert.appended {
                info!(
                    "CVAT template in {} updated to version {} ({})",
                    namespace.name, upsert.template.version, repository_type
                );
            } else {
                debug!("CVAT template in {} already up to date", namespace.name);
            }
        }

        Ok(())
    }

    async fn down(&self, _ctx: &mut MigrationContext<'_>) -> Result<()> {
        // One-way manifest upgrade
        Ok(())
    }
}
