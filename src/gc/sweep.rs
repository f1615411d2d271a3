use tracing::info;

use crate::errors::Result;
use crate::metadata::{PostgresMetadataTx, PropertyRefKind};

/// Delete one batch of versions together with their files and the
/// properties keyed to either. Runs inside the caller's transaction; a
/// failure anywhere rolls the whole run back.
///
/// Row counts are logged per relation so operators can audit what a run
/// removed.
pub(crate) async fn sweep_version_batch(
    tx: &mut PostgresMetadataTx<'_>,
    version_ids: &[i64],
) -> Result<()> {
    let file_ids = tx.select_version_file_ids(version_ids).await?;

    let files_removed = tx.delete_files(&file_ids).await?;
    let file_properties_removed = tx
        .delete_properties(PropertyRefKind::File, &file_ids)
        .await?;
    info!(
        "Removing {files_removed} entries from `package_files` and {file_properties_removed} \
         from `package_properties`"
    );

    let versions_removed = tx.delete_versions(version_ids).await?;
    let version_properties_removed = tx
        .delete_properties(PropertyRefKind::Version, version_ids)
        .await?;
    info!(
        "Removing {versions_removed} entries from `package_versions` and \
         {version_properties_removed} from `package_properties`"
    );

    Ok(())
}
