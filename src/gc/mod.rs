//! Dangling container image collection.
//!
//! Container pushes upload content-addressed versions first and the index
//! manifest that references them last. Deleting or overwriting an index
//! manifest later leaves `sha256:*` versions behind with nothing pointing
//! at them; this module finds and removes those versions together with
//! their files and properties.

mod scan;
mod sweep;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::metadata::PostgresMetadataPool;
use scan::scan_versions;
use sweep::sweep_version_batch;

/// Default number of version ids per relational delete predicate.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Stable start marker for log watchers.
pub const CLEANUP_START: &str =
    "Start to clean up dangling container images with a sha256:* version";
/// Stable finish marker for log watchers, emitted even when the run fails.
pub const CLEANUP_FINISH: &str =
    "Finished cleaning up dangling container images with a sha256:* version";

/// Finds and deletes container package versions named by a content digest
/// that no index manifest references.
///
/// One logical pass per invocation. Must not be run concurrently against
/// the same package store: two interleaved runs would compute overlapping
/// dangling sets and race on the deletes. All scan state is private to a
/// run and discarded at its end.
pub struct DanglingImageCollector {
    metadata: PostgresMetadataPool,
    batch_size: usize,
}

impl DanglingImageCollector {
    pub fn new(metadata: PostgresMetadataPool, batch_size: usize) -> Self {
        Self {
            metadata,
            // chunks() requires a non-zero size
            batch_size: batch_size.max(1),
        }
    }

    /// Run one collection pass. `older_than` is the grace period: versions
    /// younger than it are never deleted, whatever their reference status,
    /// so an upload racing the scan cannot lose its layers.
    ///
    /// Idempotent. A failed run rolls back in full and the next invocation
    /// rediscovers the same dangling set.
    pub async fn cleanup(&self, older_than: Duration) -> Result<()> {
        info!("{CLEANUP_START}");
        let res = self.collect(older_than).await;
        info!("{CLEANUP_FINISH}");
        res
    }

    async fn collect(&self, older_than: Duration) -> Result<()> {
        let mut tx = self.metadata.get_tx().await?;

        // Taken before the inventory so an image created while the scan
        // runs can never appear old enough to delete.
        let cutoff = Utc::now() - older_than;

        debug!("Look for all package_versions.lower_version that start with sha256:");
        let outcome = {
            let rows = tx.stream_container_versions()?;
            scan_versions(rows).await?
        };

        let dangling = outcome.resolve();
        if dangling.is_empty() {
            if dangling.digest_versions_seen {
                debug!(
                    "All container images with a version matching sha256:* are referenced by an \
                     index manifest"
                );
            } else {
                debug!("There are no container images with a version matching sha256:*");
            }
            info!("Nothing to clean up");
            // read-only so far; dropping the tx rolls it back
            return Ok(());
        }

        let found = dangling.len();
        warn!(
            "{found} container image(s) with a version matching sha256:* are not referenced by \
             an index manifest"
        );

        let (version_ids, too_young) = dangling.deletable_before(cutoff);
        if too_young > 0 {
            warn!(
                "{too_young} out of {found} container image(s) are not deleted because they were \
                 created less than {older_than} ago"
            );
        }

        debug!(
            "Deleting unreferenced image versions from `package_versions`, `package_files` and \
             `package_properties` ({} at a time)",
            self.batch_size
        );
        for batch in version_ids.chunks(self.batch_size) {
            sweep_version_batch(&mut tx, batch).await?;
        }

        tx.commit().await
    }
}
