use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use tracing::warn;

use crate::container::{decode_manifest_refs, ManifestRefs, DIGEST_PREFIX};
use crate::errors::Result;
use crate::metadata::PackageVersionRow;

/// A content-digest version observed by the scan. It stays in the
/// candidate map until an index manifest claims its digest.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CandidateVersion {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct ScanOutcome {
    candidates: HashMap<String, CandidateVersion>,
    seen_references: HashSet<String>,
    digest_versions_seen: bool,
}

/// Single ordered pass over all container versions. Versions named by a
/// content digest become candidates; index manifests knock the digests
/// they reference out of the candidate map. A digest referenced before its
/// content version is observed (or one whose content version does not
/// exist at all) lands in the seen-references set instead, to be applied
/// by [`ScanOutcome::resolve`].
///
/// Malformed metadata is logged and treated as carrying no references.
pub(crate) async fn scan_versions<S>(mut rows: S) -> Result<ScanOutcome>
where
    S: Stream<Item = sqlx::Result<PackageVersionRow>> + Unpin,
{
    let mut outcome = ScanOutcome::default();

    while let Some(version) = rows.try_next().await? {
        if version.lower_version.starts_with(DIGEST_PREFIX) {
            outcome.digest_versions_seen = true;
            outcome.candidates.insert(
                version.lower_version,
                CandidateVersion {
                    id: version.id,
                    created_at: version.created_at,
                },
            );
        } else {
            match decode_manifest_refs(&version.metadata_json) {
                ManifestRefs::Index(digests) => {
                    for digest in digests {
                        if outcome.candidates.remove(&digest).is_none() {
                            outcome.seen_references.insert(digest);
                        }
                    }
                }
                ManifestRefs::NotAnIndex => {}
                ManifestRefs::Malformed(err) => {
                    warn!(
                        version_id = version.id,
                        metadata = %version.metadata_json,
                        error = %err,
                        "package_versions.metadata_json is not a JSON string containing valid \
                         metadata; it was ignored but it is an inconsistency in the database \
                         that should be looked at"
                    );
                }
            }
        }
    }

    Ok(outcome)
}

impl ScanOutcome {
    /// Out-of-order protection: drop every candidate whose digest any index
    /// manifest referenced before (or without) its content version being
    /// observed. What remains is the dangling set.
    pub(crate) fn resolve(mut self) -> DanglingSet {
        for digest in &self.seen_references {
            self.candidates.remove(digest);
        }
        DanglingSet {
            versions: self.candidates,
            digest_versions_seen: self.digest_versions_seen,
        }
    }
}

/// Content-digest versions no surviving index manifest references.
#[derive(Debug)]
pub(crate) struct DanglingSet {
    versions: HashMap<String, CandidateVersion>,
    /// Distinguishes "none exist" from "all referenced" on the empty path.
    /// Diagnostic only; never drives control flow.
    pub digest_versions_seen: bool,
}

impl DanglingSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.versions.len()
    }

    /// Version ids old enough to delete, plus the count held back by the
    /// grace period.
    pub(crate) fn deletable_before(&self, cutoff: DateTime<Utc>) -> (Vec<i64>, usize) {
        let mut ids = Vec::new();
        let mut too_young = 0;
        for candidate in self.versions.values() {
            if candidate.created_at < cutoff {
                ids.push(candidate.id);
            } else {
                too_young += 1;
            }
        }
        (ids, too_young)
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;
    use futures::stream;

    use super::*;

    fn version(id: i64, version: &str, metadata_json: &str, age: Duration) -> PackageVersionRow {
        PackageVersionRow {
            id,
            lower_version: version.to_string(),
            metadata_json: metadata_json.to_string(),
            created_at: Utc::now() - age,
        }
    }

    fn index_metadata(digests: &[&str]) -> String {
        let manifests = digests
            .iter()
            .map(|d| format!(r#"{{"platform":"linux/amd64","digest":"{d}"}}"#))
            .collect::<Vec<_>>()
            .join(",");
        format!(r#"{{"type":"oci","manifests":[{manifests}]}}"#)
    }

    async fn scan(rows: Vec<PackageVersionRow>) -> ScanOutcome {
        scan_versions(stream::iter(rows.into_iter().map(Ok::<_, sqlx::Error>)))
            .await
            .expect("scan failed")
    }

    #[tokio::test]
    async fn reference_in_upload_order_protects_the_content_version() {
        let rows = vec![
            version(1, "sha256:layer", "", Duration::hours(2)),
            version(2, "v1.0", &index_metadata(&["sha256:layer"]), Duration::hours(2)),
        ];
        let dangling = scan(rows).await.resolve();
        assert!(dangling.is_empty());
        assert!(dangling.digest_versions_seen);
    }

    #[tokio::test]
    async fn reference_out_of_upload_order_still_protects() {
        let rows = vec![
            version(1, "v1.0", &index_metadata(&["sha256:late"]), Duration::hours(2)),
            version(2, "sha256:late", "", Duration::hours(2)),
        ];
        let dangling = scan(rows).await.resolve();
        assert!(dangling.is_empty());
        assert!(dangling.digest_versions_seen);
    }

    #[tokio::test]
    async fn unreferenced_digest_version_is_dangling() {
        let rows = vec![version(7, "sha256:orphan", "", Duration::hours(2))];
        let dangling = scan(rows).await.resolve();
        assert_eq!(dangling.len(), 1);

        let (ids, too_young) = dangling.deletable_before(Utc::now() - Duration::hours(1));
        assert_eq!(ids, vec![7]);
        assert_eq!(too_young, 0);
    }

    #[tokio::test]
    async fn grace_period_holds_back_young_versions() {
        let rows = vec![
            version(1, "sha256:old", "", Duration::hours(2)),
            version(2, "sha256:new", "", Duration::minutes(30)),
        ];
        let dangling = scan(rows).await.resolve();
        assert_eq!(dangling.len(), 2);

        let (ids, too_young) = dangling.deletable_before(Utc::now() - Duration::hours(1));
        assert_eq!(ids, vec![1]);
        assert_eq!(too_young, 1);
    }

    #[tokio::test]
    async fn version_created_exactly_at_the_cutoff_is_kept() {
        let created = Utc::now();
        let row = PackageVersionRow {
            id: 1,
            lower_version: "sha256:edge".to_string(),
            metadata_json: String::new(),
            created_at: created,
        };
        let dangling = scan(vec![row]).await.resolve();

        let (ids, too_young) = dangling.deletable_before(created);
        assert!(ids.is_empty());
        assert_eq!(too_young, 1);
    }

    #[tokio::test]
    async fn malformed_metadata_does_not_abort_the_scan() {
        let rows = vec![
            version(1, "broken", r#"corrupted "manifests":[{ bad"#, Duration::hours(2)),
            version(2, "sha256:orphan", "", Duration::hours(2)),
        ];
        let dangling = scan(rows).await.resolve();
        assert_eq!(dangling.len(), 1);

        // the malformed version neither protects anything nor becomes a
        // candidate itself
        let (ids, _) = dangling.deletable_before(Utc::now() - Duration::hours(1));
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn reference_to_a_version_never_uploaded_is_inert() {
        let rows = vec![version(
            1,
            "v1.0",
            &index_metadata(&["sha256:ghost"]),
            Duration::hours(2),
        )];
        let dangling = scan(rows).await.resolve();
        assert!(dangling.is_empty());
        assert!(!dangling.digest_versions_seen);
    }

    #[tokio::test]
    async fn non_index_metadata_is_ignored() {
        let rows = vec![
            version(1, "sha256:orphan", "", Duration::hours(2)),
            version(2, "v1.0", r#"{"type":"oci","is_tagged":true}"#, Duration::hours(2)),
        ];
        let dangling = scan(rows).await.resolve();
        assert_eq!(dangling.len(), 1);
    }

    #[tokio::test]
    async fn storage_errors_abort_the_scan() {
        let rows = stream::iter(vec![
            Ok(version(1, "sha256:orphan", "", Duration::hours(2))),
            Err(sqlx::Error::RowNotFound),
        ]);
        assert!(scan_versions(rows).await.is_err());
    }
}
