//! Container image package conventions.
//!
//! Container pushes create one package version per manifest. A version
//! named by its content digest (`sha256:<hex>`) holds a single image
//! manifest; a tagged version holds either an image manifest or an index
//! manifest whose metadata lists the digests of its per-platform children.

use serde::Deserialize;

/// Package kind under which container images are stored.
pub const PACKAGE_KIND: &str = "container";

/// Version strings carrying this prefix name an image by content digest.
pub const DIGEST_PREFIX: &str = "sha256:";

/// Cheap textual pre-filter: only metadata containing this marker is worth
/// a full parse. Leaf versions never pay for deserialization.
const INDEX_MANIFEST_MARKER: &str = r#""manifests":[{"#;

#[derive(Deserialize)]
struct Metadata {
    #[serde(default)]
    manifests: Vec<ManifestEntry>,
}

#[derive(Deserialize)]
struct ManifestEntry {
    #[serde(default)]
    digest: String,
}

/// Outcome of probing a version's metadata blob for index-manifest
/// references.
#[derive(Debug)]
pub enum ManifestRefs {
    /// An index manifest listing child digests, in document order.
    Index(Vec<String>),
    /// Anything that does not look like an index manifest.
    NotAnIndex,
    /// Looks like an index manifest but does not parse. Recoverable by
    /// contract; the caller decides how loudly to complain.
    Malformed(serde_json::Error),
}

/// Extract the child digests of an index manifest from a version's raw
/// metadata. No validation beyond pulling out the digest list; a manifest
/// entry without a digest decodes to an empty string, which can never match
/// a real version.
pub fn decode_manifest_refs(metadata_json: &str) -> ManifestRefs {
    if !metadata_json.contains(INDEX_MANIFEST_MARKER) {
        return ManifestRefs::NotAnIndex;
    }
    match serde_json::from_str::<Metadata>(metadata_json) {
        Ok(metadata) => {
            ManifestRefs::Index(metadata.manifests.into_iter().map(|m| m.digest).collect())
        }
        Err(err) => ManifestRefs::Malformed(err),
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::two_platforms(
        r#"{"type":"oci","manifests":[{"platform":"linux/amd64","digest":"sha256:aaa"},{"platform":"linux/arm64","digest":"sha256:bbb"}]}"#,
        vec!["sha256:aaa", "sha256:bbb"]
    )]
    #[case::digest_missing(r#"{"manifests":[{"platform":"linux/amd64"}]}"#, vec![""])]
    fn decodes_index_references(#[case] metadata: &str, #[case] expected: Vec<&str>) {
        match decode_manifest_refs(metadata) {
            ManifestRefs::Index(digests) => assert_eq!(digests, expected),
            other => panic!("expected Index, got {other:?}"),
        }
    }

    #[rstest]
    #[case::empty("")]
    #[case::leaf_image(r#"{"type":"oci","is_tagged":true,"image_layers":["sha256:ccc"]}"#)]
    #[case::empty_manifest_list(r#"{"type":"oci","manifests":[]}"#)]
    fn ignores_non_index_metadata(#[case] metadata: &str) {
        assert!(matches!(
            decode_manifest_refs(metadata),
            ManifestRefs::NotAnIndex
        ));
    }

    #[rstest]
    #[case::truncated(r#"corrupted "manifests":[{ bad"#)]
    #[case::wrong_digest_type(r#"{"manifests":[{"digest":42}]}"#)]
    fn flags_malformed_index_metadata(#[case] metadata: &str) {
        assert!(matches!(
            decode_manifest_refs(metadata),
            ManifestRefs::Malformed(_)
        ));
    }
}
