use chrono::{DateTime, Utc};
use sea_query::Iden;

#[derive(Iden)]
pub enum Packages {
    Table,
    Id,
    OwnerId,
    LowerName,
    Kind,
}

#[derive(Iden)]
pub enum PackageVersions {
    Table,
    Id,
    PackageId,
    LowerVersion,
    MetadataJson,
    CreatedAt,
}

#[derive(Iden)]
pub enum PackageFiles {
    Table,
    Id,
    VersionId,
    BlobId,
    LowerName,
}

#[derive(Iden)]
pub enum PackageProperties {
    Table,
    Id,
    RefKind,
    RefId,
    Name,
    Value,
}

/// Content-addressed storage units, shared across files and packages.
/// The collector never touches this relation directly; blob reclamation is
/// driven downstream by the disappearance of the last referencing file.
#[derive(Iden)]
pub enum PackageBlobs {
    Table,
    Id,
    Digest,
    Size,
}

/// Discriminates which relation a package_properties row is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyRefKind {
    Version,
    File,
}

impl PropertyRefKind {
    pub(crate) fn as_i16(self) -> i16 {
        match self {
            PropertyRefKind::Version => 0,
            PropertyRefKind::File => 1,
        }
    }
}

/// The projection of package_versions the reference scan consumes. Rows
/// are streamed one at a time; the scan never materializes the table.
#[derive(Debug, sqlx::FromRow)]
pub struct PackageVersionRow {
    pub id: i64,
    pub lower_version: String,
    pub metadata_json: String,
    pub created_at: DateTime<Utc>,
}
