mod postgres;
pub use postgres::{PostgresConfig, PostgresMetadataPool, PostgresMetadataTx};

mod types;
pub use types::{
    PackageBlobs, PackageFiles, PackageProperties, PackageVersionRow, PackageVersions, Packages,
    PropertyRefKind,
};
