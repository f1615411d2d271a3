use futures::stream::BoxStream;
use once_cell::sync::Lazy;
use sea_query::{
    DeleteStatement, Expr, Order, PostgresQueryBuilder, Query, QueryStatementWriter,
    SelectStatement,
};
use sea_query_binder::SqlxBinder;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, Pool, Postgres, Row, Transaction};

use super::types::{
    PackageFiles, PackageProperties, PackageVersionRow, PackageVersions, Packages, PropertyRefKind,
};
use crate::container::PACKAGE_KIND;
use crate::errors::{Error, Result};

#[derive(Clone, Deserialize)]
pub struct PostgresConfig {
    connection_string: String,
}

impl PostgresConfig {
    pub async fn new_metadata(&self) -> Result<PostgresMetadataPool> {
        let pool = PgPoolOptions::new()
            .connect(&self.connection_string)
            .await?;
        Ok(PostgresMetadataPool { pool })
    }
}

#[derive(Clone)]
pub struct PostgresMetadataPool {
    pool: Pool<Postgres>,
}

impl PostgresMetadataPool {
    pub async fn get_tx(&self) -> Result<PostgresMetadataTx> {
        Ok(PostgresMetadataTx {
            tx: Some(self.pool.begin().await?),
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// Built once so the row stream can borrow it for as long as the connection
// it runs on.
static CONTAINER_VERSION_SCAN_SQL: Lazy<String> =
    Lazy::new(|| scan_container_versions_stmt().to_string(PostgresQueryBuilder));

// Ascending id is the upload-order proxy the reference scan relies on:
// content versions normally precede the index manifest referencing them.
fn scan_container_versions_stmt() -> SelectStatement {
    Query::select()
        .from(PackageVersions::Table)
        .columns([
            (PackageVersions::Table, PackageVersions::Id),
            (PackageVersions::Table, PackageVersions::LowerVersion),
            (PackageVersions::Table, PackageVersions::MetadataJson),
            (PackageVersions::Table, PackageVersions::CreatedAt),
        ])
        .inner_join(
            Packages::Table,
            Expr::col((Packages::Table, Packages::Id))
                .equals((PackageVersions::Table, PackageVersions::PackageId)),
        )
        .and_where(Expr::col((Packages::Table, Packages::Kind)).eq(PACKAGE_KIND))
        .order_by((PackageVersions::Table, PackageVersions::Id), Order::Asc)
        .to_owned()
}

fn select_version_file_ids_stmt(version_ids: &[i64]) -> SelectStatement {
    Query::select()
        .from(PackageFiles::Table)
        .column(PackageFiles::Id)
        .and_where(Expr::col(PackageFiles::VersionId).is_in(version_ids.iter().copied()))
        .to_owned()
}

fn delete_files_stmt(file_ids: &[i64]) -> DeleteStatement {
    Query::delete()
        .from_table(PackageFiles::Table)
        .and_where(Expr::col(PackageFiles::Id).is_in(file_ids.iter().copied()))
        .to_owned()
}

fn delete_versions_stmt(version_ids: &[i64]) -> DeleteStatement {
    Query::delete()
        .from_table(PackageVersions::Table)
        .and_where(Expr::col(PackageVersions::Id).is_in(version_ids.iter().copied()))
        .to_owned()
}

fn delete_properties_stmt(ref_kind: PropertyRefKind, ref_ids: &[i64]) -> DeleteStatement {
    Query::delete()
        .from_table(PackageProperties::Table)
        .and_where(Expr::col(PackageProperties::RefKind).eq(ref_kind.as_i16()))
        .and_where(Expr::col(PackageProperties::RefId).is_in(ref_ids.iter().copied()))
        .to_owned()
}

// Queries that only require a `&mut PgConnection` and don't care whether it
// came from a transaction or a pool connection.
struct Queries {}

impl Queries {
    pub async fn select_version_file_ids(
        executor: &mut PgConnection,
        version_ids: &[i64],
    ) -> Result<Vec<i64>> {
        if version_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (sql, values) = select_version_file_ids_stmt(version_ids).build_sqlx(PostgresQueryBuilder);
        let rows = sqlx::query_with(&sql, values).fetch_all(executor).await?;
        rows.iter()
            .map(|row| Ok(row.try_get("id")?))
            .collect()
    }

    pub async fn delete_files(executor: &mut PgConnection, file_ids: &[i64]) -> Result<u64> {
        if file_ids.is_empty() {
            return Ok(0);
        }
        let (sql, values) = delete_files_stmt(file_ids).build_sqlx(PostgresQueryBuilder);
        Ok(sqlx::query_with(&sql, values)
            .execute(executor)
            .await?
            .rows_affected())
    }

    pub async fn delete_versions(executor: &mut PgConnection, version_ids: &[i64]) -> Result<u64> {
        if version_ids.is_empty() {
            return Ok(0);
        }
        let (sql, values) = delete_versions_stmt(version_ids).build_sqlx(PostgresQueryBuilder);
        Ok(sqlx::query_with(&sql, values)
            .execute(executor)
            .await?
            .rows_affected())
    }

    pub async fn delete_properties(
        executor: &mut PgConnection,
        ref_kind: PropertyRefKind,
        ref_ids: &[i64],
    ) -> Result<u64> {
        if ref_ids.is_empty() {
            return Ok(0);
        }
        let (sql, values) =
            delete_properties_stmt(ref_kind, ref_ids).build_sqlx(PostgresQueryBuilder);
        Ok(sqlx::query_with(&sql, values)
            .execute(executor)
            .await?
            .rows_affected())
    }
}

// Wrapper around a Postgres transaction with the ability to commit.
// Dropping it without committing rolls the transaction back.
pub struct PostgresMetadataTx<'a> {
    tx: Option<Transaction<'a, Postgres>>,
}

impl<'a> PostgresMetadataTx<'a> {
    pub async fn commit(&mut self) -> Result<()> {
        if let Some(t) = self.tx.take() {
            Ok(t.commit().await?)
        } else {
            Ok(())
        }
    }

    /// Stream all container package versions, ascending by id. Rows are
    /// produced one at a time; the caller decides what to keep.
    pub fn stream_container_versions(
        &mut self,
    ) -> Result<BoxStream<'_, sqlx::Result<PackageVersionRow>>> {
        let tx = self.tx.as_mut().ok_or(Error::PostgresMetadataTxInactive)?;
        Ok(sqlx::query_as::<_, PackageVersionRow>(&CONTAINER_VERSION_SCAN_SQL).fetch(&mut **tx))
    }

    pub async fn select_version_file_ids(&mut self, version_ids: &[i64]) -> Result<Vec<i64>> {
        let tx = self.tx.as_mut().ok_or(Error::PostgresMetadataTxInactive)?;
        Queries::select_version_file_ids(&mut **tx, version_ids).await
    }

    pub async fn delete_files(&mut self, file_ids: &[i64]) -> Result<u64> {
        let tx = self.tx.as_mut().ok_or(Error::PostgresMetadataTxInactive)?;
        Queries::delete_files(&mut **tx, file_ids).await
    }

    pub async fn delete_versions(&mut self, version_ids: &[i64]) -> Result<u64> {
        let tx = self.tx.as_mut().ok_or(Error::PostgresMetadataTxInactive)?;
        Queries::delete_versions(&mut **tx, version_ids).await
    }

    pub async fn delete_properties(
        &mut self,
        ref_kind: PropertyRefKind,
        ref_ids: &[i64],
    ) -> Result<u64> {
        let tx = self.tx.as_mut().ok_or(Error::PostgresMetadataTxInactive)?;
        Queries::delete_properties(&mut **tx, ref_kind, ref_ids).await
    }
}
