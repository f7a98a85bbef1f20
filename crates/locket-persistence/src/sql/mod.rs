//! SQL-based lock store (MySQL/PostgreSQL via SeaORM)
//!
//! Every write is a single read-modify-write transaction over the `locks`
//! table. On engines with row locking the read takes `SELECT ... FOR UPDATE`,
//! so concurrent writers on one key serialize in the database.

mod error;


use std::sync::Arc;

use async_trait::async_trait;
use locket_common::{GuidProvider, Lock, LocketError, Resource, Result};
use sea_orm::sea_query::{ColumnDef, Table};
use sea_orm::*;
use tracing::{Instrument, debug, error, info, info_span};

use crate::entity::locks;
use crate::traits::LockDb;

use self::error::{convert_db_err, is_lost_race};

/// How many times `lock` re-reads after losing a race on the key
const MAX_LOCK_ATTEMPTS: usize = 3;

/// Lock store over a SeaORM connection
pub struct SqlLockDb {
    db: DatabaseConnection,
    guid_provider: Arc<dyn GuidProvider>,
}

impl SqlLockDb {
    /// Create a new SqlLockDb with the given connection and GUID source
    pub fn new(db: DatabaseConnection, guid_provider: Arc<dyn GuidProvider>) -> Self {
        Self { db, guid_provider }
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create the `locks` table if it does not exist yet
    pub async fn create_lock_table(&self) -> Result<()> {
        let backend = self.db.get_database_backend();
        let statement = Table::create()
            .table(locks::Entity.table_ref())
            .if_not_exists()
            .col(
                ColumnDef::new(locks::Column::Path)
                    .string_len(255)
                    .not_null()
                    .primary_key(),
            )
            .col(
                ColumnDef::new(locks::Column::Owner)
                    .string_len(255)
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(locks::Column::Value)
                    .string_len(4096)
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(locks::Column::Type)
                    .string_len(255)
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(locks::Column::ModifiedIndex)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(locks::Column::ModifiedId)
                    .string_len(255)
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(locks::Column::Ttl)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .to_owned();

        self.db
            .execute(backend.build(&statement))
            .await
            .map_err(convert_db_err)
            .inspect_err(|err| error!(error = %err, "failed-to-create-lock-table"))?;

        debug!("created-lock-table");
        Ok(())
    }

    /// Select the row for `key`, taking a row lock where the engine has one
    fn find_row(&self, key: &str) -> Select<locks::Entity> {
        let select = locks::Entity::find_by_id(key.to_owned());
        match self.db.get_database_backend() {
            DbBackend::Sqlite => select,
            _ => select.lock_exclusive(),
        }
    }

    /// Rows that are held, i.e. not owner/value-empty placeholders
    fn held_rows(lock_type: &str) -> Select<locks::Entity> {
        let mut select = locks::Entity::find().filter(
            Condition::any()
                .add(locks::Column::Owner.ne(""))
                .add(locks::Column::Value.ne("")),
        );
        if !lock_type.is_empty() {
            select = select.filter(locks::Column::Type.eq(lock_type));
        }
        select
    }

    /// One lock transaction. `Ok(None)` means a concurrent writer on the key won.
    async fn try_lock(&self, resource: &Resource, ttl_in_seconds: i64) -> Result<Option<Lock>> {
        let txn = self.db.begin().await.map_err(convert_db_err)?;

        let existing = self
            .find_row(&resource.key)
            .one(&txn)
            .await
            .map_err(convert_db_err)
            .inspect_err(|err| error!(error = %err, "failed-to-fetch-lock"))?;

        let prior_index = match &existing {
            Some(row) if !row.is_vacant() && row.owner != resource.owner => {
                debug!("lock-already-exists");
                return Err(LocketError::LockCollision);
            }
            Some(row) => row.modified_index,
            None => 0,
        };
        let acquired = existing.as_ref().is_none_or(|row| row.is_vacant());

        let modified_id = self
            .guid_provider
            .next_guid()
            .inspect_err(|err| error!(error = %err, "failed-to-generate-guid"))?;

        let lock = Lock {
            resource: resource.clone(),
            modified_index: prior_index + 1,
            modified_id,
            ttl_in_seconds,
        };
        let row = locks::ActiveModel {
            path: Set(lock.resource.key.clone()),
            owner: Set(lock.resource.owner.clone()),
            value: Set(lock.resource.value.clone()),
            r#type: Set(lock.resource.r#type.clone()),
            modified_index: Set(lock.modified_index),
            modified_id: Set(lock.modified_id.clone()),
            ttl: Set(lock.ttl_in_seconds),
        };

        let written = if existing.is_some() {
            row.update(&txn).await.map(|_| ())
        } else {
            locks::Entity::insert(row)
                .exec_without_returning(&txn)
                .await
                .map(|_| ())
        };
        let committed = match written {
            Ok(()) => txn.commit().await,
            Err(err) => Err(err),
        };
        if let Err(err) = committed {
            if is_lost_race(&err) {
                debug!(error = %err, "lost-race-on-key");
                return Ok(None);
            }
            let err = convert_db_err(err);
            error!(error = %err, "failed-updating-lock");
            return Err(err);
        }

        if acquired {
            info!(modified_index = lock.modified_index, "acquired-lock");
        }
        Ok(Some(lock))
    }
}

#[async_trait]
impl LockDb for SqlLockDb {
    async fn lock(&self, resource: &Resource, ttl_in_seconds: i64) -> Result<Lock> {
        let resource = resource.normalized();
        let span = info_span!(
            "lock",
            key = %resource.key,
            owner = %resource.owner,
            "type" = %resource.r#type
        );

        async {
            for attempt in 1..=MAX_LOCK_ATTEMPTS {
                if let Some(lock) = self.try_lock(&resource, ttl_in_seconds).await? {
                    return Ok(lock);
                }
                debug!(attempt, "lock-insert-raced");
            }
            Err(LocketError::LockCollision)
        }
        .instrument(span)
        .await
    }

    async fn release(&self, resource: &Resource) -> Result<()> {
        let span = info_span!(
            "release-lock",
            key = %resource.key,
            owner = %resource.owner,
            "type" = %resource.resolved_type()
        );

        async {
            let txn = self.db.begin().await.map_err(convert_db_err)?;

            let row = self
                .find_row(&resource.key)
                .one(&txn)
                .await
                .map_err(convert_db_err)
                .inspect_err(|err| error!(error = %err, "failed-to-fetch-lock"))?;

            match row {
                Some(row) if !row.is_vacant() && row.owner == resource.owner => {}
                Some(row) if !row.is_vacant() => {
                    error!(holder = %row.owner, "cannot-release-lock");
                    return Err(LocketError::ResourceNotFound);
                }
                _ => {
                    debug!("lock-not-found");
                    return Err(LocketError::ResourceNotFound);
                }
            }

            locks::Entity::delete_by_id(resource.key.clone())
                .exec(&txn)
                .await
                .map_err(convert_db_err)
                .inspect_err(|err| error!(error = %err, "failed-to-release-lock"))?;

            txn.commit().await.map_err(convert_db_err)?;

            info!("released-lock");
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn fetch(&self, key: &str) -> Result<Lock> {
        let row = locks::Entity::find_by_id(key.to_owned())
            .one(&self.db)
            .await
            .map_err(convert_db_err)
            .inspect_err(|err| error!(key = %key, error = %err, "failed-to-fetch-lock"))?;

        match row {
            Some(row) if !row.is_vacant() => Ok(row.into()),
            _ => Err(LocketError::ResourceNotFound),
        }
    }

    async fn fetch_all(&self, lock_type: &str) -> Result<Vec<Lock>> {
        let rows = Self::held_rows(lock_type)
            .order_by_asc(locks::Column::Path)
            .all(&self.db)
            .await
            .map_err(convert_db_err)
            .inspect_err(|err| error!("type" = %lock_type, error = %err, "failed-to-fetch-locks"))?;

        Ok(rows.into_iter().map(Lock::from).collect())
    }

    async fn count(&self, lock_type: &str) -> Result<usize> {
        let count = Self::held_rows(lock_type)
            .count(&self.db)
            .await
            .map_err(convert_db_err)
            .inspect_err(|err| error!("type" = %lock_type, error = %err, "failed-to-count-locks"))?;

        Ok(count as usize)
    }
}
