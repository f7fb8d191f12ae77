//! `PostgreSQL` instance store.

use super::{models::InstanceRow, schema::mcp_server_instances};
use crate::tool_runtime::{
    domain::{
        AccountId, InstanceId, InstanceKey, InstanceRecord, InstanceStatus, OwnerId, ServerId,
        TransportKind,
    },
    ports::{InstanceStore, InstanceStoreError, InstanceStoreResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::Clock;
use std::sync::Arc;

/// `PostgreSQL` connection pool type for the instance store.
pub type InstancePgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed instance store over `mcp_server_instances`.
pub struct PostgresInstanceStore<C>
where
    C: Clock + Send + Sync + 'static,
{
    pool: InstancePgPool,
    clock: Arc<C>,
}

impl<C> PostgresInstanceStore<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a store from a pool; `clock` stamps `updated_at`.
    #[must_use]
    pub const fn new(pool: InstancePgPool, clock: Arc<C>) -> Self {
        Self { pool, clock }
    }

    async fn run_blocking<F, T>(&self, operation: F) -> InstanceStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> InstanceStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(InstanceStoreError::persistence)?;
            operation(&mut connection)
        })
        .await
        .map_err(InstanceStoreError::persistence)?
    }
}

#[async_trait]
impl<C> InstanceStore for PostgresInstanceStore<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn find_instance(
        &self,
        instance_id: InstanceId,
    ) -> InstanceStoreResult<Option<InstanceRecord>> {
        self.run_blocking(move |connection| {
            let row = mcp_server_instances::table
                .filter(mcp_server_instances::id.eq(instance_id.into_inner()))
                .select(InstanceRow::as_select())
                .first::<InstanceRow>(connection)
                .optional()
                .map_err(InstanceStoreError::persistence)?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn set_instance_status(
        &self,
        instance_id: InstanceId,
        status: InstanceStatus,
    ) -> InstanceStoreResult<()> {
        let updated_at = self.clock.utc();
        self.run_blocking(move |connection| {
            let updated_count = diesel::update(
                mcp_server_instances::table
                    .filter(mcp_server_instances::id.eq(instance_id.into_inner())),
            )
            .set((
                mcp_server_instances::status.eq(status.as_str()),
                mcp_server_instances::last_health_check.eq(Some(updated_at)),
                mcp_server_instances::updated_at.eq(updated_at),
            ))
            .execute(connection)
            .map_err(InstanceStoreError::persistence)?;
            ensure_updated(updated_count, instance_id)
        })
        .await
    }

    async fn set_process_id(
        &self,
        instance_id: InstanceId,
        process_id: Option<u32>,
    ) -> InstanceStoreResult<()> {
        let stored_pid = process_id
            .map(i32::try_from)
            .transpose()
            .map_err(InstanceStoreError::persistence)?;
        let updated_at = self.clock.utc();
        self.run_blocking(move |connection| {
            let updated_count = diesel::update(
                mcp_server_instances::table
                    .filter(mcp_server_instances::id.eq(instance_id.into_inner())),
            )
            .set((
                mcp_server_instances::process_id.eq(stored_pid),
                mcp_server_instances::updated_at.eq(updated_at),
            ))
            .execute(connection)
            .map_err(InstanceStoreError::persistence)?;
            ensure_updated(updated_count, instance_id)
        })
        .await
    }

    async fn list_instances_with_status(
        &self,
        status: InstanceStatus,
    ) -> InstanceStoreResult<Vec<InstanceRecord>> {
        self.run_blocking(move |connection| {
            let rows = mcp_server_instances::table
                .filter(mcp_server_instances::status.eq(status.as_str()))
                .select(InstanceRow::as_select())
                .load::<InstanceRow>(connection)
                .map_err(InstanceStoreError::persistence)?;
            rows.into_iter().map(row_to_record).collect()
        })
        .await
    }

    async fn find_instance_id(&self, key: &InstanceKey) -> InstanceStoreResult<Option<InstanceId>> {
        let owner = key.owner_id().into_inner();
        let server = key.server_id().into_inner();
        let account = key.account_id().map(AccountId::into_inner);
        self.run_blocking(move |connection| {
            let scoped = mcp_server_instances::table
                .filter(mcp_server_instances::user_id.eq(owner))
                .filter(mcp_server_instances::server_id.eq(server));
            let found = match account {
                Some(account_uuid) => scoped
                    .filter(mcp_server_instances::account_id.eq(account_uuid))
                    .select(mcp_server_instances::id)
                    .first::<uuid::Uuid>(connection),
                None => scoped
                    .filter(mcp_server_instances::account_id.is_null())
                    .select(mcp_server_instances::id)
                    .first::<uuid::Uuid>(connection),
            };
            let id = found.optional().map_err(InstanceStoreError::persistence)?;
            Ok(id.map(InstanceId::from_uuid))
        })
        .await
    }
}

fn ensure_updated(updated_count: usize, instance_id: InstanceId) -> InstanceStoreResult<()> {
    if updated_count == 0 {
        return Err(InstanceStoreError::NotFound(instance_id));
    }
    Ok(())
}

fn row_to_record(row: InstanceRow) -> InstanceStoreResult<InstanceRecord> {
    let InstanceRow {
        id,
        user_id,
        server_id,
        account_id,
        transport_type,
        status,
        process_id,
        ..
    } = row;

    let parsed_status = InstanceStatus::try_from(status.as_str())
        .map_err(InstanceStoreError::invalid_persisted_data)?;
    let parsed_kind = TransportKind::try_from(transport_type.as_str())
        .map_err(InstanceStoreError::invalid_persisted_data)?;
    let parsed_pid = process_id
        .map(u32::try_from)
        .transpose()
        .map_err(InstanceStoreError::invalid_persisted_data)?;

    let owner_key = InstanceKey::new(OwnerId::from_uuid(user_id), ServerId::from_uuid(server_id));
    let key = match account_id {
        Some(account) => owner_key.with_account(AccountId::from_uuid(account)),
        None => owner_key,
    };

    Ok(
        InstanceRecord::new(InstanceId::from_uuid(id), key, parsed_status, parsed_kind)
            .with_process_id(parsed_pid),
    )
}
