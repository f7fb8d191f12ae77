//! Diesel row models for instance records.

use super::schema::mcp_server_instances;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result row for instance records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = mcp_server_instances)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InstanceRow {
    /// Instance identifier.
    pub id: uuid::Uuid,
    /// Owning user.
    pub user_id: uuid::Uuid,
    /// Catalogued tool server.
    pub server_id: uuid::Uuid,
    /// Connected account.
    pub account_id: Option<uuid::Uuid>,
    /// Transport kind.
    pub transport_type: String,
    /// Durable status.
    pub status: String,
    /// OS process id.
    pub process_id: Option<i32>,
    /// Last health sweep timestamp.
    pub last_health_check: Option<DateTime<Utc>>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}
