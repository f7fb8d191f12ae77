//! Diesel schema for tool-server instance records.

diesel::table! {
    /// Provisioned tool-server instances.
    mcp_server_instances (id) {
        /// Instance identifier.
        id -> Uuid,
        /// Owning user.
        user_id -> Uuid,
        /// Catalogued tool server.
        server_id -> Uuid,
        /// Connected account, when the server needs one.
        account_id -> Nullable<Uuid>,
        /// Transport kind (`stdio`, `http`).
        #[max_length = 20]
        transport_type -> Varchar,
        /// Durable status (`starting`, `running`, `stopped`, `error`).
        #[max_length = 20]
        status -> Varchar,
        /// OS process id of a local tool server.
        process_id -> Nullable<Int4>,
        /// Timestamp of the last status transition.
        last_health_check -> Nullable<Timestamptz>,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}
