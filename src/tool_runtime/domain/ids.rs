//! Identifier types and the composite instance key.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the wrapped UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Durable identifier of one provisioned tool-server instance.
    InstanceId
);

uuid_identifier!(
    /// Identifier of the user who owns an instance.
    OwnerId
);

uuid_identifier!(
    /// Identifier of a catalogued tool server.
    ServerId
);

uuid_identifier!(
    /// Identifier of a linked OAuth account.
    AccountId
);

/// Composite identity of a logical tool-server connection.
///
/// Two instances with equal keys represent the same connection; only one of
/// them may be backed by a live transport at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    owner_id: OwnerId,
    server_id: ServerId,
    account_id: Option<AccountId>,
}

impl InstanceKey {
    /// Creates a key for a server that needs no per-account credentials.
    #[must_use]
    pub const fn new(owner_id: OwnerId, server_id: ServerId) -> Self {
        Self {
            owner_id,
            server_id,
            account_id: None,
        }
    }

    /// Scopes the key to a linked account.
    #[must_use]
    pub const fn with_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Returns the owning user.
    #[must_use]
    pub const fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// Returns the tool server.
    #[must_use]
    pub const fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Returns the linked account, if any.
    #[must_use]
    pub const fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.account_id {
            Some(account_id) => write!(
                formatter,
                "{}:{}:{account_id}",
                self.owner_id, self.server_id
            ),
            None => write!(formatter, "{}:{}:-", self.owner_id, self.server_id),
        }
    }
}
