//! Identifier types for Sarafi entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// New identifiers use UUID v7 so that ids sort by creation time.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from string.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// A bureau (tenant). Every record is owned by exactly one tenant.
    TenantId
);

uuid_id!(
    /// A physical branch of a tenant.
    BranchId
);

uuid_id!(
    /// A staff member acting on a record.
    UserId
);

uuid_id!(
    /// A customer of the bureau.
    CustomerId
);

uuid_id!(
    /// An outgoing or incoming remittance.
    RemittanceId
);

uuid_id!(
    /// A settlement between an outgoing and an incoming remittance.
    SettlementId
);

uuid_id!(
    /// A payment method configuration row.
    PaymentMethodId
);

uuid_id!(
    /// A support ticket.
    TicketId
);

uuid_id!(TicketMessageId);

uuid_id!(ActivityId);

uuid_id!(
    /// A currency conversion transaction.
    TransactionId
);
