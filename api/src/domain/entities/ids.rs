//! Identifier newtypes
//!
//! Every aggregate and every external reference gets its own UUID wrapper so
//! a `PatientId` can never be passed where an `InvoiceId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for an invoice
    InvoiceId
);
entity_id!(
    /// Unique identifier for a payment
    PaymentId
);
entity_id!(
    /// Unique identifier for a payment plan
    PaymentPlanId
);
entity_id!(
    /// Unique identifier for an insurance claim
    ClaimId
);
entity_id!(
    /// Unique identifier for an insurance claim batch
    BatchId
);
entity_id!(
    /// Unique identifier for a price table
    PriceTableId
);
entity_id!(
    /// Patient reference (owned by the records subsystem)
    PatientId
);
entity_id!(
    /// Clinic reference
    ClinicId
);
entity_id!(
    /// Insurer (health plan operator) reference
    InsurerId
);
entity_id!(
    /// Staff user acting on billing records
    UserId
);
