//! Pure entitlement computation: tier mapping, state derivation, and change
//! detection. Nothing in this module performs I/O or can fail.

pub mod hash;
pub mod resolver;
pub mod tier;

pub use hash::{SEED_HASH, entitlement_hash, hash_result, should_write};
pub use resolver::{
    BILLING_ISSUE_EVENT, EntitlementStatus, ReconcileContext, ReconcileResult, parse_timestamp,
    resolve,
};
pub use tier::{Tier, map_product_to_tier};
