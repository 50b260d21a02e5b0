use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies an object in a [`Store`](crate::store::Store).
    ///
    /// Handles are generational: once an object is removed its handle never
    /// compares equal to the handle of any later object.
    pub struct ObjectHandle;
}

/// Identifies an object schema in the catalog. Cheap to copy and compare.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ObjectTypeId(pub u32);

impl ObjectTypeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies a change subscriber registered on a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);
