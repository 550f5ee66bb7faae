//! Reference data: equipment types and statuses

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One entry of a lookup collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReferenceItem {
    pub id: String,
    /// Display name, also the value stored on equipment records
    pub name: String,
}

impl ReferenceItem {
    /// The value an equipment record stores to point at this item
    pub fn reference(&self) -> ReferenceRef {
        ReferenceRef::by_name(self.name.clone())
    }
}

/// Which lookup collection to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceCollection {
    Types,
    Statuses,
}

impl std::fmt::Display for ReferenceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceCollection::Types => f.write_str("types"),
            ReferenceCollection::Statuses => f.write_str("statuses"),
        }
    }
}

/// How an equipment record points at a reference item.
///
/// Records store the item's display name, not its id, and values that no
/// longer match any item are kept as-is. All comparisons against a selected
/// type or status go through [`ReferenceRef::matches`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ReferenceRef(String);

impl ReferenceRef {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact, case-sensitive match against a selected key
    pub fn matches(&self, key: &str) -> bool {
        self.0 == key
    }

    /// Whether this reference resolves to one of `items`
    pub fn resolves_in(&self, items: &[ReferenceItem]) -> bool {
        items.iter().any(|item| item.reference() == *self)
    }
}

impl std::fmt::Display for ReferenceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
