//! Data models for the equipment inventory

pub mod equipment;
pub mod reference;

// Re-export commonly used types
pub use equipment::{EquipmentDraft, EquipmentField, EquipmentId, EquipmentRecord};
pub use reference::{ReferenceCollection, ReferenceItem, ReferenceRef};
