//! Equipment model

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use super::reference::ReferenceRef;
use crate::error::{DecodeError, FieldErrors};

/// Opaque equipment identifier, assigned once at creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct EquipmentId(String);

impl EquipmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EquipmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EquipmentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EquipmentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Editable equipment fields, keyed by their persisted names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EquipmentField {
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "type")]
    EquipmentType,
    #[serde(rename = "location")]
    Location,
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "description")]
    Description,
    #[serde(rename = "serialNumber")]
    SerialNumber,
    #[serde(rename = "model")]
    Model,
}

impl EquipmentField {
    /// Key used in the persisted layout and in API payloads
    pub fn wire_name(self) -> &'static str {
        match self {
            EquipmentField::Name => "name",
            EquipmentField::EquipmentType => "type",
            EquipmentField::Location => "location",
            EquipmentField::Status => "status",
            EquipmentField::Description => "description",
            EquipmentField::SerialNumber => "serialNumber",
            EquipmentField::Model => "model",
        }
    }

    /// Resolve either the wire name or the Rust field name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "name" => Some(EquipmentField::Name),
            "type" | "equipment_type" => Some(EquipmentField::EquipmentType),
            "location" => Some(EquipmentField::Location),
            "status" => Some(EquipmentField::Status),
            "description" => Some(EquipmentField::Description),
            "serialNumber" | "serial_number" => Some(EquipmentField::SerialNumber),
            "model" => Some(EquipmentField::Model),
            _ => None,
        }
    }

    fn required_message(self) -> &'static str {
        match self {
            EquipmentField::Name => "Equipment name is required.",
            EquipmentField::EquipmentType => "Type is required.",
            EquipmentField::Location => "Location is required.",
            EquipmentField::Status => "Status is required.",
            EquipmentField::Model => "Model is required.",
            EquipmentField::Description | EquipmentField::SerialNumber => "Invalid value.",
        }
    }
}

/// Equipment record as materialized from the remote collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentRecord {
    pub id: EquipmentId,
    pub name: String,
    /// Type name, stored by display name rather than by reference id
    #[serde(rename = "type")]
    pub equipment_type: ReferenceRef,
    pub location: String,
    /// Status name, stored by display name rather than by reference id
    pub status: ReferenceRef,
    pub description: String,
    /// Inventory number, digits only or empty
    pub serial_number: String,
    pub model: String,
}

impl EquipmentRecord {
    /// Decode the value stored at `equipment/<id>`
    pub fn decode(id: EquipmentId, value: &Value) -> Result<Self, DecodeError> {
        let stored = StoredEquipment::deserialize(value)
            .map_err(|e| DecodeError::new(format!("equipment/{}", id), e.to_string()))?;
        Ok(stored.into_record(id))
    }

    /// Copy every field into a draft, verbatim
    pub fn to_draft(&self) -> EquipmentDraft {
        EquipmentDraft {
            name: self.name.clone(),
            equipment_type: self.equipment_type.as_str().to_string(),
            location: self.location.clone(),
            status: self.status.as_str().to_string(),
            description: self.description.clone(),
            serial_number: self.serial_number.clone(),
            model: self.model.clone(),
        }
    }
}

/// In-progress, not-yet-persisted equipment field set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct EquipmentDraft {
    #[validate(length(min = 1, message = "Equipment name is required."))]
    pub name: String,
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "Type is required."))]
    pub equipment_type: String,
    #[validate(length(min = 1, message = "Location is required."))]
    pub location: String,
    #[validate(length(min = 1, message = "Status is required."))]
    pub status: String,
    pub description: String,
    /// Inventory number, digits only or empty
    pub serial_number: String,
    #[validate(length(min = 1, message = "Model is required."))]
    pub model: String,
}

impl EquipmentDraft {
    pub fn set_field(&mut self, field: EquipmentField, value: String) {
        let slot = match field {
            EquipmentField::Name => &mut self.name,
            EquipmentField::EquipmentType => &mut self.equipment_type,
            EquipmentField::Location => &mut self.location,
            EquipmentField::Status => &mut self.status,
            EquipmentField::Description => &mut self.description,
            EquipmentField::SerialNumber => &mut self.serial_number,
            EquipmentField::Model => &mut self.model,
        };
        *slot = value;
    }

    /// Run every rule and collect all failures at once
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if let Err(e) = self.validate() {
            for (name, field_errors) in e.field_errors() {
                let Some(field) = EquipmentField::from_name(&name.to_string()) else {
                    continue;
                };
                let message = field_errors
                    .iter()
                    .find_map(|err| err.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| field.required_message().to_string());
                errors.add(field, message);
            }
        }

        if !is_digits_only(&self.serial_number) {
            errors.add(
                EquipmentField::SerialNumber,
                "Inventory number may contain digits only.",
            );
        }

        errors.into_result()
    }

    pub fn into_record(self, id: EquipmentId) -> EquipmentRecord {
        StoredEquipment::from(self).into_record(id)
    }
}

/// True for the empty string or a run of ASCII digits
pub fn is_digits_only(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_digit())
}

/// Flat persisted layout at `equipment/<id>`, every value a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEquipment {
    pub name: String,
    #[serde(rename = "type")]
    pub equipment_type: String,
    pub location: String,
    pub status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub serial_number: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model: String,
}

impl StoredEquipment {
    fn into_record(self, id: EquipmentId) -> EquipmentRecord {
        EquipmentRecord {
            id,
            name: self.name,
            equipment_type: ReferenceRef::by_name(self.equipment_type),
            location: self.location,
            status: ReferenceRef::by_name(self.status),
            description: self.description,
            serial_number: self.serial_number,
            model: self.model,
        }
    }

    pub fn to_value(&self) -> Value {
        // Plain string fields cannot fail to serialize
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<EquipmentDraft> for StoredEquipment {
    fn from(draft: EquipmentDraft) -> Self {
        Self {
            name: draft.name,
            equipment_type: draft.equipment_type,
            location: draft.location,
            status: draft.status,
            description: draft.description,
            serial_number: draft.serial_number,
            model: draft.model,
        }
    }
}

/// Optional text fields: strings as-is, numbers as their decimal text, null as empty
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string, found {}",
            other
        ))),
    }
}

/// Canonical public URL encoded in an equipment QR code
pub fn equipment_url(host: &str, id: &EquipmentId) -> String {
    format!("https://{}/equipment/{}", host.trim_end_matches('/'), id)
}
