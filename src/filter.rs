//! Filter and search over the equipment list
//!
//! Pure derivation: the input list is never modified and the result keeps
//! the input order.

use serde::Deserialize;
use utoipa::IntoParams;

use crate::models::{EquipmentRecord, ReferenceRef};

/// Selector value that disables a reference filter
pub const ALL: &str = "all";

/// Type or status selection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    #[default]
    Any,
    Only(String),
}

impl Selector {
    /// Empty input and the `"all"` sentinel both mean no filtering
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() || raw == ALL {
            Selector::Any
        } else {
            Selector::Only(raw.to_string())
        }
    }

    pub fn accepts(&self, value: &ReferenceRef) -> bool {
        match self {
            Selector::Any => true,
            Selector::Only(key) => value.matches(key),
        }
    }
}

/// Filter state of one viewing session
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EquipmentFilter {
    /// Type name, empty or "all" for every type
    #[serde(default, rename = "type")]
    pub equipment_type: String,
    /// Status name, empty or "all" for every status
    #[serde(default)]
    pub status: String,
    /// Case-insensitive substring of the equipment name
    #[serde(default)]
    pub search: String,
}

impl EquipmentFilter {
    pub fn new(
        equipment_type: impl Into<String>,
        status: impl Into<String>,
        search: impl Into<String>,
    ) -> Self {
        Self {
            equipment_type: equipment_type.into(),
            status: status.into(),
            search: search.into(),
        }
    }

    pub fn apply(&self, records: &[EquipmentRecord]) -> Vec<EquipmentRecord> {
        let matcher = Matcher::new(self);
        records
            .iter()
            .filter(|record| matcher.accepts(record))
            .cloned()
            .collect()
    }
}

struct Matcher {
    equipment_type: Selector,
    status: Selector,
    search: String,
}

impl Matcher {
    fn new(filter: &EquipmentFilter) -> Self {
        Self {
            equipment_type: Selector::parse(&filter.equipment_type),
            status: Selector::parse(&filter.status),
            search: filter.search.to_lowercase(),
        }
    }

    fn accepts(&self, record: &EquipmentRecord) -> bool {
        self.equipment_type.accepts(&record.equipment_type)
            && self.status.accepts(&record.status)
            && (self.search.is_empty() || record.name.to_lowercase().contains(&self.search))
    }
}

/// Visible subset of `records` for the given filters
pub fn derive(
    records: &[EquipmentRecord],
    type_filter: &str,
    status_filter: &str,
    search_term: &str,
) -> Vec<EquipmentRecord> {
    EquipmentFilter::new(type_filter, status_filter, search_term).apply(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EquipmentDraft, EquipmentId};

    fn record(id: &str, name: &str, kind: &str, status: &str) -> EquipmentRecord {
        EquipmentDraft {
            name: name.to_string(),
            equipment_type: kind.to_string(),
            location: "Lab1".to_string(),
            status: status.to_string(),
            model: "M".to_string(),
            ..Default::default()
        }
        .into_record(EquipmentId::new(id))
    }

    fn sample() -> Vec<EquipmentRecord> {
        vec![
            record("1", "ThinkPad X1", "Laptop", "Active"),
            record("2", "LaserJet 400", "Printer", "Retired"),
            record("3", "MacBook Air", "Laptop", "Retired"),
            record("4", "Принтер Canon", "Printer", "Active"),
        ]
    }

    #[test]
    fn test_all_filters_off_is_identity() {
        let records = sample();
        assert_eq!(derive(&records, "all", "all", ""), records);
        assert_eq!(derive(&records, "", "", ""), records);
    }

    #[test]
    fn test_type_filter_is_exact_and_case_sensitive() {
        let records = sample();
        let ids: Vec<_> = derive(&records, "Laptop", "", "")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![EquipmentId::new("1"), EquipmentId::new("3")]);
        assert!(derive(&records, "laptop", "", "").is_empty());
    }

    #[test]
    fn test_unknown_type_yields_nothing() {
        assert!(derive(&sample(), "Plotter", "", "").is_empty());
    }

    #[test]
    fn test_filters_combine_with_and() {
        let result = derive(&sample(), "Laptop", "Retired", "");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "MacBook Air");
    }

    #[test]
    fn test_any_case_substring_of_name_matches() {
        let r = record("1", "ThinkPad X1", "Laptop", "Active");
        let name = r.name.clone();
        for start in 0..name.len() {
            for end in start + 1..=name.len() {
                let Some(sub) = name.get(start..end) else { continue };
                let records = vec![r.clone()];
                assert_eq!(derive(&records, "", "", &sub.to_uppercase()).len(), 1, "{}", sub);
                assert_eq!(derive(&records, "", "", &sub.to_lowercase()).len(), 1, "{}", sub);
            }
        }
    }

    #[test]
    fn test_search_handles_cyrillic_case() {
        let result = derive(&sample(), "", "", "ПРИНТЕР");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id.as_str(), "4");
    }

    #[test]
    fn test_result_preserves_input_order() {
        let records = sample();
        let names: Vec<_> = derive(&records, "", "", "a").into_iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec!["ThinkPad X1", "LaserJet 400", "MacBook Air", "Принтер Canon"]
        );
    }
}
