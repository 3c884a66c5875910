//! Calculator requirement registry.
//!
//! Pure requirement data: which fields each calculator needs, which it can
//! additionally use, and how it should be treated when it needs nothing.
//! The registry is assembled once through [`RegistryBuilder`] and read-only
//! afterwards, so it can be shared across request tasks without locking.
//! The arithmetic behind each calculator lives elsewhere (see
//! `crate::calculators`); nothing in here computes a score.

pub mod catalog;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Declared input schema for one calculator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatorRequirement {
    pub calculator_id: String,
    pub name: String,
    pub category: String,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
    /// Auto-select policy for calculators whose required set is empty.
    pub default_include: bool,
}

/// Immutable id → requirement catalog.
#[derive(Debug, Clone, Default)]
pub struct CalculatorRegistry {
    entries: BTreeMap<String, CalculatorRequirement>,
}

impl CalculatorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, calculator_id: &str) -> Option<&CalculatorRequirement> {
        self.entries.get(calculator_id)
    }

    pub fn contains(&self, calculator_id: &str) -> bool {
        self.entries.contains_key(calculator_id)
    }

    /// All requirements in calculator-id order.
    pub fn all(&self) -> impl Iterator<Item = &CalculatorRequirement> {
        self.entries.values()
    }

    pub fn list_by_category(&self, category: &str) -> Vec<&CalculatorRequirement> {
        self.entries
            .values()
            .filter(|r| r.category == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder so registries are immutable once handed out.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, CalculatorRequirement>,
}

impl RegistryBuilder {
    pub fn register(mut self, requirement: CalculatorRequirement) -> Self {
        if let Some(previous) = self
            .entries
            .insert(requirement.calculator_id.clone(), requirement)
        {
            tracing::warn!(
                calculator_id = %previous.calculator_id,
                "duplicate calculator registration replaced the earlier entry"
            );
        }
        self
    }

    pub fn build(self) -> CalculatorRegistry {
        CalculatorRegistry {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement(id: &str, category: &str, required: &[&str]) -> CalculatorRequirement {
        CalculatorRequirement {
            calculator_id: id.into(),
            name: id.to_uppercase(),
            category: category.into(),
            required_fields: required.iter().map(|s| s.to_string()).collect(),
            optional_fields: vec![],
            default_include: false,
        }
    }

    #[test]
    fn builder_round_trip() {
        let registry = CalculatorRegistry::builder()
            .register(requirement("bmi", "general", &["weight_kg", "height_cm"]))
            .register(requirement("capra", "prostate_oncology", &["age", "psa"]))
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("bmi"));
        assert_eq!(registry.get("capra").unwrap().category, "prostate_oncology");
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn all_iterates_in_id_order() {
        let registry = CalculatorRegistry::builder()
            .register(requirement("meld", "hepatology", &[]))
            .register(requirement("bmi", "general", &[]))
            .register(requirement("capra", "prostate_oncology", &[]))
            .build();

        let ids: Vec<&str> = registry.all().map(|r| r.calculator_id.as_str()).collect();
        assert_eq!(ids, vec!["bmi", "capra", "meld"]);
    }

    #[test]
    fn duplicate_registration_keeps_latest() {
        let registry = CalculatorRegistry::builder()
            .register(requirement("bmi", "general", &["weight_kg"]))
            .register(requirement("bmi", "general", &["weight_kg", "height_cm"]))
            .build();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("bmi").unwrap().required_fields.len(), 2);
    }

    #[test]
    fn list_by_category_filters() {
        let registry = CalculatorRegistry::builder()
            .register(requirement("capra", "prostate_oncology", &[]))
            .register(requirement("psa_density", "prostate_oncology", &[]))
            .register(requirement("bmi", "general", &[]))
            .build();

        let prostate = registry.list_by_category("prostate_oncology");
        assert_eq!(prostate.len(), 2);
        assert!(registry.list_by_category("cardiology").is_empty());
    }
}
