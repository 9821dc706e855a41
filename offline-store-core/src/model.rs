use crate::error::OfflineStoreError;
use crate::value::ScalarValue;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fmt::Formatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Feature,
    Label,
    TrainingSet,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Feature => write!(f, "feature"),
            ResourceType::Label => write!(f, "label"),
            ResourceType::TrainingSet => write!(f, "training set"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub name: String,
    pub variant: String,
    pub resource_type: ResourceType,
}

impl ResourceId {
    pub fn new(
        name: impl Into<String>,
        variant: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            name: name.into(),
            variant: variant.into(),
            resource_type,
        }
    }

    pub fn feature(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self::new(name, variant, ResourceType::Feature)
    }

    pub fn label(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self::new(name, variant, ResourceType::Label)
    }

    pub fn training_set(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self::new(name, variant, ResourceType::TrainingSet)
    }

    /// Fails unless this id is one of `expected` kinds.
    pub fn check(&self, expected: &[ResourceType]) -> Result<()> {
        if expected.contains(&self.resource_type) {
            return Ok(());
        }
        let expected = expected
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" or ");
        Err(OfflineStoreError::invalid_resource_id(
            &self.name,
            &self.variant,
            format!("expected {}, got {}", expected, self.resource_type),
        )
        .into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterializationId(String);

impl MaterializationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&ResourceId> for MaterializationId {
    fn from(id: &ResourceId) -> Self {
        Self(id.name.clone())
    }
}

impl From<&str> for MaterializationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for MaterializationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for MaterializationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One observation of a feature or label for an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRecord {
    pub entity: String,
    pub value: ScalarValue,
    pub ts: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(entity: impl Into<String>, value: ScalarValue, ts: DateTime<Utc>) -> Self {
        Self {
            entity: entity.into(),
            value,
            ts,
        }
    }

    pub fn check(&self) -> Result<()> {
        if self.entity.is_empty() {
            return Err(OfflineStoreError::invalid_record("entity must not be empty").into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSetDef {
    pub id: ResourceId,
    pub label: ResourceId,
    pub features: Vec<ResourceId>,
}

impl TrainingSetDef {
    pub fn check(&self) -> Result<()> {
        self.id.check(&[ResourceType::TrainingSet])?;
        self.label.check(&[ResourceType::Label]).map_err(|_| {
            OfflineStoreError::invalid_training_set_def(format!(
                "label '{}' ({}) must be a label",
                self.label.name, self.label.variant
            ))
        })?;
        if self.features.is_empty() {
            return Err(
                OfflineStoreError::invalid_training_set_def("no features provided").into(),
            );
        }
        let mut seen = HashSet::with_capacity(self.features.len());
        for feature in &self.features {
            if feature.resource_type != ResourceType::Feature {
                return Err(OfflineStoreError::invalid_training_set_def(format!(
                    "'{}' ({}) is a {}, not a feature",
                    feature.name, feature.variant, feature.resource_type
                ))
                .into());
            }
            if !seen.insert(feature) {
                return Err(OfflineStoreError::invalid_training_set_def(format!(
                    "feature '{}' ({}) listed more than once",
                    feature.name, feature.variant
                ))
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(features: Vec<ResourceId>) -> TrainingSetDef {
        TrainingSetDef {
            id: ResourceId::training_set("churn", "v1"),
            label: ResourceId::label("churned", "v1"),
            features,
        }
    }

    fn def_error(def: &TrainingSetDef) -> Option<OfflineStoreError> {
        def.check()
            .err()
            .and_then(|e| e.downcast_ref::<OfflineStoreError>().cloned())
    }

    #[test]
    fn valid_training_set_def() -> Result<()> {
        def(vec![
            ResourceId::feature("age", "v1"),
            ResourceId::feature("age", "v2"),
        ])
        .check()
    }

    #[test]
    fn training_set_def_requires_features() {
        assert!(matches!(
            def_error(&def(vec![])),
            Some(OfflineStoreError::InvalidTrainingSetDef { .. })
        ));
    }

    #[test]
    fn training_set_def_rejects_wrong_kinds_and_repeats() {
        let mut bad_label = def(vec![ResourceId::feature("age", "v1")]);
        bad_label.label = ResourceId::feature("churned", "v1");
        assert!(matches!(
            def_error(&bad_label),
            Some(OfflineStoreError::InvalidTrainingSetDef { .. })
        ));

        let mut bad_id = def(vec![ResourceId::feature("age", "v1")]);
        bad_id.id = ResourceId::label("churn", "v1");
        assert!(matches!(
            def_error(&bad_id),
            Some(OfflineStoreError::InvalidResourceId { .. })
        ));

        let repeated = def(vec![
            ResourceId::feature("age", "v1"),
            ResourceId::feature("age", "v1"),
        ]);
        assert!(def_error(&repeated).is_some());
        let label_as_feature = def(vec![ResourceId::label("churned", "v1")]);
        assert!(def_error(&label_as_feature).is_some());
    }

    #[test]
    fn record_requires_entity() {
        let record = ResourceRecord::new("", ScalarValue::Int(1), Utc::now());
        assert!(record.check().is_err());
        let record = ResourceRecord::new("u1", ScalarValue::Int(1), Utc::now());
        assert!(record.check().is_ok());
    }

    #[test]
    fn materialization_id_uses_feature_name() {
        let id = MaterializationId::from(&ResourceId::feature("age", "v1"));
        assert_eq!(id.as_str(), "age");
    }
}
