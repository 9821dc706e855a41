use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineStoreError {
    InvalidConfig {
        reason: String,
    },
    InvalidResourceId {
        name: String,
        variant: String,
        reason: String,
    },
    InvalidTrainingSetDef {
        reason: String,
    },
    InvalidRecord {
        reason: String,
    },
    InvalidSegment {
        start: i64,
        end: i64,
    },
    TableAlreadyExists {
        name: String,
        variant: String,
    },
    TableNotFound {
        name: String,
        variant: String,
    },
    MaterializationNotFound {
        id: String,
    },
    TrainingSetNotFound {
        name: String,
        variant: String,
    },
    Codec {
        reason: String,
    },
}

impl OfflineStoreError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn invalid_resource_id(
        name: impl Into<String>,
        variant: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidResourceId {
            name: name.into(),
            variant: variant.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_training_set_def(reason: impl Into<String>) -> Self {
        Self::InvalidTrainingSetDef {
            reason: reason.into(),
        }
    }

    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }

    pub fn table_already_exists(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self::TableAlreadyExists {
            name: name.into(),
            variant: variant.into(),
        }
    }

    pub fn table_not_found(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self::TableNotFound {
            name: name.into(),
            variant: variant.into(),
        }
    }

    pub fn materialization_not_found(id: impl Into<String>) -> Self {
        Self::MaterializationNotFound { id: id.into() }
    }

    pub fn training_set_not_found(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self::TrainingSetNotFound {
            name: name.into(),
            variant: variant.into(),
        }
    }

    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TableNotFound { .. }
                | Self::MaterializationNotFound { .. }
                | Self::TrainingSetNotFound { .. }
        )
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::TableAlreadyExists { .. })
    }
}

impl Display for OfflineStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => write!(f, "Invalid postgres config: {}", reason),
            Self::InvalidResourceId {
                name,
                variant,
                reason,
            } => write!(
                f,
                "Invalid resource id '{}' (variant '{}'): {}",
                name, variant, reason
            ),
            Self::InvalidTrainingSetDef { reason } => {
                write!(f, "Invalid training set definition: {}", reason)
            }
            Self::InvalidRecord { reason } => write!(f, "Invalid resource record: {}", reason),
            Self::InvalidSegment { start, end } => {
                write!(f, "Invalid materialization segment ({}, {}]", start, end)
            }
            Self::TableAlreadyExists { name, variant } => write!(
                f,
                "Table '{}' with variant '{}' already exists",
                name, variant
            ),
            Self::TableNotFound { name, variant } => write!(
                f,
                "Table '{}' with variant '{}' not found",
                name, variant
            ),
            Self::MaterializationNotFound { id } => {
                write!(f, "Materialization '{}' not found", id)
            }
            Self::TrainingSetNotFound { name, variant } => write!(
                f,
                "Training set '{}' with variant '{}' not found",
                name, variant
            ),
            Self::Codec { reason } => write!(f, "Failed to convert table value: {}", reason),
        }
    }
}

impl std::error::Error for OfflineStoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_kinds() {
        assert!(OfflineStoreError::table_not_found("age", "v1").is_not_found());
        assert!(OfflineStoreError::materialization_not_found("age").is_not_found());
        assert!(OfflineStoreError::training_set_not_found("ts", "v1").is_not_found());
        assert!(!OfflineStoreError::table_already_exists("age", "v1").is_not_found());
        assert!(OfflineStoreError::table_already_exists("age", "v1").is_already_exists());
    }

    #[test]
    fn display_names_offending_identifier() {
        let err = OfflineStoreError::table_already_exists("age", "v1");
        assert_eq!(err.to_string(), "Table 'age' with variant 'v1' already exists");
        let err = anyhow::Error::from(OfflineStoreError::materialization_not_found("age"));
        assert_eq!(
            err.downcast_ref::<OfflineStoreError>(),
            Some(&OfflineStoreError::materialization_not_found("age"))
        );
    }
}
