use crate::error::OfflineStoreError;
use crate::model::{MaterializationId, ResourceId, ResourceType};
use anyhow::Result;

const RESOURCE_TABLE_PREFIX: &str = "featureform_resource";
const MATERIALIZATION_TABLE_PREFIX: &str = "featureform_materialization";
const TRAINING_SET_TABLE_PREFIX: &str = "featureform_trainingset";

/// PostgreSQL truncates longer identifiers (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Quotes `ident` for interpolation into statement text.
///
/// Every dynamically built table or column name goes through here; values are
/// always bound as parameters instead.
pub fn sanitize(ident: &str) -> String {
    let escaped = ident.replace('\0', "").replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

pub fn resource_table_name(id: &ResourceId) -> Result<String> {
    id.check(&[ResourceType::Feature, ResourceType::Label])?;
    let kind = match id.resource_type {
        ResourceType::Feature => "feature",
        _ => "label",
    };
    check_len(
        &id.name,
        &id.variant,
        format!(
            "{}_{}_{}_{}",
            RESOURCE_TABLE_PREFIX, kind, id.name, id.variant
        ),
    )
}

pub fn materialization_table_name(id: &MaterializationId) -> Result<String> {
    check_len(
        id.as_str(),
        "",
        format!("{}_{}", MATERIALIZATION_TABLE_PREFIX, id),
    )
}

pub fn training_set_table_name(id: &ResourceId) -> Result<String> {
    id.check(&[ResourceType::TrainingSet])?;
    check_len(
        &id.name,
        &id.variant,
        format!("{}_{}_{}", TRAINING_SET_TABLE_PREFIX, id.name, id.variant),
    )
}

fn check_len(name: &str, variant: &str, table: String) -> Result<String> {
    if table.len() > MAX_IDENTIFIER_LEN {
        return Err(OfflineStoreError::invalid_resource_id(
            name,
            variant,
            format!(
                "table name '{}' exceeds {} bytes",
                table, MAX_IDENTIFIER_LEN
            ),
        )
        .into());
    }
    Ok(table)
}
