//! Schema to column type mapping.

use crate::error::{QueryError, QueryResult};
use crate::types::FieldType;

/// Returns the column type declaration for a field.
pub fn column_type(field: &str, field_type: &FieldType) -> QueryResult<String> {
    let sql = match field_type {
        FieldType::String { max_len } if *max_len > 0 => format!("VARCHAR({})", max_len),
        FieldType::String { .. } | FieldType::Url => "VARCHAR".to_string(),
        FieldType::Integer => "INTEGER".to_string(),
        FieldType::Float => "FLOAT".to_string(),
        FieldType::Bool => "BIT(1)".to_string(),
        FieldType::Time => "TIMESTAMP".to_string(),
        FieldType::Array | FieldType::Object | FieldType::Reference => {
            return Err(QueryError::UnsupportedFieldType {
                field: field.to_string(),
                field_type: field_type.name().to_string(),
            });
        }
    };
    Ok(sql)
}
