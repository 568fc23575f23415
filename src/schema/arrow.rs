// src/schema/arrow.rs

use arrow::datatypes::DataType;

use super::types::SqlType;

/// Map an Arrow DataType (as produced by CSV inference or the derived views)
/// onto the DuckDB column type it is stored as.
///
/// Covers:
/// - Boolean                  → BOOLEAN
/// - Int8..Int64, UInt8..32   → BIGINT
/// - Float16/32/64            → DOUBLE
/// - Utf8, LargeUtf8, Null    → VARCHAR
/// - Date32, Date64           → DATE
/// - Timestamp(_, None)       → TIMESTAMP
///
/// Anything else (UInt64, zoned timestamps, nested types, binary) is `None`.
pub fn map_from_arrow_type(dt: &DataType) -> Option<SqlType> {
    match dt {
        DataType::Boolean => Some(SqlType::Boolean),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => Some(SqlType::BigInt),
        DataType::Float16 | DataType::Float32 | DataType::Float64 => Some(SqlType::Double),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Null => Some(SqlType::Varchar),
        DataType::Date32 | DataType::Date64 => Some(SqlType::Date),
        DataType::Timestamp(_, None) => Some(SqlType::Timestamp),
        _ => None,
    }
}
