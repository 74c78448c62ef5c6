//! Conversions between [`Value`] and PostgreSQL wire types.
//!
//! Parameters adapt to the type the server inferred for them: an integer
//! bound against an `INT2` column is narrowed, a boolean bound against a
//! `BIT(1)` column is written as a one-bit string, and so on.

use std::error::Error;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDateTime, Utc};
use postgres_types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};

use crate::core::Row;
use crate::error::{BackendError, StorageResult};
use crate::types::{Value, format_timestamp};

type BoxError = Box<dyn Error + Sync + Send>;

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind {} parameter to {} column", value.type_name(), ty).into()
}

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

/// Writes a single bit in `BIT`/`VARBIT` binary format.
fn write_bit(bit: bool, out: &mut BytesMut) {
    out.put_i32(1);
    out.put_u8(if bit { 0x80 } else { 0x00 });
}

fn read_bit(raw: &[u8]) -> Result<bool, BoxError> {
    match raw {
        [0, 0, 0, 0] => Ok(false),
        [_, _, _, _, first, ..] => Ok(first & 0x80 != 0),
        _ => Err("invalid bit string".into()),
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => match *ty {
                Type::BIT | Type::VARBIT => {
                    write_bit(*b, out);
                    Ok(IsNull::No)
                }
                Type::BOOL => b.to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 => {
                    Value::Integer(i64::from(*b)).to_sql(ty, out)
                }
                _ if is_text(ty) => b.to_string().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Integer(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::INT8 => i.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::BOOL => (*i != 0).to_sql(ty, out),
                Type::BIT | Type::VARBIT => {
                    write_bit(*i != 0, out);
                    Ok(IsNull::No)
                }
                _ if is_text(ty) => i.to_string().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                _ if is_text(ty) => f.to_string().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Timestamp(t) => match *ty {
                Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
                Type::TIMESTAMPTZ => t.to_sql(ty, out),
                _ if is_text(ty) => format_timestamp(t).to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::String(s) => match *ty {
                Type::TIMESTAMP | Type::TIMESTAMPTZ => {
                    let parsed = DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc);
                    Value::Timestamp(parsed).to_sql(ty, out)
                }
                _ => s.as_str().to_sql(ty, out),
            },
            Value::Array(values) => match ty.kind() {
                Kind::Array(_) => values.to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Integer(i64::from(i16::from_sql(ty, raw)?)),
            Type::INT4 => Value::Integer(i64::from(i32::from_sql(ty, raw)?)),
            Type::INT8 => Value::Integer(i64::from_sql(ty, raw)?),
            Type::FLOAT4 => Value::Float(f64::from(f32::from_sql(ty, raw)?)),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::TIMESTAMP => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?.and_utc()),
            Type::TIMESTAMPTZ => Value::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::BIT | Type::VARBIT => Value::Bool(read_bit(raw)?),
            _ if is_text(ty) => Value::String(String::from_sql(ty, raw)?),
            _ => return Err(format!("unsupported column type {}", ty).into()),
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Decodes a driver row into a [`Row`].
pub(crate) fn decode_row(row: &tokio_postgres::Row) -> StorageResult<Row> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let value = row
            .try_get::<_, Value>(i)
            .map_err(|e| BackendError::Decode {
                column: column.clone(),
                message: e.to_string(),
            })?;
        values.push(value);
    }
    Ok(Row { columns, values })
}

/// Borrows parameters in the form the driver expects.
pub(crate) fn params(values: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}
