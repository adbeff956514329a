use std::error::Error;

use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::params::Parameter;
use crate::types::RowValues;

/// Container for Postgres parameters with lifetime tracking
pub struct Params<'a> {
    references: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> Params<'a> {
    /// Borrow each parameter's value in driver order.
    #[must_use]
    pub fn convert(params: &'a [Parameter]) -> Params<'a> {
        let references = params
            .iter()
            .map(|p| &p.value as &(dyn ToSql + Sync))
            .collect();
        Params { references }
    }

    /// Get a reference to the underlying parameter array
    #[must_use]
    pub fn as_refs(&self) -> &[&(dyn ToSql + Sync)] {
        &self.references
    }
}

/// Values are encoded for the type the server inferred for each placeholder, so an `Int`
/// bound to an `int4` column or a `Float` bound to `real` still round-trips.
impl ToSql for RowValues {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            RowValues::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::BOOL => (*i != 0).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                    i.to_string().to_sql(ty, out)
                }
                _ => i.to_sql_checked(ty, out),
            },
            RowValues::Float(f) => match *ty {
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql_checked(ty, out),
            },
            RowValues::Text(s) => match *ty {
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                _ => s.to_sql_checked(ty, out),
            },
            RowValues::Bool(b) => b.to_sql_checked(ty, out),
            RowValues::Timestamp(dt) => match *ty {
                Type::DATE => dt.date().to_sql(ty, out),
                Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => dt.format("%F %T%.f").to_string().to_sql(ty, out),
                _ => dt.to_sql_checked(ty, out),
            },
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::JSON(jsval) => match *ty {
                Type::TEXT | Type::VARCHAR => jsval.to_string().to_sql(ty, out),
                _ => jsval.to_sql_checked(ty, out),
            },
            RowValues::Blob(bytes) => bytes.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &RowValues, ty: &Type) -> Result<Vec<u8>, Box<dyn Error + Sync + Send>> {
        let mut out = bytes::BytesMut::new();
        value.to_sql(ty, &mut out)?;
        Ok(out.to_vec())
    }

    #[test]
    fn narrows_integers_to_the_column_width() {
        assert_eq!(encode(&RowValues::Int(7), &Type::INT4).unwrap(), 7i32.to_be_bytes());
        assert_eq!(encode(&RowValues::Int(7), &Type::INT8).unwrap(), 7i64.to_be_bytes());
        assert!(encode(&RowValues::Int(i64::MAX), &Type::INT2).is_err());
    }

    #[test]
    fn mismatched_types_are_rejected() {
        assert!(encode(&RowValues::Bool(true), &Type::INT4).is_err());
        assert!(encode(&RowValues::Text("x".into()), &Type::INT4).is_err());
    }

    #[test]
    fn null_encodes_as_null_for_any_type() {
        let mut out = bytes::BytesMut::new();
        assert!(matches!(
            RowValues::Null.to_sql(&Type::INT4, &mut out).unwrap(),
            IsNull::Yes
        ));
    }
}
