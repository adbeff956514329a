use std::error::Error;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{SimpleQueryMessage, Statement};

use crate::error::SqlExecutorError;
use crate::results::{ResultSet, RowSet};
use crate::types::RowValues;

type DecodeError = Box<dyn Error + Sync + Send>;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// Types without a dedicated arm are read through their binary form: valid UTF-8
/// (enums, `xml`, `citext`, ...) becomes text, anything else a blob.
///
/// # Errors
/// Returns `SqlExecutorError` if the column cannot be retrieved.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<RowValues, SqlExecutorError> {
    let type_info = row.columns()[idx].type_();

    match type_info.name() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Int))
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Float))
        }
        "numeric" => {
            let val: Option<PgNumeric> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, PgNumeric::into_value))
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Bool))
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Timestamp))
        }
        "timestamptz" => {
            let val: Option<DateTime<Utc>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc())))
        }
        "date" => {
            let val: Option<NaiveDate> = row.try_get(idx)?;
            Ok(val
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map_or(RowValues::Null, RowValues::Timestamp))
        }
        "time" => {
            let val: Option<NaiveTime> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |t| {
                RowValues::Text(t.format("%H:%M:%S%.f").to_string())
            }))
        }
        "interval" => {
            let val: Option<PgInterval> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Text(v.0)))
        }
        "uuid" => {
            let val: Option<uuid::Uuid> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string())))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::JSON))
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Blob))
        }
        "text" | "varchar" | "bpchar" | "name" | "citext" | "unknown" => {
            let val: Option<String> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Text))
        }
        _ => {
            let val: Option<RawValue> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| v.0))
        }
    }
}

/// `numeric` in its exact decimal text form.
#[derive(Debug, Clone, PartialEq)]
struct PgNumeric(String);

impl PgNumeric {
    /// Float when the text parses as one (including `NaN` and the infinities), text otherwise.
    fn into_value(self) -> RowValues {
        match self.0.parse::<f64>() {
            Ok(v) => RowValues::Float(v),
            Err(_) => RowValues::Text(self.0),
        }
    }
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        numeric_text(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn be_u16(raw: &[u8], at: usize) -> Result<u16, DecodeError> {
    raw.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated numeric value".into())
}

/// Decode the binary `numeric` layout: digit count, weight, sign, display scale,
/// then base-10000 digits with the first one at `10000^weight`.
fn numeric_text(raw: &[u8]) -> Result<String, DecodeError> {
    let ndigits = usize::from(be_u16(raw, 0)?);
    let weight = i64::from(i16::from_be_bytes(be_u16(raw, 2)?.to_be_bytes()));
    let sign = be_u16(raw, 4)?;
    let dscale = usize::from(be_u16(raw, 6)?);

    match sign {
        0x0000 | 0x4000 => {}
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        other => return Err(format!("invalid numeric sign {other:#06x}").into()),
    }

    let digits = (0..ndigits)
        .map(|i| be_u16(raw, 8 + 2 * i))
        .collect::<Result<Vec<u16>, _>>()?;
    let digit_at = |pos: i64| -> u16 {
        usize::try_from(pos)
            .ok()
            .and_then(|p| digits.get(p).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 && digits.iter().any(|d| *d != 0) {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for pos in 0..=weight {
            let digit = digit_at(pos);
            if pos == 0 {
                let _ = write!(out, "{digit}");
            } else {
                let _ = write!(out, "{digit:04}");
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit_at(pos));
            pos += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// `interval` rendered the way `psql` prints it by default.
#[derive(Debug, Clone, PartialEq)]
struct PgInterval(String);

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let bytes: [u8; 16] = raw
            .try_into()
            .map_err(|_| format!("interval expects 16 bytes, got {}", raw.len()))?;
        let micros = i64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]);
        let days = i32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let months = i32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        Ok(PgInterval(interval_text(months, days, micros)))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

fn interval_text(months: i32, days: i32, micros: i64) -> String {
    fn unit(parts: &mut Vec<String>, n: i32, one: &str, many: &str) {
        if n != 0 {
            parts.push(format!("{n} {}", if n.unsigned_abs() == 1 { one } else { many }));
        }
    }

    let mut parts = Vec::new();
    unit(&mut parts, months / 12, "year", "years");
    unit(&mut parts, months % 12, "mon", "mons");
    unit(&mut parts, days, "day", "days");

    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let frac = total % 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        if frac != 0 {
            let digits = format!("{frac:06}");
            let _ = write!(clock, ".{}", digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

/// Any other type: UTF-8 payloads become text, the rest stay as bytes.
struct RawValue(RowValues);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(RawValue(match std::str::from_utf8(raw) {
            Ok(text) => RowValues::Text(text.to_string()),
            Err(_) => RowValues::Blob(raw.to_vec()),
        }))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

pub(crate) fn statement_columns(stmt: &Statement) -> Arc<Vec<String>> {
    Arc::new(
        stmt.columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect(),
    )
}

pub(crate) fn extract_row(row: &tokio_postgres::Row) -> Result<Vec<RowValues>, SqlExecutorError> {
    (0..row.len())
        .map(|idx| postgres_extract_value(row, idx))
        .collect()
}

/// Build a result set using statement metadata for column names.
///
/// Column names come from the prepared statement, so an empty result still has them.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_result_set_from_statement(
    stmt: &Statement,
    rows: &[tokio_postgres::Row],
) -> Result<ResultSet, SqlExecutorError> {
    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(statement_columns(stmt));

    for row in rows {
        result_set.add_row_values(extract_row(row)?);
    }

    Ok(result_set)
}

/// Total rows changed across every statement of a simple-query run.
pub(crate) fn affected_rows(messages: &[SimpleQueryMessage]) -> u64 {
    messages
        .iter()
        .map(|message| match message {
            SimpleQueryMessage::CommandComplete(rows) => *rows,
            _ => 0,
        })
        .sum()
}

/// Group simple-query messages into one table per statement that returned rows.
///
/// The simple protocol transfers every value as text, so non-null values become
/// [`RowValues::Text`].
#[must_use]
pub fn build_row_set_from_messages(messages: &[SimpleQueryMessage]) -> RowSet {
    let mut set = RowSet::default();
    let mut current: Option<ResultSet> = None;

    for message in messages {
        match message {
            SimpleQueryMessage::Row(row) => {
                let table = current.get_or_insert_with(|| {
                    let mut table = ResultSet::with_capacity(16);
                    table.set_column_names(Arc::new(
                        row.columns()
                            .iter()
                            .map(|c| c.name().to_string())
                            .collect(),
                    ));
                    table
                });
                let values = (0..row.len())
                    .map(|idx| {
                        row.get(idx)
                            .map_or(RowValues::Null, |v| RowValues::Text(v.to_string()))
                    })
                    .collect();
                table.add_row_values(values);
            }
            SimpleQueryMessage::CommandComplete(_) => {
                if let Some(table) = current.take() {
                    set.push(table);
                }
            }
            _ => {}
        }
    }
    if let Some(table) = current {
        set.push(table);
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&ndigits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn numeric_decodes_to_exact_text() {
        assert_eq!(numeric_text(&numeric(2, 0, 0, 1, &[1, 5000])).unwrap(), "1.5");
        assert_eq!(
            numeric_text(&numeric(3, 1, 0x4000, 3, &[1, 2345, 6780])).unwrap(),
            "-12345.678"
        );
        assert_eq!(numeric_text(&numeric(1, -1, 0, 4, &[12])).unwrap(), "0.0012");
        assert_eq!(numeric_text(&numeric(1, 1, 0, 0, &[7])).unwrap(), "70000");
        assert_eq!(numeric_text(&numeric(0, 0, 0, 2, &[])).unwrap(), "0.00");
        assert_eq!(numeric_text(&numeric(0, 0, 0xC000, 0, &[])).unwrap(), "NaN");
        assert!(numeric_text(&[0, 1]).is_err());
    }

    #[test]
    fn numeric_columns_become_floats_through_from_sql() {
        let raw = numeric(2, 0, 0, 2, &[2, 2500]);
        let value = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap().into_value();
        assert_eq!(value, RowValues::Float(2.25));
        assert!(PgNumeric::accepts(&Type::NUMERIC));
        assert!(!PgNumeric::accepts(&Type::INT4));
    }

    #[test]
    fn intervals_read_like_psql() {
        assert_eq!(interval_text(14, 4, 3_723_000_000), "1 year 2 mons 4 days 01:02:03");
        assert_eq!(interval_text(0, 1, 0), "1 day");
        assert_eq!(interval_text(0, 0, -1_500_000), "-00:00:01.5");
        assert_eq!(interval_text(0, 0, 0), "00:00:00");

        let mut raw = Vec::new();
        raw.extend_from_slice(&90_000_000i64.to_be_bytes());
        raw.extend_from_slice(&2i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        let interval = PgInterval::from_sql(&Type::INTERVAL, &raw).unwrap();
        assert_eq!(interval.0, "2 days 00:01:30");
        assert!(PgInterval::from_sql(&Type::INTERVAL, &raw[..8]).is_err());
    }

    #[test]
    fn affected_rows_sum_every_statement() {
        let messages = [
            SimpleQueryMessage::CommandComplete(0),
            SimpleQueryMessage::CommandComplete(2),
            SimpleQueryMessage::CommandComplete(3),
        ];
        assert_eq!(affected_rows(&messages), 5);
        assert_eq!(affected_rows(&[]), 0);
    }

    #[test]
    fn unknown_types_fall_back_to_text_or_bytes() {
        let RawValue(text) = RawValue::from_sql(&Type::XML, b"<a/>").unwrap();
        assert_eq!(text, RowValues::Text("<a/>".into()));
        let RawValue(bytes) = RawValue::from_sql(&Type::MONEY, &[0xff, 0x00]).unwrap();
        assert_eq!(bytes, RowValues::Blob(vec![0xff, 0x00]));
        assert!(RawValue::accepts(&Type::TS_VECTOR));
    }
}
