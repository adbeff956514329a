use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::TryStreamExt;
use tiberius::numeric::Numeric;
use tiberius::{ColumnData, FromSql, QueryItem, QueryStream};

use crate::error::SqlExecutorError;
use crate::results::{ResultSet, RowSet};
use crate::types::RowValues;

/// Read every result set from a query stream, one table per metadata token.
///
/// # Errors
/// Returns the driver error if a token or row cannot be read.
pub async fn build_row_set(mut stream: QueryStream<'_>) -> Result<RowSet, SqlExecutorError> {
    let mut set = RowSet::default();
    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) => {
                let names: Vec<String> = meta
                    .columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect();
                let mut table = ResultSet::with_capacity(10);
                table.set_column_names(Arc::new(names));
                set.push(table);
            }
            QueryItem::Row(row) => {
                if let Some(table) = set.tables.last_mut() {
                    table.add_row_values(extract_row(&row)?);
                }
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
    Ok(set)
}

pub(crate) fn extract_row(row: &tiberius::Row) -> Result<Vec<RowValues>, SqlExecutorError> {
    row.cells()
        .map(|(column, data)| extract_value(column.name(), data))
        .collect()
}

/// Map one SQL Server cell onto a `RowValues`.
///
/// `date` becomes a midnight timestamp, `datetimeoffset` a UTC timestamp and `time` its
/// `HH:MM:SS[.f]` text. A non-null value of a type without a mapping is an error rather
/// than a silent null.
fn extract_value(column: &str, data: &ColumnData<'static>) -> Result<RowValues, SqlExecutorError> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(RowValues::Int),
        ColumnData::F32(v) => v.map(|v| RowValues::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(RowValues::Float),
        ColumnData::Bit(v) => v.map(RowValues::Bool),
        ColumnData::Numeric(v) => v.as_ref().map(|n| RowValues::Float(numeric_to_f64(n))),
        ColumnData::String(v) => v.as_ref().map(|s| RowValues::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| RowValues::Text(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| RowValues::Blob(b.to_vec())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(RowValues::Timestamp)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(RowValues::Timestamp),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?
            .map(|t| RowValues::Text(t.format("%H:%M:%S%.f").to_string())),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)?
            .map(|dt| RowValues::Timestamp(dt.naive_utc())),
        #[allow(unreachable_patterns)]
        _ => match <&str>::from_sql(data) {
            Ok(text) => text.map(|s| RowValues::Text(s.to_string())),
            Err(err) => {
                return Err(SqlExecutorError::ExecutionError(format!(
                    "column {column}: no value mapping for this SQL Server type ({err})"
                )));
            }
        },
    };
    Ok(value.unwrap_or(RowValues::Null))
}

fn numeric_to_f64(n: &Numeric) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let value = n.value() as f64;
    value / 10f64.powi(i32::from(n.scale()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiberius::IntoSql;

    #[test]
    fn dates_and_times_keep_their_values() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let data: ColumnData<'static> = day.into_sql();
        assert_eq!(
            extract_value("d", &data).unwrap(),
            RowValues::Timestamp(day.and_hms_opt(0, 0, 0).unwrap())
        );

        let time = NaiveTime::from_hms_opt(13, 45, 30).unwrap();
        let data: ColumnData<'static> = time.into_sql();
        match extract_value("t", &data).unwrap() {
            RowValues::Text(text) => assert!(text.starts_with("13:45:30"), "{text}"),
            other => panic!("expected text, got {other:?}"),
        }

        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = day.and_hms_opt(12, 0, 0).unwrap();
        let stamped = local.and_local_timezone(offset).unwrap();
        let data: ColumnData<'static> = stamped.into_sql();
        assert_eq!(
            extract_value("o", &data).unwrap(),
            RowValues::Timestamp(day.and_hms_opt(10, 0, 0).unwrap())
        );
    }

    #[test]
    fn numerics_become_floats_and_nulls_stay_null() {
        let data = ColumnData::Numeric(Some(Numeric::new_with_scale(12345, 2)));
        assert_eq!(extract_value("n", &data).unwrap(), RowValues::Float(123.45));
        let data = ColumnData::Numeric(Some(Numeric::new_with_scale(-5, 0)));
        assert_eq!(extract_value("n", &data).unwrap(), RowValues::Float(-5.0));

        assert_eq!(extract_value("d", &ColumnData::Date(None)).unwrap(), RowValues::Null);
        assert_eq!(extract_value("i", &ColumnData::I32(None)).unwrap(), RowValues::Null);
        assert_eq!(
            extract_value("i", &ColumnData::U8(Some(7))).unwrap(),
            RowValues::Int(7)
        );
    }
}
