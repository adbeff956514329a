use std::sync::Arc;

use odbc_api::{Cursor, CursorRow, DataType, ResultSetMetadata};

use crate::error::SqlExecutorError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// How a column is read back; ODBC drivers all support reading as text, so that is the
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Integer,
    Real,
    Bit,
    Binary,
    Text,
}

impl ColumnKind {
    fn of(data_type: DataType) -> Self {
        match data_type {
            DataType::TinyInt { .. }
            | DataType::SmallInt { .. }
            | DataType::Integer { .. }
            | DataType::BigInt { .. } => ColumnKind::Integer,
            DataType::Real { .. } | DataType::Float { .. } | DataType::Double { .. } => {
                ColumnKind::Real
            }
            DataType::Bit { .. } => ColumnKind::Bit,
            DataType::Binary { .. }
            | DataType::Varbinary { .. }
            | DataType::LongVarbinary { .. } => ColumnKind::Binary,
            _ => ColumnKind::Text,
        }
    }
}

/// Column names and read kinds of the cursor's current result set.
pub(crate) fn describe(
    cursor: &mut impl ResultSetMetadata,
) -> Result<(Arc<Vec<String>>, Vec<ColumnKind>), SqlExecutorError> {
    let count = u16::try_from(cursor.num_result_cols()?).unwrap_or(0);
    let mut names = Vec::with_capacity(usize::from(count));
    let mut kinds = Vec::with_capacity(usize::from(count));
    for col in 1..=count {
        names.push(cursor.col_name(col)?);
        kinds.push(ColumnKind::of(cursor.col_data_type(col)?));
    }
    Ok((Arc::new(names), kinds))
}

pub(crate) fn extract_row(
    row: &mut CursorRow<'_>,
    kinds: &[ColumnKind],
    buf: &mut Vec<u8>,
) -> Result<Vec<RowValues>, SqlExecutorError> {
    let mut values = Vec::with_capacity(kinds.len());
    for (i, kind) in kinds.iter().enumerate() {
        let col = u16::try_from(i + 1).map_err(|_| {
            SqlExecutorError::ExecutionError("too many ODBC columns".to_string())
        })?;
        buf.clear();
        let present = if *kind == ColumnKind::Binary {
            row.get_binary(col, buf)?
        } else {
            row.get_text(col, buf)?
        };
        if !present {
            values.push(RowValues::Null);
            continue;
        }
        let value = match kind {
            ColumnKind::Binary => RowValues::Blob(buf.clone()),
            _ => {
                let text = String::from_utf8_lossy(buf).into_owned();
                parse_text(*kind, text)
            }
        };
        values.push(value);
    }
    Ok(values)
}

fn parse_text(kind: ColumnKind, text: String) -> RowValues {
    let trimmed = text.trim();
    match kind {
        ColumnKind::Integer => trimmed
            .parse::<i64>()
            .map_or_else(|_| RowValues::Text(text.clone()), RowValues::Int),
        ColumnKind::Real => trimmed
            .parse::<f64>()
            .map_or_else(|_| RowValues::Text(text.clone()), RowValues::Float),
        ColumnKind::Bit => RowValues::Bool(trimmed == "1" || trimmed.eq_ignore_ascii_case("true")),
        ColumnKind::Binary | ColumnKind::Text => RowValues::Text(text),
    }
}

/// Read every row of the cursor's current result set.
pub(crate) fn read_table(cursor: &mut impl Cursor) -> Result<ResultSet, SqlExecutorError> {
    let (names, kinds) = describe(cursor)?;
    let mut table = ResultSet::with_capacity(16);
    table.set_column_names(names);
    let mut buf = Vec::new();
    while let Some(mut row) = cursor.next_row()? {
        table.add_row_values(extract_row(&mut row, &kinds, &mut buf)?);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_parsed_by_column_kind() {
        assert_eq!(parse_text(ColumnKind::Integer, " 42".into()), RowValues::Int(42));
        assert_eq!(parse_text(ColumnKind::Real, "1.5".into()), RowValues::Float(1.5));
        assert_eq!(parse_text(ColumnKind::Bit, "1".into()), RowValues::Bool(true));
        assert_eq!(
            parse_text(ColumnKind::Integer, "n/a".into()),
            RowValues::Text("n/a".into())
        );
    }

    #[test]
    fn column_kinds_follow_the_reported_type() {
        assert_eq!(ColumnKind::of(DataType::BigInt), ColumnKind::Integer);
        assert_eq!(ColumnKind::of(DataType::Double), ColumnKind::Real);
        assert_eq!(ColumnKind::of(DataType::Bit), ColumnKind::Bit);
        assert_eq!(
            ColumnKind::of(DataType::Varbinary { length: None }),
            ColumnKind::Binary
        );
        assert_eq!(ColumnKind::of(DataType::Date), ColumnKind::Text);
        assert_eq!(ColumnKind::of(DataType::Unknown), ColumnKind::Text);
    }
}
