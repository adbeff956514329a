use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::SqlExecutorError;
use crate::params::{Parameter, bare_name};
use crate::types::RowValues;

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Bind every placeholder in `stmt` from `params`.
///
/// `?` takes the next parameter in order, `?N` takes parameter `N`, and `:name`, `@name` or
/// `$name` takes the parameter whose name matches with or without its sigil.
///
/// # Errors
/// Returns [`SqlExecutorError::ParameterError`] when a placeholder has no value.
pub fn bind_parameters(stmt: &mut Statement<'_>, params: &[Parameter]) -> Result<(), SqlExecutorError> {
    let mut next_anonymous = 0;
    for index in 1..=stmt.parameter_count() {
        let param = match stmt.parameter_name(index) {
            None => {
                next_anonymous += 1;
                params.get(next_anonymous - 1)
            }
            Some(name) => match name.strip_prefix('?') {
                Some(number) => number
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| params.get(n.checked_sub(1)?)),
                None => find_named(params, name),
            },
        };
        let Some(param) = param else {
            let placeholder = stmt
                .parameter_name(index)
                .map_or_else(|| format!("?#{index}"), ToString::to_string);
            return Err(SqlExecutorError::ParameterError(format!(
                "no value supplied for placeholder {placeholder}"
            )));
        };
        stmt.raw_bind_parameter(index, row_value_to_sqlite_value(&param.value))?;
    }
    Ok(())
}

fn find_named<'p>(params: &'p [Parameter], placeholder: &str) -> Option<&'p Parameter> {
    let wanted = bare_name(placeholder);
    params
        .iter()
        .find(|p| p.bare_name() == wanted)
        .or_else(|| params.iter().find(|p| p.bare_name().eq_ignore_ascii_case(wanted)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::NamedParams;

    fn bound(sql: &str, params: &NamedParams) -> Result<Vec<Value>, SqlExecutorError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        let mut stmt = conn.prepare(sql)?;
        bind_parameters(&mut stmt, params.as_slice())?;
        let mut rows = stmt.raw_query();
        let row = rows.next()?.expect("one row");
        let mut out = Vec::new();
        for i in 0..row.as_ref().column_count() {
            out.push(row.get::<_, Value>(i)?);
        }
        Ok(out)
    }

    #[test]
    fn binds_by_name_regardless_of_sigil() {
        let params = NamedParams::new().with("@a", 1).with("b", "two");
        let values = bound("select :b, @a, $a", &params).unwrap();
        assert_eq!(
            values,
            vec![Value::Text("two".into()), Value::Integer(1), Value::Integer(1)]
        );
    }

    #[test]
    fn binds_anonymous_and_numbered_markers_by_position() {
        let params = NamedParams::new().with("x", 10).with("y", 20);
        assert_eq!(
            bound("select ?, ?", &params).unwrap(),
            vec![Value::Integer(10), Value::Integer(20)]
        );
        assert_eq!(
            bound("select ?2, ?1", &params).unwrap(),
            vec![Value::Integer(20), Value::Integer(10)]
        );
    }

    #[test]
    fn missing_values_are_parameter_errors() {
        let params = NamedParams::new().with("a", 1);
        let err = bound("select :a, :b", &params).unwrap_err();
        assert!(matches!(err, SqlExecutorError::ParameterError(ref m) if m.contains(":b")));
    }

    #[test]
    fn converts_every_value_kind() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(
            row_value_to_sqlite_value(&RowValues::Timestamp(ts)),
            Value::Text("2024-01-02 03:04:05".into())
        );
        assert_eq!(row_value_to_sqlite_value(&RowValues::Bool(true)), Value::Integer(1));
        assert_eq!(
            row_value_to_sqlite_value(&RowValues::JSON(serde_json::json!({"a": 1}))),
            Value::Text(r#"{"a":1}"#.into())
        );
    }
}
