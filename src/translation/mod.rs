use std::borrow::Cow;

mod parsers;
mod scanner;

use parsers::{
    follows_identifier, is_block_comment_end, is_block_comment_start, is_doubled,
    is_json_operator, is_line_comment_start, matches_tag, try_start_dollar_quote,
};
use scanner::{State, scan_digits, scan_identifier};

use crate::params::Parameter;

/// How a driver expects parameters to appear in command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// The driver binds `?`, `?N`, `:name`, `@name` and `$name` itself (`SQLite`).
    Native,
    /// `$1`, `$2`, ... (`PostgreSQL`).
    Dollar,
    /// `@P1`, `@P2`, ... (SQL Server over TDS).
    AtP,
    /// One `?` per bound value (ODBC).
    Question,
}

impl PlaceholderStyle {
    /// The placeholder token for a 1-based driver position.
    #[must_use]
    pub fn token(self, position: usize) -> String {
        match self {
            PlaceholderStyle::Native | PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${position}"),
            PlaceholderStyle::AtP => format!("@P{position}"),
        }
    }

    /// Whether one driver position can be referenced more than once in the text.
    fn reuses_positions(self) -> bool {
        matches!(self, PlaceholderStyle::Dollar | PlaceholderStyle::AtP)
    }
}

/// Command text rewritten for a driver, with the order in which the caller's parameters bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten<'a> {
    pub sql: Cow<'a, str>,
    /// Indices into the caller's parameter list, one per driver position.
    pub order: Vec<usize>,
}

impl<'a> Rewritten<'a> {
    fn passthrough(sql: &'a str, param_count: usize) -> Self {
        Self {
            sql: Cow::Borrowed(sql),
            order: (0..param_count).collect(),
        }
    }
}

/// Rewrite named and anonymous placeholders into the driver's positional style.
///
/// * `:name` and `@name` become positional only when `name` is one of `params`; anything
///   else (T-SQL variables, `::` casts, `@@ROWCOUNT`) is left alone.
/// * a bare `?` takes the next parameter in mapping order; `?N` refers to parameter `N`.
/// * quoted strings, quoted identifiers, comments and dollar-quoted bodies are skipped.
///
/// When nothing is recognised the text is returned borrowed and parameters bind in mapping
/// order, so text already written with `$1` or `@P1` works unchanged:
/// ```rust
/// use sql_executor::prelude::*;
/// use sql_executor::translation::rewrite_placeholders;
///
/// let params = NamedParams::new().with("id", 1).with("name", "x");
/// let out = rewrite_placeholders(
///     "update t set name = :name where id = :id",
///     PlaceholderStyle::Dollar,
///     params.as_slice(),
/// );
/// assert_eq!(out.sql, "update t set name = $1 where id = $2");
/// assert_eq!(out.order, vec![1, 0]);
/// ```
#[must_use]
pub fn rewrite_placeholders<'a>(
    sql: &'a str,
    style: PlaceholderStyle,
    params: &[Parameter],
) -> Rewritten<'a> {
    if style == PlaceholderStyle::Native || params.is_empty() {
        return Rewritten::passthrough(sql, params.len());
    }

    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    let mut order: Vec<usize> = Vec::new();
    let mut positions: Vec<Option<usize>> = vec![None; params.len()];
    let mut next_anonymous = 0;
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => {
                let mut reference: Option<(usize, usize)> = None;
                match b {
                    b'\'' => state = State::SingleQuoted,
                    b'"' => state = State::DoubleQuoted,
                    b'[' if style == PlaceholderStyle::AtP => state = State::Bracketed,
                    _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                    _ if is_block_comment_start(bytes, idx) => {
                        state = State::BlockComment(1);
                        idx += 1;
                    }
                    b'$' if style == PlaceholderStyle::Dollar => {
                        if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                            state = State::DollarQuoted(tag);
                            idx = advance;
                        }
                    }
                    b':' | b'@' => {
                        if is_doubled(bytes, idx) {
                            idx += 1;
                        } else if !follows_identifier(bytes, idx) {
                            if let Some((end, ident)) = scan_identifier(bytes, idx + 1) {
                                match find_param(params, ident) {
                                    Some(param_idx) => reference = Some((param_idx, end)),
                                    None => idx = end - 1,
                                }
                            }
                        }
                    }
                    b'?' if !is_json_operator(bytes, idx) => {
                        if let Some((end, digits)) = scan_digits(bytes, idx + 1) {
                            match digits.parse::<usize>() {
                                Ok(n) if (1..=params.len()).contains(&n) => {
                                    reference = Some((n - 1, end));
                                }
                                _ => idx = end - 1,
                            }
                        } else if next_anonymous < params.len() {
                            reference = Some((next_anonymous, idx + 1));
                            next_anonymous += 1;
                        }
                    }
                    _ => {}
                }

                if let Some((param_idx, end)) = reference {
                    out.push_str(&sql[copied..idx]);
                    let position = match positions[param_idx] {
                        Some(position) if style.reuses_positions() => position,
                        _ => {
                            order.push(param_idx);
                            positions[param_idx] = Some(order.len());
                            order.len()
                        }
                    };
                    out.push_str(&style.token(position));
                    copied = end;
                    idx = end;
                    continue;
                }
            }
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::Bracketed => {
                if b == b']' {
                    if bytes.get(idx + 1) == Some(&b']') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    if order.is_empty() {
        return Rewritten::passthrough(sql, params.len());
    }
    out.push_str(&sql[copied..]);
    Rewritten {
        sql: Cow::Owned(out),
        order,
    }
}

fn find_param(params: &[Parameter], ident: &str) -> Option<usize> {
    params
        .iter()
        .position(|p| p.bare_name() == ident)
        .or_else(|| {
            params
                .iter()
                .position(|p| p.bare_name().eq_ignore_ascii_case(ident))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::NamedParams;

    fn params(names: &[&str]) -> NamedParams {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, i64::try_from(i).unwrap()))
            .collect()
    }

    #[test]
    fn named_to_dollar_reuses_positions() {
        let p = params(&["a", "b"]);
        let res = rewrite_placeholders(
            "select * from t where x = :b or y = :a or z = :b",
            PlaceholderStyle::Dollar,
            p.as_slice(),
        );
        assert_eq!(res.sql, "select * from t where x = $1 or y = $2 or z = $1");
        assert_eq!(res.order, vec![1, 0]);
    }

    #[test]
    fn named_to_question_duplicates_values() {
        let p = params(&["a"]);
        let res = rewrite_placeholders(
            "select ? from t where a = @a or b = @a",
            PlaceholderStyle::Question,
            p.as_slice(),
        );
        assert_eq!(res.sql, "select ? from t where a = ? or b = ?");
        assert_eq!(res.order, vec![0, 0, 0]);
    }

    #[test]
    fn anonymous_markers_take_mapping_order() {
        let p = params(&["a", "b"]);
        let res = rewrite_placeholders(
            "insert into t values (?, ?)",
            PlaceholderStyle::AtP,
            p.as_slice(),
        );
        assert_eq!(res.sql, "insert into t values (@P1, @P2)");
        assert_eq!(res.order, vec![0, 1]);
    }

    #[test]
    fn leaves_variables_casts_and_literals_alone() {
        let p = params(&["id"]);
        let sql = "declare @x int; select ':id', [@id], @@rowcount, @x -- :id\n/* @id */ from t where id = @id";
        let res = rewrite_placeholders(sql, PlaceholderStyle::AtP, p.as_slice());
        assert_eq!(
            res.sql,
            "declare @x int; select ':id', [@id], @@rowcount, @x -- :id\n/* @id */ from t where id = @P1"
        );

        let res = rewrite_placeholders(
            "select :id::text, $q$ :id $q$",
            PlaceholderStyle::Dollar,
            p.as_slice(),
        );
        assert_eq!(res.sql, "select $1::text, $q$ :id $q$");
    }

    #[test]
    fn native_text_passes_through_in_mapping_order() {
        let p = params(&["a", "b"]);
        let sql = "select $1, $2";
        let res = rewrite_placeholders(sql, PlaceholderStyle::Dollar, p.as_slice());
        assert!(matches!(res.sql, Cow::Borrowed(_)));
        assert_eq!(res.order, vec![0, 1]);

        let res = rewrite_placeholders("select :a", PlaceholderStyle::Native, p.as_slice());
        assert_eq!(res.sql, "select :a");
    }

    #[test]
    fn jsonb_key_operators_are_not_placeholders() {
        let p = params(&["id"]);
        let res = rewrite_placeholders(
            "select * from t where data ? 'k' and tags ?| array['a'] and id = :id",
            PlaceholderStyle::Dollar,
            p.as_slice(),
        );
        assert_eq!(
            res.sql,
            "select * from t where data ? 'k' and tags ?| array['a'] and id = $1"
        );
        assert_eq!(res.order, vec![0]);

        let res = rewrite_placeholders("select ? , 'x'", PlaceholderStyle::Dollar, p.as_slice());
        assert_eq!(res.sql, "select $1 , 'x'");
    }

    #[test]
    fn keeps_multibyte_text_intact() {
        let p = params(&["name"]);
        let res = rewrite_placeholders(
            "select 'héllo', :name as 名前",
            PlaceholderStyle::Dollar,
            p.as_slice(),
        );
        assert_eq!(res.sql, "select 'héllo', $1 as 名前");
    }

    #[test]
    fn numbered_markers_bind_by_number() {
        let p = params(&["a", "b"]);
        let res = rewrite_placeholders(
            "select ?2, ?1, ?2",
            PlaceholderStyle::Dollar,
            p.as_slice(),
        );
        assert_eq!(res.sql, "select $1, $2, $1");
        assert_eq!(res.order, vec![1, 0]);
    }
}
