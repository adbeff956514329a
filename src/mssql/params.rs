use tiberius::Query;

use crate::params::Parameter;
use crate::types::RowValues;

/// Bind parameters directly to the query for SQL Server
/// Return a query builder with parameters already bound
pub fn bind_query_params<'a>(query: &'a str, params: &[Parameter]) -> Query<'a> {
    let mut query_builder = Query::new(query);

    for param in params {
        match &param.value {
            RowValues::Int(i) => query_builder.bind(*i),
            RowValues::Float(f) => query_builder.bind(*f),
            RowValues::Text(s) => query_builder.bind(s.clone()),
            RowValues::Bool(b) => query_builder.bind(*b),
            RowValues::Timestamp(dt) => query_builder.bind(*dt),
            RowValues::Null => query_builder.bind(Option::<String>::None),
            RowValues::JSON(jsval) => query_builder.bind(jsval.to_string()),
            RowValues::Blob(bytes) => query_builder.bind(bytes.clone()),
        }
    }

    query_builder
}

/// Ensure a parameter name carries the `@` sigil T-SQL expects.
pub(crate) fn at_name(name: &str) -> String {
    if name.starts_with('@') {
        name.to_string()
    } else {
        format!("@{}", crate::params::bare_name(name))
    }
}

/// `EXEC` text for a procedure, reading output arguments back through a trailing `SELECT`.
///
/// Each argument binds positionally as `@Pn`. Output arguments go through a declared local
/// variable initialised from their input value; the final row names each one after the
/// procedure argument.
pub(crate) fn exec_text(name: &str, params: &[Parameter]) -> String {
    let mut declares = String::new();
    let mut args = Vec::with_capacity(params.len());
    let mut outputs = Vec::new();

    for (i, param) in params.iter().enumerate() {
        let position = i + 1;
        let arg = param.bare_name();
        if param.direction.is_output() {
            let var = format!("@__out{position}");
            let sql_type = param.sql_type.as_deref().unwrap_or("NVARCHAR(MAX)");
            declares.push_str(&format!("DECLARE {var} {sql_type} = @P{position};\n"));
            args.push(format!("@{arg} = {var} OUTPUT"));
            outputs.push(format!("{var} AS [{arg}]"));
        } else {
            args.push(format!("@{arg} = @P{position}"));
        }
    }

    let mut text = declares;
    text.push_str("EXEC ");
    text.push_str(name);
    if !args.is_empty() {
        text.push(' ');
        text.push_str(&args.join(", "));
    }
    text.push(';');
    if !outputs.is_empty() {
        text.push_str("\nSELECT ");
        text.push_str(&outputs.join(", "));
        text.push(';');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_gain_the_at_sigil_once() {
        assert_eq!(at_name("id"), "@id");
        assert_eq!(at_name("@id"), "@id");
        assert_eq!(at_name(":id"), "@id");
    }

    #[test]
    fn plain_procedures_bind_positionally() {
        let params = vec![Parameter::new("@a", 1), Parameter::new("b", "x")];
        assert_eq!(exec_text("dbo.p", &params), "EXEC dbo.p @a = @P1, @b = @P2;");
        assert_eq!(exec_text("dbo.noargs", &[]), "EXEC dbo.noargs;");
    }

    #[test]
    fn outputs_are_selected_back() {
        let params = vec![
            Parameter::new("@id", 7),
            Parameter::output("@total").with_sql_type("INT"),
        ];
        assert_eq!(
            exec_text("dbo.count_orders", &params),
            "DECLARE @__out2 INT = @P2;\n\
             EXEC dbo.count_orders @id = @P1, @total = @__out2 OUTPUT;\n\
             SELECT @__out2 AS [total];"
        );
    }
}
