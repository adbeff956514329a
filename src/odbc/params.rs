use odbc_api::parameter::{InputParameter, VarBinaryBox, VarCharBox};
use odbc_api::{Bit, IntoParameter};

use crate::params::Parameter;
use crate::types::RowValues;

/// Owned ODBC input parameters, one per `?` in driver order.
pub struct Params(Vec<Box<dyn InputParameter>>);

impl Params {
    #[must_use]
    pub fn convert(params: &[Parameter]) -> Self {
        Params(params.iter().map(|p| to_input(&p.value)).collect())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Box<dyn InputParameter>] {
        &self.0
    }
}

fn to_input(value: &RowValues) -> Box<dyn InputParameter> {
    match value {
        RowValues::Int(i) => Box::new(*i),
        RowValues::Float(f) => Box::new(*f),
        RowValues::Text(s) => Box::new(s.clone().into_parameter()),
        RowValues::Bool(b) => Box::new(Bit::from_bool(*b)),
        RowValues::Timestamp(dt) => {
            Box::new(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string().into_parameter())
        }
        RowValues::Null => Box::new(VarCharBox::null()),
        RowValues::JSON(jsval) => Box::new(jsval.to_string().into_parameter()),
        RowValues::Blob(bytes) => Box::new(VarBinaryBox::from_vec(bytes.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_value_kind_becomes_one_input() {
        let params = vec![
            Parameter::new("i", 1),
            Parameter::new("f", 1.5),
            Parameter::new("s", "text"),
            Parameter::new("b", true),
            Parameter::new(
                "t",
                chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
                    .and_then(|d| d.and_hms_opt(3, 4, 5))
                    .unwrap(),
            ),
            Parameter::new("n", RowValues::Null),
            Parameter::new("j", RowValues::JSON(serde_json::json!({"a": 1}))),
            Parameter::new("x", RowValues::Blob(vec![0, 1, 2])),
        ];
        let converted = Params::convert(&params);
        assert_eq!(converted.as_slice().len(), params.len());
        assert!(Params::convert(&[]).as_slice().is_empty());
    }
}
