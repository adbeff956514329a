use crate::types::RowValues;

/// Direction of a procedure argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParamDirection {
    #[default]
    Input,
    Output,
    InputOutput,
}

impl ParamDirection {
    /// Whether the value is read back after a procedure call.
    #[must_use]
    pub fn is_output(self) -> bool {
        matches!(self, ParamDirection::Output | ParamDirection::InputOutput)
    }
}

/// One named command parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: RowValues,
    pub direction: ParamDirection,
    /// Declared SQL type for output parameters on backends that need one (SQL Server).
    pub sql_type: Option<String>,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            direction: ParamDirection::Input,
            sql_type: None,
        }
    }

    /// An output-only procedure argument.
    #[must_use]
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            direction: ParamDirection::Output,
            ..Self::new(name, RowValues::Null)
        }
    }

    /// An argument that is both passed in and read back.
    #[must_use]
    pub fn input_output(name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        Self {
            direction: ParamDirection::InputOutput,
            ..Self::new(name, value)
        }
    }

    #[must_use]
    pub fn with_sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    /// The name without its placeholder sigil (`@`, `:`, `$`, `?`).
    #[must_use]
    pub fn bare_name(&self) -> &str {
        bare_name(&self.name)
    }
}

pub(crate) fn bare_name(name: &str) -> &str {
    name.trim_start_matches(['@', ':', '$', '?'])
}

/// Insertion-ordered mapping from parameter name to value.
///
/// Iteration order is the order in which names were first inserted; inserting an existing
/// name replaces its value in place. Names match without regard to their sigil, so `a`,
/// `:a` and `@a` are the same parameter.
///
/// ```rust
/// use sql_executor::prelude::*;
///
/// let params = NamedParams::new().with("id", 7).with("name", "ada");
/// assert_eq!(params.len(), 2);
/// assert_eq!(params.get("@id"), Some(&RowValues::Int(7)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedParams {
    entries: Vec<Parameter>,
}

impl NamedParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.insert(Parameter::new(name, value));
        self
    }

    /// Insert a parameter, replacing any existing one with the same bare name.
    pub fn insert(&mut self, param: Parameter) {
        match self
            .entries
            .iter_mut()
            .find(|p| p.bare_name() == param.bare_name())
        {
            Some(existing) => *existing = param,
            None => self.entries.push(param),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RowValues> {
        let wanted = bare_name(name);
        self.entries
            .iter()
            .find(|p| p.bare_name() == wanted)
            .map(|p| &p.value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.entries.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Parameter] {
        &self.entries
    }
}

impl<K, V> FromIterator<(K, V)> for NamedParams
where
    K: Into<String>,
    V: Into<RowValues>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = NamedParams::new();
        for (name, value) in iter {
            params.insert(Parameter::new(name, value));
        }
        params
    }
}

impl FromIterator<Parameter> for NamedParams {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        let mut params = NamedParams::new();
        for param in iter {
            params.insert(param);
        }
        params
    }
}

impl From<Vec<Parameter>> for NamedParams {
    fn from(params: Vec<Parameter>) -> Self {
        params.into_iter().collect()
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for NamedParams
where
    K: Into<String>,
    V: Into<RowValues>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl IntoIterator for NamedParams {
    type Item = Parameter;
    type IntoIter = std::vec::IntoIter<Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a NamedParams {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
