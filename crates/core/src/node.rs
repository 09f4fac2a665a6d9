// Filter node: one named step of a filter chain

use crate::arity::Arity;
use crate::error::{GraphError, GraphResult};

/// Characters that carry meaning in the filter-graph grammar.
const METACHARS: &[char] = &['\'', '\\', ':', ',', ';', '[', ']', '='];

#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterArg {
    Positional(String),
    Named(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterNode {
    name: String,
    args: Vec<FilterArg>,
    input_arity: Arity,
    output_arity: Arity,
}

impl FilterNode {
    /// Create a node with one input and one output pad.
    pub fn new(name: impl Into<String>) -> GraphResult<Self> {
        let name = name.into();
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || METACHARS.contains(&c)) {
            return Err(GraphError::InvalidFilterName { name });
        }

        Ok(Self {
            name,
            args: Vec::new(),
            input_arity: Arity::default(),
            output_arity: Arity::default(),
        })
    }

    pub fn with_arity(mut self, inputs: Arity, outputs: Arity) -> Self {
        self.input_arity = inputs;
        self.output_arity = outputs;
        self
    }

    /// Append a positional argument (`scale=1280:720`).
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(FilterArg::Positional(value.to_string()));
        self
    }

    /// Set a named option. Re-setting a key replaces the value in place.
    pub fn option(mut self, key: impl Into<String>, value: impl ToString) -> GraphResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(GraphError::EmptyOptionKey);
        }
        let value = value.to_string();

        let existing = self.args.iter_mut().find_map(|arg| match arg {
            FilterArg::Named(k, v) if *k == key => Some(v),
            _ => None,
        });
        match existing {
            Some(slot) => *slot = value,
            None => self.args.push(FilterArg::Named(key, value)),
        }
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_arity(&self) -> Arity {
        self.input_arity
    }

    pub fn output_arity(&self) -> Arity {
        self.output_arity
    }

    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg {
            FilterArg::Named(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    /// Render as `name=arg:key=value:...`, or the bare name when there are no arguments.
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            return self.name.clone();
        }

        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| match arg {
                FilterArg::Positional(v) => escape_value(v),
                FilterArg::Named(k, v) => format!("{}={}", k, escape_value(v)),
            })
            .collect();

        format!("{}={}", self.name, args.join(":"))
    }
}

/// Quote a value so the graph parser reads it as one token.
pub fn escape_value(value: &str) -> String {
    let needs_quoting = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || METACHARS.contains(&c));

    if !needs_quoting {
        return value.to_string();
    }

    format!("'{}'", value.replace('\'', "'\\''"))
}
