//! Typed inline script variables from the query string.
//!
//! Parameters prefixed `str_`, `int_`, `dbl_` or `bool_` become typed
//! defaults for `$name` references in a script, reset on every run.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Dbl(f64),
    Bool(bool),
}

pub type ParamVars = HashMap<String, ParamValue>;

/// Extract typed inline variables from raw query parameters.
/// Unparseable numerics fall back to zero, matching loose coercion on the
/// wire; unknown prefixes are ignored.
pub fn inline_params(query: &HashMap<String, String>) -> ParamVars {
    let mut vars = ParamVars::new();

    for (key, raw) in query {
        if let Some(name) = key.strip_prefix("str_") {
            if !name.is_empty() {
                vars.insert(name.to_string(), ParamValue::Str(raw.clone()));
            }
        } else if let Some(name) = key.strip_prefix("int_") {
            if !name.is_empty() {
                vars.insert(
                    name.to_string(),
                    ParamValue::Int(raw.trim().parse().unwrap_or(0)),
                );
            }
        } else if let Some(name) = key.strip_prefix("dbl_") {
            if !name.is_empty() {
                vars.insert(
                    name.to_string(),
                    ParamValue::Dbl(raw.trim().parse().unwrap_or(0.0)),
                );
            }
        } else if let Some(name) = key.strip_prefix("bool_") {
            if !name.is_empty() {
                vars.insert(
                    name.to_string(),
                    ParamValue::Bool(raw == "true" || raw == "1"),
                );
            }
        }
    }

    vars
}
