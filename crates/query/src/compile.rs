//! The aggregate script compiler.
//!
//! Scripts are line-oriented:
//!
//! ```text
//! # revenue by country for big orders
//! group country
//! filter total gt $min_total
//! count as orders
//! sum total as revenue
//! ```
//!
//! Directives: `group <col>`, `filter <col> <op> <value>`, `count`,
//! `sum|min|max|avg <col>`, optional `as <alias>`, `return <col>`
//! (histogram source value), `tally` (explicit event tally marker).
//! `$name` values resolve against the typed inline parameters.

use openset_core::QueryError;
use openset_db::{ColumnType, Columns, FieldValue};
use openset_result::AccType;

use crate::params::{ParamValue, ParamVars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "eq" => Some(Self::Eq),
            "neq" => Some(Self::Neq),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub column: usize,
    pub op: FilterOp,
    pub value: FieldValue,
}

/// One result column of a compiled query.
#[derive(Debug, Clone)]
pub struct ColumnVar {
    /// Name used for sort resolution and result metadata.
    pub alias: String,
    /// Underlying schema column name (empty for `count`).
    pub actual: String,
    /// Schema column index; None for `count`.
    pub column: Option<usize>,
    pub agg: AccType,
    pub col_type: Option<ColumnType>,
}

/// The compiled intermediate form handed to endpoint open-loops.
#[derive(Debug, Clone, Default)]
pub struct CompiledQuery {
    pub column_vars: Vec<ColumnVar>,
    /// Schema column to group rows by; None groups everything under one key.
    pub group: Option<usize>,
    pub filters: Vec<Filter>,
    /// Histogram source column (`return <col>`).
    pub returns: Option<usize>,
    /// Script called `tally` explicitly (disallowed for histograms).
    pub uses_tally: bool,
    /// Segment compare list from the `segments` parameter.
    pub segments: Vec<String>,
    /// Session timeout in ms, relayed to execution.
    pub session_time: i64,
    pub is_segment: bool,
    pub segment_ttl: Option<i64>,
    pub segment_refresh: Option<i64>,
}

impl CompiledQuery {
    pub fn column_count(&self) -> usize {
        self.column_vars.len()
    }

    pub fn acc_types(&self) -> Vec<AccType> {
        self.column_vars.iter().map(|c| c.agg).collect()
    }

    /// Result columns sourced from double-typed schema columns; their
    /// accumulated cells are fixed-point and need unscaling at render.
    pub fn double_columns(&self) -> Vec<usize> {
        self.column_vars
            .iter()
            .enumerate()
            .filter(|(_, c)| c.col_type == Some(ColumnType::Double) && c.agg != AccType::Count)
            .map(|(i, _)| i)
            .collect()
    }

    /// Resolve a sort alias to its result column index.
    pub fn sort_column(&self, alias: &str) -> Option<usize> {
        self.column_vars.iter().position(|c| c.alias == alias)
    }
}

/// Compiles script text against a table schema. Kept behind a trait so the
/// embedded engine can be swapped for a richer one.
pub trait QueryCompiler: Send + Sync {
    fn compile(
        &self,
        code: &str,
        columns: &Columns,
        params: &ParamVars,
    ) -> Result<CompiledQuery, QueryError>;
}

/// The built-in aggregate script compiler.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptCompiler;

impl QueryCompiler for ScriptCompiler {
    fn compile(
        &self,
        code: &str,
        columns: &Columns,
        params: &ParamVars,
    ) -> Result<CompiledQuery, QueryError> {
        let mut query = CompiledQuery::default();

        for (line_no, raw) in code.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = line.split_whitespace();
            let directive = words.next().unwrap_or("");
            let rest: Vec<&str> = words.collect();

            match directive {
                "group" => {
                    let column = resolve_column(columns, required(&rest, 0, line_no, "group")?)?;
                    query.group = Some(column.index);
                }
                "filter" => {
                    let column = resolve_column(columns, required(&rest, 0, line_no, "filter")?)?;
                    let op = FilterOp::parse(required(&rest, 1, line_no, "filter")?)
                        .ok_or_else(|| syntax(line_no, "unknown filter operator"))?;
                    let value =
                        parse_value(required(&rest, 2, line_no, "filter")?, params, line_no)?;
                    query.filters.push(Filter {
                        column: column.index,
                        op,
                        value,
                    });
                }
                "count" => {
                    query.column_vars.push(ColumnVar {
                        alias: alias_of(&rest, 0).unwrap_or_else(|| "count".to_string()),
                        actual: String::new(),
                        column: None,
                        agg: AccType::Count,
                        col_type: None,
                    });
                }
                "sum" | "min" | "max" | "avg" => {
                    let name = required(&rest, 0, line_no, directive)?;
                    let column = resolve_column(columns, name)?;
                    if column.col_type == ColumnType::Text {
                        return Err(syntax(line_no, "cannot aggregate a text column"));
                    }
                    let agg = match directive {
                        "sum" => AccType::Sum,
                        "min" => AccType::Min,
                        "max" => AccType::Max,
                        _ => AccType::Avg,
                    };
                    query.column_vars.push(ColumnVar {
                        alias: alias_of(&rest, 1).unwrap_or_else(|| name.to_string()),
                        actual: name.to_string(),
                        column: Some(column.index),
                        agg,
                        col_type: Some(column.col_type),
                    });
                }
                "return" => {
                    let column = resolve_column(columns, required(&rest, 0, line_no, "return")?)?;
                    if column.col_type == ColumnType::Text {
                        return Err(syntax(line_no, "return requires a numeric column"));
                    }
                    query.returns = Some(column.index);
                }
                "tally" => query.uses_tally = true,
                other => {
                    return Err(syntax(line_no, format!("unknown directive '{other}'")));
                }
            }
        }

        // Scripts that only filter (segment definitions) still produce one
        // result column: the membership count.
        if query.column_vars.is_empty() {
            query.column_vars.push(ColumnVar {
                alias: "count".to_string(),
                actual: String::new(),
                column: None,
                agg: AccType::Count,
                col_type: None,
            });
        }

        Ok(query)
    }
}

struct ResolvedColumn {
    index: usize,
    col_type: ColumnType,
}

fn resolve_column(columns: &Columns, name: &str) -> Result<ResolvedColumn, QueryError> {
    columns
        .get(name)
        .map(|c| ResolvedColumn {
            index: c.index,
            col_type: c.col_type,
        })
        .ok_or_else(|| QueryError::parse(format!("unknown column '{name}'")))
}

fn required<'a>(
    rest: &[&'a str],
    index: usize,
    line_no: usize,
    directive: &str,
) -> Result<&'a str, QueryError> {
    rest.get(index)
        .copied()
        .ok_or_else(|| syntax(line_no, format!("'{directive}' is missing an argument")))
}

fn alias_of(rest: &[&str], from: usize) -> Option<String> {
    if rest.get(from).copied() == Some("as") {
        rest.get(from + 1).map(|s| s.to_string())
    } else {
        None
    }
}

fn parse_value(
    token: &str,
    params: &ParamVars,
    line_no: usize,
) -> Result<FieldValue, QueryError> {
    if let Some(name) = token.strip_prefix('$') {
        return match params.get(name) {
            Some(ParamValue::Str(v)) => Ok(FieldValue::Text(v.clone())),
            Some(ParamValue::Int(v)) => Ok(FieldValue::Int(*v)),
            Some(ParamValue::Dbl(v)) => Ok(FieldValue::Double(*v)),
            Some(ParamValue::Bool(v)) => Ok(FieldValue::Bool(*v)),
            None => Err(syntax(line_no, format!("undefined parameter '${name}'"))),
        };
    }
    if token == "true" || token == "false" {
        return Ok(FieldValue::Bool(token == "true"));
    }
    if let Some(quoted) = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
    {
        return Ok(FieldValue::Text(quoted.to_string()));
    }
    if let Ok(v) = token.parse::<i64>() {
        return Ok(FieldValue::Int(v));
    }
    if let Ok(v) = token.parse::<f64>() {
        return Ok(FieldValue::Double(v));
    }
    // Bare words are text values.
    Ok(FieldValue::Text(token.to_string()))
}

fn syntax(line_no: usize, message: impl Into<String>) -> QueryError {
    QueryError::parse(format!("line {}: {}", line_no + 1, message.into()))
}

/// Human-readable dump of a compiled query, for the `debug` parameter.
pub fn disassemble(query: &CompiledQuery) -> String {
    let mut out = String::new();
    if let Some(group) = query.group {
        out.push_str(&format!("group      column #{group}\n"));
    }
    for filter in &query.filters {
        out.push_str(&format!(
            "filter     column #{} {:?} {:?}\n",
            filter.column, filter.op, filter.value
        ));
    }
    for (i, var) in query.column_vars.iter().enumerate() {
        out.push_str(&format!(
            "column {i}   {:?} {} (as {})\n",
            var.agg,
            if var.actual.is_empty() {
                "*"
            } else {
                var.actual.as_str()
            },
            var.alias
        ));
    }
    if let Some(returns) = query.returns {
        out.push_str(&format!("return     column #{returns}\n"));
    }
    if query.uses_tally {
        out.push_str("tally\n");
    }
    if !query.segments.is_empty() {
        out.push_str(&format!("segments   {}\n", query.segments.join(",")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Columns {
        Columns::from_pairs(&[
            ("total", ColumnType::Double),
            ("country", ColumnType::Text),
            ("visits", ColumnType::Int),
        ])
    }

    #[test]
    fn compiles_grouped_aggregates() {
        let code = "\
# revenue by country
group country
filter total gt 10
count as orders
sum total as revenue
";
        let query = ScriptCompiler
            .compile(code, &columns(), &ParamVars::new())
            .unwrap();
        assert_eq!(query.group, Some(1));
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.column_vars.len(), 2);
        assert_eq!(query.column_vars[1].alias, "revenue");
        assert_eq!(query.acc_types(), vec![AccType::Count, AccType::Sum]);
        assert_eq!(query.double_columns(), vec![1]);
        assert_eq!(query.sort_column("revenue"), Some(1));
        assert_eq!(query.sort_column("missing"), None);
    }

    #[test]
    fn unknown_directive_is_syntax_error() {
        let err = ScriptCompiler
            .compile("frobnicate\n", &columns(), &ParamVars::new())
            .unwrap_err();
        assert_eq!(err.class, openset_core::ErrorClass::Parse);
        assert!(err.message.contains("frobnicate"));
    }

    #[test]
    fn unknown_column_is_rejected() {
        let err = ScriptCompiler
            .compile("sum missing\n", &columns(), &ParamVars::new())
            .unwrap_err();
        assert!(err.message.contains("missing"));
    }

    #[test]
    fn params_resolve_in_filters() {
        let mut params = ParamVars::new();
        params.insert("min_total".to_string(), ParamValue::Int(25));
        let query = ScriptCompiler
            .compile("filter total gt $min_total\n", &columns(), &params)
            .unwrap();
        assert_eq!(query.filters[0].value, FieldValue::Int(25));

        let err = ScriptCompiler
            .compile("filter total gt $nope\n", &columns(), &ParamVars::new())
            .unwrap_err();
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn filter_only_script_defaults_to_count() {
        let query = ScriptCompiler
            .compile("filter visits gt 3\n", &columns(), &ParamVars::new())
            .unwrap();
        assert_eq!(query.column_vars.len(), 1);
        assert_eq!(query.column_vars[0].agg, AccType::Count);
    }

    #[test]
    fn tally_and_return_are_tracked() {
        let query = ScriptCompiler
            .compile("return total\ntally\n", &columns(), &ParamVars::new())
            .unwrap();
        assert_eq!(query.returns, Some(0));
        assert!(query.uses_tally);
    }
}
