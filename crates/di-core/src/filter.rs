//! Typed metadata filter expressions and the column schema they are checked
//! against.
//!
//! Filters arrive as JSON trees in request parameters and in the default
//! query policy. They are parsed into [`FilterExpr`] and validated against the
//! declared columns before any store sees them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::document::TagValue;
use crate::error::{IndexerError, Result};

/// Column type for the filterable tag schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    Str,
    Int,
    Float,
    Bool,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Whether a tag value can be compared against this column.
    pub fn accepts(self, value: &TagValue) -> bool {
        match (self, value) {
            (Self::Str, TagValue::Str(_)) => true,
            (Self::Bool, TagValue::Bool(_)) => true,
            (Self::Int | Self::Float, TagValue::Int(_) | TagValue::Float(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => write!(f, "str"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Bool => write!(f, "bool"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "str" | "string" | "text" | "keyword" => Ok(Self::Str),
            "int" | "int64" | "integer" | "long" => Ok(Self::Int),
            "float" | "float32" | "double" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Bool),
            other => Err(IndexerError::InvalidConfig(format!("unknown column type '{other}'"))),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = IndexerError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ColumnType> for String {
    fn from(t: ColumnType) -> Self {
        t.to_string()
    }
}

/// A declared, filterable tag column.
///
/// Deserializes from `{"name": "price", "type": "float"}` or from the pair
/// form `["price", "float"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "ColumnDefRepr")]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnDefRepr {
    Pair(String, ColumnType),
    Named {
        name: String,
        #[serde(rename = "type")]
        column_type: ColumnType,
    },
}

impl From<ColumnDefRepr> for ColumnDef {
    fn from(r: ColumnDefRepr) -> Self {
        match r {
            ColumnDefRepr::Pair(name, column_type) => Self { name, column_type },
            ColumnDefRepr::Named { name, column_type } => Self { name, column_type },
        }
    }
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self { name: name.into(), column_type }
    }
}

/// Numeric bounds of a range filter. All present bounds must hold.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NumericRange {
    pub gt: Option<f64>,
    pub gte: Option<f64>,
    pub lt: Option<f64>,
    pub lte: Option<f64>,
}

impl NumericRange {
    pub fn is_unbounded(&self) -> bool {
        self.gt.is_none() && self.gte.is_none() && self.lt.is_none() && self.lte.is_none()
    }

    pub fn contains(&self, v: f64) -> bool {
        self.gt.map_or(true, |b| v > b)
            && self.gte.map_or(true, |b| v >= b)
            && self.lt.map_or(true, |b| v < b)
            && self.lte.map_or(true, |b| v <= b)
    }
}

/// A metadata filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Every word of `query` occurs in the string tag (case-insensitive).
    Match { column: String, query: String },
    /// Exact equality on a declared column.
    Term { column: String, value: TagValue },
    /// Numeric range on a declared numeric column.
    Range { column: String, range: NumericRange },
    /// Word match over indexed text content and text-indexed tags.
    Text { query: String },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    pub fn match_words(column: impl Into<String>, query: impl Into<String>) -> Self {
        Self::Match { column: column.into(), query: query.into() }
    }

    pub fn term(column: impl Into<String>, value: impl Into<TagValue>) -> Self {
        Self::Term { column: column.into(), value: value.into() }
    }

    pub fn range(column: impl Into<String>, range: NumericRange) -> Self {
        Self::Range { column: column.into(), range }
    }

    pub fn gte(column: impl Into<String>, bound: f64) -> Self {
        Self::range(column, NumericRange { gte: Some(bound), ..Default::default() })
    }

    /// Parse a JSON filter tree.
    pub fn from_json(v: &Value) -> Result<Self> {
        let (op, body) = single_entry(v, "filter")?;
        match op {
            "match" => {
                let (column, q) = single_entry(body, "match")?;
                let query = q.as_str().ok_or_else(|| {
                    IndexerError::invalid_filter(format!("match on '{column}' needs a string, got {q}"))
                })?;
                Ok(Self::Match { column: column.to_string(), query: query.to_string() })
            }
            "term" => {
                let (column, raw) = single_entry(body, "term")?;
                let value = scalar(raw).ok_or_else(|| {
                    IndexerError::invalid_filter(format!("term on '{column}' needs a scalar, got {raw}"))
                })?;
                Ok(Self::Term { column: column.to_string(), value })
            }
            "range" => {
                let (column, raw) = single_entry(body, "range")?;
                let bounds = raw.as_object().ok_or_else(|| {
                    IndexerError::invalid_filter(format!("range on '{column}' needs an object of bounds"))
                })?;
                let mut range = NumericRange::default();
                for (k, b) in bounds {
                    let n = b.as_f64().ok_or_else(|| {
                        IndexerError::invalid_filter(format!("range bound {k} on '{column}' is not a number: {b}"))
                    })?;
                    match k.as_str() {
                        "gt" => range.gt = Some(n),
                        "gte" => range.gte = Some(n),
                        "lt" => range.lt = Some(n),
                        "lte" => range.lte = Some(n),
                        other => {
                            return Err(IndexerError::invalid_filter(format!(
                                "unknown range bound '{other}' on '{column}'"
                            )))
                        }
                    }
                }
                if range.is_unbounded() {
                    return Err(IndexerError::invalid_filter(format!("range on '{column}' has no bounds")));
                }
                Ok(Self::Range { column: column.to_string(), range })
            }
            "text" => {
                let query = match body {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(o) => o.get("query").and_then(Value::as_str),
                    _ => None,
                }
                .ok_or_else(|| IndexerError::invalid_filter("text filter needs a query string"))?;
                Ok(Self::Text { query: query.to_string() })
            }
            "and" => Ok(Self::And(parse_list(body, "and")?)),
            "or" => Ok(Self::Or(parse_list(body, "or")?)),
            "not" => Ok(Self::Not(Box::new(Self::from_json(body)?))),
            "bool" => parse_bool(body),
            other => Err(IndexerError::invalid_filter(format!("unknown filter operator '{other}'"))),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Match { column, query } => keyed("match", column, json!(query)),
            Self::Term { column, value } => keyed("term", column, json!(value)),
            Self::Range { column, range } => {
                let mut bounds = Map::new();
                for (k, b) in [("gt", range.gt), ("gte", range.gte), ("lt", range.lt), ("lte", range.lte)] {
                    if let Some(b) = b {
                        bounds.insert(k.to_string(), json!(b));
                    }
                }
                keyed("range", column, Value::Object(bounds))
            }
            Self::Text { query } => json!({ "text": { "query": query } }),
            Self::And(items) => json!({ "and": items.iter().map(Self::to_json).collect::<Vec<_>>() }),
            Self::Or(items) => json!({ "or": items.iter().map(Self::to_json).collect::<Vec<_>>() }),
            Self::Not(inner) => json!({ "not": inner.to_json() }),
        }
    }

    /// Check the tree against the declared columns. `text_search` says
    /// whether the collection indexes text for [`FilterExpr::Text`].
    pub fn validate(&self, columns: &[ColumnDef], text_search: bool) -> Result<()> {
        match self {
            Self::Match { column, .. } => {
                let ty = column_type(columns, column)?;
                if ty != ColumnType::Str {
                    return Err(IndexerError::invalid_filter(format!(
                        "match needs a str column, '{column}' is {ty}"
                    )));
                }
                Ok(())
            }
            Self::Term { column, value } => {
                let ty = column_type(columns, column)?;
                if !ty.accepts(value) {
                    return Err(IndexerError::invalid_filter(format!(
                        "term value {value} ({}) does not fit {ty} column '{column}'",
                        value.kind()
                    )));
                }
                Ok(())
            }
            Self::Range { column, range } => {
                let ty = column_type(columns, column)?;
                if !ty.is_numeric() {
                    return Err(IndexerError::invalid_filter(format!(
                        "range needs a numeric column, '{column}' is {ty}"
                    )));
                }
                if range.is_unbounded() {
                    return Err(IndexerError::invalid_filter(format!("range on '{column}' has no bounds")));
                }
                Ok(())
            }
            Self::Text { .. } if !text_search => Err(IndexerError::invalid_filter(
                "text filter used but neither index_text nor tag_indices is configured",
            )),
            Self::Text { .. } => Ok(()),
            Self::And(items) | Self::Or(items) => {
                if items.is_empty() {
                    return Err(IndexerError::invalid_filter("empty composite filter"));
                }
                items.iter().try_for_each(|f| f.validate(columns, text_search))
            }
            Self::Not(inner) => inner.validate(columns, text_search),
        }
    }
}

impl TryFrom<Value> for FilterExpr {
    type Error = IndexerError;

    fn try_from(v: Value) -> Result<Self> {
        Self::from_json(&v)
    }
}

impl From<FilterExpr> for Value {
    fn from(f: FilterExpr) -> Self {
        f.to_json()
    }
}

impl Serialize for FilterExpr {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(s)
    }
}

impl<'de> Deserialize<'de> for FilterExpr {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let v = Value::deserialize(d)?;
        Self::from_json(&v).map_err(serde::de::Error::custom)
    }
}

fn keyed(op: &str, column: &str, body: Value) -> Value {
    let mut inner = Map::new();
    inner.insert(column.to_string(), body);
    let mut outer = Map::new();
    outer.insert(op.to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn column_type(columns: &[ColumnDef], name: &str) -> Result<ColumnType> {
    columns
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.column_type)
        .ok_or_else(|| IndexerError::invalid_filter(format!("column '{name}' is not declared")))
}

fn single_entry<'a>(v: &'a Value, what: &str) -> Result<(&'a str, &'a Value)> {
    let obj = v
        .as_object()
        .ok_or_else(|| IndexerError::invalid_filter(format!("{what} must be an object, got {v}")))?;
    let mut it = obj.iter();
    match (it.next(), it.next()) {
        (Some((k, body)), None) => Ok((k.as_str(), body)),
        _ => Err(IndexerError::invalid_filter(format!(
            "{what} must have exactly one key, got {}",
            obj.len()
        ))),
    }
}

fn scalar(v: &Value) -> Option<TagValue> {
    match v {
        Value::Bool(b) => Some(TagValue::Bool(*b)),
        Value::Number(n) => n.as_i64().map(TagValue::Int).or_else(|| n.as_f64().map(TagValue::Float)),
        Value::String(s) => Some(TagValue::Str(s.clone())),
        _ => None,
    }
}

fn parse_list(v: &Value, op: &str) -> Result<Vec<FilterExpr>> {
    let items = v
        .as_array()
        .ok_or_else(|| IndexerError::invalid_filter(format!("{op} needs a list of filters")))?;
    if items.is_empty() {
        return Err(IndexerError::invalid_filter(format!("{op} needs at least one filter")));
    }
    items.iter().map(FilterExpr::from_json).collect()
}

// A clause of a bool query is a single filter or a list of them.
fn clause(obj: &Map<String, Value>, key: &str) -> Result<Vec<FilterExpr>> {
    match obj.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(FilterExpr::from_json).collect(),
        Some(single) => Ok(vec![FilterExpr::from_json(single)?]),
    }
}

fn parse_bool(v: &Value) -> Result<FilterExpr> {
    let obj = v
        .as_object()
        .ok_or_else(|| IndexerError::invalid_filter("bool needs an object of clauses"))?;
    if let Some(k) = obj.keys().find(|k| !matches!(k.as_str(), "must" | "filter" | "should" | "must_not")) {
        return Err(IndexerError::invalid_filter(format!("unknown bool clause '{k}'")));
    }
    let mut conjuncts = clause(obj, "must")?;
    conjuncts.extend(clause(obj, "filter")?);
    let should = clause(obj, "should")?;
    if !should.is_empty() {
        conjuncts.push(FilterExpr::Or(should));
    }
    conjuncts.extend(clause(obj, "must_not")?.into_iter().map(|f| FilterExpr::Not(Box::new(f))));
    match conjuncts.len() {
        0 => Err(IndexerError::invalid_filter("bool filter has no clauses")),
        1 => Ok(conjuncts.remove(0)),
        _ => Ok(FilterExpr::And(conjuncts)),
    }
}
