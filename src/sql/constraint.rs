//! Request parameters to WHERE constraints, driven by a declarative parameter schema.

use crate::error::ParameterError;
use crate::sql::params::BindValue;
use serde::de::Error;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Boolean,
    String,
    Numeric,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ParamDescriptor {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub column: String,
    #[serde(default)]
    pub mandatory: bool,
}

/// Either a bare column name (optional string parameter) or a full descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamDef {
    Column(String),
    Descriptor(ParamDescriptor),
}

impl ParamDef {
    pub fn normalized(&self) -> ParamDescriptor {
        match self {
            ParamDef::Column(column) => ParamDescriptor {
                param_type: ParamType::String,
                column: column.clone(),
                mandatory: false,
            },
            ParamDef::Descriptor(d) => d.clone(),
        }
    }
}

/// Request parameter name to definition, kept in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParamSchema {
    entries: Vec<(String, ParamDef)>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand: optional string parameter matched against `column`.
    pub fn column(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.entries.push((name.into(), ParamDef::Column(column.into())));
        self
    }

    pub fn param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        column: impl Into<String>,
        mandatory: bool,
    ) -> Self {
        self.entries.push((
            name.into(),
            ParamDef::Descriptor(ParamDescriptor {
                param_type,
                column: column.into(),
                mandatory,
            }),
        ));
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ParamDef)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for ParamSchema {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let mut entries = Vec::with_capacity(raw.len());
        for (name, v) in raw {
            let def = match v {
                Value::String(column) => ParamDef::Column(column),
                Value::Object(obj) => {
                    if !obj.contains_key("type") {
                        return Err(D::Error::custom(format!(
                            "parameter type is mandatory when using parameter definition object, but type is not set for [{}]",
                            name
                        )));
                    }
                    let d: ParamDescriptor =
                        serde_json::from_value(Value::Object(obj)).map_err(D::Error::custom)?;
                    ParamDef::Descriptor(d)
                }
                other => {
                    return Err(D::Error::custom(format!(
                        "parameter [{}] must be a column name or a definition object, got {}",
                        name, other
                    )))
                }
            };
            entries.push((name, def));
        }
        Ok(ParamSchema { entries })
    }
}

/// One WHERE fragment.
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// `column = <bound value>`, derived from a validated request parameter.
    Bound { column: String, value: BindValue },
    /// Fragment supplied verbatim by the route definition.
    Raw(String),
}

impl Constraint {
    pub fn raw(fragment: impl Into<String>) -> Self {
        Constraint::Raw(fragment.into())
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Bound { column, value } => write!(f, "{}={}", column, value),
            Constraint::Raw(s) => f.write_str(s),
        }
    }
}

/// Lenient numeric coercion: surrounding whitespace ignored, blank is zero, only finite values.
fn coerce_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return Some(0.0);
    }
    // f64::from_str also takes "inf" and "NaN"; neither is a usable constraint value.
    let n: f64 = s.parse().ok()?;
    n.is_finite().then_some(n)
}

fn numeric_value(n: f64) -> BindValue {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        BindValue::Int(n as i64)
    } else {
        BindValue::Float(n)
    }
}

/// Turn request parameters into constraints, one per declared parameter that is present.
///
/// Absent or empty parameters are skipped. Every problem (missing mandatory value,
/// non-numeric numeric value) is collected and returned together.
pub fn parse_parameters(
    params: &HashMap<String, String>,
    schema: &ParamSchema,
) -> Result<Vec<Constraint>, ParameterError> {
    let mut constraints = Vec::new();
    let mut messages = Vec::new();

    for (name, def) in schema.entries() {
        let d = def.normalized();
        let Some(raw) = params.get(name).filter(|v| !v.is_empty()) else {
            if d.mandatory {
                messages.push(format!("missing mandatory parameter {}", name));
            }
            continue;
        };

        let value = match d.param_type {
            ParamType::Boolean => {
                let truthy = coerce_number(raw).map(|n| n != 0.0).unwrap_or(false);
                BindValue::Int(i64::from(truthy))
            }
            ParamType::String => BindValue::Text(raw.clone()),
            ParamType::Numeric => match coerce_number(raw) {
                Some(n) => numeric_value(n),
                None => {
                    messages.push(format!(
                        "parameter [{}] should be numeric but is [{}]",
                        name, raw
                    ));
                    continue;
                }
            },
        };
        constraints.push(Constraint::Bound {
            column: d.column,
            value,
        });
    }

    if !messages.is_empty() {
        return Err(ParameterError { messages });
    }
    tracing::debug!(count = constraints.len(), "parsed request parameters");
    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn rendered(c: &[Constraint]) -> Vec<String> {
        c.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn optional_missing_parameters_yield_nothing() {
        let schema = ParamSchema::new()
            .column("name", "project_name")
            .param("active", ParamType::Boolean, "is_active", false);
        assert!(parse_parameters(&params(&[]), &schema).unwrap().is_empty());
        assert!(parse_parameters(&params(&[("name", "")]), &schema).unwrap().is_empty());
    }

    #[test]
    fn each_type_is_encoded() {
        let schema = ParamSchema::new()
            .column("name", "project_name")
            .param("active", ParamType::Boolean, "is_active", false)
            .param("off", ParamType::Boolean, "is_off", false)
            .param("year", ParamType::Numeric, "fiscal_year", false)
            .param("rate", ParamType::Numeric, "rate", false);
        let c = parse_parameters(
            &params(&[("name", "Alpha"), ("active", "1"), ("off", "yes"), ("year", " 2016 "), ("rate", "0.5")]),
            &schema,
        )
        .unwrap();
        assert_eq!(
            rendered(&c),
            ["project_name='Alpha'", "is_active=1", "is_off=0", "fiscal_year=2016", "rate=0.5"]
        );
        assert_eq!(
            c[0],
            Constraint::Bound { column: "project_name".into(), value: BindValue::Text("Alpha".into()) }
        );
    }

    #[test]
    fn constraints_follow_schema_order_not_request_order() {
        let schema = ParamSchema::new().column("b", "col_b").column("a", "col_a");
        let c = parse_parameters(&params(&[("a", "1"), ("b", "2")]), &schema).unwrap();
        assert_eq!(rendered(&c), ["col_b='2'", "col_a='1'"]);
    }

    #[test]
    fn all_errors_are_reported_together() {
        let schema = ParamSchema::new()
            .param("item", ParamType::Numeric, "project_number", true)
            .param("year", ParamType::Numeric, "fiscal_year", false)
            .param("month", ParamType::Numeric, "fiscal_month", true);
        let err = parse_parameters(&params(&[("year", "abc")]), &schema).unwrap_err();
        assert_eq!(
            err.messages,
            [
                "missing mandatory parameter item",
                "parameter [year] should be numeric but is [abc]",
                "missing mandatory parameter month",
            ]
        );
    }

    #[test]
    fn non_numeric_never_becomes_zero() {
        let schema = ParamSchema::new().param("n", ParamType::Numeric, "n", false);
        for bad in ["P123", "NaN", "inf", "1,5", "--1"] {
            assert!(parse_parameters(&params(&[("n", bad)]), &schema).is_err(), "{}", bad);
        }
    }

    #[test]
    fn mandatory_present_parameter_passes() {
        let schema = ParamSchema::new().param("item", ParamType::Numeric, "project_number", true);
        let c = parse_parameters(&params(&[("item", "123")]), &schema).unwrap();
        assert_eq!(rendered(&c), ["project_number=123"]);
    }

    #[test]
    fn schema_deserializes_in_declaration_order() {
        let schema: ParamSchema = serde_json::from_str(
            r#"{ "z": "col_z", "item": { "type": "numeric", "column": "project_number", "mandatory": true } }"#,
        )
        .unwrap();
        let names: Vec<&str> = schema.entries().map(|(n, _)| n).collect();
        assert_eq!(names, ["z", "item"]);
        assert_eq!(
            schema.entries().nth(1).unwrap().1.normalized(),
            ParamDescriptor { param_type: ParamType::Numeric, column: "project_number".into(), mandatory: true }
        );
    }

    #[test]
    fn descriptor_without_type_is_rejected() {
        let err = serde_json::from_str::<ParamSchema>(r#"{ "item": { "column": "project_number" } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("parameter type is mandatory"));
    }
}
