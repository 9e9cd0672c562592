//! Equivalence classes tolerated by non-strict diffs.
//!
//! Two values of different runtime kinds are reported as changed unless a
//! rule in the active policy declares them equivalent. The default policy
//! is empty, which makes strict and non-strict diffs agree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ValueKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquivalenceRule {
    /// `30` ~ `"30"`, `1.5` ~ `" 1.5 "`
    NumericString,
    /// `30` ~ `30.0`
    IntegralNumber,
    /// `true` ~ `"true"`
    BoolString,
    /// `{"$date": "2024-01-01T00:00:00Z"}` ~ `"2024-01-01T00:00:00+00:00"`
    DateString,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquivalencePolicy {
    rules: Vec<EquivalenceRule>,
}

impl EquivalencePolicy {
    pub fn new(rules: impl IntoIterator<Item = EquivalenceRule>) -> Self {
        let mut policy = Self::default();
        for rule in rules {
            policy = policy.with(rule);
        }
        policy
    }

    /// Every known rule.
    pub fn lenient() -> Self {
        Self::new([
            EquivalenceRule::NumericString,
            EquivalenceRule::IntegralNumber,
            EquivalenceRule::BoolString,
            EquivalenceRule::DateString,
        ])
    }

    pub fn with(mut self, rule: EquivalenceRule) -> Self {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
        self
    }

    pub fn rules(&self) -> &[EquivalenceRule] { &self.rules }

    pub fn is_empty(&self) -> bool { self.rules.is_empty() }

    pub fn equivalent(&self, a: &Value, b: &Value) -> bool {
        self.rules.iter().any(|rule| rule.holds(a, b) || rule.holds(b, a))
    }
}

impl EquivalenceRule {
    fn holds(self, a: &Value, b: &Value) -> bool {
        match (self, a, b) {
            (EquivalenceRule::NumericString, Value::Number(n), Value::String(s)) => {
                match (n.as_f64(), s.trim().parse::<f64>()) {
                    (Some(x), Ok(y)) => x == y,
                    _ => false,
                }
            }
            (EquivalenceRule::IntegralNumber, Value::Number(x), Value::Number(y)) => {
                x.as_f64().is_some() && x.as_f64() == y.as_f64()
            }
            (EquivalenceRule::BoolString, Value::Bool(x), Value::String(s)) => {
                s.trim().parse::<bool>().is_ok_and(|y| *x == y)
            }
            (EquivalenceRule::DateString, _, Value::String(s)) if ValueKind::of(a) == ValueKind::Date => {
                match (date_of(a), parse_rfc3339(s)) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

/// Instant held by an extended-JSON `$date` wrapper.
pub(crate) fn date_of(value: &Value) -> Option<DateTime<Utc>> {
    match value.get("$date")? {
        Value::String(s) => parse_rfc3339(s),
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        Value::Object(inner) => {
            let millis = inner.get("$numberLong")?.as_str()?.parse::<i64>().ok()?;
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim()).ok().map(|dt| dt.with_timezone(&Utc))
}
