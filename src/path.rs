//! Field paths in dot / bracket notation: `health.primary_physician.name`,
//! `addresses[0].city`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:\.?([^.\[\]]+)|\[(\d+)\]|\[("(?:[^"\\]|\\.)*")\])"#).expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid field path `{input}` at byte {offset}")]
pub struct PathParseError {
    pub input: String,
    pub offset: usize,
}

impl FieldPath {
    pub fn root() -> Self { Self::default() }

    pub fn is_root(&self) -> bool { self.segments.is_empty() }

    pub fn segments(&self) -> &[Segment] { &self.segments }

    pub fn key(&self, name: &str) -> Self {
        let mut out = self.clone();
        out.segments.push(Segment::Key(name.to_string()));
        out
    }

    pub fn index(&self, i: usize) -> Self {
        let mut out = self.clone();
        out.segments.push(Segment::Index(i));
        out
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
        other.segments.len() >= self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    pub fn parse(input: &str) -> Result<Self, PathParseError> {
        let mut segments = Vec::new();
        let mut rest = input;
        while !rest.is_empty() {
            let offset = input.len() - rest.len();
            let caps = SEGMENT
                .captures(rest)
                .ok_or_else(|| PathParseError { input: input.to_string(), offset })?;
            // a leading dot is only legal between segments
            let whole = caps.get(0).map_or("", |m| m.as_str());
            if offset == 0 && whole.starts_with('.') {
                return Err(PathParseError { input: input.to_string(), offset });
            }
            if let Some(key) = caps.get(1) {
                segments.push(Segment::Key(key.as_str().to_string()));
            } else if let Some(idx) = caps.get(2) {
                let i = idx
                    .as_str()
                    .parse::<usize>()
                    .map_err(|_| PathParseError { input: input.to_string(), offset })?;
                segments.push(Segment::Index(i));
            } else if let Some(quoted) = caps.get(3) {
                let key = serde_json::from_str::<String>(quoted.as_str())
                    .map_err(|_| PathParseError { input: input.to_string(), offset })?;
                segments.push(Segment::Key(key));
            }
            rest = &rest[whole.len()..];
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "(root)");
        }
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                // keys that would read as path syntax are quoted: `a["b.c"]`
                Segment::Key(k) if needs_quoting(k) => write!(f, "[{}]", serde_json::Value::String(k.clone()))?,
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty() || key.contains(['.', '[', ']'])
}

impl FromStr for FieldPath {
    type Err = PathParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FieldPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}
