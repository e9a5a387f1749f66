//! Cache keys for logical queries.
//!
//! A key is a resource name plus the ordered parameter values that identify
//! one logical query. Parameters are primitives only, so key equality stays
//! well-defined; equal keys always map to the same cache entry.

use std::fmt;

/// A single primitive query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    Int(i64),
    Text(String),
    Flag(bool),
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Param::Int(value as i64)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(value as i64)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Flag(value)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Int(n) => write!(f, "{}", n),
            Param::Text(s) => write!(f, "{}", s),
            Param::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// Identity of a logical query: resource name + ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: &'static str,
    params: Vec<Param>,
}

impl QueryKey {
    /// Start a key for a resource, e.g. `QueryKey::new("anime.search")`.
    pub fn new(resource: &'static str) -> Self {
        Self {
            resource,
            params: Vec::new(),
        }
    }

    /// Append a parameter value.
    pub fn arg(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.resource)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}
