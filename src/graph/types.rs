//! Core type definitions for the twin graph

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Returned when a string is not a well-formed digital twin model identifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid type id: {0}")]
pub struct InvalidDtmi(pub String);

fn dtmi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^dtmi:[A-Za-z](?:[A-Za-z0-9_]*[A-Za-z0-9])?(?::[A-Za-z_](?:[A-Za-z0-9_]*[A-Za-z0-9])?)*(?:;[1-9][0-9]{0,8}(?:\.[0-9]{1,6})?)?$",
        )
        .expect("static type id pattern compiles")
    })
}

/// Digital twin model identifier (e.g. `dtmi:com:willowinc:Building;1`)
///
/// Identifies both source-ontology and target-ontology types. Only
/// constructed through [`Dtmi::parse`] so every instance is well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Dtmi(String);

impl Dtmi {
    pub fn parse(value: impl AsRef<str>) -> Result<Self, InvalidDtmi> {
        let value = value.as_ref().trim();
        if dtmi_pattern().is_match(value) {
            Ok(Dtmi(value.to_string()))
        } else {
            Err(InvalidDtmi(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment without the version, e.g. `Building`
    pub fn short_name(&self) -> &str {
        let path = self.0.split(';').next().unwrap_or(&self.0);
        path.rsplit(':').next().unwrap_or(path)
    }
}

impl fmt::Display for Dtmi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Dtmi {
    type Error = InvalidDtmi;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Dtmi::parse(value)
    }
}

impl From<Dtmi> for String {
    fn from(value: Dtmi) -> Self {
        value.0
    }
}

impl PartialEq<str> for Dtmi {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Dtmi {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
