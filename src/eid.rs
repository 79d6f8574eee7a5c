use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;
use std::{fmt::Display, ops::Deref};

/// Identifier of an indexing job (a ULID string).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct JobId(String);

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(JobId(s.to_string()))
    }
}

impl Deref for JobId {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(fr: &str) -> Self {
        JobId(fr.to_string())
    }
}

impl From<String> for JobId {
    fn from(fr: String) -> Self {
        JobId(fr)
    }
}

impl JobId {
    #[inline]
    pub fn new() -> JobId {
        JobId(rusty_ulid::generate_ulid_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}
