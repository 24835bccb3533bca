//! Commands and per-deployment device profiles.

use crate::error::ExpectError;
use anyhow::Context as _;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// A line to send and, optionally, the pattern that ends its output.
///
/// Serialized as `["text"]` or `["text", "pattern"]`.
#[derive(Clone)]
pub struct Command {
    pub text: String,
    pub expect: Option<Regex>,
}

impl Command {
    /// A command that falls back to the profile's default pattern.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expect: None,
        }
    }

    /// A command that waits for `pattern`.
    pub fn expecting(text: impl Into<String>, pattern: &str) -> Result<Self, ExpectError> {
        Ok(Self {
            text: text.into(),
            expect: Some(compile(pattern)?),
        })
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("text", &self.text)
            .field("expect", &self.expect.as_ref().map(Regex::as_str))
            .finish()
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.expect.as_ref().map(Regex::as_str) == other.expect.as_ref().map(Regex::as_str)
    }
}

impl TryFrom<Vec<Option<String>>> for Command {
    type Error = ExpectError;

    fn try_from(entry: Vec<Option<String>>) -> Result<Self, Self::Error> {
        let mut parts = entry.into_iter();
        let text = match parts.next() {
            Some(Some(text)) => text,
            _ => {
                return Err(ExpectError::Config(
                    "Command entry must start with the command text".to_string(),
                ));
            }
        };
        let expect = parts.next().flatten();
        if parts.next().is_some() {
            return Err(ExpectError::Config(format!(
                "Command entry for '{text}' has more than two elements"
            )));
        }
        match expect {
            Some(pattern) => Self::expecting(text, &pattern),
            None => Ok(Self::new(text)),
        }
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entry = Vec::<Option<String>>::deserialize(deserializer)?;
        Command::try_from(entry).map_err(de::Error::custom)
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.expect.is_some() { 2 } else { 1 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.text)?;
        if let Some(pattern) = &self.expect {
            seq.serialize_element(pattern.as_str())?;
        }
        seq.end()
    }
}

/// Initialization commands and the fallback pattern for one kind of device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceProfile {
    #[serde(default)]
    pub init_cmds: Vec<Command>,
    #[serde(default, deserialize_with = "deserialize_pattern")]
    pub default_expect: Option<Regex>,
}

impl DeviceProfile {
    /// Load a profile from a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read device profile: {}", path.display()))?;
        let profile = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON device profile: {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML device profile: {}", path.display()))?,
        };
        Ok(profile)
    }

    /// The pattern to use for `command`: its own, else the profile default.
    pub fn expect_for<'a>(&'a self, command: &'a Command) -> Option<&'a Regex> {
        command.expect.as_ref().or(self.default_expect.as_ref())
    }
}

/// Interpret the caller's `cmds` value as an ordered command list.
///
/// Anything other than an array yields no commands rather than an error;
/// a malformed entry inside an array is still rejected.
pub fn commands_from_value(value: &Value) -> Result<Vec<Command>, ExpectError> {
    let Value::Array(entries) = value else {
        if !value.is_null() {
            warn!("Command list is not a sequence, treating it as empty");
        }
        return Ok(Vec::new());
    };
    entries
        .iter()
        .map(|entry| {
            Command::deserialize(entry)
                .map_err(|e| ExpectError::Config(format!("Invalid command entry {entry}: {e}")))
        })
        .collect()
}

fn compile(pattern: &str) -> Result<Regex, ExpectError> {
    Regex::new(pattern)
        .map_err(|e| ExpectError::Config(format!("Invalid expected pattern '{pattern}': {e}")))
}

fn deserialize_pattern<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Regex>, D::Error> {
    Option::<String>::deserialize(deserializer)?
        .map(|pattern| compile(&pattern).map_err(de::Error::custom))
        .transpose()
}
