//! Field-level validation messages
//!
//! A [`ValidationResult`] collects `(key, message)` pairs. A keyed message is
//! attached to one field (e.g. `editPermission`), a generic message has no key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One validation message, optionally bound to a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextualMessage {
    /// Field the message refers to, `None` for generic messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Message identifier (e.g. `validate.role.noSpaceAllowed`)
    pub message: String,
    /// Message arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl fmt::Display for ContextualMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}: {}", key, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if !self.args.is_empty() {
            write!(f, " ({})", self.args.join(","))?;
        }
        Ok(())
    }
}

/// Accumulated validation messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    messages: Vec<ContextualMessage>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message bound to `key`
    pub fn add_contextual_message(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.messages.push(ContextualMessage {
            key: Some(key.into()),
            message: message.into(),
            args: Vec::new(),
        });
    }

    /// Add a message bound to `key` with arguments
    pub fn add_contextual_message_with_args<I, S>(
        &mut self,
        key: impl Into<String>,
        message: impl Into<String>,
        args: I,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.messages.push(ContextualMessage {
            key: Some(key.into()),
            message: message.into(),
            args: args.into_iter().map(Into::into).collect(),
        });
    }

    /// Add a message that is not bound to any field
    pub fn add_generic_message<I, S>(&mut self, message: impl Into<String>, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.messages.push(ContextualMessage {
            key: None,
            message: message.into(),
            args: args.into_iter().map(Into::into).collect(),
        });
    }

    /// Append all messages of `other`
    pub fn merge(&mut self, other: ValidationResult) {
        self.messages.extend(other.messages);
    }

    pub fn is_valid(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ContextualMessage] {
        &self.messages
    }

    /// Messages bound to `key`
    pub fn messages_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a ContextualMessage> {
        self.messages
            .iter()
            .filter(move |m| m.key.as_deref() == Some(key))
    }

    pub fn has_message_for(&self, key: &str) -> bool {
        self.messages_for(key).next().is_some()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.messages.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}
