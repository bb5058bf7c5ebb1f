//! User-facing messages attached to a row.

use crate::validation::Severity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

/// A message shown as a row tooltip, e.g. why a save or load failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeanMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl BeanMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            text: text.into(),
        }
    }

    /// Severity cue used when rendering the row.
    pub fn severity(&self) -> Severity {
        match self.kind {
            MessageKind::Info => Severity::Ok,
            MessageKind::Warning => Severity::Warning,
            MessageKind::Error => Severity::Error,
        }
    }
}
