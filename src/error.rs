/// Error types for the grouping pipeline
///
/// Failures are contained where they happen: a bad rule drops that rule, a
/// failed classifier call drops the AI stage, a rejected store command drops
/// that one group. Only a settings read failure aborts a whole run.
use thiserror::Error;

use crate::tab_data::{GroupId, TabId};

/// Failures reported by the tab/group store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The environment rejected a group/ungroup/update command.
    #[error("store operation `{operation}` failed: {message}")]
    Operation { operation: String, message: String },

    /// A tab referenced by a snapshot has since been closed.
    #[error("tab {0} no longer exists")]
    TabGone(TabId),

    /// A group referenced by a snapshot has since been removed.
    #[error("group {0} no longer exists")]
    GroupGone(GroupId),

    /// The primitive ungroup command is not provided by this environment.
    #[error("ungroup is not supported by this environment")]
    UngroupUnsupported,
}

impl StoreError {
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Failures on the AI classifier path. None of these escape `classify`.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("no API key configured")]
    ConfigurationMissing,

    #[error("AI grouping is disabled")]
    Disabled,

    #[error("classifier returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("classifier transport failed: {0}")]
    Transport(String),

    #[error("classifier returned empty content")]
    EmptyResponse,

    #[error("no JSON object found in classifier response")]
    NoJsonObject,

    #[error("classifier response has no `groups` array")]
    MalformedGroups,

    #[error("invalid JSON from classifier: {0}")]
    Json(#[from] serde_json::Error),
}

/// A rule whose pattern cannot be compiled.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule `{rule}` has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

/// Failures reading or writing persisted settings and rules.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("settings storage failed: {0}")]
    Storage(String),

    #[error("settings are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
