use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    // -- configuration: raised while loading a script, before anything runs --
    #[error("failed to read test script '{path}': {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in '{path}': {source}")]
    MalformedXml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    #[error("include cycle detected: '{0}' includes itself")]
    IncludeCycle(PathBuf),

    #[error("<{element}> in '{path}' is missing required attribute '{attribute}'")]
    MissingAttribute {
        element: String,
        attribute: String,
        path: PathBuf,
    },

    #[error("action '{action}': invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttribute {
        action: String,
        attribute: String,
        value: String,
    },

    #[error("duplicate action id '{0}'")]
    DuplicateActionId(String),

    #[error("action '{action}': parameter '{param}' is declared more than once")]
    DuplicateParameter { action: String, param: String },

    #[error("action '{action}': unsupported action type '{action_type}'")]
    UnknownActionType { action: String, action_type: String },

    #[error("action '{action}': missing required parameter '{param}'")]
    MissingParameter { action: String, param: String },

    #[error("action '{action}': invalid value '{value}' for parameter '{param}'")]
    InvalidParameter {
        action: String,
        param: String,
        value: String,
    },

    #[error("filter name '{0}' does not match any top-level action")]
    UnknownFilterName(String),

    #[error("invalid driver configuration: {0}")]
    InvalidConfig(String),

    // -- runtime: raised by actions while the test is running --
    #[error("variable '{0}' is not defined")]
    UndefinedVariable(String),

    #[error("variable '{name}' holds a {actual}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{0}")]
    ActionFailed(String),

    #[error("sync condition '{condition}' did not reach {value} within {timeout_ms}ms")]
    SyncTimeout {
        condition: String,
        value: i64,
        timeout_ms: u64,
    },

    #[error("sync condition '{0}' does not exist")]
    UnknownCondition(String),

    #[error("{0} is closed")]
    Closed(String),

    #[error("no message arrived on '{destination}' within {timeout_ms}ms")]
    ReceiveTimeout { destination: String, timeout_ms: u64 },

    #[error("name '{0}' is not bound in the directory")]
    NameNotBound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl DriverError {
    /// True for errors that abort a test before any action runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DriverError::ScriptRead { .. }
                | DriverError::MalformedXml { .. }
                | DriverError::IncludeCycle(_)
                | DriverError::MissingAttribute { .. }
                | DriverError::InvalidAttribute { .. }
                | DriverError::DuplicateActionId(_)
                | DriverError::DuplicateParameter { .. }
                | DriverError::UnknownActionType { .. }
                | DriverError::MissingParameter { .. }
                | DriverError::InvalidParameter { .. }
                | DriverError::UnknownFilterName(_)
                | DriverError::InvalidConfig(_)
                | DriverError::Yaml(_)
        )
    }
}

/// Render an error followed by every `source()` beneath it, joined by `: `.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut cur = err.source();
    while let Some(cause) = cur {
        let msg = cause.to_string();
        // thiserror's `{source}` interpolation already repeats the cause
        if !out.ends_with(&msg) {
            out.push_str(": ");
            out.push_str(&msg);
        }
        cur = cause.source();
    }
    out
}

pub type Result<T> = std::result::Result<T, DriverError>;
