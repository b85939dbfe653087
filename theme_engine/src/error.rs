use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

use crate::lua_host::library::BindingWarning;

/// A script-supplied argument did not match the kind its binding declares.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bad argument #{position} to '{function}' ({expected} expected, got {got})")]
pub struct CoercionError {
    pub function: String,
    pub position: usize,
    pub expected: String,
    pub got: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error("table nesting exceeds {limit} levels (cyclic table?)")]
    TooDeep { limit: usize },
    #[error("cannot convert a {type_name} key to a host key")]
    UnsupportedKey { type_name: String },
}

/// Failures raised by host methods while servicing a script call.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("actor has been destroyed")]
    DestroyedActor,
    #[error("actor is already in use by another host call")]
    ActorBusy,
    #[error("binding argument {index} is not a {expected}")]
    ArgumentMismatch { index: usize, expected: &'static str },
    #[error("invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: String },
    #[error("{0}")]
    Message(String),
    #[error("texture '{path}' could not be loaded: {reason}")]
    Texture { path: String, reason: String },
    #[error("path '{path}' does not exist")]
    PathNotFound { path: String },
    #[error("metric {group}::{key} is not defined")]
    MissingMetric { group: String, key: String },
    #[error("metric {group}::{key} is invalid: {reason}")]
    InvalidMetric {
        group: String,
        key: String,
        reason: String,
    },
    #[error(transparent)]
    Script(#[from] mlua::Error),
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("syntax error in {chunk}: {message}")]
    Syntax { chunk: String, message: String },
    #[error("runtime error: {message}")]
    Runtime { message: String },
    #[error(transparent)]
    Coercion(CoercionError),
    #[error("actor class '{class}' is not registered")]
    UnregisteredClass { class: String },
    #[error("actor descriptor has no Class field")]
    MissingClass,
    #[error("invalid descriptor key '{key}': {reason}")]
    InvalidDescriptor { key: String, reason: String },
    #[error("descriptor for class '{class}' contains itself")]
    DescriptorCycle { class: String },
    #[error("actor descriptors nest deeper than {limit} levels")]
    DescriptorTooDeep { limit: usize },
    #[error(transparent)]
    Marshal(MarshalError),
    #[error("script manager is already running a chunk")]
    Busy,
    #[error(transparent)]
    Host(HostError),
    #[error("class registry: {0}")]
    Registry(String),
    #[error("class '{class}' binding is incomplete ({} warnings)", warnings.len())]
    Binding {
        class: String,
        warnings: Vec<BindingWarning>,
    },
    #[error("reading {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("interpreter error: {0}")]
    Lua(#[from] mlua::Error),
}

impl ThemeError {
    /// Classify an error that surfaced from script execution.
    ///
    /// Host failures cross the interpreter as external errors wrapped in
    /// callback errors; they are unwrapped here so callers see the original
    /// kind instead of an opaque runtime message.
    pub fn from_script(err: mlua::Error) -> Self {
        if let Some(coercion) = find_external::<CoercionError>(&err) {
            return ThemeError::Coercion(coercion.clone());
        }
        if let Some(marshal) = find_external::<MarshalError>(&err) {
            return ThemeError::Marshal(marshal.clone());
        }
        if let Some(host) = find_external::<HostError>(&err) {
            return ThemeError::Host(host.clone());
        }
        if let mlua::Error::SyntaxError { message, .. } = &err {
            return ThemeError::Syntax {
                chunk: chunk_of(message),
                message: message.clone(),
            };
        }
        ThemeError::Runtime {
            message: root_message(&err),
        }
    }

    /// Classify a host failure surfacing outside any script call.
    pub fn from_host(err: HostError) -> Self {
        match err {
            HostError::Script(inner) => ThemeError::from_script(inner),
            other => ThemeError::Host(other),
        }
    }
}

fn find_external<'a, T: StdError + 'static>(err: &'a mlua::Error) -> Option<&'a T> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<T>().or_else(|| {
            inner
                .downcast_ref::<HostError>()
                .and_then(|host| match host {
                    HostError::Script(nested) => find_external(nested),
                    _ => None,
                })
        }),
        mlua::Error::CallbackError { cause, .. } => find_external(cause),
        _ => None,
    }
}

fn root_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(message) => message.clone(),
        mlua::Error::CallbackError { cause, .. } => root_message(cause),
        other => other.to_string(),
    }
}

fn chunk_of(message: &str) -> String {
    message
        .split_once(':')
        .map(|(chunk, _)| chunk.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn coercion_errors_survive_callback_wrapping() {
        let coercion = CoercionError {
            function: "x".to_string(),
            position: 2,
            expected: "number".to_string(),
            got: "string".to_string(),
        };
        let wrapped = mlua::Error::CallbackError {
            traceback: "stack traceback".to_string(),
            cause: Arc::new(mlua::Error::external(coercion.clone())),
        };
        match ThemeError::from_script(wrapped) {
            ThemeError::Coercion(found) => assert_eq!(found, coercion),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn runtime_messages_drop_tracebacks() {
        let wrapped = mlua::Error::CallbackError {
            traceback: "stack traceback".to_string(),
            cause: Arc::new(mlua::Error::RuntimeError("boom".to_string())),
        };
        match ThemeError::from_script(wrapped) {
            ThemeError::Runtime { message } => assert_eq!(message, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn coercion_message_names_position_and_kind() {
        let err = CoercionError {
            function: "zoom".to_string(),
            position: 2,
            expected: "number".to_string(),
            got: "string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "bad argument #2 to 'zoom' (number expected, got string)"
        );
    }
}
