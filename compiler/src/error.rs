use shimwright_schema::RuleDecodeError;
use thiserror::Error;

/// Which of the two generated artifacts an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    NativeShim,
    HostWrapper,
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Artifact::NativeShim => f.write_str("native shim"),
            Artifact::HostWrapper => f.write_str("host wrapper"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ShimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{file}: parse error at line {line}, column {column}: {msg}")]
    ParseError {
        file:   String,
        msg:    String,
        line:   usize,
        column: usize,
    },

    #[error("{file}: cannot import {import}: {reason}")]
    ImportError {
        file:   String,
        import: String,
        reason: String,
    },

    #[error(transparent)]
    RuleDecode(#[from] RuleDecodeError),

    #[error("rule attached to {0} was not normalized before resolution")]
    UnnormalizedRule(String),

    #[error("failed to find {kind} {name} at resolving {context}")]
    Unresolved {
        kind:    &'static str,
        name:    String,
        context: String,
    },

    #[error("{kind} {name} is defined twice")]
    Duplicate {
        kind: &'static str,
        name: String,
    },

    #[error("{context}: type kind is not specified")]
    MissingTypeKind { context: String },

    #[error("{0} message doesn't specify funcptr but used as a funcptr")]
    NotAFuncptr(String),

    #[error("failed to resolve {message} funcptr: funcbaseptr flag must be enabled for exactly one argument, found {count}")]
    MalformedFuncptr {
        message: String,
        count:   usize,
    },

    #[error("method {method} has receiver {receiver} which is a callback type, not a constructible struct")]
    InvalidReceiver {
        method:   String,
        receiver: String,
    },

    #[error("{context}: array_num and array_num_arg are both set")]
    ConflictingArrayLength { context: String },

    #[error("{context}: length argument index {index} is outside 1..={max}")]
    LengthIndexOutOfRange {
        context: String,
        index:   u64,
        max:     usize,
    },

    #[error("failed to render {artifact}: {msg}")]
    RenderError { artifact: Artifact, msg: String },

    #[error("{artifact} failed syntax validation at line {line}: {msg}")]
    SyntaxError {
        artifact: Artifact,
        line:     usize,
        msg:      String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
