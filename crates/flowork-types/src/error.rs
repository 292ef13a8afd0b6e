use thiserror::Error;

/// Errors from store operations (load, save, close).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no store accepts path '{0}'")]
    Unsupported(String),

    #[error("path '{0}' is not absolute")]
    NotAbsolute(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error for '{url}': {message}")]
    Http { url: String, message: String },

    #[error("operation not supported by {store} store: {operation}")]
    ReadOnly { store: String, operation: String },
}

impl StoreError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return StoreError::NotFound(path.into());
        }
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from runner operations (volumes, file staging, task execution).
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("volume error: {0}")]
    Volume(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("task '{task}' exited with status {code}, see {stderr_path}")]
    TaskFailed {
        task: String,
        code: i32,
        stderr_path: String,
    },

    #[error("runner configuration error: {0}")]
    Config(String),
}

/// Errors produced while iterating an input path source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to list inputs in '{path}': {source}")]
    List {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read entry in '{path}': {source}")]
    Entry {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("input path is not valid UTF-8: {0}")]
    NonUtf8(String),
}
