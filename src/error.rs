use std::path::PathBuf;

/// Failure talking to the text-generation provider.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("invalid provider endpoint: {0}")]
    Endpoint(String),

    #[error("failed to reach provider: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed provider stream: {0}")]
    Stream(String),

    #[error("provider returned no text ({0})")]
    Blocked(String),
}

/// Failure writing the packaged project to disk.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("failed to create build directory: {0}")]
    CreateDir(#[source] std::io::Error),

    #[error("invalid file name in file set: {0:?}")]
    InvalidName(String),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk build directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Errors surfaced at the user-action boundary.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("No API key found. Set GEMINI_API_KEY or google.api_key in config.toml")]
    MissingCredential,

    #[error("Prompt is empty. Describe the app you want to build.")]
    EmptyPrompt,

    #[error("No files yet. Generate an app first.")]
    NoFiles,

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
