use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    General(String),
    /// A textual metadata file is missing, unreadable, or contains no entries.
    #[error("could not read {}: {reason}", path.display())]
    ConfigRead { path: PathBuf, reason: String },
    /// A required key is absent from a parsed metadata file.
    #[error("{file} is missing required key {key:?}")]
    MissingKey { file: &'static str, key: String },
    #[error("{file}: invalid value {value:?} for key {key:?}")]
    InvalidValue {
        file: &'static str,
        key: String,
        value: String,
    },
    /// The container does not have the layout of a TCF acquisition.
    #[error("unexpected container layout: {0}")]
    ModalityResolution(String),
    /// Pixel data disagrees with the size attributes declared for it.
    #[error("array shape mismatch: {0}")]
    ArrayReshape(String),
    #[error("fluorescence sub-channel {0} is not supported (expected 0, 1 or 2)")]
    UnsupportedFluorescenceChannel(u8),
    #[error("building metadata for {folder} failed: {source}")]
    MetadataAssembly {
        folder: String,
        #[source]
        source: Box<Error>,
    },
    #[error("writing {} failed: {reason}", path.display())]
    SinkWrite { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error>),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn wrap(error: impl std::error::Error + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }

    pub(crate) fn config_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ConfigRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn sink_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SinkWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap a failure that happened while building the metadata of `folder`.
    pub fn metadata_assembly(folder: impl Into<String>, source: Error) -> Self {
        Self::MetadataAssembly {
            folder: folder.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error came from reading the textual metadata files.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigRead { .. } | Self::MissingKey { .. } | Self::InvalidValue { .. }
        )
    }
}
