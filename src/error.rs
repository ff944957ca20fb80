use camino::Utf8PathBuf;
use thiserror::Error;

use crate::module::ModuleId;

/// Failure of a single descriptor synchronization attempt.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Can't stat file {0}")]
    SourceNotStatable(Utf8PathBuf),

    #[error("Interrupted while copying {0}")]
    Interrupted(Utf8PathBuf),

    #[error("Couldn't read the workspace descriptor {0}.\n{1}")]
    Source(Utf8PathBuf, std::io::Error),

    #[error("Couldn't write the descriptor backup {0}.\n{1}")]
    Target(Utf8PathBuf, std::io::Error),
}

impl SyncError {
    /// Only a failure to write the local backup is fatal, every other failure
    /// leaves the previous snapshot in charge.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Target(..))
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings file {0} does not exist")]
    Unavailable(Utf8PathBuf),

    #[error("Settings file {0} is malformed.\n{1}")]
    Malformed(Utf8PathBuf, serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("I/O error while reading the descriptor.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error in {path} at line {line}: {reason}")]
    Parse {
        path: Utf8PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Descriptor failed validation: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't read the report registry.\n{0}")]
    Format(#[from] serde_json::Error),
}

/// Errors which abort report generation for a module, or the whole publish
/// step in case of cancellation.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Couldn't prepare the report directory {0}.\n{1}")]
    Target(Utf8PathBuf, std::io::Error),

    #[error("Module '{0}':\n{1}")]
    Sync(ModuleId, SyncError),

    #[error("Module '{0}' would overwrite the reports named '{1}' of another module")]
    Duplicate(ModuleId, String),

    #[error("Renderer failed for '{0}' ({1}):\n{2}")]
    Render(ModuleId, String, anyhow::Error),

    #[error("Error while saving the report registry:\n{0}")]
    Registry(#[from] RegistryError),

    #[error("Publishing was cancelled")]
    Cancelled,
}
