use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DapperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Source directory not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Layout '{name}' not found for {path} (looked in {layout_path})")]
    LayoutNotFound {
        name: String,
        path: PathBuf,
        layout_path: PathBuf,
    },

    #[error("Template error in {path}: {message}")]
    Template { path: PathBuf, message: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Directory walk error in {path}: {message}")]
    WalkDir { path: PathBuf, message: String },

    #[error("Refusing to clean {path}: it contains the source directory")]
    UnsafeClean { path: PathBuf },
}

impl DapperError {
    /// Fatal errors abort a whole build; everything else is recorded per file
    /// in the [`BuildReport`](crate::BuildReport) and the build carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Config { .. } | Self::SourceNotFound { .. } | Self::UnsafeClean { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DapperError>;

pub trait IoContext<T> {
    fn read_context(self, path: impl Into<PathBuf>) -> Result<T>;
    fn write_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| DapperError::Read {
            path: path.into(),
            source,
        })
    }

    fn write_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| DapperError::Write {
            path: path.into(),
            source,
        })
    }
}
