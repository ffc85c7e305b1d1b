use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type EnvResult<T> = Result<T, EnvError>;

/// 错误分类：调用方只需要关心这三类 I/O 失败 (外加配置错误)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    Io,
    Config,
}

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("Not Found: {}: {source}", path.display())]
    NotFound { path: PathBuf, source: io::Error },

    #[error("Access Denied: {}: {source}", path.display())]
    AccessDenied { path: PathBuf, source: io::Error },

    #[error("I/O Error: {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Config Error: {0}")]
    Config(String),
}

impl EnvError {
    /// 根据 io::ErrorKind 归类，保留原始 OS 错误码和出错路径
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => EnvError::NotFound { path, source },
            io::ErrorKind::PermissionDenied => EnvError::AccessDenied { path, source },
            _ => EnvError::Io { path, source },
        }
    }

    /// 读写路径上的失败一律是 Io，即使 errno 恰好是 ENOENT
    pub fn io(path: &Path, source: io::Error) -> Self {
        EnvError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EnvError::NotFound { .. } => ErrorKind::NotFound,
            EnvError::AccessDenied { .. } => ErrorKind::AccessDenied,
            EnvError::Io { .. } => ErrorKind::Io,
            EnvError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            EnvError::NotFound { path, .. }
            | EnvError::AccessDenied { path, .. }
            | EnvError::Io { path, .. } => Some(path),
            EnvError::Config(_) => None,
        }
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            EnvError::NotFound { source, .. }
            | EnvError::AccessDenied { source, .. }
            | EnvError::Io { source, .. } => source.raw_os_error(),
            EnvError::Config(_) => None,
        }
    }
}
