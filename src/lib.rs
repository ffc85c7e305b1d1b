//! 存储引擎用的文件 I/O 环境
//!
//! 通过 [`env::Env`] 打开四种文件句柄：顺序读、随机读、追加写、内存映射。
//! 每个句柄独占一个 OS 资源 (文件描述符或映射区域)，在 Drop 时释放。
//!
//! ```no_run
//! use posix_env::env::{default_env, Env, OpenMode};
//! use std::path::Path;
//!
//! # fn main() -> posix_env::error::EnvResult<()> {
//! let env = default_env();
//! let mut wal = env.open_writable(Path::new("000001.log"), OpenMode::Reopen)?;
//! let offset = wal.file_size();
//! wal.prepare_write(offset, 5)?;
//! wal.write(b"hello")?;
//! wal.sync()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod env;
pub mod error;

pub use config::EnvOptions;
pub use error::{EnvError, EnvResult, ErrorKind};
