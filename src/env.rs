mod memory;
#[cfg(unix)]
mod os;
mod prealloc;
mod traits;

pub use memory::MemEnv;
#[cfg(unix)]
pub use os::{
    PosixEnv, PosixMmapFile, PosixRandomAccessFile, PosixSequentialFile, PosixWritableFile,
};
pub use traits::{
    AccessPattern, Env, FILE_PERMISSIONS, MIN_MMAP_SIZE, MmapFile, OpenMode,
    PREALLOCATION_BLOCK_SIZE, RandomAccessFile, SequentialFile, WritableFile, WriteLifetimeHint,
};

#[cfg(unix)]
static DEFAULT_ENV: std::sync::OnceLock<PosixEnv> = std::sync::OnceLock::new();

/// 进程级默认 Env，使用默认 EnvOptions，第一次调用时初始化
#[cfg(unix)]
pub fn default_env() -> &'static PosixEnv {
    DEFAULT_ENV.get_or_init(PosixEnv::default)
}
