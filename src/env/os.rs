mod mmap;
mod platform;
mod random;
mod sequential;
mod writable;

pub use mmap::PosixMmapFile;
pub use random::PosixRandomAccessFile;
pub use sequential::PosixSequentialFile;
pub use writable::PosixWritableFile;

use super::traits::{
    Env, FILE_PERMISSIONS, MIN_MMAP_SIZE, MmapFile, OpenMode, RandomAccessFile, SequentialFile,
    WritableFile,
};
use crate::config::EnvOptions;
use crate::error::{EnvError, EnvResult};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// 基于 POSIX 系统调用的 Env 实现
#[derive(Debug, Clone, Default)]
pub struct PosixEnv {
    options: EnvOptions,
}

impl PosixEnv {
    pub fn new(options: EnvOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EnvOptions {
        &self.options
    }

    /// 统一的打开流程：EINTR 重试、0644 权限、打开后设置 close-on-exec
    fn open(&self, path: &Path, options: &mut OpenOptions) -> EnvResult<File> {
        options.mode(FILE_PERMISSIONS);
        let file = platform::retry_on_interrupt(|| options.open(path))
            .map_err(|e| EnvError::from_io(path, e))?;

        // 尽力而为，失败不影响打开结果
        if let Err(e) = platform::set_cloexec(&file) {
            tracing::trace!(path = %path.display(), error = %e, "set FD_CLOEXEC failed");
        }
        Ok(file)
    }

    fn open_read_only(&self, path: &Path) -> EnvResult<File> {
        self.open(path, OpenOptions::new().read(true))
    }

    /// Create 模式截断，Reopen 模式保留内容
    fn open_for_write(&self, path: &Path, mode: OpenMode, read: bool) -> EnvResult<File> {
        self.open(
            path,
            OpenOptions::new()
                .read(read)
                .write(true)
                .create(true)
                .truncate(mode == OpenMode::Create),
        )
    }
}

impl Env for PosixEnv {
    #[tracing::instrument(level = "debug", skip(self, path), fields(path = %path.display()))]
    fn open_sequential(&self, path: &Path) -> EnvResult<Box<dyn SequentialFile>> {
        let file = self.open_read_only(path)?;
        Ok(Box::new(PosixSequentialFile::new(path.to_path_buf(), file)))
    }

    #[tracing::instrument(level = "debug", skip(self, path), fields(path = %path.display()))]
    fn open_random_access(&self, path: &Path) -> EnvResult<Box<dyn RandomAccessFile>> {
        let file = self.open_read_only(path)?;
        Ok(Box::new(PosixRandomAccessFile::new(path.to_path_buf(), file)))
    }

    #[tracing::instrument(level = "debug", skip(self, path), fields(path = %path.display()))]
    fn open_writable(&self, path: &Path, mode: OpenMode) -> EnvResult<Box<dyn WritableFile>> {
        let file = self.open_for_write(path, mode, false)?;
        let filesize = match mode {
            OpenMode::Create => 0,
            // Reopen：逻辑大小从 OS 同步，后续写入接在末尾
            OpenMode::Reopen => file.metadata().map_err(|e| EnvError::io(path, e))?.len(),
        };
        Ok(Box::new(PosixWritableFile::new(
            path.to_path_buf(),
            file,
            filesize,
            self.options.allow_fallocate,
            self.options.punch_hole_on_close,
        )))
    }

    #[tracing::instrument(level = "debug", skip(self, path), fields(path = %path.display()))]
    fn open_mmap(&self, path: &Path, mode: OpenMode) -> EnvResult<Box<dyn MmapFile>> {
        let (file, len) = match mode {
            OpenMode::Create => (self.open_for_write(path, mode, true)?, 0),
            // Reopen 只映射已有文件，路径不存在时返回 NotFound
            OpenMode::Reopen => {
                let file = self.open(path, OpenOptions::new().read(true).write(true))?;
                let len = file.metadata().map_err(|e| EnvError::io(path, e))?.len();
                (file, len)
            }
        };
        // 不能映射长度为 0 的区域：新文件 (或空文件) 先扩到最小尺寸
        let len = if len == 0 {
            file.set_len(MIN_MMAP_SIZE)
                .map_err(|e| EnvError::io(path, e))?;
            MIN_MMAP_SIZE
        } else {
            len
        };
        Ok(Box::new(PosixMmapFile::map(path.to_path_buf(), file, len)?))
    }

    fn file_size(&self, path: &Path) -> EnvResult<u64> {
        let meta = std::fs::metadata(path).map_err(|e| EnvError::from_io(path, e))?;
        Ok(meta.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::traits::{AccessPattern, PREALLOCATION_BLOCK_SIZE};
    use crate::error::ErrorKind;
    use std::os::unix::fs::PermissionsExt;

    #[test_log::test]
    fn test_create_uses_fixed_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perm.log");
        let env = PosixEnv::default();

        let mut file = env.open_writable(&path, OpenMode::Create).unwrap();
        file.write(b"x").unwrap();
        drop(file);

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        // umask 只会去掉权限位，不会加上
        assert_eq!(mode & !FILE_PERMISSIONS, 0);
        assert_ne!(mode & 0o600, 0);
    }

    #[test_log::test]
    fn test_open_missing_file_for_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sst");
        let env = PosixEnv::default();

        let err = env.open_sequential(&path).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.path(), Some(path.as_path()));

        let err = env.open_random_access(&path).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = env.file_size(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test_log::test]
    fn test_open_directory_for_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let env = PosixEnv::default();

        let err = env.open_writable(dir.path(), OpenMode::Create).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.raw_os_error(), Some(libc::EISDIR));
    }

    #[test_log::test]
    fn test_descriptors_are_cloexec() {
        use std::os::unix::io::AsRawFd;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloexec.log");
        std::fs::write(&path, b"data").unwrap();

        let env = PosixEnv::default();
        let file = env.open_read_only(&path).unwrap();
        let flags = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETFD) };
        assert_ne!(flags & libc::FD_CLOEXEC, 0);
    }

    #[test_log::test]
    fn test_reopen_writable_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.log");
        let env = PosixEnv::default();

        let mut file = env.open_writable(&path, OpenMode::Create).unwrap();
        file.write(b"abc").unwrap();
        drop(file);

        let mut file = env.open_writable(&path, OpenMode::Reopen).unwrap();
        assert_eq!(file.file_size(), 3);
        file.write(b"def").unwrap();
        assert_eq!(file.file_size(), 6);
        drop(file);

        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
        assert_eq!(env.file_size(&path).unwrap(), 6);
    }

    #[test_log::test]
    fn test_reopen_writable_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.log");
        let env = PosixEnv::default();

        let file = env.open_writable(&path, OpenMode::Reopen).unwrap();
        assert_eq!(file.file_size(), 0);
        assert!(path.exists());
    }

    #[test_log::test]
    fn test_create_truncates_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trunc.log");
        std::fs::write(&path, b"old content").unwrap();
        let env = PosixEnv::default();

        let mut file = env.open_writable(&path, OpenMode::Create).unwrap();
        assert_eq!(file.file_size(), 0);
        file.write(b"new").unwrap();
        drop(file);

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test_log::test]
    fn test_preallocated_writer_leaves_logical_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prealloc.log");
        let env = PosixEnv::default();

        let mut file = env.open_writable(&path, OpenMode::Create).unwrap();
        file.prepare_write(0, 2 * PREALLOCATION_BLOCK_SIZE).unwrap();
        file.write(&[1u8; 1000]).unwrap();
        drop(file);

        assert_eq!(env.file_size(&path).unwrap(), 1000);
    }

    #[test_log::test]
    fn test_mmap_create_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.db");
        let env = PosixEnv::default();

        let mut file = env.open_mmap(&path, OpenMode::Create).unwrap();
        assert_eq!(file.file_size(), MIN_MMAP_SIZE);
        assert!(file.as_slice().iter().all(|&b| b == 0));
        file.as_mut_slice()[..4].copy_from_slice(b"ROOT");
        file.resize(3 * MIN_MMAP_SIZE).unwrap();
        file.hint(AccessPattern::Random);
        drop(file);

        let file = env.open_mmap(&path, OpenMode::Reopen).unwrap();
        assert_eq!(file.file_size(), 3 * MIN_MMAP_SIZE);
        assert_eq!(&file.as_slice()[..4], b"ROOT");
    }

    #[test_log::test]
    fn test_mmap_reopen_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        std::fs::write(&path, b"").unwrap();
        let env = PosixEnv::default();

        let file = env.open_mmap(&path, OpenMode::Reopen).unwrap();
        assert_eq!(file.file_size(), MIN_MMAP_SIZE);
        assert_eq!(env.file_size(&path).unwrap(), MIN_MMAP_SIZE);
    }

    #[test_log::test]
    fn test_mmap_reopen_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let env = PosixEnv::default();

        let err = env.open_mmap(&path, OpenMode::Reopen).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.path(), Some(path.as_path()));
        assert!(!path.exists());
    }

    #[test_log::test]
    fn test_options_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opts.log");
        let env = PosixEnv::new(EnvOptions {
            allow_fallocate: false,
            ..EnvOptions::default()
        });
        assert!(!env.options().allow_fallocate);

        let mut file = env.open_writable(&path, OpenMode::Create).unwrap();
        file.prepare_write(0, 10).unwrap();
        file.write(b"0123456789").unwrap();
        drop(file);
        assert_eq!(env.file_size(&path).unwrap(), 10);
    }
}
