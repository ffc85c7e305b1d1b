use super::platform;
use crate::env::traits::{AccessPattern, RandomAccessFile};
use crate::error::{EnvError, EnvResult};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// 无缓冲的随机读文件，所有读取都是 pread
pub struct PosixRandomAccessFile {
    path: PathBuf,
    file: File,
}

impl PosixRandomAccessFile {
    pub(crate) fn new(path: PathBuf, file: File) -> Self {
        Self { path, file }
    }
}

impl RandomAccessFile for PosixRandomAccessFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> EnvResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read_at(&mut buf[filled..], offset + filled as u64) {
                // 读到文件末尾之前不足 n 字节，返回已读部分
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EnvError::io(&self.path, e)),
            }
        }
        Ok(filled)
    }

    fn prefetch(&self, offset: u64, n: u64) -> EnvResult<()> {
        platform::readahead(&self.file, offset, n).map_err(|e| EnvError::io(&self.path, e))
    }

    fn hint(&self, pattern: AccessPattern) {
        if let Err(e) = platform::fadvise(&self.file, pattern) {
            tracing::trace!(path = %self.path.display(), ?pattern, error = %e, "fadvise ignored");
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
