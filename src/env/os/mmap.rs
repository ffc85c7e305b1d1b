use super::platform;
use crate::env::traits::{AccessPattern, MmapFile};
use crate::error::{EnvError, EnvResult};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::slice;

/// MAP_SHARED 映射的文件
///
/// 句柄独占映射区域和文件描述符：映射在 Drop 时释放，描述符随 File 一起关闭。
pub struct PosixMmapFile {
    path: PathBuf,
    file: File,
    base: *mut u8,
    len: usize,
}

// 映射区域只属于这个句柄，所有修改都要经过 &mut self
unsafe impl Send for PosixMmapFile {}

fn mapping_len(path: &Path, size: u64) -> EnvResult<usize> {
    match usize::try_from(size) {
        Ok(0) | Err(_) => Err(EnvError::io(
            path,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid mapping length {}", size),
            ),
        )),
        Ok(len) => Ok(len),
    }
}

impl PosixMmapFile {
    /// 映射 `file` 的 `[0, len)`。失败时 `file` 随之关闭。
    pub(crate) fn map(path: PathBuf, file: File, len: u64) -> EnvResult<Self> {
        let len = mapping_len(&path, len)?;
        let base = platform::map(&file, len).map_err(|e| EnvError::io(&path, e))?;
        tracing::debug!(path = %path.display(), len, "mapped");
        Ok(Self {
            path,
            file,
            base,
            len,
        })
    }
}

impl MmapFile for PosixMmapFile {
    fn as_ptr(&self) -> *const u8 {
        self.base
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.base
    }

    fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.base, self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.base, self.len) }
    }

    fn file_size(&self) -> u64 {
        self.len as u64
    }

    fn resize(&mut self, size: u64) -> EnvResult<()> {
        let new_len = mapping_len(&self.path, size)?;
        self.file
            .set_len(size)
            .map_err(|e| EnvError::io(&self.path, e))?;

        // 只有新映射成功之后才更新 base / len
        let base = platform::remap(&self.file, self.base, self.len, new_len)
            .map_err(|e| EnvError::io(&self.path, e))?;
        tracing::debug!(
            path = %self.path.display(),
            old_len = self.len,
            new_len,
            moved = base != self.base,
            "remapped"
        );
        self.base = base;
        self.len = new_len;
        Ok(())
    }

    fn hint(&self, pattern: AccessPattern) {
        if let Err(e) = platform::madvise(self.base, self.len, pattern) {
            tracing::trace!(path = %self.path.display(), ?pattern, error = %e, "madvise ignored");
        }
    }

    fn sync(&self) -> EnvResult<()> {
        platform::msync(self.base, self.len).map_err(|e| EnvError::io(&self.path, e))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PosixMmapFile {
    fn drop(&mut self) {
        if let Err(e) = platform::unmap(self.base, self.len) {
            tracing::warn!(path = %self.path.display(), error = %e, "munmap on close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::traits::MIN_MMAP_SIZE;
    use crate::error::ErrorKind;
    use std::fs::OpenOptions;

    fn create(path: &Path, len: u64) -> PosixMmapFile {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)
            .unwrap();
        file.set_len(len).unwrap();
        PosixMmapFile::map(path.to_path_buf(), file, len).unwrap()
    }

    #[test]
    fn test_writes_reach_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.db");

        let mut file = create(&path, MIN_MMAP_SIZE);
        file.as_mut_slice()[..5].copy_from_slice(b"hello");
        file.sync().unwrap();
        drop(file);

        let content = std::fs::read(&path).unwrap();
        assert_eq!(content.len() as u64, MIN_MMAP_SIZE);
        assert_eq!(&content[..5], b"hello");
    }

    #[test]
    fn test_grow_preserves_prefix_and_zero_fills() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.db");

        let mut file = create(&path, MIN_MMAP_SIZE);
        file.as_mut_slice()[0] = 0xAB;
        file.as_mut_slice()[4095] = 0xCD;

        file.resize(3 * MIN_MMAP_SIZE).unwrap();
        assert_eq!(file.file_size(), 3 * MIN_MMAP_SIZE);
        let view = file.as_slice();
        assert_eq!(view[0], 0xAB);
        assert_eq!(view[4095], 0xCD);
        assert!(view[4096..].iter().all(|&b| b == 0));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * MIN_MMAP_SIZE);
    }

    #[test]
    fn test_shrink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shrink.db");

        let mut file = create(&path, 2 * MIN_MMAP_SIZE);
        file.as_mut_slice()[..3].copy_from_slice(b"abc");
        file.resize(MIN_MMAP_SIZE).unwrap();
        assert_eq!(file.file_size(), MIN_MMAP_SIZE);
        assert_eq!(&file.as_slice()[..3], b"abc");
        drop(file);

        assert_eq!(std::fs::metadata(&path).unwrap().len(), MIN_MMAP_SIZE);
    }

    #[test]
    fn test_resize_to_zero_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.db");

        let mut file = create(&path, MIN_MMAP_SIZE);
        let err = file.resize(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        // 失败后句柄保持原状
        assert_eq!(file.file_size(), MIN_MMAP_SIZE);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), MIN_MMAP_SIZE);
    }

    #[test]
    fn test_hints_do_not_change_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hint.db");

        let mut file = create(&path, MIN_MMAP_SIZE);
        file.as_mut_slice()[..2].copy_from_slice(b"ok");
        for pattern in [
            AccessPattern::Normal,
            AccessPattern::Sequential,
            AccessPattern::Random,
            AccessPattern::NoReuse,
            AccessPattern::WillNeed,
        ] {
            file.hint(pattern);
        }
        assert_eq!(&file.as_slice()[..2], b"ok");
    }
}
