use super::platform;
use crate::env::prealloc::Watermark;
use crate::env::traits::{WritableFile, WriteLifetimeHint};
use crate::error::{EnvError, EnvResult};
use std::fs::File;
use std::io;
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::{Path, PathBuf};

/// 追加写文件
///
/// 写入总是落在逻辑末尾 (`filesize`)，使用 pwrite 而不是 O_APPEND：
/// 预分配只预留块不改文件大小，truncate 之后下一次写入也能接着新的末尾写。
pub struct PosixWritableFile {
    path: PathBuf,
    file: File,
    filesize: u64,
    watermark: Watermark,
    allow_fallocate: bool,
    punch_hole_on_close: bool,
}

impl PosixWritableFile {
    pub(crate) fn new(
        path: PathBuf,
        file: File,
        filesize: u64,
        allow_fallocate: bool,
        punch_hole_on_close: bool,
    ) -> Self {
        Self {
            path,
            file,
            filesize,
            watermark: Watermark::default(),
            allow_fallocate,
            punch_hole_on_close,
        }
    }

    /// 已经预留到的位置 (字节)，没有预分配过时为 0
    pub fn preallocated_until(&self) -> u64 {
        self.watermark.end()
    }

    /// prepare_write 实际触发预分配的次数
    pub fn preallocation_calls(&self) -> u64 {
        self.watermark.reservations()
    }

    /// 关闭前回收多预留的空间。只做尽力而为，错误只记日志。
    fn release_preallocation(&mut self) {
        if let Err(e) = self.file.set_len(self.filesize) {
            tracing::warn!(path = %self.path.display(), error = %e, "truncate on close failed");
            return;
        }
        if !self.punch_hole_on_close {
            return;
        }

        // 截断不保证多出来的块被真正释放：比较实际占用的块数和逻辑大小需要的块数
        let meta = match self.file.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "fstat on close failed");
                return;
            }
        };
        let blksize = meta.blksize().max(512);
        let needed = meta.size().div_ceil(blksize);
        let allocated = meta.blocks() / (blksize / 512);
        if needed == allocated {
            return;
        }

        let end = self.watermark.end();
        if end <= self.filesize {
            return;
        }
        match platform::punch_hole(&self.file, self.filesize, end - self.filesize) {
            Ok(()) => tracing::debug!(
                path = %self.path.display(),
                offset = self.filesize,
                len = end - self.filesize,
                "released preallocated blocks"
            ),
            Err(e) if platform::is_unsupported(&e) => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "punch hole on close failed")
            }
        }
    }
}

fn fallocate_range(file: &File, path: &Path, allowed: bool, offset: u64, n: u64) -> EnvResult<()> {
    if !allowed || n == 0 {
        return Ok(());
    }
    match platform::fallocate(file, offset, n) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), offset, len = n, "preallocated");
            Ok(())
        }
        // 文件系统不支持预分配，纯优化，当作 no-op
        Err(e) if platform::is_unsupported(&e) => Ok(()),
        Err(e) => Err(EnvError::io(path, e)),
    }
}

impl WritableFile for PosixWritableFile {
    fn write(&mut self, data: &[u8]) -> EnvResult<()> {
        let mut written = 0;
        while written < data.len() {
            let offset = self.filesize + written as u64;
            match self.file.write_at(&data[written..], offset) {
                Ok(0) => {
                    return Err(EnvError::io(
                        &self.path,
                        io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer"),
                    ));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EnvError::io(&self.path, e)),
            }
        }
        self.filesize += data.len() as u64;
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> EnvResult<()> {
        self.file
            .set_len(size)
            .map_err(|e| EnvError::io(&self.path, e))?;
        self.filesize = size;
        Ok(())
    }

    fn sync(&mut self) -> EnvResult<()> {
        self.file.sync_all().map_err(|e| EnvError::io(&self.path, e))
    }

    fn range_sync(&mut self, offset: u64, n: u64) -> EnvResult<()> {
        platform::range_sync(&self.file, offset, n).map_err(|e| EnvError::io(&self.path, e))
    }

    fn prepare_write(&mut self, offset: u64, n: u64) -> EnvResult<()> {
        let Self {
            path,
            file,
            watermark,
            allow_fallocate,
            ..
        } = self;
        watermark.prepare(path, offset, n, |offset, len| {
            fallocate_range(file, path, *allow_fallocate, offset, len)
        })
    }

    fn allocate(&mut self, offset: u64, n: u64) -> EnvResult<()> {
        fallocate_range(&self.file, &self.path, self.allow_fallocate, offset, n)
    }

    fn file_size(&self) -> u64 {
        self.filesize
    }

    fn hint(&mut self, hint: WriteLifetimeHint) {
        if let Err(e) = platform::set_write_lifetime(&self.file, hint) {
            tracing::trace!(path = %self.path.display(), ?hint, error = %e, "write hint ignored");
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PosixWritableFile {
    fn drop(&mut self) {
        if self.watermark.is_active() {
            self.release_preallocation();
        }
        // File 自己负责 close
    }
}
