use super::prealloc::Watermark;
use super::traits::{
    AccessPattern, Env, MIN_MMAP_SIZE, MmapFile, OpenMode, RandomAccessFile, SequentialFile,
    WritableFile, WriteLifetimeHint,
};
use crate::error::{EnvError, EnvResult};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// --- In-Memory Env (For Testing) ---
//
// 语义和 PosixEnv 保持一致，额外记录 allocate 的调用次数，用来验证预分配的批量策略。

#[derive(Debug, Default)]
struct MemFileData {
    bytes: Vec<u8>,
    // 预留到的位置，对应磁盘上被预分配的块
    reserved: u64,
    allocate_calls: u64,
}

type SharedData = Arc<RwLock<MemFileData>>;

#[derive(Clone, Default)]
pub struct MemEnv {
    // Path -> File Content
    files: Arc<RwLock<HashMap<PathBuf, SharedData>>>,
}

fn not_found(path: &Path) -> EnvError {
    EnvError::from_io(path, io::Error::new(io::ErrorKind::NotFound, "File not found"))
}

impl MemEnv {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, path: &Path) -> EnvResult<SharedData> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn get_or_create(&self, path: &Path, mode: OpenMode) -> SharedData {
        let mut guard = self.files.write();
        let data = guard.entry(path.to_path_buf()).or_default().clone();
        if mode == OpenMode::Create {
            let mut file = data.write();
            file.bytes.clear();
            file.reserved = 0;
        }
        data
    }

    /// 该文件上 allocate 实际执行的次数 (不含 no-op)
    pub fn allocate_calls(&self, path: &Path) -> u64 {
        self.get(path).map(|d| d.read().allocate_calls).unwrap_or(0)
    }

    /// 当前仍被预留的空间末尾，关闭 writer 后应该回落到文件大小
    pub fn reserved_bytes(&self, path: &Path) -> u64 {
        self.get(path).map(|d| d.read().reserved).unwrap_or(0)
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.get(path).ok().map(|d| d.read().bytes.clone())
    }
}

struct MemSequentialFile {
    path: PathBuf,
    data: SharedData,
    pos: u64,
}

impl SequentialFile for MemSequentialFile {
    fn read(&mut self, buf: &mut [u8]) -> EnvResult<usize> {
        let n = read_at(&self.data, buf, self.pos);
        self.pos += n as u64;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> EnvResult<()> {
        self.pos = self.pos.saturating_add(n);
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn read_at(data: &SharedData, buf: &mut [u8], offset: u64) -> usize {
    let guard = data.read();
    let len = guard.bytes.len() as u64;
    if offset >= len {
        return 0;
    }
    let start = offset as usize;
    let end = start + buf.len().min((len - offset) as usize);
    let n = end - start;
    buf[..n].copy_from_slice(&guard.bytes[start..end]);
    n
}

struct MemRandomAccessFile {
    path: PathBuf,
    data: SharedData,
}

impl RandomAccessFile for MemRandomAccessFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> EnvResult<usize> {
        Ok(read_at(&self.data, buf, offset))
    }

    fn prefetch(&self, _offset: u64, _n: u64) -> EnvResult<()> {
        Ok(())
    }

    fn hint(&self, _pattern: AccessPattern) {}

    fn path(&self) -> &Path {
        &self.path
    }
}

struct MemWritableFile {
    path: PathBuf,
    data: SharedData,
    filesize: u64,
    watermark: Watermark,
}

fn reserve(data: &SharedData, offset: u64, n: u64) {
    let mut guard = data.write();
    guard.allocate_calls += 1;
    guard.reserved = guard.reserved.max(offset.saturating_add(n));
}

impl WritableFile for MemWritableFile {
    fn write(&mut self, data: &[u8]) -> EnvResult<()> {
        let mut guard = self.data.write();
        let start = self.filesize as usize;
        let end = start + data.len();
        if guard.bytes.len() < end {
            guard.bytes.resize(end, 0);
        }
        guard.bytes[start..end].copy_from_slice(data);
        self.filesize = end as u64;
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> EnvResult<()> {
        self.data.write().bytes.resize(size as usize, 0);
        self.filesize = size;
        Ok(())
    }

    fn sync(&mut self) -> EnvResult<()> {
        Ok(()) // 内存操作不需要 sync
    }

    fn range_sync(&mut self, _offset: u64, _n: u64) -> EnvResult<()> {
        Ok(())
    }

    fn prepare_write(&mut self, offset: u64, n: u64) -> EnvResult<()> {
        let data = &self.data;
        self.watermark.prepare(&self.path, offset, n, |offset, len| {
            reserve(data, offset, len);
            Ok(())
        })
    }

    fn allocate(&mut self, offset: u64, n: u64) -> EnvResult<()> {
        reserve(&self.data, offset, n);
        Ok(())
    }

    fn file_size(&self) -> u64 {
        self.filesize
    }

    fn hint(&mut self, _hint: WriteLifetimeHint) {}

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MemWritableFile {
    fn drop(&mut self) {
        if self.watermark.is_active() {
            let mut guard = self.data.write();
            guard.bytes.resize(self.filesize as usize, 0);
            guard.reserved = self.filesize;
        }
    }
}

/// 内存里没有真正的共享映射：句柄持有一份私有副本，sync / resize / drop 时写回
struct MemMmapFile {
    path: PathBuf,
    data: SharedData,
    buf: Vec<u8>,
}

impl MemMmapFile {
    fn write_back(&self) {
        let mut guard = self.data.write();
        guard.bytes.clear();
        guard.bytes.extend_from_slice(&self.buf);
    }
}

impl MmapFile for MemMmapFile {
    fn as_ptr(&self) -> *const u8 {
        self.buf.as_ptr()
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.buf.as_mut_ptr()
    }

    fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn file_size(&self) -> u64 {
        self.buf.len() as u64
    }

    fn resize(&mut self, size: u64) -> EnvResult<()> {
        if size == 0 {
            return Err(EnvError::io(
                &self.path,
                io::Error::new(io::ErrorKind::InvalidInput, "invalid mapping length 0"),
            ));
        }
        self.buf.resize(size as usize, 0);
        self.write_back();
        Ok(())
    }

    fn hint(&self, _pattern: AccessPattern) {}

    fn sync(&self) -> EnvResult<()> {
        self.write_back();
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MemMmapFile {
    fn drop(&mut self) {
        self.write_back();
    }
}

impl Env for MemEnv {
    fn open_sequential(&self, path: &Path) -> EnvResult<Box<dyn SequentialFile>> {
        Ok(Box::new(MemSequentialFile {
            path: path.to_path_buf(),
            data: self.get(path)?,
            pos: 0,
        }))
    }

    fn open_random_access(&self, path: &Path) -> EnvResult<Box<dyn RandomAccessFile>> {
        Ok(Box::new(MemRandomAccessFile {
            path: path.to_path_buf(),
            data: self.get(path)?,
        }))
    }

    fn open_writable(&self, path: &Path, mode: OpenMode) -> EnvResult<Box<dyn WritableFile>> {
        let data = self.get_or_create(path, mode);
        let filesize = data.read().bytes.len() as u64;
        Ok(Box::new(MemWritableFile {
            path: path.to_path_buf(),
            data,
            filesize,
            watermark: Watermark::default(),
        }))
    }

    fn open_mmap(&self, path: &Path, mode: OpenMode) -> EnvResult<Box<dyn MmapFile>> {
        let data = match mode {
            OpenMode::Create => self.get_or_create(path, mode),
            OpenMode::Reopen => self.get(path)?,
        };
        let mut buf = data.read().bytes.clone();
        if buf.is_empty() {
            buf.resize(MIN_MMAP_SIZE as usize, 0);
        }
        let file = MemMmapFile {
            path: path.to_path_buf(),
            data,
            buf,
        };
        file.write_back();
        Ok(Box::new(file))
    }

    fn file_size(&self, path: &Path) -> EnvResult<u64> {
        Ok(self.get(path)?.read().bytes.len() as u64)
    }
}
