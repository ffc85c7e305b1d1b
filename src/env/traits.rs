use crate::error::EnvResult;
use std::path::Path;

/// 新建文件的权限 (rw-r--r--)，固定策略，不可按调用配置
pub const FILE_PERMISSIONS: u32 = 0o644;

/// 新建 mmap 文件时预留并映射的最小长度，避免映射长度为 0 的区域
pub const MIN_MMAP_SIZE: u64 = 4096;

/// prepare_write 批量预分配的块大小
pub const PREALLOCATION_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Create: 截断或新建，从 0 开始；Reopen: 不存在则新建，从当前文件末尾继续
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Create,
    Reopen,
}

/// 访问模式提示，只影响 OS 的缓存行为，不影响正确性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPattern {
    Normal,
    Sequential,
    Random,
    NoReuse,
    WillNeed,
    DontNeed,
}

/// 写入数据的生命周期提示，取值与 Linux 的 RWH_WRITE_LIFE_* 一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum WriteLifetimeHint {
    NotSet = 0,
    None = 1,
    Short = 2,
    Medium = 3,
    Long = 4,
    Extreme = 5,
}

/// [Capability Trait] 顺序读取能力
///
/// 对应场景：启动时回放 WAL / Manifest。只能向前读或跳过，带读缓冲。
pub trait SequentialFile: Send {
    /// 最多读取 `buf.len()` 字节。返回值小于 `buf.len()` 只意味着到达了文件末尾，
    /// 之后文件被追加的数据仍可以继续读到。
    fn read(&mut self, buf: &mut [u8]) -> EnvResult<usize>;

    fn skip(&mut self, n: u64) -> EnvResult<()>;

    fn path(&self) -> &Path;
}

/// [Capability Trait] 随机读取能力
///
/// `read_at` 不改变任何游标 (pread)，所以同一个句柄可以被多个线程同时读取。
pub trait RandomAccessFile: Send + Sync {
    /// 读到 `buf` 填满或遇到 EOF 为止。越过文件末尾的读取不是错误，返回实际读到的字节数。
    fn read_at(&self, buf: &mut [u8], offset: u64) -> EnvResult<usize>;

    /// 请求 OS 异步把 `[offset, offset + n)` 读进页缓存
    fn prefetch(&self, offset: u64, n: u64) -> EnvResult<()>;

    fn hint(&self, pattern: AccessPattern);

    fn path(&self) -> &Path;
}

/// [Capability Trait] 追加写入能力
///
/// 对应场景：WAL、SSTable 的构建。`file_size` 是逻辑大小，即已成功写入的字节数，
/// 和 OS 看到的文件大小可能不同 (预分配)。
pub trait WritableFile: Send {
    fn write(&mut self, data: &[u8]) -> EnvResult<()>;

    fn truncate(&mut self, size: u64) -> EnvResult<()>;

    fn sync(&mut self) -> EnvResult<()>;

    /// 提前把一段脏页刷下去，削平 sync 时的延迟尖刺。不支持的平台上是 no-op。
    fn range_sync(&mut self, offset: u64, n: u64) -> EnvResult<()>;

    /// 在写入 `[offset, offset + n)` 之前调用，按 PREALLOCATION_BLOCK_SIZE 批量预留空间
    fn prepare_write(&mut self, offset: u64, n: u64) -> EnvResult<()>;

    /// 预留磁盘空间的底层原语，不支持的平台上是 no-op
    fn allocate(&mut self, offset: u64, n: u64) -> EnvResult<()>;

    fn file_size(&self) -> u64;

    fn hint(&mut self, hint: WriteLifetimeHint);

    fn path(&self) -> &Path;
}

/// [Capability Trait] 内存映射文件
///
/// 所有指针和切片在下一次 `resize` 或句柄销毁后失效。
pub trait MmapFile: Send {
    fn as_ptr(&self) -> *const u8;

    fn as_mut_ptr(&mut self) -> *mut u8;

    fn as_slice(&self) -> &[u8];

    fn as_mut_slice(&mut self) -> &mut [u8];

    fn file_size(&self) -> u64;

    /// 把文件长度改为 `size`，并让映射覆盖新长度。映射地址可能改变。
    fn resize(&mut self, size: u64) -> EnvResult<()>;

    fn hint(&self, pattern: AccessPattern);

    /// 把映射区域的修改刷到磁盘 (msync)
    fn sync(&self) -> EnvResult<()>;

    fn path(&self) -> &Path;
}

/// [Factory Trait] 文件 I/O 环境
///
/// 上层存储引擎只通过这个接口拿到文件句柄，不直接调用 OS。
/// 目录遍历、删除、建目录等无状态操作不在这里。
pub trait Env: Send + Sync {
    fn open_sequential(&self, path: &Path) -> EnvResult<Box<dyn SequentialFile>>;

    fn open_random_access(&self, path: &Path) -> EnvResult<Box<dyn RandomAccessFile>>;

    fn open_writable(&self, path: &Path, mode: OpenMode) -> EnvResult<Box<dyn WritableFile>>;

    fn open_mmap(&self, path: &Path, mode: OpenMode) -> EnvResult<Box<dyn MmapFile>>;

    fn file_size(&self, path: &Path) -> EnvResult<u64>;
}

// --- Boilerplate: Box<dyn ...> 转发 ---
//
// 让 Box<dyn WritableFile> 等也满足对应的 trait，上层的泛型代码 (W: WritableFile)
// 可以直接接收 Env 返回的句柄。

impl SequentialFile for Box<dyn SequentialFile> {
    fn read(&mut self, buf: &mut [u8]) -> EnvResult<usize> {
        (**self).read(buf)
    }
    fn skip(&mut self, n: u64) -> EnvResult<()> {
        (**self).skip(n)
    }
    fn path(&self) -> &Path {
        (**self).path()
    }
}

impl RandomAccessFile for Box<dyn RandomAccessFile> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> EnvResult<usize> {
        (**self).read_at(buf, offset)
    }
    fn prefetch(&self, offset: u64, n: u64) -> EnvResult<()> {
        (**self).prefetch(offset, n)
    }
    fn hint(&self, pattern: AccessPattern) {
        (**self).hint(pattern)
    }
    fn path(&self) -> &Path {
        (**self).path()
    }
}

impl WritableFile for Box<dyn WritableFile> {
    fn write(&mut self, data: &[u8]) -> EnvResult<()> {
        (**self).write(data)
    }
    fn truncate(&mut self, size: u64) -> EnvResult<()> {
        (**self).truncate(size)
    }
    fn sync(&mut self) -> EnvResult<()> {
        (**self).sync()
    }
    fn range_sync(&mut self, offset: u64, n: u64) -> EnvResult<()> {
        (**self).range_sync(offset, n)
    }
    fn prepare_write(&mut self, offset: u64, n: u64) -> EnvResult<()> {
        (**self).prepare_write(offset, n)
    }
    fn allocate(&mut self, offset: u64, n: u64) -> EnvResult<()> {
        (**self).allocate(offset, n)
    }
    fn file_size(&self) -> u64 {
        (**self).file_size()
    }
    fn hint(&mut self, hint: WriteLifetimeHint) {
        (**self).hint(hint)
    }
    fn path(&self) -> &Path {
        (**self).path()
    }
}
