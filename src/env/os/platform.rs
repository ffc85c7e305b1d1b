//! 平台能力层
//!
//! 每个能力 (fallocate、mremap、readahead、fadvise ...) 在编译期通过 `cfg_if!` 选定一种实现，
//! 缺少该能力的平台退化为语义等价但更慢的做法，或者 no-op。调用方不需要按平台分支。

use crate::env::traits::{AccessPattern, WriteLifetimeHint};
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::ptr;

fn check(r: libc::c_int) -> io::Result<()> {
    if r == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

// posix_fadvise / posix_madvise 直接返回错误码，不设置 errno
#[allow(dead_code)]
fn check_errno(r: libc::c_int) -> io::Result<()> {
    if r != 0 {
        Err(io::Error::from_raw_os_error(r))
    } else {
        Ok(())
    }
}

/// 文件系统不支持某个操作时返回的错误
pub(crate) fn is_unsupported(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EOPNOTSUPP) | Some(libc::ENOSYS)
    )
}

/// 反复调用 `f`，直到它不再因为 EINTR 失败
pub(crate) fn retry_on_interrupt<T>(mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match f() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

pub(crate) fn set_cloexec(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    check(flags)?;
    check(unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) })
}

/// MAP_SHARED 读写映射整个 `[0, len)`
pub(crate) fn map(file: &File, len: usize) -> io::Result<*mut u8> {
    let base = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };
    if base == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(base as *mut u8)
}

pub(crate) fn unmap(base: *mut u8, len: usize) -> io::Result<()> {
    check(unsafe { libc::munmap(base as *mut libc::c_void, len) })
}

pub(crate) fn msync(base: *mut u8, len: usize) -> io::Result<()> {
    check(unsafe { libc::msync(base as *mut libc::c_void, len, libc::MS_SYNC) })
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        const F_SET_RW_HINT: libc::c_int = 1024 + 12;

        pub(crate) fn fallocate(file: &File, offset: u64, len: u64) -> io::Result<()> {
            // KEEP_SIZE: 只预留块，不改变文件大小，追加写入的位置不受影响
            check(unsafe {
                libc::fallocate(
                    file.as_raw_fd(),
                    libc::FALLOC_FL_KEEP_SIZE,
                    offset as libc::off_t,
                    len as libc::off_t,
                )
            })
        }

        pub(crate) fn punch_hole(file: &File, offset: u64, len: u64) -> io::Result<()> {
            check(unsafe {
                libc::fallocate(
                    file.as_raw_fd(),
                    libc::FALLOC_FL_KEEP_SIZE | libc::FALLOC_FL_PUNCH_HOLE,
                    offset as libc::off_t,
                    len as libc::off_t,
                )
            })
        }

        pub(crate) fn range_sync(file: &File, offset: u64, len: u64) -> io::Result<()> {
            check(unsafe {
                libc::sync_file_range(
                    file.as_raw_fd(),
                    offset as libc::off64_t,
                    len as libc::off64_t,
                    libc::SYNC_FILE_RANGE_WRITE,
                )
            })
        }

        pub(crate) fn set_write_lifetime(file: &File, hint: WriteLifetimeHint) -> io::Result<()> {
            let value = hint as u64;
            check(unsafe { libc::fcntl(file.as_raw_fd(), F_SET_RW_HINT, &value as *const u64) })
        }

        /// 原地扩展/收缩映射，地址可能改变。失败时旧映射保持不变。
        pub(crate) fn remap(
            _file: &File,
            base: *mut u8,
            old_len: usize,
            new_len: usize,
        ) -> io::Result<*mut u8> {
            let new_base = unsafe {
                libc::mremap(
                    base as *mut libc::c_void,
                    old_len,
                    new_len,
                    libc::MREMAP_MAYMOVE,
                )
            };
            if new_base == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            Ok(new_base as *mut u8)
        }
    } else {
        pub(crate) fn fallocate(_file: &File, _offset: u64, _len: u64) -> io::Result<()> {
            Ok(())
        }

        pub(crate) fn punch_hole(_file: &File, _offset: u64, _len: u64) -> io::Result<()> {
            Ok(())
        }

        pub(crate) fn range_sync(_file: &File, _offset: u64, _len: u64) -> io::Result<()> {
            Ok(())
        }

        pub(crate) fn set_write_lifetime(_file: &File, _hint: WriteLifetimeHint) -> io::Result<()> {
            Ok(())
        }

        /// 没有 mremap：先映射一块新的区域，成功后再释放旧区域
        pub(crate) fn remap(
            file: &File,
            base: *mut u8,
            old_len: usize,
            new_len: usize,
        ) -> io::Result<*mut u8> {
            let new_base = map(file, new_len)?;
            if let Err(e) = unmap(base, old_len) {
                tracing::warn!(error = %e, "munmap of previous region failed during remap");
            }
            Ok(new_base)
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub(crate) fn readahead(file: &File, offset: u64, len: u64) -> io::Result<()> {
            let r = unsafe {
                libc::readahead(file.as_raw_fd(), offset as libc::off64_t, len as libc::size_t)
            };
            if r == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    } else if #[cfg(target_vendor = "apple")] {
        pub(crate) fn readahead(file: &File, offset: u64, len: u64) -> io::Result<()> {
            let advice = libc::radvisory {
                ra_offset: offset as libc::off_t,
                ra_count: len.min(libc::c_int::MAX as u64) as libc::c_int,
            };
            check(unsafe { libc::fcntl(file.as_raw_fd(), libc::F_RDADVISE, &advice as *const libc::radvisory) })
        }
    } else {
        pub(crate) fn readahead(_file: &File, _offset: u64, _len: u64) -> io::Result<()> {
            Ok(())
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
        pub(crate) fn fadvise(file: &File, pattern: AccessPattern) -> io::Result<()> {
            let advice = match pattern {
                AccessPattern::Normal => libc::POSIX_FADV_NORMAL,
                AccessPattern::Sequential => libc::POSIX_FADV_SEQUENTIAL,
                AccessPattern::Random => libc::POSIX_FADV_RANDOM,
                AccessPattern::NoReuse => libc::POSIX_FADV_NOREUSE,
                AccessPattern::WillNeed => libc::POSIX_FADV_WILLNEED,
                AccessPattern::DontNeed => libc::POSIX_FADV_DONTNEED,
            };
            check_errno(unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, advice) })
        }
    } else {
        pub(crate) fn fadvise(_file: &File, _pattern: AccessPattern) -> io::Result<()> {
            Ok(())
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_vendor = "apple"))] {
        pub(crate) fn madvise(base: *mut u8, len: usize, pattern: AccessPattern) -> io::Result<()> {
            let advice = match pattern {
                // posix_madvise 没有 NOREUSE
                AccessPattern::Normal | AccessPattern::NoReuse => libc::POSIX_MADV_NORMAL,
                AccessPattern::Sequential => libc::POSIX_MADV_SEQUENTIAL,
                AccessPattern::Random => libc::POSIX_MADV_RANDOM,
                AccessPattern::WillNeed => libc::POSIX_MADV_WILLNEED,
                AccessPattern::DontNeed => libc::POSIX_MADV_DONTNEED,
            };
            check_errno(unsafe { libc::posix_madvise(base as *mut libc::c_void, len, advice) })
        }
    } else {
        pub(crate) fn madvise(_base: *mut u8, _len: usize, _pattern: AccessPattern) -> io::Result<()> {
            Ok(())
        }
    }
}
