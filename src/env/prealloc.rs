use super::traits::PREALLOCATION_BLOCK_SIZE;
use crate::error::{EnvError, EnvResult};
use std::io;
use std::path::Path;

/// 需要向 OS 预留的一段空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reservation {
    pub offset: u64,
    pub len: u64,
    last_block: u64,
}

/// 预分配水位线
///
/// 记录已经预留到第几个块 (块大小 PREALLOCATION_BLOCK_SIZE)。
/// 只有当写入越过水位线时才需要新的 allocate 调用，把预留空间的开销摊到多次小写入上。
#[derive(Debug, Default)]
pub(crate) struct Watermark {
    last_block: u64,
    // 成功推进水位线的次数，也就是 prepare 触发的 allocate 次数
    reservations: u64,
}

impl Watermark {
    /// 计算写入 `[offset, offset + n)` 之前还需要预留的空间，已经覆盖则返回 None
    ///
    /// 预留区间的末尾必须能用 u64 字节数表示，否则返回 InvalidInput。
    pub fn plan(&self, offset: u64, n: u64) -> io::Result<Option<Reservation>> {
        let end = offset.saturating_add(n);
        let new_last_block = end.div_ceil(PREALLOCATION_BLOCK_SIZE);
        if new_last_block <= self.last_block {
            return Ok(None);
        }
        let start = self.last_block * PREALLOCATION_BLOCK_SIZE;
        let len = (new_last_block - self.last_block)
            .checked_mul(PREALLOCATION_BLOCK_SIZE)
            .filter(|len| start.checked_add(*len).is_some())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("preallocation range out of bounds: offset {offset}, len {n}"),
                )
            })?;
        Ok(Some(Reservation {
            offset: start,
            len,
            last_block: new_last_block,
        }))
    }

    /// 写入 `[offset, offset + n)` 之前的完整流程：plan，必要时调用 `allocate`，成功后 commit。
    /// allocate 失败时水位线不动。
    pub fn prepare<F>(&mut self, path: &Path, offset: u64, n: u64, allocate: F) -> EnvResult<()>
    where
        F: FnOnce(u64, u64) -> EnvResult<()>,
    {
        let Some(reservation) = self.plan(offset, n).map_err(|e| EnvError::io(path, e))? else {
            return Ok(());
        };
        allocate(reservation.offset, reservation.len)?;
        self.commit(reservation);
        self.reservations += 1;
        Ok(())
    }

    pub fn reservations(&self) -> u64 {
        self.reservations
    }

    /// allocate 成功之后才推进水位线
    pub fn commit(&mut self, reservation: Reservation) {
        self.last_block = self.last_block.max(reservation.last_block);
    }

    pub fn is_active(&self) -> bool {
        self.last_block > 0
    }

    /// 已预留空间的末尾 (字节)
    pub fn end(&self) -> u64 {
        self.last_block * PREALLOCATION_BLOCK_SIZE
    }
}
