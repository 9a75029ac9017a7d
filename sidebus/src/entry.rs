//! side-info 条目
//!
//! 单个带类型标签的二进制块，以及条目序列的深拷贝/释放工具。
//! 生产端写入时条目被完整复制，调用返回后双方持有的内存互不相交。

use std::fmt;
use std::mem::size_of;

use crate::error::{BusError, Result};

/// 单条 side-info
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SideEntry {
    /// 类型标签，见 [`crate::constants::kind`]
    pub kind: u32,
    /// 保留：压缩/色彩空间/版本等
    pub flags: u32,
    /// 数据，长度即 size
    pub data: Vec<u8>,
}

impl SideEntry {
    pub fn new(kind: u32, data: Vec<u8>) -> Self {
        Self {
            kind,
            flags: 0,
            data,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// 数据字节数
    ///
    /// 单条上限 `u32::MAX`，超出的条目在写入总线时被拒绝；
    /// 未经总线的超大条目这里饱和为 `u32::MAX`。
    pub fn size(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 深拷贝，内存不足时返回错误而不是中止进程
    pub fn try_clone(&self) -> Result<Self> {
        check_size(self.data.len())?;

        let mut data = Vec::new();
        data.try_reserve_exact(self.data.len())
            .map_err(|_| BusError::OutOfMemory {
                bytes: self.data.len(),
            })?;
        data.extend_from_slice(&self.data);

        Ok(Self {
            kind: self.kind,
            flags: self.flags,
            data,
        })
    }
}

impl fmt::Display for SideEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kind=0x{:08x} flags=0x{:08x} size={}",
            self.kind,
            self.flags,
            self.size()
        )
    }
}

/// 条目长度必须能用 u32 表示
fn check_size(len: usize) -> Result<()> {
    if u32::try_from(len).is_err() {
        return Err(BusError::EntryTooLarge { size: len });
    }
    Ok(())
}

/// 深拷贝条目序列
///
/// 要么完整构建，要么失败：中途分配失败时已构建的部分随 Vec 一起释放。
/// 空输入得到空结果。
pub fn try_clone_entries(src: &[SideEntry]) -> Result<Vec<SideEntry>> {
    clone_entries_with(src, SideEntry::try_clone)
}

fn clone_entries_with<F>(src: &[SideEntry], mut clone_one: F) -> Result<Vec<SideEntry>>
where
    F: FnMut(&SideEntry) -> Result<SideEntry>,
{
    let mut out = Vec::new();
    out.try_reserve_exact(src.len())
        .map_err(|_| BusError::OutOfMemory {
            bytes: src.len() * size_of::<SideEntry>(),
        })?;

    for entry in src {
        out.push(clone_one(entry)?);
    }

    Ok(out)
}

/// 释放消费端取得的条目序列
pub fn free_entries(entries: Vec<SideEntry>) {
    drop(entries);
}

/// 序列中全部数据的字节数
pub fn payload_bytes(entries: &[SideEntry]) -> usize {
    entries.iter().map(|e| e.data.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_independent() {
        let src = vec![
            SideEntry::new(8, vec![1, 2, 3, 4]),
            SideEntry::new(9, vec![]).with_flags(0x10),
        ];

        let mut copy = try_clone_entries(&src).unwrap();
        assert_eq!(copy, src);
        assert_ne!(copy[0].data.as_ptr(), src[0].data.as_ptr());

        copy[0].data[0] = 0xFF;
        assert_eq!(src[0].data[0], 1);
    }

    #[test]
    fn test_clone_empty() {
        let copy = try_clone_entries(&[]).unwrap();
        assert!(copy.is_empty());
        free_entries(copy);
    }

    #[test]
    fn test_zero_size_entry() {
        let e = SideEntry::new(3, Vec::new());
        assert_eq!(e.size(), 0);
        assert!(e.is_empty());
        let c = e.try_clone().unwrap();
        assert_eq!(c.size(), 0);
    }

    /// 中途失败：整体返回错误，后面的条目不再复制
    #[test]
    fn test_clone_fails_midway() {
        let src = vec![
            SideEntry::new(1, vec![1; 8]),
            SideEntry::new(2, vec![2; 8]),
            SideEntry::new(3, vec![3; 8]),
        ];

        let mut calls = 0;
        let result = clone_entries_with(&src, |e| {
            calls += 1;
            if e.kind == 2 {
                return Err(BusError::OutOfMemory { bytes: e.data.len() });
            }
            e.try_clone()
        });

        assert_eq!(result, Err(BusError::OutOfMemory { bytes: 8 }));
        assert_eq!(calls, 2);
        assert_eq!(src[0].data, vec![1; 8]);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_size_limit() {
        assert!(check_size(u32::MAX as usize).is_ok());
        assert_eq!(
            check_size(u32::MAX as usize + 1),
            Err(BusError::EntryTooLarge {
                size: u32::MAX as usize + 1
            })
        );
    }

    #[test]
    fn test_payload_bytes() {
        let v = vec![SideEntry::new(1, vec![0; 10]), SideEntry::new(2, vec![0; 5])];
        assert_eq!(payload_bytes(&v), 15);
    }
}
