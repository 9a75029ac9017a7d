//! 错误类型

use thiserror::Error;

/// 总线错误
///
/// 未命中 (miss) 不属于错误，`pop` 用 `Ok(None)` 表示。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("out of memory: failed to allocate {bytes} bytes")]
    OutOfMemory { bytes: usize },
    #[error("bus closed")]
    Closed,
    #[error("invalid capacity: {0}")]
    InvalidCapacity(usize),
    #[error("entry too large: {size} bytes (max {max})", max = u32::MAX)]
    EntryTooLarge { size: usize },
}

pub type Result<T> = std::result::Result<T, BusError>;
