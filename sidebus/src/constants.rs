//! 常量定义
//!
//! side-info 总线的容量、时钟与匹配容差

/// 时钟频率：每秒 tick 数（1 tick = 1 微秒）
pub const CLOCK_FREQ: i64 = 1_000_000;

/// 默认环形缓冲槽位数
pub const DEFAULT_CAPACITY: usize = 256;

/// 默认 PTS 匹配容差 (8ms)
pub const DEFAULT_PTS_TOLERANCE: u64 = (8 * CLOCK_FREQ / 1000) as u64;

/// 无效时间戳，消费端遇到时直接跳过
pub const PTS_INVALID: i64 = 0;

/// 常用 side-info 类型标签
///
/// 标签空间由生产端定义，总线本身不解释其含义。
pub mod kind {
    /// 运动矢量 (与 AV_FRAME_DATA_MOTION_VECTORS 对齐)
    pub const MOTION_VECTORS: u32 = 8;
    /// 量化参数表: [tag:4B][blk_px:1B][qp:i8 ...]
    pub const QP_TABLE: u32 = 0x5153_0001;
    /// 宏块/编码块类型
    pub const BLOCK_TYPE: u32 = 0x5153_0002;
    /// 残差大小图
    pub const RESIDUAL_SIZE: u32 = 0x5153_0003;
}
