//! 按类型标签分发条目
//!
//! 消费端为每种 side-info 注册处理函数（画运动矢量、QP 热力图等）。
//! 未注册的标签不是错误：记录一条警告后跳过。

use std::collections::HashMap;

use tracing::warn;

use crate::constants::kind;
use crate::entry::SideEntry;
use crate::packet::SidePacket;

/// 常用标签的名字，未知标签返回 "unknown"
pub fn kind_name(tag: u32) -> &'static str {
    match tag {
        kind::MOTION_VECTORS => "motion-vectors",
        kind::QP_TABLE => "qp-table",
        kind::BLOCK_TYPE => "block-type",
        kind::RESIDUAL_SIZE => "residual-size",
        _ => "unknown",
    }
}

/// 处理函数：(上下文, 条目, codec_id)
pub type Handler<C> = Box<dyn FnMut(&mut C, &SideEntry, i32) + Send>;

/// 一次分发的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub handled: usize,
    pub unknown: usize,
}

/// 标签 → 处理函数
pub struct DispatchTable<C> {
    handlers: HashMap<u32, Handler<C>>,
}

impl<C> Default for DispatchTable<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C> DispatchTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理函数，同一标签重复注册时后者覆盖前者
    pub fn register<F>(&mut self, tag: u32, handler: F) -> &mut Self
    where
        F: FnMut(&mut C, &SideEntry, i32) + Send + 'static,
    {
        self.handlers.insert(tag, Box::new(handler));
        self
    }

    pub fn supports(&self, tag: u32) -> bool {
        self.handlers.contains_key(&tag)
    }

    /// 按顺序分发包内每个条目
    pub fn dispatch(&mut self, ctx: &mut C, packet: &SidePacket) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for entry in &packet.entries {
            match self.handlers.get_mut(&entry.kind) {
                Some(handler) => {
                    handler(ctx, entry, packet.codec_id);
                    summary.handled += 1;
                }
                None => {
                    warn!(
                        "sidebus: unsupported sideinfo type: 0x{:08x} ({})",
                        entry.kind,
                        kind_name(entry.kind)
                    );
                    summary.unknown += 1;
                }
            }
        }

        summary
    }
}
