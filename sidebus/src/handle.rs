//! 生产端/消费端句柄
//!
//! 提供 SideProducer 和 SideConsumer 两种句柄，都只持有总线的共享引用，
//! 可以分别移交给解码线程和渲染线程。

use std::sync::Arc;

use tracing::debug;

use crate::bus::{BusStats, SideBus};
use crate::constants::PTS_INVALID;
use crate::dispatch::{DispatchSummary, DispatchTable};
use crate::entry::free_entries;
use crate::error::Result;
use crate::packet::SidePacket;
use crate::registry::{BusRegistry, RootId};

/// 生产端（解码侧）
#[derive(Debug, Clone)]
pub struct SideProducer {
    bus: Arc<SideBus>,
}

impl SideProducer {
    pub fn new(bus: Arc<SideBus>) -> Self {
        Self { bus }
    }

    pub fn acquire(registry: &BusRegistry, root: RootId) -> Result<Self> {
        Ok(Self::new(registry.acquire(root)?))
    }

    /// 写入一包，总线内部保存的是深拷贝，调用方之后可以随意复用 `packet`
    pub fn push(&self, packet: &SidePacket) -> Result<()> {
        self.bus.push(packet)
    }

    pub fn stats(&self) -> BusStats {
        self.bus.stats()
    }

    pub fn bus(&self) -> &Arc<SideBus> {
        &self.bus
    }
}

/// 叠加配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayConfig {
    /// 是否绘制 side-info
    pub draw_sideinfo: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            draw_sideinfo: true,
        }
    }
}

/// 一帧叠加的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayOutcome {
    /// 配置关闭了绘制
    Disabled,
    /// 帧没有有效时间戳
    Skipped,
    /// 容差内没有对应的包
    Miss,
    Drawn(DispatchSummary),
}

/// 消费端（渲染侧）
pub struct SideConsumer<C> {
    bus: Arc<SideBus>,
    config: OverlayConfig,
    table: DispatchTable<C>,
}

impl<C> SideConsumer<C> {
    pub fn new(bus: Arc<SideBus>, config: OverlayConfig) -> Self {
        Self {
            bus,
            config,
            table: DispatchTable::new(),
        }
    }

    pub fn acquire(registry: &BusRegistry, root: RootId, config: OverlayConfig) -> Result<Self> {
        Ok(Self::new(registry.acquire(root)?, config))
    }

    /// 注册处理函数用
    pub fn table_mut(&mut self) -> &mut DispatchTable<C> {
        &mut self.table
    }

    /// 直接取包，调用方负责释放
    pub fn pop(&self, pts: i64) -> Result<Option<SidePacket>> {
        self.bus.pop(pts)
    }

    /// 为显示时间戳为 `pts` 的帧叠加 side-info
    ///
    /// 取到的包是调用方独占的，分发完即释放。
    pub fn overlay(&mut self, pts: i64, ctx: &mut C) -> Result<OverlayOutcome> {
        if !self.config.draw_sideinfo {
            return Ok(OverlayOutcome::Disabled);
        }
        if pts == PTS_INVALID {
            return Ok(OverlayOutcome::Skipped);
        }

        let Some(packet) = self.bus.pop(pts)? else {
            return Ok(OverlayOutcome::Miss);
        };

        let summary = self.table.dispatch(ctx, &packet);
        debug!(
            "sidebus: overlay pts={} packet={} handled={} unknown={}",
            pts, packet.pts, summary.handled, summary.unknown
        );
        free_entries(packet.into_entries());

        Ok(OverlayOutcome::Drawn(summary))
    }

    pub fn config(&self) -> OverlayConfig {
        self.config
    }

    pub fn stats(&self) -> BusStats {
        self.bus.stats()
    }

    pub fn bus(&self) -> &Arc<SideBus> {
        &self.bus
    }
}
