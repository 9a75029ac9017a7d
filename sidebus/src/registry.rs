//! 总线注册表
//!
//! 每个 root 句柄对应唯一一条总线：第一次 acquire 时创建，之后返回同一实例。
//! release 只释放总线内的数据，不解除 root 与总线的关联，
//! 总线对象随注册表存活（全局注册表即进程生命周期）。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::info;

use crate::bus::{BusConfig, SideBus};
use crate::error::Result;

/// root 句柄标识（播放器实例、管线实例等）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RootId(pub u64);

impl RootId {
    /// 进程默认 root
    pub const PROCESS: RootId = RootId(0);
}

impl From<u64> for RootId {
    fn from(v: u64) -> Self {
        RootId(v)
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root#{}", self.0)
    }
}

/// root → 总线 映射
pub struct BusRegistry {
    config: BusConfig,
    buses: Mutex<HashMap<RootId, Arc<SideBus>>>,
}

impl Default for BusRegistry {
    fn default() -> Self {
        Self::with_config(BusConfig::default())
    }
}

impl BusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后创建的每条总线都使用该配置
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            config,
            buses: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RootId, Arc<SideBus>>> {
        self.buses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 取得 root 对应的总线，不存在则创建
    ///
    /// 创建失败（内存不足/配置无效）返回错误，调用方应视为功能不可用。
    pub fn acquire(&self, root: RootId) -> Result<Arc<SideBus>> {
        let mut buses = self.lock();
        if let Some(bus) = buses.get(&root) {
            return Ok(Arc::clone(bus));
        }

        let bus = Arc::new(SideBus::new(self.config)?);
        buses.insert(root, Arc::clone(&bus));
        info!(
            "sidebus: created bus for {} (capacity={}, tolerance={})",
            root, self.config.capacity, self.config.tolerance
        );
        Ok(bus)
    }

    /// 只查询，不创建
    pub fn get(&self, root: RootId) -> Option<Arc<SideBus>> {
        self.lock().get(&root).cloned()
    }

    /// 释放 root 对应总线中的数据；未知 root 或重复调用均无副作用
    pub fn release(&self, root: RootId) {
        // 不持有注册表锁去等待总线锁
        let bus = self.get(root);
        if let Some(bus) = bus {
            bus.release();
        }
    }

    /// 释放全部总线
    pub fn release_all(&self) {
        let buses: Vec<Arc<SideBus>> = self.lock().values().cloned().collect();
        for bus in buses {
            bus.release();
        }
    }

    /// 已创建的总线数
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static GLOBAL: OnceLock<BusRegistry> = OnceLock::new();

/// 进程级注册表，使用默认配置
pub fn global() -> &'static BusRegistry {
    GLOBAL.get_or_init(BusRegistry::default)
}

/// 在进程级注册表上 acquire
pub fn acquire(root: RootId) -> Result<Arc<SideBus>> {
    global().acquire(root)
}

/// 在进程级注册表上 release，进程退出前调用一次
pub fn release(root: RootId) {
    global().release(root)
}
