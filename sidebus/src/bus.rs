//! 以 PTS 索引的 side-info 环形总线
//!
//! 设计要点：
//! 1. 有界 - 固定槽位数，写满后覆盖最旧的未消费包，不对生产端施加背压
//! 2. 近似查找 - 按 |slot.pts - pts| 最小匹配，超出容差视为未命中
//! 3. 深拷贝 - push 时复制调用方的条目，pop 时把槽位内容整体交给调用方
//! 4. 单锁 - push/pop 全程持有同一把互斥锁
//!
//! 游标：
//! ```text
//!   tail: 累计写入次数，写槽位 = tail % capacity
//!   head: 累计成功取出次数
//!
//!   ┌────┬────┬────┬────┐
//!   │ S0 │ S1 │ S2 │ S3 │   只有最近 capacity 次写入 [tail - cap, tail)
//!   └────┴────┴────┴────┘   中仍占用的槽位可以被匹配
//!          ↑
//!      tail % cap (写满时这里就是最旧的包)
//! ```
//!
//! head 只在 pop 命中时前进，与命中哪个槽位无关，消费顺序不是 FIFO。
//! 占用情况按槽位记录，乱序取走的槽位不会再被扫描。

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_CAPACITY, DEFAULT_PTS_TOLERANCE};
use crate::entry::{try_clone_entries, SideEntry};
use crate::error::{BusError, Result};
use crate::packet::SidePacket;

/// 总线配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// 槽位数
    pub capacity: usize,
    /// 最大允许的 PTS 距离 (tick)
    pub tolerance: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            tolerance: DEFAULT_PTS_TOLERANCE,
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(BusError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }
}

/// 统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    pub capacity: usize,
    pub occupied: usize,
    pub head: u64,
    pub tail: u64,
    pub pushed: u64,
    pub evicted: u64,
    pub hits: u64,
    pub misses: u64,
    pub closed: bool,
}

impl fmt::Display for BusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Side-info Bus Statistics:")?;
        writeln!(
            f,
            "  Occupied: {}/{} ({:.1}%)",
            self.occupied,
            self.capacity,
            self.occupied as f64 / self.capacity.max(1) as f64 * 100.0
        )?;
        writeln!(f, "  Cursors: head={} tail={}", self.head, self.tail)?;
        writeln!(f, "  Pushed: {} (evicted {})", self.pushed, self.evicted)?;
        let lookups = self.hits + self.misses;
        writeln!(
            f,
            "  Pop: {} hits, {} misses ({:.1}% hit)",
            self.hits,
            self.misses,
            if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64 * 100.0
            }
        )?;
        if self.closed {
            writeln!(f, "  State: released")?;
        }
        Ok(())
    }
}

/// 锁内状态
struct Ring {
    slots: Vec<Option<SidePacket>>,
    head: u64,
    tail: u64,
    closed: bool,
    pushed: u64,
    evicted: u64,
    hits: u64,
    misses: u64,
}

impl Ring {
    fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// side-info 总线
pub struct SideBus {
    config: BusConfig,
    ring: Mutex<Ring>,
}

impl SideBus {
    /// 按配置创建总线，槽位一次性分配
    pub fn new(config: BusConfig) -> Result<Self> {
        config.validate()?;

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(config.capacity)
            .map_err(|_| BusError::OutOfMemory {
                bytes: config.capacity * std::mem::size_of::<Option<SidePacket>>(),
            })?;
        slots.resize_with(config.capacity, || None);

        Ok(Self {
            config,
            ring: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                closed: false,
                pushed: 0,
                evicted: 0,
                hits: 0,
                misses: 0,
            }),
        })
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::new(BusConfig {
            capacity,
            ..BusConfig::default()
        })
    }

    pub fn config(&self) -> BusConfig {
        self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn tolerance(&self) -> u64 {
        self.config.tolerance
    }

    /// 加锁；持锁线程 panic 后继续使用（槽位只在深拷贝完整后才写入）
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 写入一包
    ///
    /// 写槽位仍被占用时先丢弃其中最旧的包再写入。深拷贝失败时槽位保持为空，
    /// tail 照常前进。
    pub fn push(&self, packet: &SidePacket) -> Result<()> {
        self.push_with(packet, try_clone_entries)
    }

    /// push 的实现，深拷贝函数可替换
    pub(crate) fn push_with<F>(&self, packet: &SidePacket, clone_entries: F) -> Result<()>
    where
        F: FnOnce(&[SideEntry]) -> Result<Vec<SideEntry>>,
    {
        let mut ring = self.lock();
        if ring.closed {
            return Err(BusError::Closed);
        }

        let cap = self.config.capacity as u64;
        let write_idx = (ring.tail % cap) as usize;

        if let Some(oldest) = ring.slots[write_idx].take() {
            ring.evicted += 1;
            warn!(
                "sidebus: buffer full, clear the oldest member (pts={}, head={}, tail={})",
                oldest.pts, ring.head, ring.tail
            );
        }

        debug!(
            "sidebus: push pts={} entries={}",
            packet.pts,
            packet.entries.len()
        );

        let result = match clone_entries(&packet.entries) {
            Ok(entries) => {
                ring.slots[write_idx] = Some(SidePacket {
                    pts: packet.pts,
                    codec_id: packet.codec_id,
                    entries,
                });
                ring.pushed += 1;
                Ok(())
            }
            Err(e) => {
                warn!("sidebus: push pts={} dropped: {}", packet.pts, e);
                Err(e)
            }
        };
        ring.tail += 1;

        result
    }

    /// 按 PTS 取出最接近的一包
    ///
    /// 同距离时偏好不晚于 `pts` 的包。没有包或最近的包超出容差时返回 `Ok(None)`，
    /// 不消费任何槽位。命中时槽位被清空、head 前进一格，包的所有权交给调用方。
    pub fn pop(&self, pts: i64) -> Result<Option<SidePacket>> {
        let mut ring = self.lock();
        if ring.closed {
            return Err(BusError::Closed);
        }

        let cap = self.config.capacity as u64;
        let start = ring.tail.saturating_sub(cap);

        // (槽位, diff)
        let mut best: Option<(usize, i64)> = None;
        for i in start..ring.tail {
            let idx = (i % cap) as usize;
            let Some(slot) = &ring.slots[idx] else {
                continue;
            };

            let diff = slot.pts.saturating_sub(pts);
            let ad = diff.unsigned_abs();

            let better = match best {
                None => true,
                Some((_, best_diff)) => {
                    let best_ad = best_diff.unsigned_abs();
                    ad < best_ad || (ad == best_ad && diff <= 0 && best_diff > 0)
                }
            };
            if better {
                best = Some((idx, diff));
            }
        }

        let Some((best_idx, diff)) = best else {
            ring.misses += 1;
            debug!("sidebus: pop MISS: req={}", pts);
            return Ok(None);
        };

        debug!(
            "sidebus: pop CAND: req={} best={} diff={} |d|={} tol={}",
            pts,
            pts.saturating_add(diff),
            diff,
            diff.unsigned_abs(),
            self.config.tolerance
        );

        if diff.unsigned_abs() > self.config.tolerance {
            ring.misses += 1;
            debug!("sidebus: pop MISS: out-of-tol");
            return Ok(None);
        }

        let Some(packet) = ring.slots[best_idx].take() else {
            ring.misses += 1;
            return Ok(None);
        };
        ring.head += 1;
        ring.hits += 1;

        debug!(
            "sidebus: pop HIT: best={} entries={} occupied={}",
            packet.pts,
            packet.entries.len(),
            ring.occupied()
        );

        Ok(Some(packet))
    }

    /// 当前占用的槽位数
    pub fn len(&self) -> usize {
        self.lock().occupied()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// 释放全部槽位并关闭总线，可重复调用
    ///
    /// 之后 push/pop 都返回 [`BusError::Closed`]。总线对象本身保留。
    pub fn release(&self) {
        let mut ring = self.lock();
        if ring.closed {
            return;
        }

        let freed = ring.slots.iter_mut().filter_map(Option::take).count();
        ring.closed = true;

        info!(
            "sidebus: released, {} pending packets dropped (head={}, tail={})",
            freed, ring.head, ring.tail
        );
    }

    pub fn stats(&self) -> BusStats {
        let ring = self.lock();
        BusStats {
            capacity: self.config.capacity,
            occupied: ring.occupied(),
            head: ring.head,
            tail: ring.tail,
            pushed: ring.pushed,
            evicted: ring.evicted,
            hits: ring.hits,
            misses: ring.misses,
            closed: ring.closed,
        }
    }
}

impl fmt::Debug for SideBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideBus")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
