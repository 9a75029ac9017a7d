//! 解码/渲染管线模拟
//!
//! 生产线程按解码顺序（带 B 帧式重排、可选丢帧）写入，
//! 消费线程按显示顺序、延迟若干帧并带时间抖动去取。
//! 每个条目末尾带 CRC32，消费端逐条校验，确认跨线程后数据完整。
//!
//! 条目格式：
//! ```text
//! ┌──────────┬──────────────┬───────┐
//! │ pts:8B   │ body ...     │ CRC:4B│
//! └──────────┴──────────────┴───────┘
//! ```

use std::fmt;
use std::panic;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::bus::{BusConfig, BusStats};
use crate::constants::{kind, CLOCK_FREQ};
use crate::entry::SideEntry;
use crate::error::Result;
use crate::handle::{OverlayConfig, OverlayOutcome, SideConsumer, SideProducer};
use crate::packet::SidePacket;
use crate::registry::{BusRegistry, RootId};

/// 条目头 pts + 尾 CRC
const ENTRY_OVERHEAD: usize = 8 + 4;
/// QP 表头标记 "QTB0"
const QP_TABLE_TAG: u32 = 0x5154_4230;
/// QP 块大小 (像素)
const QP_BLOCK_PX: u8 = 16;
/// 每帧运动矢量块数上限（3840x2160 按 16 像素分块）
pub const MAX_MV_BLOCKS: usize = 240 * 135;
/// 每行块数
const MV_BLOCKS_PER_ROW: usize = 240;

/// 模拟参数
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// 总帧数
    pub frames: u64,
    pub fps: u32,
    /// 时间压缩倍数，1 = 实时
    pub speed: u32,
    /// 解码重排窗口（窗口内倒序写入）
    pub reorder: usize,
    /// 渲染落后解码的帧数
    pub delay_frames: u64,
    /// 渲染请求 pts 的抖动 (tick)，奇偶帧交替正负
    pub jitter: i64,
    /// 每 N 帧丢一帧不写入，0 = 不丢
    pub drop_every: u64,
    /// 每帧运动矢量块数，超过 [`MAX_MV_BLOCKS`] 按上限生成
    pub mv_blocks: usize,
    pub codec_id: i32,
    pub bus: BusConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            frames: 250,
            fps: 25,
            speed: 10,
            reorder: 3,
            delay_frames: 4,
            jitter: 2_000,
            drop_every: 0,
            mv_blocks: 64,
            codec_id: 27,
            bus: BusConfig::default(),
        }
    }
}

/// 模拟结果
#[derive(Debug, Clone, Default)]
pub struct SimReport {
    pub frames: u64,
    /// 生产端写入的包数
    pub pushed: u64,
    /// 生产端故意丢掉的帧
    pub dropped: u64,
    /// 渲染端命中的帧
    pub drawn: u64,
    pub missed: u64,
    /// 校验通过的条目
    pub verified: u64,
    pub corrupt: u64,
    /// 命中包与请求 pts 的最大距离 (tick)
    pub max_drift: u64,
    pub stats: BusStats,
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline Simulation:")?;
        writeln!(
            f,
            "  Frames: {} (pushed {}, dropped by producer {})",
            self.frames, self.pushed, self.dropped
        )?;
        writeln!(f, "  Rendered: {} drawn, {} missed", self.drawn, self.missed)?;
        writeln!(
            f,
            "  Entries: {} verified, {} corrupt",
            self.verified, self.corrupt
        )?;
        writeln!(f, "  Max drift: {} ticks", self.max_drift)?;
        write!(f, "{}", self.stats)
    }
}

/// 第 i 帧的显示时间戳（从 1 帧时长开始，避开无效 pts 0）
pub fn frame_pts(index: u64, fps: u32) -> i64 {
    (index as i64 + 1) * CLOCK_FREQ / fps.max(1) as i64
}

/// 给条目加上 pts 头和 CRC 尾
fn seal(pts: i64, body: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(body.len() + ENTRY_OVERHEAD);
    data.extend_from_slice(&pts.to_le_bytes());
    data.extend_from_slice(body);
    let crc = crc32fast::hash(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    data
}

/// 校验条目，返回其中记录的 pts
pub fn verify_entry(entry: &SideEntry) -> Option<i64> {
    let data = &entry.data;
    if data.len() < ENTRY_OVERHEAD {
        return None;
    }

    let crc_pos = data.len() - 4;
    let stored = u32::from_le_bytes([
        data[crc_pos],
        data[crc_pos + 1],
        data[crc_pos + 2],
        data[crc_pos + 3],
    ]);
    if crc32fast::hash(&data[..crc_pos]) != stored {
        return None;
    }

    Some(i64::from_le_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ]))
}

/// 生成第 i 帧的 side-info：运动矢量 + QP 表
pub fn make_packet(index: u64, config: &SimConfig) -> SidePacket {
    let pts = frame_pts(index, config.fps);

    // 每块 16 字节: src_x, src_y, dst_x, dst_y (i16), motion_x, motion_y (i16), w, h (u8), source (i8), pad
    let blocks = config.mv_blocks.min(MAX_MV_BLOCKS);
    let mut mv = Vec::with_capacity(blocks * 16);
    for b in 0..blocks {
        let x = ((b % MV_BLOCKS_PER_ROW) * 16) as i16;
        let y = ((b / MV_BLOCKS_PER_ROW) * 16) as i16;
        let mx = ((index as usize + b) % 9) as i16 - 4;
        let my = ((index as usize * 3 + b) % 7) as i16 - 3;
        for v in [x + mx, y + my, x, y, mx, my] {
            mv.extend_from_slice(&v.to_le_bytes());
        }
        mv.extend_from_slice(&[16, 16, if b % 2 == 0 { 1 } else { 0xFF }, 0]);
    }

    let mut qp = Vec::with_capacity(5 + blocks);
    qp.extend_from_slice(&QP_TABLE_TAG.to_le_bytes());
    qp.push(QP_BLOCK_PX);
    qp.extend((0..blocks).map(|b| ((index as usize + b) % 52) as u8));

    SidePacket::new(pts, config.codec_id)
        .with_entry(SideEntry::new(kind::MOTION_VECTORS, seal(pts, &mv)))
        .with_entry(SideEntry::new(kind::QP_TABLE, seal(pts, &qp)))
}

/// 解码顺序：窗口内倒序
fn decode_order(frames: u64, reorder: usize) -> Vec<u64> {
    let window = reorder.max(1) as u64;
    let mut order = Vec::with_capacity(frames as usize);
    let mut start = 0;
    while start < frames {
        let end = (start + window).min(frames);
        order.extend((start..end).rev());
        start = end;
    }
    order
}

fn sleep_until(start: Instant, offset: Duration) {
    if let Some(wait) = (start + offset).checked_duration_since(Instant::now()) {
        thread::sleep(wait);
    }
}

/// 渲染端每帧的校验上下文
#[derive(Debug, Default)]
struct FrameCheck {
    requested: i64,
    verified: u64,
    corrupt: u64,
    max_drift: u64,
}

impl FrameCheck {
    fn check(&mut self, entry: &SideEntry) {
        match verify_entry(entry) {
            Some(pts) => {
                self.verified += 1;
                self.max_drift = self.max_drift.max(pts.abs_diff(self.requested));
            }
            None => self.corrupt += 1,
        }
    }
}

/// 运行一次模拟
pub fn run(config: &SimConfig) -> Result<SimReport> {
    let registry = BusRegistry::with_config(config.bus);
    let producer = SideProducer::acquire(&registry, RootId::PROCESS)?;
    let mut consumer: SideConsumer<FrameCheck> =
        SideConsumer::acquire(&registry, RootId::PROCESS, OverlayConfig::default())?;
    consumer
        .table_mut()
        .register(kind::MOTION_VECTORS, |check, entry, _| check.check(entry))
        .register(kind::QP_TABLE, |check, entry, _| check.check(entry));

    let frame_dur = Duration::from_nanos(
        1_000_000_000 / config.fps.max(1) as u64 / config.speed.max(1) as u64,
    );

    info!(
        "sim: {} frames @ {} fps x{}, reorder={}, delay={} frames, jitter={} ticks",
        config.frames, config.fps, config.speed, config.reorder, config.delay_frames, config.jitter
    );

    let start = Instant::now();

    let producer_cfg = config.clone();
    let producer_thread = thread::spawn(move || -> Result<(u64, u64)> {
        let mut pushed = 0;
        let mut dropped = 0;
        for (pos, index) in decode_order(producer_cfg.frames, producer_cfg.reorder)
            .into_iter()
            .enumerate()
        {
            sleep_until(start, frame_dur * pos as u32);

            if producer_cfg.drop_every > 0 && (index + 1) % producer_cfg.drop_every == 0 {
                debug!("sim: producer drops frame {}", index);
                dropped += 1;
                continue;
            }

            producer.push(&make_packet(index, &producer_cfg))?;
            pushed += 1;
        }
        Ok((pushed, dropped))
    });

    let consumer_cfg = config.clone();
    let consumer_thread = thread::spawn(move || -> Result<(SideConsumer<FrameCheck>, SimReport)> {
        let mut report = SimReport::default();
        for index in 0..consumer_cfg.frames {
            sleep_until(
                start,
                frame_dur * (index + consumer_cfg.delay_frames) as u32,
            );

            let offset = if index % 2 == 0 {
                consumer_cfg.jitter
            } else {
                consumer_cfg.jitter.saturating_neg()
            };
            let mut check = FrameCheck {
                requested: frame_pts(index, consumer_cfg.fps).saturating_add(offset),
                ..FrameCheck::default()
            };

            match consumer.overlay(check.requested, &mut check)? {
                OverlayOutcome::Drawn(_) => report.drawn += 1,
                _ => report.missed += 1,
            }
            report.verified += check.verified;
            report.corrupt += check.corrupt;
            report.max_drift = report.max_drift.max(check.max_drift);
        }
        Ok((consumer, report))
    });

    let (pushed, dropped) = match producer_thread.join() {
        Ok(result) => result?,
        Err(e) => panic::resume_unwind(e),
    };
    let (consumer, mut report) = match consumer_thread.join() {
        Ok(result) => result?,
        Err(e) => panic::resume_unwind(e),
    };

    report.frames = config.frames;
    report.pushed = pushed;
    report.dropped = dropped;
    report.stats = consumer.stats();

    registry.release(RootId::PROCESS);
    info!(
        "sim: done in {:.2}s, {} drawn / {} missed",
        start.elapsed().as_secs_f64(),
        report.drawn,
        report.missed
    );

    Ok(report)
}
