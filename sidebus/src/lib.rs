//! sidebus - 解码端与渲染端之间的 side-info 总线
//!
//! 特性：
//! - 按 PTS 索引：渲染端按当前帧时间戳取最接近的一包
//! - 有界：固定槽位，写满后覆盖最旧的未消费包
//! - 线程安全：单锁保护，多生产者/多消费者
//! - 所有权清晰：写入时深拷贝，取出时整包移交给调用方
//!
//! # 示例
//!
//! ```rust
//! use sidebus::{kind, BusRegistry, RootId, SideEntry, SidePacket};
//!
//! let registry = BusRegistry::new();
//! let bus = registry.acquire(RootId::PROCESS).unwrap();
//!
//! let packet = SidePacket::new(40_000, 27)
//!     .with_entry(SideEntry::new(kind::MOTION_VECTORS, vec![0u8; 64]));
//! bus.push(&packet).unwrap();
//!
//! // 8ms 以内视为同一帧
//! let got = bus.pop(44_000).unwrap().unwrap();
//! assert_eq!(got.pts, 40_000);
//!
//! registry.release(RootId::PROCESS);
//! ```

pub mod bus;
pub mod constants;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod handle;
pub mod packet;
pub mod registry;
pub mod sim;


pub use bus::{BusConfig, BusStats, SideBus};
pub use constants::{kind, CLOCK_FREQ, DEFAULT_CAPACITY, DEFAULT_PTS_TOLERANCE, PTS_INVALID};
pub use dispatch::{kind_name, DispatchSummary, DispatchTable};
pub use entry::{free_entries, try_clone_entries, SideEntry};
pub use error::BusError;
pub use handle::{OverlayConfig, OverlayOutcome, SideConsumer, SideProducer};
pub use packet::SidePacket;
pub use registry::{BusRegistry, RootId};
