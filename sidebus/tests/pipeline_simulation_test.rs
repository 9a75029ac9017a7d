//! 解码/渲染管线并发测试
//!
//! 测试流程：
//! 1. 多个生产线程并发写入互不重叠的 PTS
//! 2. 多个消费线程并发按同一组 PTS 取包，检查每包恰好被取走一次
//! 3. 跑一次完整的管线模拟，检查 CRC 与计数

use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use sidebus::sim::{self, SimConfig};
use sidebus::{
    kind, BusConfig, BusRegistry, OverlayConfig, OverlayOutcome, RootId, SideBus, SideConsumer,
    SideEntry, SidePacket, SideProducer,
};

const PRODUCERS: usize = 4;
const CONSUMERS: usize = 4;
const PER_PRODUCER: i64 = 200;

fn pts_of(producer: usize, i: i64) -> i64 {
    // 间隔 1ms，容差 0 下互不干扰
    (producer as i64 * PER_PRODUCER + i + 1) * 1_000
}

fn packet(pts: i64) -> SidePacket {
    SidePacket::new(pts, 27)
        .with_entry(SideEntry::new(kind::MOTION_VECTORS, pts.to_le_bytes().to_vec()))
        .with_entry(SideEntry::new(kind::QP_TABLE, vec![(pts % 52) as u8; 16]))
}

#[test]
fn test_concurrent_push_then_pop_exactly_once() {
    let total = PRODUCERS * PER_PRODUCER as usize;
    let bus = Arc::new(
        SideBus::new(BusConfig {
            capacity: total,
            tolerance: 0,
        })
        .unwrap(),
    );

    let barrier = Arc::new(Barrier::new(PRODUCERS));
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let producer = SideProducer::new(Arc::clone(&bus));
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_PRODUCER {
                    producer.push(&packet(pts_of(p, i))).unwrap();
                }
            })
        })
        .collect();
    for handle in producers {
        handle.join().unwrap();
    }

    let stats = bus.stats();
    assert_eq!(stats.occupied, total);
    assert_eq!(stats.tail, total as u64);
    assert_eq!(stats.evicted, 0);

    // 所有消费者都尝试取全部 PTS
    let taken = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(CONSUMERS));
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let bus = Arc::clone(&bus);
            let taken = Arc::clone(&taken);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut local = Vec::new();
                for p in 0..PRODUCERS {
                    for i in 0..PER_PRODUCER {
                        let pts = pts_of(p, i);
                        if let Some(got) = bus.pop(pts).unwrap() {
                            assert_eq!(got.pts, pts);
                            assert_eq!(got.entries[0].data, pts.to_le_bytes().to_vec());
                            local.push(got.pts);
                        }
                    }
                }
                taken.lock().unwrap().extend(local);
            })
        })
        .collect();
    for handle in consumers {
        handle.join().unwrap();
    }

    let taken = taken.lock().unwrap();
    assert_eq!(taken.len(), total, "每包恰好被取走一次");
    let unique: HashSet<i64> = taken.iter().copied().collect();
    assert_eq!(unique.len(), total);

    let stats = bus.stats();
    assert_eq!(stats.occupied, 0);
    assert_eq!(stats.head, total as u64);
    assert_eq!(stats.hits, total as u64);
    assert_eq!(stats.misses, (total * (CONSUMERS - 1)) as u64);
}

#[test]
fn test_concurrent_overflow_keeps_capacity() {
    let capacity = 32;
    let bus = Arc::new(SideBus::with_capacity(capacity).unwrap());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let producer = SideProducer::new(Arc::clone(&bus));
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    producer.push(&packet(pts_of(p, i))).unwrap();
                }
            })
        })
        .collect();

    // 生产同时不停地取
    let reader = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || {
            let mut hits = 0u64;
            for round in 0..(PRODUCERS as i64 * PER_PRODUCER) {
                if bus.pop(pts_of(0, round % PER_PRODUCER)).unwrap().is_some() {
                    hits += 1;
                }
                assert!(bus.len() <= capacity);
            }
            hits
        })
    };

    for handle in producers {
        handle.join().unwrap();
    }
    let hits = reader.join().unwrap();

    let stats = bus.stats();
    let total = (PRODUCERS as i64 * PER_PRODUCER) as u64;
    assert!(stats.occupied <= capacity);
    assert_eq!(stats.tail, total);
    assert_eq!(stats.pushed, total);
    assert_eq!(stats.hits, hits);
    assert_eq!(stats.head, hits);
    // 每包要么还在、要么被淘汰、要么被取走
    assert_eq!(stats.occupied as u64 + stats.evicted + stats.hits, total);
}

#[test]
fn test_registry_handles_across_threads() {
    let registry = Arc::new(BusRegistry::new());
    let root = RootId(42);

    let producer_registry = Arc::clone(&registry);
    let producer = thread::spawn(move || {
        let producer = SideProducer::acquire(&producer_registry, root).unwrap();
        for i in 0..10 {
            producer.push(&packet(pts_of(0, i) * 40)).unwrap();
        }
    });
    producer.join().unwrap();

    let mut consumer: SideConsumer<usize> =
        SideConsumer::acquire(&registry, root, OverlayConfig::default()).unwrap();
    consumer
        .table_mut()
        .register(kind::MOTION_VECTORS, |n, _, _| *n += 1);

    let mut drawn = 0;
    for i in 0..10 {
        // 偏 3ms，仍在默认 8ms 容差内
        let outcome = consumer.overlay(pts_of(0, i) * 40 + 3_000, &mut drawn).unwrap();
        assert!(matches!(outcome, OverlayOutcome::Drawn(s) if s.handled == 1 && s.unknown == 1));
    }
    assert_eq!(drawn, 10);

    registry.release(root);
    assert!(consumer.bus().is_closed());
    assert!(consumer.overlay(40_000, &mut drawn).is_err());
}

#[test]
fn test_pipeline_simulation() {
    let config = SimConfig {
        frames: 100,
        speed: 50,
        reorder: 4,
        drop_every: 10,
        mv_blocks: 16,
        ..SimConfig::default()
    };

    let report = sim::run(&config).unwrap();
    println!("{}", report);

    assert_eq!(report.frames, 100);
    assert_eq!(report.dropped, 10);
    assert_eq!(report.pushed, 90);
    assert_eq!(report.drawn + report.missed, report.frames);
    assert!(report.drawn <= report.pushed);
    assert_eq!(report.corrupt, 0);
    // 每包两个条目
    assert_eq!(report.verified, report.drawn * 2);
    assert!(report.max_drift <= config.bus.tolerance);

    assert_eq!(report.stats.pushed, report.pushed);
    assert_eq!(report.stats.hits, report.drawn);
    assert_eq!(report.stats.misses, report.missed);
}
