//! sidebus 命令行工具
//!
//! 用法：
//!   sidebus                                  # 默认参数跑一次管线模拟
//!   sidebus simulate --frames 500 --reorder 4 --drop-every 10
//!   sidebus info                             # 显示默认配置

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sidebus::sim::{self, SimConfig, MAX_MV_BLOCKS};
use sidebus::{BusConfig, CLOCK_FREQ, DEFAULT_CAPACITY, DEFAULT_PTS_TOLERANCE};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "sidebus")]
#[command(about = "Timestamp-indexed side-info bus between decoder and renderer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 详细输出
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 模拟解码线程与渲染线程通过总线交换 side-info
    Simulate {
        /// 总帧数
        #[arg(short, long, default_value_t = 250)]
        frames: u64,

        /// 帧率
        #[arg(long, default_value_t = 25)]
        fps: u32,

        /// 时间压缩倍数（1 = 实时）
        #[arg(short, long, default_value_t = 10)]
        speed: u32,

        /// 解码重排窗口
        #[arg(short, long, default_value_t = 3)]
        reorder: usize,

        /// 渲染落后解码的帧数
        #[arg(short, long, default_value_t = 4)]
        delay: u64,

        /// 渲染请求 pts 抖动（微秒）
        #[arg(short, long, default_value_t = 2_000)]
        jitter: i64,

        /// 每 N 帧丢一帧（0 = 不丢）
        #[arg(long, default_value_t = 0)]
        drop_every: u64,

        /// 每帧运动矢量块数
        #[arg(long, default_value_t = 64)]
        mv_blocks: usize,

        /// 总线槽位数
        #[arg(short, long, default_value_t = DEFAULT_CAPACITY)]
        capacity: usize,

        /// 匹配容差（微秒）
        #[arg(short, long, default_value_t = DEFAULT_PTS_TOLERANCE)]
        tolerance: u64,
    },

    /// 显示默认配置
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Some(Commands::Simulate {
            frames,
            fps,
            speed,
            reorder,
            delay,
            jitter,
            drop_every,
            mv_blocks,
            capacity,
            tolerance,
        }) => {
            if fps == 0 {
                bail!("fps must be greater than 0");
            }
            if mv_blocks > MAX_MV_BLOCKS {
                bail!("mv-blocks must be at most {}", MAX_MV_BLOCKS);
            }
            let config = SimConfig {
                frames,
                fps,
                speed,
                reorder,
                delay_frames: delay,
                jitter,
                drop_every,
                mv_blocks,
                bus: BusConfig {
                    capacity,
                    tolerance,
                },
                ..SimConfig::default()
            };
            run_simulate(&config)
        }
        Some(Commands::Info) => {
            print_info();
            Ok(())
        }
        None => run_simulate(&SimConfig::default()),
    }
}

fn run_simulate(config: &SimConfig) -> Result<()> {
    let report = sim::run(config)?;
    println!("{}", report);

    if report.corrupt > 0 {
        bail!("{} entries failed CRC verification", report.corrupt);
    }
    info!("simulate: ok");
    Ok(())
}

fn print_info() {
    let config = BusConfig::default();
    println!("Side-info Bus Defaults:");
    println!("  Capacity: {} slots", config.capacity);
    println!(
        "  Tolerance: {} ticks ({:.1} ms)",
        config.tolerance,
        config.tolerance as f64 * 1000.0 / CLOCK_FREQ as f64
    );
    println!("  Clock: {} ticks/s", CLOCK_FREQ);
}
