use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use link_audit::models::{Phase, ShardStatus};
use link_audit::{logger, run_worker, Config, Pipeline, WorkerArgs};

#[derive(Debug, Parser)]
#[command(
    name = "link-audit",
    version,
    about = "两轮检查文献链接是否仍可访问：直接请求 + 浏览器复查"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 运行完整的两轮检查
    Run {
        /// 输入 CSV，至少包含 database / url 两列
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// TOML 配置文件
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// worker 进程数
        #[arg(short, long, value_name = "N")]
        workers: Option<usize>,

        /// 每个数据库最多抽取的链接数
        #[arg(long, value_name = "N")]
        sample: Option<usize>,

        /// 抽样随机种子
        #[arg(long, value_name = "N")]
        seed: Option<u64>,

        /// 复用上次运行已完成的分片
        #[arg(long, default_value_t = false)]
        resume: bool,

        #[arg(short, long, default_value_t = false)]
        verbose: bool,
    },

    /// 处理单个分片（由协调器启动）
    #[command(hide = true)]
    Worker {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        #[arg(long, value_enum)]
        phase: Phase,

        #[arg(long)]
        shard: usize,

        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long, value_name = "FILE")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match Cli::parse().command {
        Command::Run {
            input,
            config,
            workers,
            sample,
            seed,
            resume,
            verbose,
        } => {
            let loaded = Config::load(config.as_deref());
            logger::init(verbose || loaded.as_ref().is_ok_and(|c| c.verbose_logging));

            let mut config = match loaded {
                Ok(config) => config,
                Err(e) => {
                    error!("❌ 配置加载失败: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            if let Some(workers) = workers {
                config.worker_count = workers;
            }
            if sample.is_some() {
                config.sample_per_database = sample;
            }
            if seed.is_some() {
                config.sample_seed = seed;
            }
            if let Err(e) = config.validate() {
                error!("❌ 配置无效: {}", e);
                return ExitCode::FAILURE;
            }

            let program = match std::env::current_exe() {
                Ok(program) => program,
                Err(e) => {
                    error!("❌ 无法确定当前可执行文件路径: {}", e);
                    return ExitCode::FAILURE;
                }
            };

            match Pipeline::new(config, program)
                .with_resume(resume)
                .run(&input)
                .await
            {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("❌ 运行失败: {:#}", e);
                    ExitCode::FAILURE
                }
            }
        }

        Command::Worker {
            config,
            phase,
            shard,
            input,
            output,
        } => {
            let loaded = Config::from_file(&config);
            logger::init(loaded.as_ref().is_ok_and(|c| c.verbose_logging));

            let status = match loaded {
                Ok(config) => {
                    let args = WorkerArgs {
                        phase,
                        shard_index: shard,
                        input,
                        output,
                    };
                    match run_worker(&config, &args).await {
                        Ok(status) => status,
                        Err(e) => {
                            error!("❌ 分片 {} 处理失败: {:#}", shard, e);
                            ShardStatus::Crashed
                        }
                    }
                }
                Err(e) => {
                    error!("❌ 分片 {} 无法读取配置: {}", shard, e);
                    ShardStatus::Crashed
                }
            };
            ExitCode::from(status.exit_code() as u8)
        }
    }
}
