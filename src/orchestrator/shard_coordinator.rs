//! 分片协调器 - 编排层
//!
//! ## 职责
//!
//! 把一轮要处理的行切成 N 个连续分片，每个分片起一个 worker 子进程，
//! 全部结束后按分片顺序合并输出文件。
//!
//! ## 文件交接
//!
//! ```text
//! {work_dir}/phase-{轮次}/
//!     shard-{i}.input.csv     协调器写，worker 读
//!     shard-{i}.csv           worker 写，协调器读
//!     shard-{i}.summary.json  worker 在输出落盘后写的完成标记
//! ```
//!
//! worker 之间不共享任何内存，只通过这些文件和退出码交接。

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::error::{AppResult, WorkerError};
use crate::models::loaders::remove_if_exists;
use crate::models::loaders::file_matches_rows;
use crate::models::{read_rows, read_summary, write_rows, Phase, ShardStatus, UrlRecord};
use crate::orchestrator::worker::summary_path_for;
use crate::utils::logging::{log_phase_complete, log_phase_start};

/// 把 `len` 行切成 `worker_count` 个连续区间
///
/// 前 `len % worker_count` 个分片多一行；行数少于分片数时后面的分片为空
pub fn shard_ranges(len: usize, worker_count: usize) -> Vec<Range<usize>> {
    let shards = worker_count.max(1);
    let base = len / shards;
    let extra = len % shards;

    let mut ranges = Vec::with_capacity(shards);
    let mut start = 0;
    for index in 0..shards {
        let size = base + usize::from(index < extra);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// 一个分片的三个交接文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPaths {
    pub input: PathBuf,
    pub output: PathBuf,
    pub summary: PathBuf,
}

impl ShardPaths {
    pub fn new(phase_dir: &Path, index: usize) -> Self {
        let output = phase_dir.join(format!("shard-{}.csv", index));
        Self {
            input: phase_dir.join(format!("shard-{}.input.csv", index)),
            summary: summary_path_for(&output),
            output,
        }
    }
}

/// 单个分片在本轮的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardReport {
    pub index: usize,
    pub rows: usize,
    pub status: ShardStatus,
    /// 续跑时直接复用了上次的输出
    pub reused: bool,
}

/// 一轮的合并结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    /// 按分片顺序拼接的所有输出行
    pub records: Vec<UrlRecord>,
    pub shards: Vec<ShardReport>,
}

impl PhaseReport {
    pub fn count(&self, status: ShardStatus) -> usize {
        self.shards.iter().filter(|s| s.status == status).count()
    }

    pub fn crashed_shards(&self) -> Vec<usize> {
        self.shards
            .iter()
            .filter(|s| s.status == ShardStatus::Crashed)
            .map(|s| s.index)
            .collect()
    }
}

/// 启动 worker 子进程的命令
///
/// 正常运行时 `program` 就是当前可执行文件本身
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    config_path: PathBuf,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            config_path: config_path.into(),
        }
    }

    fn spawn(&self, phase: Phase, index: usize, paths: &ShardPaths) -> std::io::Result<Child> {
        Command::new(&self.program)
            .arg("worker")
            .arg("--config")
            .arg(&self.config_path)
            .arg("--phase")
            .arg(phase.as_arg())
            .arg("--shard")
            .arg(index.to_string())
            .arg("--input")
            .arg(&paths.input)
            .arg("--output")
            .arg(&paths.output)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

/// 分片协调器
pub struct ShardCoordinator {
    command: WorkerCommand,
    work_dir: PathBuf,
    worker_count: usize,
    resume: bool,
}

/// 等待中的分片
enum Pending {
    Running(Child),
    Reused(ShardStatus),
}

impl ShardCoordinator {
    pub fn new(command: WorkerCommand, work_dir: impl Into<PathBuf>, worker_count: usize) -> Self {
        Self {
            command,
            work_dir: work_dir.into(),
            worker_count,
            resume: false,
        }
    }

    /// 续跑：完成标记与当前分片行数一致的分片不再重跑
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn phase_dir(&self, phase: Phase) -> PathBuf {
        self.work_dir.join(format!("phase-{}", phase.round()))
    }

    /// 跑一轮
    ///
    /// `on_crash` 决定崩溃分片的输入行如何进入合并结果
    pub async fn run_phase<T, F>(
        &self,
        phase: Phase,
        rows: &[T],
        on_crash: F,
    ) -> AppResult<PhaseReport>
    where
        T: Serialize + Clone,
        F: Fn(Vec<T>) -> Vec<UrlRecord>,
    {
        let ranges = shard_ranges(rows.len(), self.worker_count);
        let phase_dir = self.phase_dir(phase);
        log_phase_start(phase, rows.len(), ranges.len());

        let mut pending = Vec::with_capacity(ranges.len());
        for (index, range) in ranges.iter().enumerate() {
            let paths = ShardPaths::new(&phase_dir, index);

            if let Some(status) = self.reusable(phase, &paths, &rows[range.clone()]) {
                info!("[第 {} 轮 分片#{}] ♻️ 复用上次的输出", phase.round(), index);
                pending.push(Pending::Reused(status));
                continue;
            }

            remove_if_exists(&paths.output)?;
            remove_if_exists(&paths.summary)?;
            write_rows(&paths.input, &rows[range.clone()])?;

            let child = self
                .command
                .spawn(phase, index, &paths)
                .map_err(|source| WorkerError::SpawnFailed { shard: index, source })?;
            info!(
                "[第 {} 轮 分片#{}] 🚀 worker 已启动 ({} 行)",
                phase.round(),
                index,
                range.len()
            );
            pending.push(Pending::Running(child));
        }

        // 等所有 worker 结束
        let mut finished = Vec::with_capacity(pending.len());
        for (index, shard) in pending.into_iter().enumerate() {
            let (status, reused) = match shard {
                Pending::Reused(status) => (status, true),
                Pending::Running(mut child) => {
                    let exit = child
                        .wait()
                        .await
                        .map_err(|source| WorkerError::WaitFailed { shard: index, source })?;
                    (ShardStatus::from_exit_code(exit.code()), false)
                }
            };
            finished.push((status, reused));
        }

        // 按分片顺序合并
        let mut records = Vec::with_capacity(rows.len());
        let mut shards = Vec::with_capacity(ranges.len());
        for (index, (range, (status, reused))) in ranges.into_iter().zip(finished).enumerate() {
            let paths = ShardPaths::new(&phase_dir, index);
            let expected = range.len();

            let status = match collect_shard(&paths, status, expected) {
                Ok(shard_records) => {
                    if status == ShardStatus::Degraded {
                        warn!("[第 {} 轮 分片#{}] ⚠️ 分片降级完成", phase.round(), index);
                    }
                    records.extend(shard_records);
                    status
                }
                Err(reason) => {
                    error!("[第 {} 轮 分片#{}] ❌ 分片失败: {}", phase.round(), index, reason);
                    records.extend(on_crash(rows[range].to_vec()));
                    ShardStatus::Crashed
                }
            };

            shards.push(ShardReport {
                index,
                rows: expected,
                status,
                reused,
            });
        }

        let report = PhaseReport {
            phase,
            records,
            shards,
        };
        log_phase_complete(
            phase,
            report.count(ShardStatus::Completed),
            report.count(ShardStatus::Degraded),
            report.count(ShardStatus::Crashed),
        );
        Ok(report)
    }

    /// 续跑时判断分片能否直接复用
    ///
    /// 只复用完整完成的分片，而且上次的输入文件必须与本次分片的行完全一致；
    /// 降级分片会重跑，给未复查的行再一次机会
    fn reusable<T: Serialize>(
        &self,
        phase: Phase,
        paths: &ShardPaths,
        shard_rows: &[T],
    ) -> Option<ShardStatus> {
        if !self.resume || !paths.output.exists() {
            return None;
        }
        let summary = match read_summary(&paths.summary) {
            Ok(Some(summary)) => summary,
            Ok(None) => return None,
            Err(e) => {
                warn!("完成标记无法读取，重新处理: {}", e);
                return None;
            }
        };
        if summary.phase != phase
            || summary.input_rows != shard_rows.len()
            || summary.status != ShardStatus::Completed
        {
            return None;
        }
        match file_matches_rows(&paths.input, shard_rows) {
            Ok(true) => Some(summary.status),
            Ok(false) => {
                info!(
                    "[第 {} 轮 分片#{}] 分片内容已变化，重新处理",
                    phase.round(),
                    summary.shard_index
                );
                None
            }
            Err(e) => {
                warn!("分片输入文件无法读取，重新处理: {}", e);
                None
            }
        }
    }
}

/// 读取一个已结束分片的输出；失败原因用于日志
fn collect_shard(
    paths: &ShardPaths,
    status: ShardStatus,
    expected: usize,
) -> Result<Vec<UrlRecord>, String> {
    if status == ShardStatus::Crashed {
        return Err("worker 异常退出".to_string());
    }
    if read_summary(&paths.summary)
        .map_err(|e| e.to_string())?
        .is_none()
    {
        return Err("没有完成标记".to_string());
    }

    let records: Vec<UrlRecord> = read_rows(&paths.output).map_err(|e| e.to_string())?;
    if records.len() != expected {
        return Err(format!("输出 {} 行，应为 {} 行", records.len(), expected));
    }
    Ok(records)
}
