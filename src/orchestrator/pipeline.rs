//! 流水线驱动 - 编排层
//!
//! ## 流程
//!
//! 1. 读取输入文件，按数据库抽样得到工作集（落盘为 `working_set.csv`）
//! 2. 第一轮：全部链接直接请求 → `checked_round_1.csv`
//! 3. 第二轮：只复查可疑状态码的行 → `checked_round_2.csv`
//!
//! 两轮都交给 `ShardCoordinator` 按分片并行。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{read_rows, write_rows, Escalation, Phase, StatusVerdict, UrlEntry, UrlRecord};
use crate::orchestrator::shard_coordinator::{PhaseReport, ShardCoordinator, WorkerCommand};
use crate::services::AmbiguousStatusSet;
use crate::utils::logging::{log_startup, log_working_set, print_final_stats, FinalStats};
use crate::workflow::mark_unresolved;

pub const WORKING_SET_FILE: &str = "working_set.csv";
pub const CONFIG_FILE: &str = "config.toml";
pub const ROUND_1_FILE: &str = "checked_round_1.csv";
pub const ROUND_2_FILE: &str = "checked_round_2.csv";

/// 一次完整运行的结果
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub round_1: PathBuf,
    pub round_2: PathBuf,
    pub phase_1: PhaseReport,
    pub phase_2: PhaseReport,
    pub stats: FinalStats,
}

/// 流水线驱动
pub struct Pipeline {
    config: Config,
    worker_program: PathBuf,
    resume: bool,
}

impl Pipeline {
    /// `worker_program` 是 worker 子进程要执行的程序，一般就是当前可执行文件
    pub fn new(config: Config, worker_program: impl Into<PathBuf>) -> Self {
        Self {
            config,
            worker_program: worker_program.into(),
            resume: false,
        }
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub async fn run(&self, input: &Path) -> Result<PipelineReport> {
        log_startup(&self.config, input);

        let work_dir = &self.config.work_dir;
        let config_path = work_dir.join(CONFIG_FILE);
        self.config
            .write_to(&config_path)
            .context("无法写出 worker 配置")?;

        let entries = self.load_working_set(input)?;

        let coordinator = ShardCoordinator::new(
            WorkerCommand::new(&self.worker_program, &config_path),
            work_dir,
            self.config.worker_count,
        )
        .with_resume(self.resume);

        // ========== 第一轮 ==========
        let phase_1 = coordinator
            .run_phase(Phase::Lightweight, &entries, |_| Vec::new())
            .await?;
        let crashed = phase_1.crashed_shards();
        if !crashed.is_empty() {
            warn!(
                "⚠️ 第一轮分片 {:?} 崩溃，这些分片的链接不会出现在结果中，可用 --resume 重跑",
                crashed
            );
        }
        let round_1 = self.config.output_dir.join(ROUND_1_FILE);
        write_rows(&round_1, &phase_1.records)?;
        info!("💾 第一轮结果已保存: {}", round_1.display());

        // ========== 第二轮 ==========
        let ambiguous = AmbiguousStatusSet::new(self.config.ambiguous_status_set.clone());
        let phase_2 = coordinator
            .run_phase(Phase::Escalation, &phase_1.records, |rows| {
                mark_unresolved(rows, &ambiguous)
            })
            .await?;
        let round_2 = self.config.output_dir.join(ROUND_2_FILE);
        write_rows(&round_2, &phase_2.records)?;

        let stats = final_stats(&phase_2.records);
        print_final_stats(&stats, &round_2);

        Ok(PipelineReport {
            round_1,
            round_2,
            phase_1,
            phase_2,
            stats,
        })
    }

    /// 读取输入并抽样；续跑时直接复用上次的工作集
    fn load_working_set(&self, input: &Path) -> Result<Vec<UrlEntry>> {
        let path = self.config.work_dir.join(WORKING_SET_FILE);
        if self.resume && path.exists() {
            let entries: Vec<UrlEntry> = read_rows(&path)?;
            info!("♻️ 复用已有工作集: {} ({} 条)", path.display(), entries.len());
            return Ok(entries);
        }

        info!("\n📁 正在读取输入文件...");
        let entries: Vec<UrlEntry> = read_rows(input)
            .with_context(|| format!("无法读取输入文件 {}", input.display()))?;
        let total = entries.len();
        let entries: Vec<UrlEntry> = entries
            .into_iter()
            .filter(|e| !e.url.trim().is_empty())
            .collect();
        if entries.len() < total {
            warn!("⚠️ 跳过 {} 条空链接", total - entries.len());
        }

        let entries = match self.config.sample_per_database {
            Some(limit) => sample_per_database(entries, limit, self.config.sample_seed),
            None => entries,
        };

        let databases = entries
            .iter()
            .map(|e| e.database.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();
        log_working_set(entries.len(), databases);

        write_rows(&path, &entries)?;
        Ok(entries)
    }
}

/// 每个数据库随机抽取至多 `limit` 条
///
/// 数据库按首次出现的顺序排列，库内保持输入顺序；给定种子时结果可复现
pub fn sample_per_database(entries: Vec<UrlEntry>, limit: usize, seed: Option<u64>) -> Vec<UrlEntry> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        let group = groups.entry(entry.database.as_str()).or_insert_with(|| {
            order.push(entry.database.as_str());
            Vec::new()
        });
        group.push(idx);
    }

    let mut keep = vec![false; entries.len()];
    let mut selected = Vec::new();
    for database in order {
        let members = &groups[database];
        let mut picked: Vec<usize> = if members.len() <= limit {
            members.clone()
        } else {
            rand::seq::index::sample(&mut rng, members.len(), limit)
                .into_iter()
                .map(|i| members[i])
                .collect()
        };
        picked.sort_unstable();
        for idx in &picked {
            keep[*idx] = true;
        }
        selected.extend(picked);
    }

    let mut slots: Vec<Option<UrlEntry>> = entries
        .into_iter()
        .zip(keep)
        .map(|(entry, kept)| kept.then_some(entry))
        .collect();
    selected
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect()
}

/// 按最终判定统计
pub fn final_stats(records: &[UrlRecord]) -> FinalStats {
    let mut stats = FinalStats {
        total: records.len(),
        ..Default::default()
    };
    for record in records {
        match record.status {
            StatusVerdict::Ok => stats.ok += 1,
            StatusVerdict::NotFound => stats.not_found += 1,
            StatusVerdict::HttpError(_) => stats.http_error += 1,
            StatusVerdict::Unreachable => stats.unreachable += 1,
        }
        match record.escalation {
            Some(Escalation::Rendered) => stats.escalated += 1,
            Some(Escalation::Unresolved) => stats.unresolved += 1,
            None => {}
        }
    }
    stats
}
