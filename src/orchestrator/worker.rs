//! 分片 worker - 编排层
//!
//! 每个 worker 是一个独立的子进程，只处理一个阶段的一个分片：
//!
//! 1. 读取分片输入文件
//! 2. 跑对应阶段的分片流程
//! 3. 写输出文件，再写完成标记
//!
//! 返回的 `ShardStatus` 由 main 转成进程退出码交给协调器。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, info_span, Instrument};

use crate::browser::{ChromeLauncher, SessionManager};
use crate::config::Config;
use crate::models::loaders::remove_if_exists;
use crate::models::{
    read_rows, write_rows, write_summary, Phase, ShardStatus, ShardSummary, UrlEntry, UrlRecord,
};
use crate::services::{AmbiguousStatusSet, EscalationProber, HttpProber, StatusClassifier};
use crate::workflow::{run_escalation, run_lightweight, ShardCtx, ShardOutput};

/// worker 子进程的命令行参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerArgs {
    pub phase: Phase,
    pub shard_index: usize,
    pub input: PathBuf,
    pub output: PathBuf,
}

/// 输出文件对应的完成标记路径：`shard-3.csv` → `shard-3.summary.json`
pub fn summary_path_for(output: &Path) -> PathBuf {
    output.with_extension("summary.json")
}

/// 处理一个分片
pub async fn run_worker(config: &Config, args: &WorkerArgs) -> Result<ShardStatus> {
    let span = info_span!("worker", phase = args.phase.as_arg(), shard = args.shard_index);
    run_shard(config, args).instrument(span).await
}

async fn run_shard(config: &Config, args: &WorkerArgs) -> Result<ShardStatus> {
    let ctx = ShardCtx::new(args.phase, args.shard_index);
    let summary_path = summary_path_for(&args.output);

    // 先清掉旧标记，崩溃时协调器不会误用上次的结果
    remove_if_exists(&summary_path)?;

    let (input_rows, output) = match args.phase {
        Phase::Lightweight => {
            let entries: Vec<UrlEntry> = read_rows(&args.input)?;
            let prober = HttpProber::from_config(config).context("创建 HTTP 客户端失败")?;
            (entries.len(), run_lightweight(&prober, entries, &ctx).await)
        }
        Phase::Escalation => {
            let records: Vec<UrlRecord> = read_rows(&args.input)?;
            (records.len(), escalate(config, records, &ctx).await)
        }
    };

    write_rows(&args.output, &output.records)?;
    write_summary(
        &summary_path,
        &ShardSummary {
            phase: args.phase,
            shard_index: args.shard_index,
            input_rows,
            output_rows: output.records.len(),
            escalated: output.escalated,
            unresolved: output.unresolved,
            status: output.status,
            finished_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        },
    )?;

    info!(
        "{} ✓ 分片完成: {} 行, 复查 {}, 未复查 {}",
        ctx,
        output.records.len(),
        output.escalated,
        output.unresolved
    );
    Ok(output.status)
}

async fn escalate(config: &Config, records: Vec<UrlRecord>, ctx: &ShardCtx) -> ShardOutput {
    let ambiguous = AmbiguousStatusSet::new(config.ambiguous_status_set.clone());
    let prober = EscalationProber::new(
        StatusClassifier::new(config.removal_markers.clone()),
        config.render_settle(),
    );
    let mut sessions = SessionManager::new(ChromeLauncher::from_config(config));

    let output = run_escalation(&mut sessions, &prober, &ambiguous, records, ctx).await;

    if let Some(session) = sessions.into_session() {
        session.shutdown().await;
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{read_summary, Escalation, StatusVerdict};

    #[test]
    fn test_summary_path_sits_next_to_output() {
        assert_eq!(
            summary_path_for(Path::new("work/phase-1/shard-3.csv")),
            PathBuf::from("work/phase-1/shard-3.summary.json")
        );
    }

    #[tokio::test]
    async fn test_escalation_worker_without_ambiguous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shard-0.input.csv");
        let output = dir.path().join("shard-0.csv");
        let records = vec![
            UrlRecord {
                database: "CNKI".to_string(),
                url: "http://x/1".to_string(),
                status: StatusVerdict::HttpError(404),
                shard_index: 1,
                escalation: None,
            },
            UrlRecord {
                database: "CNKI".to_string(),
                url: "http://x/2".to_string(),
                status: StatusVerdict::Ok,
                shard_index: 1,
                escalation: Some(Escalation::Rendered),
            },
        ];
        write_rows(&input, &records).unwrap();

        // 没有可疑行时不会启动浏览器，配置里给一个不存在的浏览器也没关系
        let config = Config {
            browser_executable: Some(dir.path().join("no-such-chrome")),
            ..Config::default()
        };
        let args = WorkerArgs {
            phase: Phase::Escalation,
            shard_index: 0,
            input,
            output: output.clone(),
        };

        let status = run_worker(&config, &args).await.unwrap();
        assert_eq!(status, ShardStatus::Completed);

        let back: Vec<UrlRecord> = read_rows(&output).unwrap();
        assert_eq!(back, records);
        let summary = read_summary(&summary_path_for(&output)).unwrap().unwrap();
        assert_eq!(summary.input_rows, 2);
        assert_eq!(summary.output_rows, 2);
        assert_eq!(summary.status, ShardStatus::Completed);
    }

    #[tokio::test]
    async fn test_lightweight_worker_writes_unreachable_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shard-2.input.csv");
        let output = dir.path().join("shard-2.csv");
        write_rows(&input, &[UrlEntry::new("Wanfang", "not a url")]).unwrap();

        let args = WorkerArgs {
            phase: Phase::Lightweight,
            shard_index: 2,
            input,
            output: output.clone(),
        };
        let status = run_worker(&Config::default(), &args).await.unwrap();
        assert_eq!(status, ShardStatus::Completed);

        let back: Vec<UrlRecord> = read_rows(&output).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].status, StatusVerdict::Unreachable);
        assert_eq!(back[0].shard_index, 2);
    }

    #[tokio::test]
    async fn test_missing_input_is_an_error_and_leaves_no_summary() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("shard-0.csv");
        let args = WorkerArgs {
            phase: Phase::Lightweight,
            shard_index: 0,
            input: dir.path().join("absent.csv"),
            output: output.clone(),
        };
        assert!(run_worker(&Config::default(), &args).await.is_err());
        assert!(!summary_path_for(&output).exists());
    }
}
