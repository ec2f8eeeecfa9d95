//! 分片处理流程 - 流程层
//!
//! 核心职责：定义"一个分片"在每一轮里的完整处理流程
//!
//! - 第一轮：逐条直接请求，得到初步判定
//! - 第二轮：只复查可疑状态码的行，其余原样透传
//!
//! 这里的函数只接收输入行、返回输出行，不读写文件，
//! 文件交接由编排层负责。

use tracing::{error, info, warn};

use crate::browser::{SessionLauncher, SessionManager};
use crate::models::{Escalation, ShardStatus, StatusVerdict, UrlEntry, UrlRecord};
use crate::services::{AmbiguousStatusSet, EscalationProber, PageRenderer, UrlProber};
use crate::utils::logging::truncate_text;
use crate::workflow::shard_ctx::ShardCtx;

/// 单个分片的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardOutput {
    /// 与输入顺序一致的输出行
    pub records: Vec<UrlRecord>,
    pub status: ShardStatus,
    /// 用浏览器复查过的行数
    pub escalated: usize,
    /// 需要复查但没能复查的行数
    pub unresolved: usize,
}

impl ShardOutput {
    fn completed(records: Vec<UrlRecord>) -> Self {
        Self {
            records,
            status: ShardStatus::Completed,
            escalated: 0,
            unresolved: 0,
        }
    }
}

/// 第一轮：对分片内每条链接发一次请求
///
/// 探测失败都已折算成判定结果，所以这一轮总是完整结束
pub async fn run_lightweight<P: UrlProber + ?Sized>(
    prober: &P,
    entries: Vec<UrlEntry>,
    ctx: &ShardCtx,
) -> ShardOutput {
    let total = entries.len();
    info!("{} 🔍 开始检查 {} 条链接", ctx, total);

    let mut records = Vec::with_capacity(total);
    for (idx, entry) in entries.into_iter().enumerate() {
        let verdict = prober.probe(&entry.url).await;
        info!(
            "{} ({}/{}) {} → {}",
            ctx,
            idx + 1,
            total,
            truncate_text(&entry.url, 80),
            verdict
        );
        records.push(UrlRecord::from_entry(entry, verdict, ctx.shard_index));
    }

    ShardOutput::completed(records)
}

/// 第二轮：用浏览器复查可疑行
///
/// - 不在可疑集合内的行原样返回
/// - 浏览器会话第一次遇到可疑行时才启动，没有可疑行的分片不会启动浏览器
/// - 会话启动失败时，剩余可疑行保留第一轮结果并标记为 `unresolved`
pub async fn run_escalation<L>(
    sessions: &mut SessionManager<L>,
    prober: &EscalationProber,
    ambiguous: &AmbiguousStatusSet,
    records: Vec<UrlRecord>,
    ctx: &ShardCtx,
) -> ShardOutput
where
    L: SessionLauncher,
    L::Session: PageRenderer,
{
    let candidates = records
        .iter()
        .filter(|r| ambiguous.should_escalate(&r.status))
        .count();
    if candidates == 0 {
        info!("{} ✓ 没有需要复查的链接，{} 行原样透传", ctx, records.len());
        return ShardOutput::completed(records);
    }
    info!("{} 🌐 {} / {} 行需要浏览器复查", ctx, candidates, records.len());

    let mut output = ShardOutput::completed(Vec::with_capacity(records.len()));
    let mut done = 0;

    for mut record in records {
        if !ambiguous.should_escalate(&record.status) {
            output.records.push(record);
            continue;
        }
        done += 1;

        match sessions.acquire().await {
            Ok(session) => {
                let previous = record.status;
                record.status = prober
                    .probe(session, &record.url)
                    .await
                    .unwrap_or(StatusVerdict::Ok);
                record.escalation = Some(Escalation::Rendered);
                output.escalated += 1;
                info!(
                    "{} ({}/{}) {} : {} → {}",
                    ctx,
                    done,
                    candidates,
                    truncate_text(&record.url, 80),
                    previous,
                    record.status
                );
            }
            Err(e) => {
                if output.status != ShardStatus::Degraded {
                    error!("{} ❌ 浏览器会话不可用，本分片可疑行保留第一轮结果: {}", ctx, e);
                    output.status = ShardStatus::Degraded;
                }
                warn!("{} 未复查: {}", ctx, truncate_text(&record.url, 80));
                record.escalation = Some(Escalation::Unresolved);
                output.unresolved += 1;
            }
        }
        output.records.push(record);
    }

    output
}

/// 把可疑行标记为未复查，其余行不变
///
/// 第二轮 worker 崩溃时，编排层用它把该分片的输入行补回结果
pub fn mark_unresolved(records: Vec<UrlRecord>, ambiguous: &AmbiguousStatusSet) -> Vec<UrlRecord> {
    records
        .into_iter()
        .map(|mut record| {
            if ambiguous.should_escalate(&record.status) {
                record.escalation = Some(Escalation::Unresolved);
            }
            record
        })
        .collect()
}
