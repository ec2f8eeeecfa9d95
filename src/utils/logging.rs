/// 日志工具模块
///
/// 提供流水线横幅和统计输出的辅助函数
use std::path::Path;

use tracing::info;

use crate::config::Config;
use crate::models::Phase;

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 当前生效的配置
/// - `input`: 目录文件路径
pub fn log_startup(config: &Config, input: &Path) {
    info!("{}", "=".repeat(60));
    info!("🚀 链接可达性检查启动 - 多进程分片模式");
    info!("📄 输入文件: {}", input.display());
    info!("📊 worker 进程数: {}", config.worker_count);
    info!("🎯 可疑状态码: {:?}", config.ambiguous_status_set);
    if let Some(n) = config.sample_per_database {
        info!("🎲 每个数据库抽样: {} 条", n);
    }
    info!("{}", "=".repeat(60));
}

/// 记录工作集信息
pub fn log_working_set(total: usize, databases: usize) {
    info!("✓ 工作集共 {} 条链接，来自 {} 个数据库", total, databases);
}

/// 记录阶段开始信息
///
/// # 参数
/// - `phase`: 当前阶段
/// - `rows`: 本阶段待处理行数
/// - `shards`: 分片（worker 进程）数
pub fn log_phase_start(phase: Phase, rows: usize, shards: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始{}", phase);
    info!("📄 {} 行 / {} 个分片", rows, shards);
    info!("{}", "=".repeat(60));
}

/// 记录阶段完成信息
pub fn log_phase_complete(phase: Phase, completed: usize, degraded: usize, crashed: usize) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ {}完成: 正常 {} / 降级 {} / 崩溃 {}",
        phase, completed, degraded, crashed
    );
    info!("{}", "─".repeat(60));
}

/// 最终统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalStats {
    pub total: usize,
    pub ok: usize,
    pub not_found: usize,
    pub http_error: usize,
    pub unreachable: usize,
    pub escalated: usize,
    pub unresolved: usize,
}

/// 打印最终统计信息
///
/// # 参数
/// - `stats`: 第二轮结束后的汇总
/// - `output_path`: 最终结果文件
pub fn print_final_stats(stats: &FinalStats, output_path: &Path) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部检查完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 可访问: {}/{}", stats.ok, stats.total);
    info!("🗑️ 软 404: {}", stats.not_found);
    info!("⚠️ HTTP 错误: {}", stats.http_error);
    info!("❌ 无法访问: {}", stats.unreachable);
    info!("🌐 浏览器复查: {} (未复查 {})", stats.escalated, stats.unresolved);
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", output_path.display());
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原文本
/// - `max_len`: 最多保留的字符数（按字符而非字节）
///
/// # 返回
/// 超长时截断并追加 `...`
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_text("http://知网/论文", 9), "http://知网...");
        assert_eq!(truncate_text("short", 10), "short");
    }
}
