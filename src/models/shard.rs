//! 分片与阶段相关的数据结构

use std::fmt;

use serde::{Deserialize, Serialize};

/// 检查阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// 第一轮：直接 HTTP 请求
    Lightweight,
    /// 第二轮：浏览器复查可疑结果
    Escalation,
}

impl Phase {
    /// 阶段编号，用于目录名和合并文件名
    pub fn round(&self) -> u8 {
        match self {
            Phase::Lightweight => 1,
            Phase::Escalation => 2,
        }
    }

    /// 传给 worker 进程的 `--phase` 参数值
    pub fn as_arg(&self) -> &'static str {
        match self {
            Phase::Lightweight => "lightweight",
            Phase::Escalation => "escalation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Lightweight => write!(f, "第 1 轮 (HTTP)"),
            Phase::Escalation => write!(f, "第 2 轮 (浏览器)"),
        }
    }
}

/// worker 的退出状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardStatus {
    /// 全部处理完成
    Completed,
    /// 输出已写出，但浏览器会话启动失败，可疑行未复查
    Degraded,
    /// 进程异常退出或没有留下输出
    Crashed,
}

impl ShardStatus {
    pub const COMPLETED_EXIT_CODE: i32 = 0;
    pub const DEGRADED_EXIT_CODE: i32 = 2;

    pub fn exit_code(&self) -> i32 {
        match self {
            ShardStatus::Completed => Self::COMPLETED_EXIT_CODE,
            ShardStatus::Degraded => Self::DEGRADED_EXIT_CODE,
            ShardStatus::Crashed => 1,
        }
    }

    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(Self::COMPLETED_EXIT_CODE) => ShardStatus::Completed,
            Some(Self::DEGRADED_EXIT_CODE) => ShardStatus::Degraded,
            _ => ShardStatus::Crashed,
        }
    }
}

/// worker 写在输出文件旁边的完成标记
///
/// 输出文件落盘之后才写这个文件，所以它存在就说明输出是完整的
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSummary {
    pub phase: Phase,
    pub shard_index: usize,
    pub input_rows: usize,
    pub output_rows: usize,
    pub escalated: usize,
    pub unresolved: usize,
    pub status: ShardStatus,
    pub finished_at: String,
}
