//! 分片处理上下文
//!
//! 封装"我正在处理哪一轮的第几个分片"这一信息

use std::fmt::Display;

use crate::models::Phase;

/// 分片处理上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardCtx {
    pub phase: Phase,

    /// 分片编号（从0开始）
    pub shard_index: usize,
}

impl ShardCtx {
    pub fn new(phase: Phase, shard_index: usize) -> Self {
        Self { phase, shard_index }
    }
}

impl Display for ShardCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[第 {} 轮 分片#{}]", self.phase.round(), self.shard_index)
    }
}
