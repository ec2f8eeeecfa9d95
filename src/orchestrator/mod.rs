//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责分片调度和进程管理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `pipeline` - 流水线驱动
//! - 读取输入、按数据库抽样得到工作集
//! - 依次跑第一轮和第二轮
//! - 写出 `checked_round_1` / `checked_round_2`
//! - 输出全局统计信息
//!
//! ### `shard_coordinator` - 分片协调器
//! - 把一轮的行切成连续分片
//! - 每个分片启动一个 worker 子进程
//! - 等待全部结束，按分片顺序合并输出
//! - 处理崩溃分片和续跑
//!
//! ### `worker` - 分片 worker
//! - 子进程入口：读输入文件、跑分片流程、写输出和完成标记
//! - 唯一持有浏览器会话的地方
//!
//! ## 层次关系
//!
//! ```text
//! pipeline (两轮，处理整个工作集)
//!     ↓
//! shard_coordinator (一轮，处理 Vec<分片>)
//!     ↓  子进程 + 文件交接
//! worker (一个分片)
//!     ↓
//! workflow::shard_flow (分片内逐行处理)
//!     ↓
//! services (能力层：classifier / http_prober / escalation_prober)
//!     ↓
//! browser / infrastructure (浏览器会话、JsExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **进程隔离**：worker 之间不共享内存，只通过文件交接
//! 2. **资源隔离**：浏览器会话只在第二轮 worker 进程内存在
//! 3. **向下依赖**：编排层 → workflow → services → browser / infrastructure
//! 4. **无业务逻辑**：只做调度、合并和统计，不做具体判定

pub mod pipeline;
pub mod shard_coordinator;
pub mod worker;

// 重新导出主要类型
pub use pipeline::{Pipeline, PipelineReport};
pub use shard_coordinator::{shard_ranges, PhaseReport, ShardCoordinator, ShardReport, WorkerCommand};
pub use worker::{run_worker, WorkerArgs};
