//! # link-audit
//!
//! 大批量检查已收集的文献链接是否仍然可以访问
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure / Browser）
//! - `infrastructure/` - `JsExecutor`，唯一的 page owner，提供 eval() 能力
//! - `browser/` - 浏览器会话：反检测设置、启动回退链
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个链接
//! - `StatusClassifier` - 状态码 + 页面文本 → 判定
//! - `HttpProber` - 第一轮直接请求
//! - `EscalationProber` - 第二轮浏览器复查
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个分片"在每一轮的处理流程
//! - `ShardCtx` - 上下文封装（轮次 + 分片编号）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 两轮流水线
//! - `orchestrator/shard_coordinator` - 分片、启动 worker 子进程、合并
//! - `orchestrator/worker` - 子进程入口
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use models::{Phase, ShardStatus, StatusVerdict, UrlEntry, UrlRecord};
pub use orchestrator::{run_worker, Pipeline, WorkerArgs};
pub use workflow::{ShardCtx, ShardOutput};
