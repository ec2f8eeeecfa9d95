use std::path::PathBuf;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 工作文件错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// worker 进程错误
    #[error("worker 错误: {0}")]
    Worker(#[from] WorkerError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("配置文件 {path} 解析失败: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置序列化失败: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("配置项 {key} 无效: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// 工作文件（CSV / 完成标记）错误
#[derive(Debug, Error)]
pub enum FileError {
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("文件 {path} 第 {line} 行无效: {reason}")]
    InvalidRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error("IO 错误 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("完成标记 {path} 解析失败: {source}")]
    SummaryParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// worker 进程错误
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("无法启动分片 {shard} 的 worker 进程: {source}")]
    SpawnFailed {
        shard: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("等待分片 {shard} 的 worker 进程失败: {source}")]
    WaitFailed {
        shard: usize,
        #[source]
        source: std::io::Error,
    },
}

/// 单次启动浏览器失败的原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchFailureKind {
    /// 找不到浏览器可执行文件，或版本不兼容
    DriverUnavailable,
    /// 驱动目录权限冲突
    PermissionConflict,
}

/// 单次启动（或安装）尝试的错误
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct LaunchError {
    pub kind: LaunchFailureKind,
    pub message: String,
}

impl LaunchError {
    pub fn driver_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: LaunchFailureKind::DriverUnavailable,
            message: message.into(),
        }
    }

    pub fn permission_conflict(message: impl Into<String>) -> Self {
        Self {
            kind: LaunchFailureKind::PermissionConflict,
            message: message.into(),
        }
    }

    /// 按错误链里的 IO 错误判断失败类型
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let message = err.to_string();
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(e) = current {
            if let Some(io) = e.downcast_ref::<std::io::Error>() {
                if io.kind() == std::io::ErrorKind::PermissionDenied {
                    return Self::permission_conflict(message);
                }
            }
            current = e.source();
        }
        if message.to_lowercase().contains("permission denied") {
            Self::permission_conflict(message)
        } else {
            Self::driver_unavailable(message)
        }
    }
}

/// 整条启动回退链都失败
#[derive(Debug, Error)]
pub enum SessionLaunchError {
    #[error("浏览器启动失败，已尝试 {attempts} 次: {last}")]
    Exhausted { attempts: usize, last: LaunchError },
    /// 本进程之前已经启动失败过，不再重试
    #[error("浏览器会话此前已启动失败")]
    PreviouslyFailed,
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
