//! 浏览器会话获取与启动回退链
//!
//! 启动顺序：
//! 1. 用本地已有的浏览器启动
//! 2. 找不到或不兼容：安装浏览器后再启动一次
//! 3. 驱动目录权限冲突：删除目录、重新安装、再启动一次
//! 4. 都失败：本分片的浏览器复查放弃

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::{LaunchError, LaunchFailureKind, SessionLaunchError};

/// 启动浏览器会话所需的底层能力
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: Send + Sync;

    /// 启动会话；`executable` 为 `None` 时使用配置或自动查找的浏览器
    async fn launch(&self, executable: Option<&Path>) -> Result<Self::Session, LaunchError>;

    /// 安装浏览器，返回可执行文件路径
    async fn install_driver(&self) -> Result<PathBuf, LaunchError>;

    /// 删除驱动目录
    async fn clear_driver_dir(&self) -> Result<(), LaunchError>;
}

/// 按回退链启动浏览器，最多重试两次
pub async fn launch_with_fallback<L: SessionLauncher>(
    launcher: &L,
) -> Result<L::Session, SessionLaunchError> {
    let mut attempts = 1;
    let mut last = match launcher.launch(None).await {
        Ok(session) => return Ok(session),
        Err(e) => e,
    };
    warn!("浏览器启动失败: {}", last);

    if last.kind == LaunchFailureKind::DriverUnavailable {
        info!("🔧 尝试安装浏览器后重新启动...");
        attempts += 1;
        match reinstall_and_launch(launcher).await {
            Ok(session) => return Ok(session),
            Err(e) => {
                warn!("安装后启动仍然失败: {}", e);
                last = e;
            }
        }
    }

    if last.kind == LaunchFailureKind::PermissionConflict {
        info!("🔧 驱动目录权限冲突，删除后重新安装...");
        attempts += 1;
        let retried = match launcher.clear_driver_dir().await {
            Ok(()) => reinstall_and_launch(launcher).await,
            Err(e) => Err(e),
        };
        match retried {
            Ok(session) => return Ok(session),
            Err(e) => {
                warn!("重新安装后启动仍然失败: {}", e);
                last = e;
            }
        }
    }

    error!("❌ 浏览器启动回退链全部失败 (共 {} 次)", attempts);
    Err(SessionLaunchError::Exhausted { attempts, last })
}

async fn reinstall_and_launch<L: SessionLauncher>(launcher: &L) -> Result<L::Session, LaunchError> {
    let executable = launcher.install_driver().await?;
    info!("浏览器已安装: {}", executable.display());
    launcher.launch(Some(&executable)).await
}

/// 每个 worker 进程唯一的会话持有者
///
/// 第一次 `acquire()` 时才启动浏览器，之后一直复用；
/// 启动失败后不再重试，后续调用直接返回错误
pub struct SessionManager<L: SessionLauncher> {
    launcher: L,
    state: SessionState<L::Session>,
}

enum SessionState<S> {
    NotStarted,
    Ready(S),
    Failed,
}

impl<L: SessionLauncher> SessionManager<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            state: SessionState::NotStarted,
        }
    }

    pub async fn acquire(&mut self) -> Result<&L::Session, SessionLaunchError> {
        if let SessionState::NotStarted = self.state {
            self.state = match launch_with_fallback(&self.launcher).await {
                Ok(session) => {
                    info!("✓ 浏览器会话已就绪");
                    SessionState::Ready(session)
                }
                Err(e) => {
                    self.state = SessionState::Failed;
                    return Err(e);
                }
            };
        }

        match &self.state {
            SessionState::Ready(session) => Ok(session),
            _ => Err(SessionLaunchError::PreviouslyFailed),
        }
    }

    /// 分片结束时取出会话用于关闭；从未启动过则为 `None`
    pub fn into_session(self) -> Option<L::Session> {
        match self.state {
            SessionState::Ready(session) => Some(session),
            _ => None,
        }
    }
}
