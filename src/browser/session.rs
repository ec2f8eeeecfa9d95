use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::launcher::SessionLauncher;
use crate::config::Config;
use crate::error::LaunchError;
use crate::infrastructure::JsExecutor;
use crate::services::escalation_prober::PageRenderer;

/// 启动参数：不带 `--enable-automation`，并关闭 AutomationControlled 特征
const LAUNCH_ARGS: &[&str] = &[
    "--start-maximized",
    "--disable-blink-features=AutomationControlled",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-hang-monitor",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-sync",
    "--metrics-recording-only",
    "--no-first-run",
    "--password-store=basic",
    "--use-mock-keychain",
    "--no-sandbox",
];

/// 每个新文档加载前注入，隐藏 webdriver 标记
const STEALTH_JS: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
"#;

/// 安装目录里可能出现的浏览器可执行文件名
const EXECUTABLE_NAMES: &[&str] = &[
    "chrome",
    "chrome.exe",
    "chromium",
    "chromium-browser",
    "Google Chrome for Testing",
];

/// 一个已配置好的浏览器会话
///
/// 每个第二轮 worker 进程最多一个，整个分片复用同一个页面
pub struct BrowserSession {
    browser: Browser,
    executor: JsExecutor,
    handler_task: JoinHandle<()>,
    profile_dir: PathBuf,
    navigation_timeout: Duration,
}

impl BrowserSession {
    async fn prepare(
        browser: Browser,
        handler_task: JoinHandle<()>,
        profile_dir: PathBuf,
        client_identity: &str,
        navigation_timeout: Duration,
    ) -> Result<Self, LaunchError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| LaunchError::from_error(&e))?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS))
            .await
            .map_err(|e| LaunchError::from_error(&e))?;
        page.execute(SetUserAgentOverrideParams::new(client_identity))
            .await
            .map_err(|e| LaunchError::from_error(&e))?;
        browser
            .execute(SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Deny))
            .await
            .map_err(|e| LaunchError::from_error(&e))?;
        debug!("反检测设置已应用");

        Ok(Self {
            browser,
            executor: JsExecutor::new(page),
            handler_task,
            profile_dir,
            navigation_timeout,
        })
    }

    /// 关闭浏览器并清理临时用户目录
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("关闭浏览器失败: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("等待浏览器进程退出失败: {}", e);
        }
        self.handler_task.abort();
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!("清理用户目录 {} 失败: {}", self.profile_dir.display(), e);
        }
        info!("浏览器会话已关闭");
    }
}

#[async_trait]
impl PageRenderer for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.executor.navigate(url, self.navigation_timeout).await
    }

    async fn rendered_text(&self) -> Result<String> {
        self.executor.document_text().await
    }
}

/// 基于 chromiumoxide 的启动器
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
    headless: bool,
    client_identity: String,
    driver_dir: PathBuf,
    install_command: Vec<String>,
    navigation_timeout: Duration,
}

impl ChromeLauncher {
    pub fn from_config(config: &Config) -> Self {
        Self {
            executable: config.browser_executable.clone(),
            headless: config.browser_headless,
            client_identity: config.client_identity_string.clone(),
            driver_dir: config.driver_dir.clone(),
            install_command: config.driver_install_command.clone(),
            navigation_timeout: config.request_timeout(),
        }
    }

    fn browser_config(
        &self,
        executable: Option<&Path>,
        profile_dir: &Path,
    ) -> Result<BrowserConfig, LaunchError> {
        let mut builder = BrowserConfig::builder()
            .disable_default_args()
            .args(LAUNCH_ARGS.iter().copied())
            .arg(format!("--user-agent={}", self.client_identity))
            .user_data_dir(profile_dir);

        if !self.headless {
            builder = builder.with_head();
        }

        if let Some(path) = executable.or(self.executable.as_deref()) {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(LaunchError::driver_unavailable)
    }

    /// 安装命令参数，替换 `{driver_dir}` 占位符
    fn install_args(&self) -> Vec<String> {
        let driver_dir = self.driver_dir.display().to_string();
        self.install_command
            .iter()
            .map(|arg| arg.replace("{driver_dir}", &driver_dir))
            .collect()
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    type Session = BrowserSession;

    async fn launch(&self, executable: Option<&Path>) -> Result<BrowserSession, LaunchError> {
        // 每个 worker 独立的用户目录，避免多个浏览器抢同一个 profile 锁
        let profile_dir =
            std::env::temp_dir().join(format!("link-audit-profile-{}", std::process::id()));
        let config = self.browser_config(executable, &profile_dir)?;

        info!("🚀 启动浏览器...");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| LaunchError::from_error(&e))?;

        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("浏览器事件处理出错: {}", e);
                }
            }
        });

        BrowserSession::prepare(
            browser,
            handler_task,
            profile_dir,
            &self.client_identity,
            self.navigation_timeout,
        )
        .await
    }

    async fn install_driver(&self) -> Result<PathBuf, LaunchError> {
        let args = self.install_args();
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| LaunchError::driver_unavailable("安装命令为空"))?;

        tokio::fs::create_dir_all(&self.driver_dir)
            .await
            .map_err(|e| LaunchError::from_error(&e))?;

        info!("执行安装命令: {}", args.join(" "));
        let output = tokio::process::Command::new(program)
            .args(rest)
            .output()
            .await
            .map_err(|e| LaunchError::from_error(&e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = format!("安装命令退出 ({}): {}", output.status, stderr.trim());
            return Err(if stderr.to_lowercase().contains("permission denied") {
                LaunchError::permission_conflict(message)
            } else {
                LaunchError::driver_unavailable(message)
            });
        }

        find_browser_executable(&self.driver_dir).ok_or_else(|| {
            LaunchError::driver_unavailable(format!(
                "安装完成但在 {} 中找不到浏览器",
                self.driver_dir.display()
            ))
        })
    }

    async fn clear_driver_dir(&self) -> Result<(), LaunchError> {
        match tokio::fs::remove_dir_all(&self.driver_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LaunchError::from_error(&e)),
        }
    }
}

/// 在安装目录中查找浏览器可执行文件（按路径排序取第一个）
pub fn find_browser_executable(root: &Path) -> Option<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    let mut found = Vec::new();

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| EXECUTABLE_NAMES.contains(&n))
            {
                found.push(path);
            }
        }
    }

    found.sort();
    found.into_iter().next()
}
