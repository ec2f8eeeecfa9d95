//! 浏览器复查 - 业务能力层
//!
//! 第二轮检查：用共享的浏览器会话打开可疑链接，等页面渲染完后
//! 对渲染文本做软 404 检测。

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::models::StatusVerdict;
use crate::services::classifier::StatusClassifier;

/// 能打开页面并读取渲染文本的会话
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn rendered_text(&self) -> Result<String>;
}

/// 浏览器复查器
pub struct EscalationProber {
    classifier: StatusClassifier,
    settle_delay: Duration,
}

impl EscalationProber {
    pub fn new(classifier: StatusClassifier, settle_delay: Duration) -> Self {
        Self {
            classifier,
            settle_delay,
        }
    }

    /// 复查单个链接
    ///
    /// 返回 `None` 表示页面上没有删除提示，由调用方结合第一轮结果定为正常
    pub async fn probe<R: PageRenderer + ?Sized>(
        &self,
        session: &R,
        url: &str,
    ) -> Option<StatusVerdict> {
        if let Err(e) = session.navigate(url).await {
            warn!("浏览器打开 {} 失败: {}", url, e);
            return Some(StatusVerdict::Unreachable);
        }

        // 等待前端渲染
        tokio::time::sleep(self.settle_delay).await;

        let text = match session.rendered_text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("读取 {} 的页面文本失败: {}", url, e);
                return Some(StatusVerdict::Unreachable);
            }
        };
        debug!("{} 渲染文本 {} 字符", url, text.chars().count());

        if self.classifier.has_removal_markers(&text) {
            Some(StatusVerdict::NotFound)
        } else {
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 按链接返回预设文本的假会话；没有预设的链接视为打开失败
    #[derive(Default)]
    pub(crate) struct FakeRenderer {
        pub pages: HashMap<String, String>,
        pub visited: Mutex<Vec<String>>,
        current: Mutex<Option<String>>,
    }

    impl FakeRenderer {
        pub(crate) fn with_pages(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(u, t)| (u.to_string(), t.to_string()))
                    .collect(),
                ..Default::default()
            }
        }

        pub(crate) fn visited(&self) -> Vec<String> {
            self.visited.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageRenderer for FakeRenderer {
        async fn navigate(&self, url: &str) -> Result<()> {
            self.visited.lock().unwrap().push(url.to_string());
            if !self.pages.contains_key(url) {
                anyhow::bail!("net::ERR_NAME_NOT_RESOLVED");
            }
            *self.current.lock().unwrap() = Some(url.to_string());
            Ok(())
        }

        async fn rendered_text(&self) -> Result<String> {
            let current = self.current.lock().unwrap().clone();
            Ok(current
                .and_then(|url| self.pages.get(&url).cloned())
                .unwrap_or_default())
        }
    }

    fn prober() -> EscalationProber {
        EscalationProber::new(StatusClassifier::default(), Duration::ZERO)
    }

    #[tokio::test]
    async fn test_rendered_removal_notice() {
        let renderer = FakeRenderer::with_pages(&[("http://x/1", "抱歉，您访问的页面不存在")]);
        assert_eq!(
            prober().probe(&renderer, "http://x/1").await,
            Some(StatusVerdict::NotFound)
        );
    }

    #[tokio::test]
    async fn test_clean_render_returns_none() {
        let renderer = FakeRenderer::with_pages(&[("http://x/1", "数字图书馆 全文阅读")]);
        assert_eq!(prober().probe(&renderer, "http://x/1").await, None);
    }

    #[tokio::test]
    async fn test_navigation_failure_is_unreachable() {
        let renderer = FakeRenderer::default();
        assert_eq!(
            prober().probe(&renderer, "http://nowhere/").await,
            Some(StatusVerdict::Unreachable)
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_poison_session() {
        let renderer = FakeRenderer::with_pages(&[("http://x/ok", "首页")]);
        assert_eq!(
            prober().probe(&renderer, "http://x/broken").await,
            Some(StatusVerdict::Unreachable)
        );
        assert_eq!(prober().probe(&renderer, "http://x/ok").await, None);
        assert_eq!(renderer.visited(), vec!["http://x/broken", "http://x/ok"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_settle_delay() {
        let renderer = FakeRenderer::with_pages(&[("http://x/1", "首页")]);
        let prober = EscalationProber::new(StatusClassifier::default(), Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        prober.probe(&renderer, "http://x/1").await;
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
