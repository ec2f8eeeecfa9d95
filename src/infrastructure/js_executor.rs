//! JS 执行器 - 基础设施层
//!
//! 持有会话里唯一的 page，只暴露"打开页面 / 执行 JS / 读取页面文本"的能力

use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// 读取整个文档根节点的渲染文本
const DOCUMENT_TEXT_JS: &str =
    "document.documentElement ? document.documentElement.innerText : ''";

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力
/// - 不认识链接记录，不做判定
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 打开页面，DOM 解析完成（DOMContentLoaded）即返回
    ///
    /// 不等图片、样式等子资源加载完，慢站点不会拖住整个分片
    ///
    /// # 参数
    /// - `url`: 要打开的链接
    /// - `timeout`: 等待 DOMContentLoaded 的最长时间
    ///
    /// # 返回
    /// 导航失败（DNS、连接被拒等）或超时返回错误
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        // 先订阅再导航，避免错过事件
        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await?;

        let response = self.page.execute(NavigateParams::new(url)).await?;
        if let Some(error) = response.result.error_text.as_ref() {
            anyhow::bail!("打开 {} 失败: {}", url, error);
        }

        tokio::time::timeout(timeout, dom_ready.next())
            .await
            .with_context(|| format!("等待 {} 的 DOMContentLoaded 超时", url))?;
        Ok(())
    }

    /// 执行 JS 代码
    ///
    /// # 参数
    /// - `js_code`: 要执行的 JS 表达式
    ///
    /// # 返回
    /// 返回 JSON 格式的执行结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并转换为指定类型
    ///
    /// # 参数
    /// - `js_code`: 要执行的 JS 表达式
    ///
    /// # 返回
    /// 返回反序列化后的结果
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 当前页面渲染后的全部可见文本
    ///
    /// # 返回
    /// 文档为空时返回空字符串
    pub async fn document_text(&self) -> Result<String> {
        self.eval_as::<Option<String>>(DOCUMENT_TEXT_JS)
            .await
            .map(Option::unwrap_or_default)
            .context("无法读取页面文本")
    }
}
