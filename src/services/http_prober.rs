//! 轻量探测 - 业务能力层
//!
//! 第一轮检查：每个链接发一次普通 HTTP 请求，交给 `StatusClassifier` 判定。
//! 网络层的任何失败都记为 `Unreachable`，不会向上抛错。

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::models::StatusVerdict;
use crate::services::classifier::{HttpOutcome, StatusClassifier};

/// 单个链接的探测能力
#[async_trait]
pub trait UrlProber: Send + Sync {
    async fn probe(&self, url: &str) -> StatusVerdict;
}

/// 基于 reqwest 的探测器
///
/// 无状态，可以在整个分片内复用（内部复用连接池）
pub struct HttpProber {
    client: reqwest::Client,
    classifier: StatusClassifier,
}

impl HttpProber {
    pub fn new(
        timeout: Duration,
        client_identity: &str,
        classifier: StatusClassifier,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(client_identity)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client, classifier })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            config.request_timeout(),
            &config.client_identity_string,
            StatusClassifier::new(config.removal_markers.clone()),
        )
    }

    async fn fetch(&self, url: &str) -> HttpOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("请求失败 {}: {}", url, e);
                return HttpOutcome::TransportFailure;
            }
        };

        let status = response.status().as_u16();
        if status != 200 {
            return HttpOutcome::Response { status, text: None };
        }

        // text() 按响应头里的 charset 解码，解不了的字节替换掉
        match response.text().await {
            Ok(text) => HttpOutcome::Response {
                status,
                text: Some(text),
            },
            Err(e) => {
                debug!("读取响应内容失败 {}: {}", url, e);
                HttpOutcome::TransportFailure
            }
        }
    }
}

#[async_trait]
impl UrlProber for HttpProber {
    async fn probe(&self, url: &str) -> StatusVerdict {
        let outcome = self.fetch(url).await;
        self.classifier.classify(&outcome)
    }
}
