//! 状态判定 - 业务能力层
//!
//! 纯函数：输入 HTTP 结果（状态码 + 页面文本），输出 `StatusVerdict`。
//! 第一轮用原始 HTML，第二轮用浏览器渲染后的文本，两者共用同一套判定词。

use std::collections::BTreeSet;

use crate::config::RemovalMarkers;
use crate::models::StatusVerdict;

/// 一次 HTTP 请求的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpOutcome {
    /// 拿到了状态码，`text` 只在 200 时需要
    Response { status: u16, text: Option<String> },
    /// 拿到状态码之前就失败了
    TransportFailure,
}

/// 状态判定器
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    markers: RemovalMarkers,
}

impl StatusClassifier {
    pub fn new(markers: RemovalMarkers) -> Self {
        Self { markers }
    }

    pub fn classify(&self, outcome: &HttpOutcome) -> StatusVerdict {
        match outcome {
            HttpOutcome::TransportFailure => StatusVerdict::Unreachable,
            HttpOutcome::Response { status, text } => {
                self.classify_status(*status, text.as_deref().unwrap_or(""))
            }
        }
    }

    pub fn classify_status(&self, status: u16, text: &str) -> StatusVerdict {
        if status != 200 {
            return StatusVerdict::HttpError(status);
        }
        if self.has_removal_markers(text) {
            StatusVerdict::NotFound
        } else {
            StatusVerdict::Ok
        }
    }

    /// 软 404 检测：两组词各命中至少一个
    pub fn has_removal_markers(&self, text: &str) -> bool {
        let hit = |terms: &[String]| terms.iter().any(|term| text.contains(term.as_str()));
        hit(&self.markers.locus_terms) && hit(&self.markers.removal_terms)
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(RemovalMarkers::default())
    }
}

/// 可疑状态码集合
///
/// 这些状态码多半是反爬拦截而不是真的被删，需要浏览器复查
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousStatusSet(BTreeSet<u16>);

impl AmbiguousStatusSet {
    pub fn new(codes: BTreeSet<u16>) -> Self {
        Self(codes)
    }

    /// 第一轮判定是否需要进入第二轮
    pub fn should_escalate(&self, verdict: &StatusVerdict) -> bool {
        match verdict {
            StatusVerdict::HttpError(code) => self.0.contains(code),
            _ => false,
        }
    }
}

impl FromIterator<u16> for AmbiguousStatusSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
