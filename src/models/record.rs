//! 链接记录与判定结果
//!
//! 工作文件中的每一行都对应这里的一个类型：
//! - `UrlEntry` - 输入文件的一行（数据库 + 链接）
//! - `UrlRecord` - 带判定结果的一行，在两轮检查之间传递

use std::fmt;

use serde::{Deserialize, Serialize};

/// 传输层失败时写入 `result` 列的文字
pub const UNAVAILABLE_LABEL: &str = "webpage unavailable";

/// 链接可达性判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusVerdict {
    /// 页面正常（HTTP 200 且没有删除提示）
    Ok,
    /// 软 404：HTTP 200 但页面显示“内容不存在/已删除”
    NotFound,
    /// 其他 HTTP 状态码
    HttpError(u16),
    /// 请求在拿到状态码之前就失败了（DNS、连接、超时）
    Unreachable,
}

impl StatusVerdict {
    /// `result` 列的取值：状态码或 "webpage unavailable"
    pub fn result_label(&self) -> String {
        match self {
            StatusVerdict::Ok => "200".to_string(),
            StatusVerdict::NotFound => "404".to_string(),
            StatusVerdict::HttpError(code) => code.to_string(),
            StatusVerdict::Unreachable => UNAVAILABLE_LABEL.to_string(),
        }
    }

    pub fn tag(&self) -> VerdictTag {
        match self {
            StatusVerdict::Ok => VerdictTag::Ok,
            StatusVerdict::NotFound => VerdictTag::NotFound,
            StatusVerdict::HttpError(_) => VerdictTag::HttpError,
            StatusVerdict::Unreachable => VerdictTag::Unreachable,
        }
    }

    /// 由 `verdict` + `result` 两列还原判定
    ///
    /// 只有 `http_error` 需要读取 `result` 里的状态码
    pub fn from_columns(tag: VerdictTag, result: &str) -> Option<Self> {
        match tag {
            VerdictTag::Ok => Some(StatusVerdict::Ok),
            VerdictTag::NotFound => Some(StatusVerdict::NotFound),
            VerdictTag::Unreachable => Some(StatusVerdict::Unreachable),
            VerdictTag::HttpError => result.trim().parse().ok().map(StatusVerdict::HttpError),
        }
    }
}

impl fmt::Display for StatusVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusVerdict::Ok => write!(f, "正常"),
            StatusVerdict::NotFound => write!(f, "内容已删除"),
            StatusVerdict::HttpError(code) => write!(f, "HTTP {}", code),
            StatusVerdict::Unreachable => write!(f, "无法访问"),
        }
    }
}

/// `verdict` 列：判定的无损标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictTag {
    Ok,
    NotFound,
    HttpError,
    Unreachable,
}

/// 第二轮（浏览器复查）对一行做了什么
///
/// 不需要复查的行保持为空，原样透传
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    /// 已用浏览器重新检查
    Rendered,
    /// 需要复查但浏览器会话启动失败，保留第一轮结果
    Unresolved,
}

/// 输入文件的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntry {
    #[serde(alias = "Database")]
    pub database: String,
    #[serde(alias = "Link", alias = "Url")]
    pub url: String,
}

impl UrlEntry {
    pub fn new(database: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            url: url.into(),
        }
    }
}

/// 带判定结果的链接记录
///
/// 读写工作文件时经由 `WorkingRow` 转换
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WorkingRow", try_from = "WorkingRow")]
pub struct UrlRecord {
    pub database: String,
    pub url: String,
    pub status: StatusVerdict,
    /// 第一轮所在的分片编号
    pub shard_index: usize,
    pub escalation: Option<Escalation>,
}

impl UrlRecord {
    pub fn from_entry(entry: UrlEntry, status: StatusVerdict, shard_index: usize) -> Self {
        Self {
            database: entry.database,
            url: entry.url,
            status,
            shard_index,
            escalation: None,
        }
    }
}

/// 工作文件中的一行（CSV 序列化形态）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingRow {
    pub database: String,
    pub url: String,
    pub shard_index: usize,
    pub result: String,
    pub verdict: VerdictTag,
    pub escalation: Option<Escalation>,
}

impl From<&UrlRecord> for WorkingRow {
    fn from(record: &UrlRecord) -> Self {
        Self {
            database: record.database.clone(),
            url: record.url.clone(),
            shard_index: record.shard_index,
            result: record.status.result_label(),
            verdict: record.status.tag(),
            escalation: record.escalation,
        }
    }
}

impl From<UrlRecord> for WorkingRow {
    fn from(record: UrlRecord) -> Self {
        Self::from(&record)
    }
}

impl TryFrom<WorkingRow> for UrlRecord {
    type Error = String;

    fn try_from(row: WorkingRow) -> Result<Self, Self::Error> {
        let status = StatusVerdict::from_columns(row.verdict, &row.result)
            .ok_or_else(|| format!("无法解析判定结果: {:?} / {}", row.verdict, row.result))?;
        Ok(Self {
            database: row.database,
            url: row.url,
            status,
            shard_index: row.shard_index,
            escalation: row.escalation,
        })
    }
}
