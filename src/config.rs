use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 默认的浏览器标识（与人工访问时保持一致）
pub const DEFAULT_CLIENT_IDENTITY: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/83.0.4103.53 Safari/537.36";

/// 软 404 判定词表
///
/// 页面同时包含一个“位置”词和一个“删除”词时视为内容已被删除
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalMarkers {
    /// 表示“访问 / 页面”的词
    pub locus_terms: Vec<String>,
    /// 表示“不存在 / 已删除 / 找不到”的词
    pub removal_terms: Vec<String>,
}

impl Default for RemovalMarkers {
    fn default() -> Self {
        Self {
            locus_terms: vec!["访问".to_string(), "页面".to_string()],
            removal_terms: vec![
                "不存在".to_string(),
                "删除".to_string(),
                "找不到".to_string(),
            ],
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 每轮并行的 worker 进程数
    pub worker_count: usize,
    /// 疑似反爬拦截的状态码，命中时进入浏览器复查
    pub ambiguous_status_set: BTreeSet<u16>,
    /// 第一轮 HTTP 请求超时（秒）
    pub request_timeout_seconds: u64,
    /// 浏览器打开页面后等待渲染的时间（秒）
    pub render_settle_seconds: u64,
    pub client_identity_string: String,
    /// 每个数据库最多抽取多少条链接，`None` 表示全部检查
    ///
    /// 默认不抽样；需要按库抽样复查时设为 50（`--sample 50`）
    pub sample_per_database: Option<usize>,
    /// 抽样随机种子，TOML 整数是 i64，不能超过 `i64::MAX`
    pub sample_seed: Option<u64>,
    /// 分片中间文件目录
    pub work_dir: PathBuf,
    /// 合并结果输出目录
    pub output_dir: PathBuf,
    /// 浏览器可执行文件，不设置时自动查找
    pub browser_executable: Option<PathBuf>,
    pub browser_headless: bool,
    /// 自动安装浏览器的目录
    pub driver_dir: PathBuf,
    /// 安装浏览器的命令，`{driver_dir}` 会被替换
    pub driver_install_command: Vec<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 写在最后：序列化为 TOML 时表必须排在普通键之后
    pub removal_markers: RemovalMarkers,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: 5,
            ambiguous_status_set: [403, 408, 412, 420, 502, 521].into_iter().collect(),
            removal_markers: RemovalMarkers::default(),
            request_timeout_seconds: 30,
            render_settle_seconds: 5,
            client_identity_string: DEFAULT_CLIENT_IDENTITY.to_string(),
            sample_per_database: None,
            sample_seed: None,
            work_dir: PathBuf::from("work"),
            output_dir: PathBuf::from("."),
            browser_executable: None,
            browser_headless: true,
            driver_dir: PathBuf::from("browser-driver"),
            driver_install_command: vec![
                "npx".to_string(),
                "@puppeteer/browsers".to_string(),
                "install".to_string(),
                "chrome@stable".to_string(),
                "--path".to_string(),
                "{driver_dir}".to_string(),
            ],
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 加载配置：配置文件（可选）→ 环境变量
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.with_env();
        config.validate()?;
        Ok(config)
    }

    /// 只读配置文件，不叠加环境变量（worker 进程使用）
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 用环境变量覆盖对应配置项，无法解析的值沿用原配置
    pub fn with_env(self) -> Self {
        Self {
            worker_count: env_parse("WORKER_COUNT").unwrap_or(self.worker_count),
            ambiguous_status_set: std::env::var("AMBIGUOUS_STATUS_SET")
                .ok()
                .and_then(|v| parse_status_set(&v))
                .unwrap_or(self.ambiguous_status_set),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(self.request_timeout_seconds),
            render_settle_seconds: env_parse("RENDER_SETTLE_SECONDS")
                .unwrap_or(self.render_settle_seconds),
            client_identity_string: std::env::var("CLIENT_IDENTITY")
                .unwrap_or(self.client_identity_string),
            work_dir: std::env::var("WORK_DIR").map(PathBuf::from).unwrap_or(self.work_dir),
            output_dir: std::env::var("OUTPUT_DIR").map(PathBuf::from).unwrap_or(self.output_dir),
            browser_executable: std::env::var("BROWSER_EXECUTABLE")
                .ok()
                .map(PathBuf::from)
                .or(self.browser_executable),
            browser_headless: env_parse("BROWSER_HEADLESS").unwrap_or(self.browser_headless),
            driver_dir: std::env::var("DRIVER_DIR").map(PathBuf::from).unwrap_or(self.driver_dir),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid {
                key: "worker_count",
                reason: "至少需要 1 个 worker".to_string(),
            });
        }
        if self.removal_markers.locus_terms.is_empty() || self.removal_markers.removal_terms.is_empty() {
            return Err(ConfigError::Invalid {
                key: "removal_markers",
                reason: "两组判定词都不能为空".to_string(),
            });
        }
        if self.sample_seed.is_some_and(|seed| i64::try_from(seed).is_err()) {
            return Err(ConfigError::Invalid {
                key: "sample_seed",
                reason: format!("不能超过 {}", i64::MAX),
            });
        }
        if self
            .sample_per_database
            .is_some_and(|limit| i64::try_from(limit).is_err())
        {
            return Err(ConfigError::Invalid {
                key: "sample_per_database",
                reason: format!("不能超过 {}", i64::MAX),
            });
        }
        if self.driver_install_command.is_empty() {
            return Err(ConfigError::Invalid {
                key: "driver_install_command",
                reason: "安装命令不能为空".to_string(),
            });
        }
        Ok(())
    }

    /// 把生效的配置写到文件，供 worker 进程读取
    pub fn write_to(&self, path: &Path) -> Result<(), crate::error::AppError> {
        let content = toml::to_string(self).map_err(ConfigError::from)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| crate::error::FileError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| crate::error::FileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn render_settle(&self) -> Duration {
        Duration::from_secs(self.render_settle_seconds)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// 解析逗号分隔的状态码列表，如 "403,408,521"
pub fn parse_status_set(value: &str) -> Option<BTreeSet<u16>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u16>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_observed_blocking_codes() {
        let config = Config::default();
        assert_eq!(config.worker_count, 5);
        assert_eq!(
            config.ambiguous_status_set.iter().copied().collect::<Vec<_>>(),
            vec![403, 408, 412, 420, 502, 521]
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.render_settle(), Duration::from_secs(5));
        // 默认检查全部链接，不抽样
        assert_eq!(config.sample_per_database, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_status_set() {
        let set = parse_status_set("403, 521,").unwrap();
        assert!(set.contains(&403) && set.contains(&521));
        assert_eq!(set.len(), 2);
        assert!(parse_status_set("403,abc").is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "worker_count = 2\nrender_settle_seconds = 8\n\n[removal_markers]\nlocus_terms = [\"page\"]\nremoval_terms = [\"not found\"]\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.render_settle_seconds, 8);
        assert_eq!(config.removal_markers.locus_terms, vec!["page".to_string()]);
        assert_eq!(config.request_timeout_seconds, 30);
    }

    #[test]
    fn test_written_config_reads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("work").join("config.toml");
        let config = Config {
            worker_count: 3,
            sample_per_database: Some(50),
            browser_executable: Some(PathBuf::from("/usr/bin/chromium")),
            ..Config::default()
        };

        config.write_to(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = Config {
            worker_count: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "worker_count", .. })
        ));
    }

    #[test]
    fn test_seed_must_fit_in_toml_integer() {
        let too_large = Config {
            sample_seed: Some(u64::MAX),
            ..Config::default()
        };
        assert!(matches!(
            too_large.validate(),
            Err(ConfigError::Invalid { key: "sample_seed", .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let largest = Config {
            sample_seed: Some(i64::MAX as u64),
            ..Config::default()
        };
        assert!(largest.validate().is_ok());
        largest.write_to(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap().sample_seed, Some(i64::MAX as u64));
    }
}
