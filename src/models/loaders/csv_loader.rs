use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::FileError;
use crate::models::shard::ShardSummary;

/// 从 CSV 工作文件读取所有行
///
/// 表头按字段名匹配，多余的列会被忽略
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FileError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|source| FileError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                return Err(FileError::InvalidRow {
                    path: path.to_path_buf(),
                    line,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::debug!("从 {} 读取 {} 行", path.display(), rows.len());
    Ok(rows)
}

/// 把所有行写入 CSV 工作文件
///
/// 先写临时文件再改名，读取方看不到写了一半的文件
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), FileError> {
    let content = to_csv_bytes(path, rows)?;
    ensure_parent(path)?;
    let tmp_path = tmp_path_for(path);

    fs::write(&tmp_path, &content).map_err(|source| FileError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| FileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!("已写入 {} 行到 {}", rows.len(), path.display());
    Ok(())
}

/// 判断文件内容是否正好是这些行的 CSV 序列化结果
///
/// # 参数
/// - `path`: 之前写出的工作文件
/// - `rows`: 当前要处理的行
///
/// # 返回
/// 文件不存在或内容不同都返回 `false`
pub fn file_matches_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<bool, FileError> {
    let existing = match fs::read(path) {
        Ok(existing) => existing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(source) => {
            return Err(FileError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(existing == to_csv_bytes(path, rows)?)
}

fn to_csv_bytes<T: Serialize>(path: &Path, rows: &[T]) -> Result<Vec<u8>, FileError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).map_err(|source| FileError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
    }
    writer.into_inner().map_err(|e| FileError::Io {
        path: path.to_path_buf(),
        source: e.into_error(),
    })
}

/// 读取分片完成标记，不存在时返回 `None`
pub fn read_summary(path: &Path) -> Result<Option<ShardSummary>, FileError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(FileError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let summary = serde_json::from_str(&content).map_err(|source| FileError::SummaryParseFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(summary))
}

pub fn write_summary(path: &Path, summary: &ShardSummary) -> Result<(), FileError> {
    ensure_parent(path)?;
    let content = serde_json::to_string_pretty(summary).map_err(|source| {
        FileError::SummaryParseFailed {
            path: path.to_path_buf(),
            source,
        }
    })?;
    fs::write(path, content).map_err(|source| FileError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// 删除文件，文件不存在不算错误
pub fn remove_if_exists(path: &Path) -> Result<(), FileError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(FileError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn ensure_parent(path: &Path) -> Result<(), FileError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| FileError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
