//! BFE 原子写入工具。
//!
//! 提供「先写临时文件，成功后再替换目标文件」的写出语义。
//! 加解密失败或被取消时临时文件会被删除，
//! 目标位置不会出现截断的容器或半截明文。

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::error::BfeError;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 原子写文件。
///
/// 流程：
/// 1. 在目标目录创建临时文件；
/// 2. 调用 `write_fn` 写入完整内容；
/// 3. 写入成功后，使用 rename 替换目标文件；失败则删除临时文件。
///
/// `overwrite` 为 false 且目标已存在时返回 `AlreadyExists`。
pub fn write_atomic<T, F>(target: &Path, overwrite: bool, write_fn: F) -> Result<T, BfeError>
where
    F: FnOnce(&mut File) -> Result<T, BfeError>,
{
    if !overwrite && target.exists() {
        return Err(BfeError::AlreadyExists(target.to_path_buf()));
    }

    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    fs::create_dir_all(parent)?;

    let tmp_path = build_tmp_path(parent, target.file_name());
    let mut tmp_file = File::create(&tmp_path)?;

    let value = match write_fn(&mut tmp_file).and_then(|v| {
        tmp_file.sync_all()?;
        Ok(v)
    }) {
        Ok(v) => v,
        Err(err) => {
            drop(tmp_file);
            discard(&tmp_path, &err);
            return Err(err);
        }
    };
    drop(tmp_file);

    // rename 直接替换已有目标；失败时旧文件保持不变
    if let Err(err) = fs::rename(&tmp_path, target) {
        let err = BfeError::Io(err);
        discard(&tmp_path, &err);
        return Err(err);
    }

    Ok(value)
}

fn discard(tmp_path: &Path, cause: &BfeError) {
    if cause.is_cancelled() {
        warn!(path = %tmp_path.display(), "operation cancelled, discarding partial output");
    } else {
        warn!(path = %tmp_path.display(), "operation failed, discarding partial output");
    }
    let _ = fs::remove_file(tmp_path);
}

fn build_tmp_path(parent: &Path, file_name: Option<&std::ffi::OsStr>) -> PathBuf {
    let base_name = file_name
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("bfe-output");

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);

    parent.join(format!(
        ".{base_name}.tmp-{}-{timestamp}-{counter}",
        std::process::id()
    ))
}
