//! 脚本热重载
//!
//! 监视目录中被修改的脚本文件，把路径排队；脚本线程调用
//! [`JsLanguage::poll_hot_reload`](super::JsLanguage::poll_hot_reload) 时重载。

use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// 热重载错误
#[derive(Error, Debug)]
pub enum HotReloadError {
    #[error("File system error: {0}")]
    FileSystemError(String),
    #[error("Watcher error: {0}")]
    WatchError(#[from] notify::Error),
}

/// 脚本目录监视器
pub struct ScriptWatcher {
    directory: PathBuf,
    extension: String,
    _watcher: notify::RecommendedWatcher,
    pending: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptWatcher {
    /// 监视 `directory` 下扩展名为 `extension` 的文件
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self, HotReloadError> {
        let directory = directory.into();
        let extension = extension.into();

        std::fs::create_dir_all(&directory)
            .map_err(|e| HotReloadError::FileSystemError(e.to_string()))?;

        let pending = Arc::new(Mutex::new(Vec::new()));
        let pending_clone = pending.clone();
        let wanted = extension.clone();

        let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
            let event = match result {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(target: "script", error = %err, "File watcher error");
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            let Ok(mut pending) = pending_clone.lock() else {
                return;
            };
            for path in event.paths {
                if has_extension(&path, &wanted) && !pending.contains(&path) {
                    pending.push(path);
                }
            }
        })?;
        watcher.watch(&directory, RecursiveMode::Recursive)?;

        tracing::info!(target: "script", directory = %directory.display(), extension = %extension, "Watching scripts for changes");
        Ok(Self {
            directory,
            extension,
            _watcher: watcher,
            pending,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// 取出所有待重载的路径
    pub fn drain(&self) -> Vec<PathBuf> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => Vec::new(),
        }
    }

    /// 手动排队（编辑器保存时直接通知）
    pub fn notify_changed(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !has_extension(&path, &self.extension) {
            return;
        }
        if let Ok(mut pending) = self.pending.lock() {
            if !pending.contains(&path) {
                pending.push(path);
            }
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

/// 两个路径是否指向同一文件
pub(crate) fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
