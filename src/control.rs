//! 流式处理的取消与进度控制
//!
//! 取消是建议性的：只在块与块之间检查，
//! 正在进行的单块加解密总会完成。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::BfeError;
use crate::progress::Progress;

/// 可跨线程共享的取消标志
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// 进度回调
pub type ProgressCallback<'a> = &'a dyn Fn(&Progress);

/// 单次加解密操作的控制参数
#[derive(Clone, Copy, Default)]
pub struct StreamControl<'a> {
    pub cancel: Option<&'a CancelToken>,
    pub on_progress: Option<ProgressCallback<'a>>,
}

impl<'a> StreamControl<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback<'a>) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub(crate) fn checkpoint(&self) -> Result<(), BfeError> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(BfeError::Cancelled),
            _ => Ok(()),
        }
    }

    pub(crate) fn report(&self, progress: &Progress) {
        if let Some(callback) = self.on_progress {
            callback(progress);
        }
    }
}
