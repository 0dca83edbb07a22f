//! 调试器侧信道
//!
//! 调试器可以在任意线程上发请求，但脚本值只能在脚本线程上访问：请求经
//! `crossbeam-channel` 排队，由 [`JsLanguage::poll_debug_requests`] 在脚本线程上
//! 处理，回复里只有宿主值。
//!
//! [`JsLanguage::poll_debug_requests`]: super::JsLanguage::poll_debug_requests

use crate::variant::Variant;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// 调试请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebugRequest {
    /// 在全局作用域求值表达式
    Eval { expression: String },
    /// 全局名字列表
    Globals,
    /// 最近一次脚本错误
    LastError,
}

/// 调试回复
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebugReply {
    Value { value: Variant },
    Globals { names: Vec<String> },
    LastError { message: Option<String> },
    Error { message: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebugError {
    #[error("Script language is gone")]
    Disconnected,
    #[error("No reply within {0:?}")]
    Timeout(Duration),
}

pub(crate) struct DebugEnvelope {
    pub(crate) request: DebugRequest,
    pub(crate) reply: Sender<DebugReply>,
}

/// 可跨线程克隆的请求句柄
#[derive(Clone)]
pub struct DebugHandle {
    sender: Sender<DebugEnvelope>,
}

impl DebugHandle {
    /// 提交请求，回复稍后从返回的通道取
    pub fn submit(&self, request: DebugRequest) -> Result<Receiver<DebugReply>, DebugError> {
        let (reply, receiver) = crossbeam_channel::bounded(1);
        self.sender
            .send(DebugEnvelope { request, reply })
            .map_err(|_| DebugError::Disconnected)?;
        Ok(receiver)
    }

    /// 提交并等待回复；不能在脚本线程上调用，否则永远等不到处理
    pub fn request(&self, request: DebugRequest, timeout: Duration) -> Result<DebugReply, DebugError> {
        let receiver = self.submit(request)?;
        receiver.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => DebugError::Timeout(timeout),
            RecvTimeoutError::Disconnected => DebugError::Disconnected,
        })
    }
}

impl std::fmt::Debug for DebugHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugHandle")
            .field("queued", &self.sender.len())
            .finish()
    }
}

/// 脚本线程一侧的队列
pub(crate) struct DebugQueue {
    sender: Sender<DebugEnvelope>,
    receiver: Receiver<DebugEnvelope>,
}

impl DebugQueue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    pub(crate) fn handle(&self) -> DebugHandle {
        DebugHandle {
            sender: self.sender.clone(),
        }
    }

    pub(crate) fn drain(&self) -> Vec<DebugEnvelope> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&DebugRequest::Eval {
            expression: "1 + 1".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"eval","expression":"1 + 1"}"#);

        let parsed: DebugRequest = serde_json::from_str(r#"{"kind":"globals"}"#).unwrap();
        assert_eq!(parsed, DebugRequest::Globals);
    }

    #[test]
    fn test_handle_is_send_and_queues_across_threads() {
        let queue = DebugQueue::new();
        let handle = queue.handle();

        let receiver = std::thread::spawn(move || handle.submit(DebugRequest::LastError).unwrap())
            .join()
            .unwrap();

        let pending = queue.drain();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request, DebugRequest::LastError);
        pending[0]
            .reply
            .send(DebugReply::LastError { message: None })
            .unwrap();

        match receiver.recv().unwrap() {
            DebugReply::LastError { message } => assert!(message.is_none()),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_request_times_out_without_polling() {
        let queue = DebugQueue::new();
        let err = queue
            .handle()
            .request(DebugRequest::Globals, Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err, DebugError::Timeout(Duration::from_millis(10)));
    }
}
