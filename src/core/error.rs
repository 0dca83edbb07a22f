//! 统一错误处理模块
//!
//! 提供脚本绑定层范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **脚本资源层** (`ScriptError`): 编译、重载、实例化、资源读写
//! - **调用层** (`CallError`): 跨边界的方法调用（原生 <-> 脚本）
//! - **绑定层** (`BindingError`): 类注册表、对象绑定
//!
//! 进入脚本的错误一律转换为 JS 异常抛出，永远不会中止宿主进程。

use crate::variant::VariantType;
use thiserror::Error;

/// 脚本资源错误
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Compilation failed for '{path}': {message}")]
    CompilationFailed { path: String, message: String },

    #[error("Script '{path}' is already in use by live instances")]
    AlreadyInUse { path: String },

    #[error("Script '{path}' is not valid, reload it first")]
    NotValid { path: String },

    #[error("Failed to instantiate '{path}': {reason}")]
    InstantiationFailed { path: String, reason: String },

    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("Uncaught exception in '{path}': {message}")]
    Exception { path: String, message: String },

    #[error("Script '{path}' contains invalid UTF-8")]
    InvalidData { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Script engine error: {0}")]
    Engine(String),
}

impl From<rquickjs::Error> for ScriptError {
    fn from(err: rquickjs::Error) -> Self {
        ScriptError::Engine(err.to_string())
    }
}

/// 跨边界调用错误
///
/// `ArgumentCount` 与 `InvalidArgument` 合称 ArgumentError。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("Method '{method}' not found on '{class}'")]
    MethodNotFound { class: String, method: String },

    #[error("Invalid method '{0}'")]
    InvalidMethod(String),

    #[error("Expected {expected} arguments, got {given}")]
    ArgumentCount { expected: usize, given: usize },

    #[error("Invalid argument {index}: expected {expected}, found {found}")]
    InvalidArgument {
        index: usize,
        expected: VariantType,
        found: VariantType,
    },

    #[error("Instance is null or already freed")]
    InstanceIsNull,

    #[error("Script exception: {0}")]
    ScriptException(String),
}

impl CallError {
    /// 参数个数或参数类型不匹配
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            CallError::ArgumentCount { .. } | CallError::InvalidArgument { .. }
        )
    }
}

/// 绑定层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("Class '{0}' has no script binding")]
    UnregisteredClass(String),

    #[error("Class '{0}' cannot be instantiated")]
    NotInstantiable(String),

    #[error("Parent '{parent}' of '{class}' must be registered first")]
    ParentNotRegistered { class: String, parent: String },

    #[error("Bindings can only be rebuilt while no script is reloading")]
    ReloadWindowClosed,
}

/// 结果类型别名
pub type ScriptResult<T> = Result<T, ScriptError>;
pub type CallResult<T> = Result<T, CallError>;
pub type RegistryResult<T> = Result<T, BindingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let binding_err = BindingError::UnregisteredClass("Sprite".to_string());
        let script_err: ScriptError = binding_err.into();
        assert!(matches!(script_err, ScriptError::Binding(_)));
    }

    #[test]
    fn test_argument_error_family() {
        assert!(CallError::ArgumentCount { expected: 1, given: 2 }.is_argument_error());
        assert!(CallError::InvalidArgument {
            index: 0,
            expected: VariantType::Int,
            found: VariantType::String,
        }
        .is_argument_error());
        assert!(!CallError::InvalidMethod("foo".into()).is_argument_error());
    }

    #[test]
    fn test_error_display() {
        let err = ScriptError::AlreadyInUse {
            path: "res://player.js".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Script 'res://player.js' is already in use by live instances"
        );
    }
}
