/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量和运行时动态调整
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogLevel, LoggingConfig};

use crate::impl_default;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 脚本语言主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// 脚本引擎运行时
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// 绑定生成
    #[serde(default)]
    pub binding: BindingConfig,

    /// 脚本资源
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// QuickJS 运行时限制
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 内存上限（字节），0 表示不限制
    pub memory_limit: usize,
    /// GC 触发阈值（字节）
    pub gc_threshold: usize,
    /// 最大栈大小（字节），0 表示使用引擎默认值
    pub max_stack_size: usize,
}

impl_default!(RuntimeConfig {
    memory_limit: 0,
    gc_threshold: 256 * 1024,
    max_stack_size: 0,
});

/// 绑定生成配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    /// 宿主根类在脚本侧的名字（不能是 `Object`）
    pub root_class_alias: String,
    /// 宿主总是会探测的可选生命周期钩子，脚本未定义时视为成功的空调用
    pub optional_hooks: Vec<String>,
    /// 值转换的最大嵌套深度
    pub max_marshal_depth: usize,
    /// 是否注册内置复合值类型
    pub register_builtins: bool,
}

impl_default!(BindingConfig {
    root_class_alias: "EngineObject".to_string(),
    optional_hooks: vec![
        "_unhandled_input".to_string(),
        "_input".to_string(),
        "_process".to_string(),
        "_physics_process".to_string(),
        "_ready".to_string(),
        "_notification".to_string(),
    ],
    max_marshal_depth: 64,
    register_builtins: true,
});

impl BindingConfig {
    pub fn is_optional_hook(&self, method: &str) -> bool {
        self.optional_hooks.iter().any(|hook| hook == method)
    }
}

/// 脚本资源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// 保存后立即重载
    pub reload_on_save: bool,
    /// 热重载监视目录
    pub watch_directory: Option<PathBuf>,
    /// 脚本文件扩展名
    pub extension: String,
}

impl_default!(ScriptsConfig {
    reload_on_save: true,
    watch_directory: None,
    extension: "js".to_string(),
});

impl LanguageConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("JS_MEMORY_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.runtime.memory_limit = limit;
            }
        }
        if let Ok(val) = env::var("JS_GC_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.runtime.gc_threshold = threshold;
            }
        }
        if let Ok(val) = env::var("JS_ROOT_CLASS_ALIAS") {
            if !val.is_empty() {
                self.binding.root_class_alias = val;
            }
        }
        if let Ok(val) = env::var("JS_MAX_MARSHAL_DEPTH") {
            if let Ok(depth) = val.parse() {
                self.binding.max_marshal_depth = depth;
            }
        }
        if let Ok(val) = env::var("JS_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                self.logging.level = level;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        let alias = &self.binding.root_class_alias;
        let is_identifier = alias
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_' || c == '$')
            && alias
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if !is_identifier {
            return Err(ConfigError::ValidationError(format!(
                "root_class_alias '{}' is not a valid identifier",
                alias
            )));
        }
        if alias == "Object" {
            return Err(ConfigError::ValidationError(
                "root_class_alias must not shadow the script engine's Object".to_string(),
            ));
        }
        if self.binding.max_marshal_depth == 0 {
            return Err(ConfigError::ValidationError(
                "max_marshal_depth must be greater than 0".to_string(),
            ));
        }
        if self.scripts.extension.is_empty() || self.scripts.extension.starts_with('.') {
            return Err(ConfigError::ValidationError(format!(
                "script extension '{}' must be non-empty and given without a dot",
                self.scripts.extension
            )));
        }
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./game_engine_js.toml
    /// 2. ./game_engine_js.json
    /// 3. ~/.config/game_engine/js.toml
    /// 4. 使用默认配置
    pub fn load_or_default() -> Self {
        if let Ok(config) = Self::from_toml_file("game_engine_js.toml") {
            tracing::info!(target: "script", "Loaded config from game_engine_js.toml");
            return config;
        }

        if let Ok(config) = Self::from_json_file("game_engine_js.json") {
            tracing::info!(target: "script", "Loaded config from game_engine_js.json");
            return config;
        }

        if let Some(home) = env::var_os("HOME") {
            let config_path = PathBuf::from(home)
                .join(".config")
                .join("game_engine")
                .join("js.toml");

            if let Ok(config) = Self::from_toml_file(&config_path) {
                tracing::info!(target: "script", "Loaded config from {:?}", config_path);
                return config;
            }
        }

        tracing::info!(target: "script", "Using default configuration");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LanguageConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.binding.root_class_alias, "EngineObject");
        assert!(config.binding.is_optional_hook("_unhandled_input"));
        assert!(!config.binding.is_optional_hook("methodOne"));
    }

    #[test]
    fn test_toml_partial_sections() {
        let config = LanguageConfig::from_toml_str(
            r#"
            [binding]
            root_class_alias = "HostObject"
            optional_hooks = []
            max_marshal_depth = 8
            register_builtins = false
            "#,
        )
        .unwrap();
        assert_eq!(config.binding.root_class_alias, "HostObject");
        assert!(!config.binding.register_builtins);
        assert_eq!(config.runtime.gc_threshold, 256 * 1024);
        assert_eq!(config.scripts.extension, "js");
    }

    #[test]
    fn test_json_serialization() {
        let config = LanguageConfig::default();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed = LanguageConfig::from_json_str(&json_str).unwrap();
        assert_eq!(
            config.binding.max_marshal_depth,
            parsed.binding.max_marshal_depth
        );
    }

    #[test]
    fn test_validation_rejects_object_alias() {
        let mut config = LanguageConfig::default();
        config.binding.root_class_alias = "Object".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        config.binding.root_class_alias = "9lives".to_string();
        assert!(config.validate().is_err());

        config.binding.root_class_alias = "EngineObject".to_string();
        config.binding.max_marshal_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("js.toml");
        let mut config = LanguageConfig::default();
        config.runtime.memory_limit = 1 << 20;
        config.save_toml(&path).unwrap();

        let loaded = LanguageConfig::from_toml_file(&path).unwrap();
        assert_eq!(loaded.runtime.memory_limit, 1 << 20);
    }
}
