//! 脚本文件读写

use super::language::{JsLanguage, TYPE_NAME};
use super::resource::ScriptResource;
use crate::core::error::{ScriptError, ScriptResult};
use std::path::Path;

/// `.js` 脚本加载器
#[derive(Debug, Default, Clone, Copy)]
pub struct JsResourceLoader;

impl JsResourceLoader {
    /// 读取源码并编译
    ///
    /// 编译失败只记日志，返回的资源处于 `Invalid` 状态，编辑器仍可打开它。
    pub fn load(&self, language: &JsLanguage, path: impl AsRef<Path>) -> ScriptResult<ScriptResource> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let bytes = std::fs::read(path)?;
        let source = String::from_utf8(bytes).map_err(|_| ScriptError::InvalidData {
            path: shown.clone(),
        })?;

        let script = language.create_script()?;
        script.set_path(shown.clone());
        script.set_source(source);
        if let Err(err) = script.reload(false) {
            tracing::error!(target: "script", path = %shown, error = %err, "Loaded script does not compile");
        }
        Ok(script)
    }

    pub fn recognized_extensions(&self, language: &JsLanguage) -> Vec<String> {
        language.recognized_extensions()
    }

    pub fn handles_type(&self, type_name: &str) -> bool {
        type_name == TYPE_NAME || type_name == "Script"
    }

    pub fn resource_type(&self, language: &JsLanguage, path: impl AsRef<Path>) -> Option<&'static str> {
        let extension = path.as_ref().extension()?.to_str()?;
        (extension.eq_ignore_ascii_case(language.extension())).then_some(TYPE_NAME)
    }
}

/// `.js` 脚本保存器
#[derive(Debug, Default, Clone, Copy)]
pub struct JsResourceSaver;

impl JsResourceSaver {
    /// 写出源码；配置了 `reload_on_save` 时随后软重载
    pub fn save(&self, language: &JsLanguage, path: impl AsRef<Path>, script: &ScriptResource) -> ScriptResult<()> {
        let path = path.as_ref();
        let source = script.source().unwrap_or_default();
        std::fs::write(path, source.as_bytes())?;
        tracing::debug!(target: "script", path = %path.display(), bytes = source.len(), "Script saved");

        if language.config().scripts.reload_on_save && language.is_initialized() {
            if let Err(err) = language.reload_tool_script(script, true) {
                tracing::error!(target: "script", path = %path.display(), error = %err, "Reload after save failed");
            }
        }
        Ok(())
    }

    pub fn recognizes(&self, script: &ScriptResource) -> bool {
        script.language_name() == super::language::LANGUAGE_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageConfig;
    use crate::host::demo_class_db;
    use crate::script::ScriptStatus;
    use std::rc::Rc;

    fn language() -> JsLanguage {
        let mut language = JsLanguage::new(Rc::new(demo_class_db()), LanguageConfig::default());
        language.init().unwrap();
        language
    }

    #[test]
    fn test_load_valid_and_invalid_scripts() {
        let language = language();
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("good.js");
        std::fs::write(&good, "exports = function () { this.speed = 3; }").unwrap();
        let script = JsResourceLoader.load(&language, &good).unwrap();
        assert_eq!(script.status(), ScriptStatus::Valid);
        assert_eq!(script.path(), good.display().to_string());

        let bad = dir.path().join("bad.js");
        std::fs::write(&bad, "exports = function (").unwrap();
        let script = JsResourceLoader.load(&language, &bad).unwrap();
        assert_eq!(script.status(), ScriptStatus::Invalid);
        assert!(language.debug_get_error().is_some());
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let language = language();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary.js");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            JsResourceLoader.load(&language, &path),
            Err(ScriptError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_resource_type_by_extension() {
        let language = language();
        assert_eq!(JsResourceLoader.resource_type(&language, "a/b.js"), Some(TYPE_NAME));
        assert_eq!(JsResourceLoader.resource_type(&language, "a/b.gd"), None);
        assert!(JsResourceLoader.handles_type("Script"));
    }

    #[test]
    fn test_save_then_reload() {
        let language = language();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.js");

        let script = language.create_script().unwrap();
        script.set_path(path.display().to_string());
        script.set_source(
            "exports = function () {};\nexports.prototype.jump = function () {};\nexports;",
        );
        JsResourceSaver.save(&language, &path, &script).unwrap();

        assert!(script.is_valid());
        assert!(script.has_method("jump"));
        let reloaded = JsResourceLoader.load(&language, &path).unwrap();
        assert_eq!(reloaded.source(), script.source());
    }
}
