//! JavaScript 语言驱动
//!
//! 负责运行时的生命周期：`init` 创建 QuickJS 运行时与上下文、构建类注册表并
//! 注册全部绑定；`finish` 销毁运行时，脚本自有的宿主对象随包装器一起销毁。
//! 其余是编辑器需要的语言元数据、全局求值与重载入口。

use super::debug::{DebugHandle, DebugQueue, DebugReply, DebugRequest};
use super::hot_reload::{same_file, HotReloadError, ScriptWatcher};
use super::resource::ScriptResource;
use super::LanguageShared;
use crate::config::LanguageConfig;
use crate::core::error::{BindingError, ScriptError, ScriptResult};
use crate::host::HostObjectSystem;
use crate::js::marshal::{to_js, to_variant};
use crate::js::{binder, registrar, BindingSession, Bridge};
use crate::variant::{ObjectId, Variant};
use rquickjs::{Context, Runtime, Value};
use std::path::Path;
use std::rc::Rc;

pub const LANGUAGE_NAME: &str = "ECMAScript";
pub const TYPE_NAME: &str = "JavaScript";

const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "undefined", "var", "void", "while", "with", "yield",
    "arguments", "eval", "NaN", "Infinity",
];

const TEMPLATE: &str = concat!(
    "class %CLASS% extends %BASE% {\n",
    "\n",
    "    constructor() {\n",
    "        super();\n",
    "    }\n",
    "\n",
    "    _ready() {\n",
    "    }\n",
    "\n",
    "}\n",
    "\n",
    "%CLASS%;\n",
);

/// JavaScript 语言
pub struct JsLanguage {
    host: Rc<dyn HostObjectSystem>,
    config: LanguageConfig,
    shared: Option<Rc<LanguageShared>>,
    debug: DebugQueue,
}

impl JsLanguage {
    pub fn new(host: Rc<dyn HostObjectSystem>, config: LanguageConfig) -> Self {
        Self {
            host,
            config,
            shared: None,
            debug: DebugQueue::new(),
        }
    }

    pub fn config(&self) -> &LanguageConfig {
        &self.config
    }

    pub fn host(&self) -> &Rc<dyn HostObjectSystem> {
        &self.host
    }

    // ========================================================================
    // 生命周期
    // ========================================================================

    /// 创建运行时并注册绑定
    pub fn init(&mut self) -> ScriptResult<()> {
        if self.shared.is_some() {
            tracing::warn!(target: "script", "JavaScript language already initialized");
            return Ok(());
        }
        self.config
            .validate()
            .map_err(|err| ScriptError::Engine(err.to_string()))?;

        let runtime = Runtime::new()?;
        let limits = &self.config.runtime;
        if limits.memory_limit > 0 {
            runtime.set_memory_limit(limits.memory_limit);
        }
        if limits.max_stack_size > 0 {
            runtime.set_max_stack_size(limits.max_stack_size);
        }
        runtime.set_gc_threshold(limits.gc_threshold);

        let session = Rc::new(BindingSession::new(
            self.host.clone(),
            self.config.binding.clone(),
        ));
        session.rebuild()?;

        let context = Context::full(&runtime)?;
        context.with(|ctx| -> ScriptResult<()> {
            Bridge::install(&ctx)?;
            let bridge = Bridge::get(&ctx)?;
            registrar::register_all(&ctx, &session)
                .map_err(|err| ScriptError::Engine(bridge.take_exception(err)))
        })?;

        tracing::info!(
            target: "script",
            classes = session.registry.borrow().len(),
            singletons = session.singletons.borrow().len(),
            "JavaScript language initialized"
        );
        self.shared = Some(Rc::new(LanguageShared::new(
            context,
            runtime,
            session,
            self.config.clone(),
        )));
        Ok(())
    }

    /// 销毁运行时
    ///
    /// 之后所有资源与实例的操作都失败；脚本自有的宿主对象在包装器回收时
    /// 销毁，宿主自有的不受影响。
    pub fn finish(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        let scripts = shared.live_scripts().len();
        drop(shared);
        tracing::info!(target: "script", scripts, "JavaScript language finished");
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.is_some()
    }

    fn shared(&self) -> ScriptResult<&Rc<LanguageShared>> {
        self.shared
            .as_ref()
            .ok_or_else(|| ScriptError::Engine("Script language is not initialized".to_string()))
    }

    // ========================================================================
    // 语言元数据
    // ========================================================================

    pub fn name(&self) -> &'static str {
        LANGUAGE_NAME
    }

    pub fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    pub fn extension(&self) -> &str {
        &self.config.scripts.extension
    }

    pub fn recognized_extensions(&self) -> Vec<String> {
        vec![self.config.scripts.extension.clone()]
    }

    pub fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED_WORDS
    }

    pub fn is_reserved_word(&self, word: &str) -> bool {
        RESERVED_WORDS.contains(&word)
    }

    pub fn comment_delimiters(&self) -> &'static [&'static str] {
        &["//", "/* */"]
    }

    pub fn string_delimiters(&self) -> &'static [&'static str] {
        &["' '", "\" \"", "` `"]
    }

    /// 新脚本模板的源码
    ///
    /// 基类与类同名时通过 `globalThis` 引用，宿主根类换成脚本侧别名。
    pub fn template_source(&self, class: &str, base: &str) -> String {
        let alias = &self.config.binding.root_class_alias;
        let base = if base == self.host.root_class() || base == "Object" {
            alias.clone()
        } else if base == class {
            format!("globalThis.{}", base)
        } else {
            base.to_string()
        };
        TEMPLATE.replace("%BASE%", &base).replace("%CLASS%", class)
    }

    pub fn template(&self, class: &str, base: &str) -> ScriptResult<ScriptResource> {
        let script = self.create_script()?;
        script.set_source(self.template_source(class, base));
        script.set_path(class);
        Ok(script)
    }

    /// 编辑器插入的方法骨架；参数里的类型标注被去掉
    pub fn make_function(&self, _class: &str, name: &str, args: &[&str]) -> String {
        let args = args
            .iter()
            .map(|arg| arg.split(':').next().unwrap_or(arg).trim())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "    {}({}) {{\n        // Replace with function body.\n    }}\n",
            name, args
        )
    }

    // ========================================================================
    // 脚本
    // ========================================================================

    pub fn create_script(&self) -> ScriptResult<ScriptResource> {
        Ok(ScriptResource::new(self.shared()?))
    }

    /// 只编译不执行
    pub fn validate(&self, source: &str, path: &str) -> ScriptResult<()> {
        let message = self.shared()?.with(|bridge| match bridge.validate(source) {
            Ok(()) => Ok(None),
            Err(err) => Ok(Some(bridge.take_exception(err))),
        })?;
        match message {
            None => Ok(()),
            Some(message) => Err(ScriptError::CompilationFailed {
                path: path.to_string(),
                message,
            }),
        }
    }

    /// 在全局作用域执行源码，返回最后一个表达式的值
    pub fn execute_source(&self, path: &str, source: &str) -> ScriptResult<Variant> {
        let shared = self.shared()?;
        let session = shared.session.clone();
        let result = shared.with(|bridge| match bridge.ctx().eval::<Value, _>(source) {
            Ok(value) => Ok(Ok(to_variant(bridge, &session, &value))),
            Err(err) => Ok(Err(bridge.take_exception(err))),
        })?;
        result.map_err(|message| {
            tracing::error!(target: "script", path, error = %message, "Uncaught exception");
            shared.set_last_error(message.clone());
            ScriptError::Exception {
                path: path.to_string(),
                message,
            }
        })
    }

    pub fn add_global_constant(&self, name: &str, value: &Variant) -> ScriptResult<()> {
        let shared = self.shared()?;
        let session = shared.session.clone();
        shared.with(|bridge| {
            let value = to_js(bridge, &session, value)?;
            bridge.ctx().globals().set(name, value)?;
            Ok(())
        })
    }

    // ========================================================================
    // 调试
    // ========================================================================

    pub fn debug_get_error(&self) -> Option<String> {
        self.shared.as_ref().and_then(|shared| shared.last_error())
    }

    pub fn debug_get_globals(&self) -> ScriptResult<Vec<String>> {
        self.shared()?.with(|bridge| Ok(bridge.globals()?))
    }

    /// 调试器请求句柄，可以发往其它线程
    pub fn debug_handle(&self) -> DebugHandle {
        self.debug.handle()
    }

    /// 在脚本线程上处理排队的调试请求，返回处理的数量
    pub fn poll_debug_requests(&self) -> usize {
        let pending = self.debug.drain();
        let count = pending.len();
        for envelope in pending {
            let reply = self.answer(&envelope.request);
            if envelope.reply.send(reply).is_err() {
                tracing::debug!(target: "script.debug", request = ?envelope.request, "Debugger dropped the reply channel");
            }
        }
        count
    }

    fn answer(&self, request: &DebugRequest) -> DebugReply {
        tracing::debug!(target: "script.debug", ?request, "Debug request");
        match request {
            DebugRequest::Eval { expression } => match self.execute_source("<debugger>", expression) {
                Ok(value) => DebugReply::Value { value },
                Err(err) => DebugReply::Error {
                    message: err.to_string(),
                },
            },
            DebugRequest::Globals => match self.debug_get_globals() {
                Ok(names) => DebugReply::Globals { names },
                Err(err) => DebugReply::Error {
                    message: err.to_string(),
                },
            },
            DebugRequest::LastError => DebugReply::LastError {
                message: self.debug_get_error(),
            },
        }
    }

    // ========================================================================
    // 重载
    // ========================================================================

    /// 重载所有有源码的脚本（保留状态）；返回成功的数量
    pub fn reload_all_scripts(&self) -> ScriptResult<usize> {
        let mut reloaded = 0;
        for state in self.shared()?.live_scripts() {
            let script = ScriptResource::from_state(state);
            if !script.has_source() {
                continue;
            }
            match script.reload(true) {
                Ok(()) => reloaded += 1,
                Err(err) => tracing::error!(target: "script", path = %script.path(), error = %err, "Reload failed"),
            }
        }
        Ok(reloaded)
    }

    pub fn reload_tool_script(&self, script: &ScriptResource, soft_reload: bool) -> ScriptResult<()> {
        self.shared()?;
        script.reload(soft_reload)
    }

    /// 整树重建绑定；只能在没有脚本正在重载时进行
    pub fn reload_bindings(&self) -> ScriptResult<()> {
        let shared = self.shared()?;
        if shared
            .live_scripts()
            .iter()
            .any(|state| state.borrow().reloading.is_some())
        {
            return Err(BindingError::ReloadWindowClosed.into());
        }

        shared.session.rebuild()?;
        let session = shared.session.clone();
        shared.with(|bridge| {
            registrar::register_all(bridge.ctx(), &session)
                .map_err(|err| ScriptError::Engine(bridge.take_exception(err)))
        })?;
        tracing::info!(target: "script.binding", generation = session.registry.borrow().generation(), "Bindings reloaded");
        Ok(())
    }

    /// 轮询文件监视器，重载被修改的脚本；返回重载成功的数量
    pub fn poll_hot_reload(&self, watcher: &ScriptWatcher) -> usize {
        let changed = watcher.drain();
        if changed.is_empty() {
            return 0;
        }
        let Ok(shared) = self.shared() else {
            return 0;
        };

        let mut reloaded = 0;
        for state in shared.live_scripts() {
            let script = ScriptResource::from_state(state);
            let path = script.path();
            let Some(file) = changed
                .iter()
                .find(|file| same_file(file, Path::new(&path)))
            else {
                continue;
            };
            let source = match std::fs::read_to_string(file) {
                Ok(source) => source,
                Err(err) => {
                    tracing::warn!(target: "script", path = %file.display(), error = %err, "Cannot read changed script");
                    continue;
                }
            };
            script.set_source(source);
            match script.reload(true) {
                Ok(()) => {
                    tracing::info!(target: "script", path = %path, "Hot reloaded script");
                    reloaded += 1;
                }
                Err(err) => tracing::error!(target: "script", path = %path, error = %err, "Hot reload failed"),
            }
        }
        reloaded
    }

    /// 按 `[scripts] watch_directory` 创建监视器；未配置目录时返回 `None`
    pub fn watch_scripts(&self) -> Result<Option<ScriptWatcher>, HotReloadError> {
        let scripts = &self.config.scripts;
        match scripts.watch_directory.as_ref() {
            Some(directory) => ScriptWatcher::new(directory, scripts.extension.as_str()).map(Some),
            None => Ok(None),
        }
    }

    /// 监视器报告 `path` 被修改时重新读入并求值
    pub fn rerun_if_changed(&self, watcher: &ScriptWatcher, path: &Path) -> ScriptResult<Option<Variant>> {
        let changed = watcher.drain();
        if !changed.iter().any(|file| same_file(file, path)) {
            return Ok(None);
        }
        let source = std::fs::read_to_string(path)?;
        let shown = path.display().to_string();
        tracing::info!(target: "script", path = %shown, "Re-running changed script");
        self.execute_source(&shown, &source).map(Some)
    }

    // ========================================================================
    // 宿主通知
    // ========================================================================

    /// 宿主已经销毁了对象：解除包装器并释放挂在它上面的脚本实例
    pub fn object_destroyed(&self, object: ObjectId) -> ScriptResult<()> {
        let shared = self.shared()?;
        let released: Vec<u64> = shared
            .live_scripts()
            .iter()
            .filter_map(|state| state.borrow_mut().instances.remove(&object))
            .collect();

        let session = shared.session.clone();
        shared.with(|bridge| {
            binder::release_native(bridge, &session, object)?;
            for key in released {
                bridge.drop_instance(key)?;
            }
            Ok(())
        })
    }

    /// 处理挂起的释放并执行一次完整 GC
    pub fn collect_garbage(&self) -> ScriptResult<()> {
        let shared = self.shared()?;
        shared.with(|_| Ok(()))?;
        shared.run_gc();
        Ok(())
    }

    /// 当前活动的宿主对象包装器数量
    pub fn live_wrappers(&self) -> usize {
        self.shared
            .as_ref()
            .map(|shared| shared.session.wrappers.borrow().len())
            .unwrap_or(0)
    }
}

impl Drop for JsLanguage {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::demo_class_db;

    fn language() -> JsLanguage {
        let mut language = JsLanguage::new(Rc::new(demo_class_db()), LanguageConfig::default());
        language.init().unwrap();
        language
    }

    #[test]
    fn test_metadata() {
        let language = JsLanguage::new(Rc::new(demo_class_db()), LanguageConfig::default());
        assert_eq!(language.name(), "ECMAScript");
        assert_eq!(language.extension(), "js");
        assert!(language.is_reserved_word("class"));
        assert!(!language.is_reserved_word("player"));
        assert!(!language.is_initialized());
    }

    #[test]
    fn test_template_renames_base() {
        let language = JsLanguage::new(Rc::new(demo_class_db()), LanguageConfig::default());
        let source = language.template_source("Player", "Object");
        assert!(source.starts_with("class Player extends EngineObject {"));
        assert!(source.trim_end().ends_with("Player;"));

        let source = language.template_source("Node", "Node");
        assert!(source.contains("extends globalThis.Node"));
    }

    #[test]
    fn test_make_function_strips_types() {
        let language = JsLanguage::new(Rc::new(demo_class_db()), LanguageConfig::default());
        let text = language.make_function("Player", "_on_hit", &["damage:int", "source"]);
        assert!(text.starts_with("    _on_hit(damage, source) {"));
    }

    #[test]
    fn test_execute_and_globals() {
        let language = language();
        assert_eq!(language.execute_source("test", "1 + 2").unwrap(), Variant::Int(3));
        assert_eq!(language.execute_source("test", "0.5").unwrap(), Variant::Real(0.5));

        let globals = language.debug_get_globals().unwrap();
        assert!(globals.iter().any(|g| g == "EngineObject"));
        assert!(globals.iter().any(|g| g == "Engine"));
        assert!(!globals.iter().any(|g| g == "__bridge"));
    }

    #[test]
    fn test_uncaught_exception_is_recorded() {
        let language = language();
        let err = language
            .execute_source("boom.js", "throw new RangeError('boom')")
            .unwrap_err();
        assert!(matches!(err, ScriptError::Exception { .. }));
        assert_eq!(language.debug_get_error().as_deref(), Some("RangeError: boom"));
    }

    #[test]
    fn test_validate_does_not_execute() {
        let language = language();
        language.validate("globalThis.touched = true;", "a.js").unwrap();
        assert_eq!(
            language.execute_source("check", "typeof touched").unwrap(),
            Variant::from("undefined")
        );
        assert!(matches!(
            language.validate("function (", "b.js"),
            Err(ScriptError::CompilationFailed { .. })
        ));
    }

    #[test]
    fn test_print_family_installed() {
        let language = language();
        for name in ["print", "printt", "prints", "printerr", "printe", "printraw", "printd"] {
            assert_eq!(
                language.execute_source("test", &format!("typeof {}", name)).unwrap(),
                Variant::from("function")
            );
        }
        assert_eq!(
            language
                .execute_source("test", "print('pos', new Vector2(1, 2), [1, 'a'])")
                .unwrap(),
            Variant::Nil
        );
        assert_eq!(language.execute_source("test", "printe('oops')").unwrap(), Variant::Nil);
    }

    #[test]
    fn test_watch_scripts_follows_config() {
        let language = language();
        assert!(language.watch_scripts().unwrap().is_none());

        let dir = tempfile::tempdir().unwrap();
        let mut config = LanguageConfig::default();
        config.scripts.watch_directory = Some(dir.path().join("scripts"));
        let mut language = JsLanguage::new(Rc::new(demo_class_db()), config);
        language.init().unwrap();

        let watcher = language.watch_scripts().unwrap().unwrap();
        assert_eq!(watcher.directory(), dir.path().join("scripts"));
        assert_eq!(watcher.extension(), "js");

        let main = dir.path().join("scripts").join("main.js");
        std::fs::write(&main, "40 + 2").unwrap();
        watcher.notify_changed(&main);
        assert_eq!(
            language.rerun_if_changed(&watcher, &main).unwrap(),
            Some(Variant::Int(42))
        );
    }

    #[test]
    fn test_operations_fail_before_init() {
        let language = JsLanguage::new(Rc::new(demo_class_db()), LanguageConfig::default());
        assert!(language.create_script().is_err());
        assert!(language.execute_source("x", "1").is_err());
    }

    #[test]
    fn test_debug_requests_answered_on_poll() {
        let language = language();
        let handle = language.debug_handle();
        let reply = handle
            .submit(DebugRequest::Eval {
                expression: "6 * 7".into(),
            })
            .unwrap();
        assert_eq!(language.poll_debug_requests(), 1);
        match reply.recv().unwrap() {
            DebugReply::Value { value } => assert_eq!(value, Variant::Int(42)),
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
