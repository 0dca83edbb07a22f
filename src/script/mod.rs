//! 脚本语言层
//!
//! - [`JsLanguage`]：语言驱动，负责运行时生命周期与全局操作
//! - [`ScriptResource`]：一个脚本源文件及其编译结果
//! - [`ScriptInstance`]：脚本对象与宿主对象的一次绑定
//! - [`JsResourceLoader`] / [`JsResourceSaver`]：脚本文件读写
//! - [`ScriptWatcher`]：基于文件监视的热重载
//! - [`DebugHandle`]：调试器侧信道（跨线程请求队列）
//!
//! 所有脚本操作都在持有语言的线程上执行；唯一的跨线程入口是调试请求队列。

pub mod debug;
pub mod hot_reload;
pub mod instance;
pub mod language;
pub mod loader;
pub mod resource;

pub use debug::{DebugHandle, DebugReply, DebugRequest};
pub use hot_reload::ScriptWatcher;
pub use instance::ScriptInstance;
pub use language::JsLanguage;
pub use loader::{JsResourceLoader, JsResourceSaver};
pub use resource::{ScriptResource, ScriptStatus};

use crate::config::LanguageConfig;
use crate::core::error::{ScriptError, ScriptResult};
use crate::js::{binder, BindingSession, Bridge};
use resource::ResourceState;
use rquickjs::{Context, Runtime};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// 等下一次进入上下文时才能执行的脚本侧释放
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingRelease {
    Script(u64),
    Instance(u64),
}

/// 语言初始化后的共享状态
///
/// 资源与实例只持有它的弱引用；`finish()` 之后它们的操作全部失败。
pub(crate) struct LanguageShared {
    context: Context,
    runtime: Runtime,
    pub(crate) session: Rc<BindingSession>,
    pub(crate) config: LanguageConfig,
    pending: RefCell<Vec<PendingRelease>>,
    in_context: Cell<bool>,
    next_key: Cell<u64>,
    last_error: RefCell<Option<String>>,
    scripts: RefCell<Vec<Weak<RefCell<ResourceState>>>>,
}

/// 进入上下文的标记，离开作用域时清除
struct EntryGuard<'a>(&'a Cell<bool>);

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl LanguageShared {
    pub(crate) fn new(
        context: Context,
        runtime: Runtime,
        session: Rc<BindingSession>,
        config: LanguageConfig,
    ) -> Self {
        Self {
            context,
            runtime,
            session,
            config,
            pending: RefCell::new(Vec::new()),
            in_context: Cell::new(false),
            next_key: Cell::new(1),
            last_error: RefCell::new(None),
            scripts: RefCell::new(Vec::new()),
        }
    }

    /// 进入脚本上下文
    ///
    /// 不允许嵌套：宿主回调里再次进入会得到 `Engine` 错误。进入时先处理
    /// 挂起的释放。
    pub(crate) fn with<R>(&self, f: impl for<'js> FnOnce(&Bridge<'js>) -> ScriptResult<R>) -> ScriptResult<R> {
        if self.in_context.replace(true) {
            return Err(ScriptError::Engine(
                "Script context is already entered on this thread".to_string(),
            ));
        }
        let _guard = EntryGuard(&self.in_context);

        self.context.with(|ctx| {
            let bridge = Bridge::get(&ctx)?;
            self.flush_pending(&bridge)?;
            f(&bridge)
        })
    }

    fn flush_pending(&self, bridge: &Bridge<'_>) -> ScriptResult<()> {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        for release in pending {
            match release {
                PendingRelease::Script(key) => bridge.drop_script(key)?,
                PendingRelease::Instance(key) => {
                    if let Some(object) = bridge.instance(key)? {
                        binder::restore_prototype(bridge, &self.session, &object.into_value())?;
                    }
                    bridge.drop_instance(key)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn queue_release(&self, release: PendingRelease) {
        self.pending.borrow_mut().push(release);
    }

    pub(crate) fn next_key(&self) -> u64 {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        key
    }

    pub(crate) fn set_last_error(&self, message: impl Into<String>) {
        *self.last_error.borrow_mut() = Some(message.into());
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub(crate) fn track(&self, script: &Rc<RefCell<ResourceState>>) {
        let mut scripts = self.scripts.borrow_mut();
        scripts.retain(|s| s.strong_count() > 0);
        scripts.push(Rc::downgrade(script));
    }

    /// 仍然存活的脚本资源
    pub(crate) fn live_scripts(&self) -> Vec<Rc<RefCell<ResourceState>>> {
        self.scripts.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn run_gc(&self) {
        self.runtime.run_gc();
    }
}
