//! 脚本资源
//!
//! 状态机：`Empty -> set_source -> Unreloaded -> reload -> Valid | Invalid`。
//! 有活实例时不带 `keep_state` 的重载失败，资源保持原状态。
//!
//! 源码求值的结果就是构造函数（`exports = function () {...}` 或以类名结尾的
//! 脚本都满足这一约定）。

use super::instance::ScriptInstance;
use super::{LanguageShared, PendingRelease};
use crate::core::error::{ScriptError, ScriptResult};
use crate::js::binder;
use crate::js::Discovered;
use crate::js::session::Adoption;
use crate::variant::ObjectId;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

/// 资源状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStatus {
    /// 还没有源码
    Empty,
    /// 有源码但从未编译
    Unreloaded,
    Valid,
    Invalid,
}

pub(crate) struct ResourceState {
    pub(crate) key: u64,
    pub(crate) path: String,
    pub(crate) source: Option<String>,
    pub(crate) status: ScriptStatus,
    /// 正在重载（以及是否保留状态）
    pub(crate) reloading: Option<bool>,
    pub(crate) members: BTreeSet<String>,
    pub(crate) methods: BTreeSet<String>,
    pub(crate) signals: BTreeSet<String>,
    /// 宿主对象 -> 实例键
    pub(crate) instances: BTreeMap<ObjectId, u64>,
    shared: Weak<LanguageShared>,
}

impl ResourceState {
    fn apply(&mut self, found: Discovered) {
        self.methods = found.methods.into_iter().collect();
        self.members = found.members.into_iter().collect();
        self.signals = found.signals.into_iter().collect();
    }

    fn clear_discovered(&mut self) {
        self.methods.clear();
        self.members.clear();
        self.signals.clear();
    }
}

impl Drop for ResourceState {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.queue_release(PendingRelease::Script(self.key));
        }
    }
}

/// 脚本资源句柄；克隆得到同一资源
#[derive(Clone)]
pub struct ScriptResource {
    pub(crate) state: Rc<RefCell<ResourceState>>,
}

impl ScriptResource {
    pub(crate) fn new(shared: &Rc<LanguageShared>) -> Self {
        let state = Rc::new(RefCell::new(ResourceState {
            key: shared.next_key(),
            path: String::new(),
            source: None,
            status: ScriptStatus::Empty,
            reloading: None,
            members: BTreeSet::new(),
            methods: BTreeSet::new(),
            signals: BTreeSet::new(),
            instances: BTreeMap::new(),
            shared: Rc::downgrade(shared),
        }));
        shared.track(&state);
        Self { state }
    }

    pub(crate) fn from_state(state: Rc<RefCell<ResourceState>>) -> Self {
        Self { state }
    }

    pub(crate) fn shared(&self) -> ScriptResult<Rc<LanguageShared>> {
        self.state
            .borrow()
            .shared
            .upgrade()
            .ok_or_else(|| ScriptError::Engine("Script language is not initialized".to_string()))
    }

    pub fn path(&self) -> String {
        self.state.borrow().path.clone()
    }

    pub fn set_path(&self, path: impl Into<String>) {
        self.state.borrow_mut().path = path.into();
    }

    pub fn source(&self) -> Option<String> {
        self.state.borrow().source.clone()
    }

    pub fn has_source(&self) -> bool {
        self.state.borrow().source.is_some()
    }

    /// 设置源码；之后需要重新 `reload`
    pub fn set_source(&self, source: impl Into<String>) {
        let mut state = self.state.borrow_mut();
        state.source = Some(source.into());
        if state.status == ScriptStatus::Empty {
            state.status = ScriptStatus::Unreloaded;
        }
    }

    pub fn status(&self) -> ScriptStatus {
        self.state.borrow().status
    }

    pub fn is_valid(&self) -> bool {
        self.status() == ScriptStatus::Valid
    }

    pub fn can_instance(&self) -> bool {
        self.is_valid() && self.shared().is_ok()
    }

    pub fn language_name(&self) -> &'static str {
        super::language::LANGUAGE_NAME
    }

    pub fn is_same(&self, other: &ScriptResource) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    // ========================================================================
    // 重载
    // ========================================================================

    /// 重新求值源码
    ///
    /// 有活实例且 `keep_state == false` 时先于编译失败，不论源码是否合法。
    /// `keep_state` 时已有实例换到新原型上。
    pub fn reload(&self, keep_state: bool) -> ScriptResult<()> {
        let (key, path, source, live) = {
            let state = self.state.borrow();
            (
                state.key,
                state.path.clone(),
                state.source.clone(),
                state.instances.values().copied().collect::<Vec<_>>(),
            )
        };

        if !live.is_empty() && !keep_state {
            tracing::warn!(target: "script", path = %path, instances = live.len(), "Reload refused, script has live instances");
            return Err(ScriptError::AlreadyInUse { path });
        }

        let shared = self.shared()?;
        let Some(source) = source else {
            self.fail(&shared, &path, "Script has no source".to_string());
            return Err(ScriptError::CompilationFailed {
                path,
                message: "Script has no source".to_string(),
            });
        };

        self.state.borrow_mut().reloading = Some(keep_state);
        let result = shared.with(|bridge| {
            let ctx = bridge.ctx();
            // 块作用域让类声明在重载时可以重新声明
            let unit = format!("{{\n{}\n}}", source);
            let value = match ctx.eval::<rquickjs::Value, _>(unit) {
                Ok(value) => value,
                Err(err) => return Ok(Err(bridge.take_exception(err))),
            };
            if !value.is_function() {
                return Ok(Err(format!(
                    "Script must evaluate to a constructor, got {:?}",
                    value.type_of()
                )));
            }

            let proto = bridge.field(&value, "prototype")?;
            let found = bridge.inspect(&proto)?;

            let previous = bridge.script(key)?;
            bridge.set_script(key, &value)?;
            if let Some(previous) = previous {
                let old_proto = bridge.field(&previous.into_value(), "prototype")?;
                for instance in &live {
                    if let Some(object) = bridge.instance(*instance)? {
                        bridge.rebase(&object.into_value(), &old_proto, &proto)?;
                    }
                }
            }
            Ok(Ok(found))
        });
        self.state.borrow_mut().reloading = None;

        match result? {
            Ok(found) => {
                let mut state = self.state.borrow_mut();
                state.apply(found);
                state.status = ScriptStatus::Valid;
                tracing::debug!(
                    target: "script",
                    path = %path,
                    methods = state.methods.len(),
                    members = state.members.len(),
                    signals = state.signals.len(),
                    "Script reloaded"
                );
                Ok(())
            }
            Err(message) => {
                self.fail(&shared, &path, message.clone());
                Err(ScriptError::CompilationFailed { path, message })
            }
        }
    }

    fn fail(&self, shared: &LanguageShared, path: &str, message: String) {
        tracing::error!(target: "script", path, error = %message, "Script compilation failed");
        shared.set_last_error(message);
        let mut state = self.state.borrow_mut();
        state.status = ScriptStatus::Invalid;
        state.clear_discovered();
    }

    // ========================================================================
    // 实例
    // ========================================================================

    /// 为宿主对象创建脚本实例（绑定路径）
    pub fn instance_create(&self, owner: ObjectId) -> ScriptResult<ScriptInstance> {
        let (key, path, discovered) = {
            let state = self.state.borrow();
            if state.reloading == Some(false) {
                return Err(ScriptError::AlreadyInUse {
                    path: state.path.clone(),
                });
            }
            if state.status != ScriptStatus::Valid {
                return Err(ScriptError::NotValid {
                    path: state.path.clone(),
                });
            }
            if state.instances.contains_key(&owner) {
                return Err(ScriptError::InstantiationFailed {
                    path: state.path.clone(),
                    reason: format!("object {} already has an instance of this script", owner),
                });
            }
            (
                state.key,
                state.path.clone(),
                !state.methods.is_empty() || !state.members.is_empty(),
            )
        };

        let shared = self.shared()?;
        if !shared.session.host.is_alive(owner) {
            return Err(ScriptError::InstantiationFailed {
                path,
                reason: format!("object {} does not exist", owner),
            });
        }

        let instance_key = shared.next_key();
        let session = shared.session.clone();
        let result = shared.with(|bridge| {
            let Some(ctor) = bridge.script(key)? else {
                return Ok(Err("Script has no compiled constructor".to_string()));
            };

            session.adopting.set(Some(Adoption { owner, script: key }));
            let constructed = bridge.construct(&ctor);
            session.adopting.set(None);
            let object = match constructed {
                Ok(object) => object,
                Err(err) => return Ok(Err(bridge.take_exception(err))),
            };
            if !object.is_object() {
                return Ok(Err("Constructor did not return an object".to_string()));
            }

            let wrapper = binder::wrap_native(bridge, &session, owner)?;
            if wrapper.is_null() {
                return Ok(Err(format!("object {} has no registered class", owner)));
            }
            let adopted = crate::js::classes::slot_of(bridge.ctx(), &object)
                .is_some_and(|(object, _, _)| object == owner);
            if !adopted && !bridge.attach(&object, &wrapper)? {
                tracing::warn!(target: "script", %owner, "Instance object is not extensible, owner link not attached");
            }
            bridge.set_instance(instance_key, &object)?;

            let found = if discovered {
                None
            } else {
                Some(bridge.inspect(&object)?)
            };
            Ok(Ok(found))
        })?;

        match result {
            Ok(found) => {
                let mut state = self.state.borrow_mut();
                if let Some(found) = found {
                    state.apply(found);
                }
                state.instances.insert(owner, instance_key);
                tracing::trace!(target: "script", path = %path, %owner, "Script instance created");
                Ok(ScriptInstance::new(instance_key, owner, self.clone()))
            }
            Err(reason) => {
                shared.set_last_error(reason.clone());
                Err(ScriptError::InstantiationFailed { path, reason })
            }
        }
    }

    pub fn instance_has(&self, owner: ObjectId) -> bool {
        self.state.borrow().instances.contains_key(&owner)
    }

    pub fn instance_count(&self) -> usize {
        self.state.borrow().instances.len()
    }

    // ========================================================================
    // 成员发现
    // ========================================================================

    pub fn has_method(&self, name: &str) -> bool {
        self.state.borrow().methods.contains(name)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.state.borrow().members.contains(name)
    }

    pub fn has_script_signal(&self, name: &str) -> bool {
        self.state.borrow().signals.contains(name)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.state.borrow().methods.iter().cloned().collect()
    }

    pub fn member_names(&self) -> Vec<String> {
        self.state.borrow().members.iter().cloned().collect()
    }

    pub fn signal_names(&self) -> Vec<String> {
        self.state.borrow().signals.iter().cloned().collect()
    }
}

impl std::fmt::Debug for ScriptResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ScriptResource")
            .field("path", &state.path)
            .field("status", &state.status)
            .field("instances", &state.instances.len())
            .finish()
    }
}
