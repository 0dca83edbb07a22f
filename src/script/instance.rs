//! 脚本实例
//!
//! 一个脚本对象与一个宿主对象的绑定。读写与调用都经过值转换器。

use super::resource::ScriptResource;
use super::PendingRelease;
use crate::core::error::{CallError, CallResult};
use crate::js::marshal::{to_js, to_variant};
use crate::variant::{ObjectId, Variant};

pub struct ScriptInstance {
    key: u64,
    owner: ObjectId,
    script: ScriptResource,
}

impl ScriptInstance {
    pub(crate) fn new(key: u64, owner: ObjectId, script: ScriptResource) -> Self {
        Self { key, owner, script }
    }

    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub fn script(&self) -> &ScriptResource {
        &self.script
    }

    /// 宿主对象销毁后实例失效
    pub fn is_live(&self) -> bool {
        self.script.state.borrow().instances.get(&self.owner) == Some(&self.key)
    }

    /// 读取脚本属性；属性不存在（或是方法）时返回 `None`，调用方可以继续
    /// 查找其它属性来源
    pub fn get(&self, name: &str) -> Option<Variant> {
        if !self.is_live() {
            return None;
        }
        let shared = self.script.shared().ok()?;
        let session = shared.session.clone();
        let key = self.key;
        let result = shared.with(|bridge| {
            let Some(object) = bridge.instance(key)? else {
                return Ok(None);
            };
            let object = object.into_value();
            if !bridge.has(&object, name)? {
                return Ok(None);
            }
            let value = bridge.field(&object, name)?;
            if value.is_function() {
                return Ok(None);
            }
            Ok(Some(to_variant(bridge, &session, &value)))
        });
        result.unwrap_or_else(|err| {
            tracing::debug!(target: "script", property = name, error = %err, "Property read failed");
            None
        })
    }

    /// 写入脚本属性；属性不存在时返回 false（未处理）
    pub fn set(&self, name: &str, value: &Variant) -> bool {
        if !self.is_live() {
            return false;
        }
        let Ok(shared) = self.script.shared() else {
            return false;
        };
        let session = shared.session.clone();
        let key = self.key;
        let result = shared.with(|bridge| {
            let Some(object) = bridge.instance(key)? else {
                return Ok(false);
            };
            let object = object.into_value();
            if !bridge.has(&object, name)? {
                return Ok(false);
            }
            let value = to_js(bridge, &session, value)?;
            match bridge.assign(&object, name, value) {
                Ok(assigned) => Ok(assigned),
                Err(err) => {
                    let message = bridge.take_exception(err);
                    tracing::warn!(target: "script", property = name, error = %message, "Property assignment threw");
                    Ok(false)
                }
            }
        });
        result.unwrap_or(false)
    }

    /// 调用脚本方法
    ///
    /// 可选的生命周期钩子不存在时直接成功；其它找不到或不可调用的名字返回
    /// `InvalidMethod`；脚本抛出的异常变成 `ScriptException`。
    pub fn call(&self, method: &str, args: &[Variant]) -> CallResult<Variant> {
        if !self.is_live() {
            return Err(CallError::InstanceIsNull);
        }
        let shared = self
            .script
            .shared()
            .map_err(|_| CallError::InstanceIsNull)?;
        let session = shared.session.clone();
        let optional = shared.session.config.is_optional_hook(method);
        let key = self.key;

        let result = shared.with(|bridge| {
            let Some(object) = bridge.instance(key)? else {
                return Ok(Err(CallError::InstanceIsNull));
            };
            let object = object.into_value();
            if !bridge.is_callable(&object, method)? {
                if optional && !bridge.has(&object, method)? {
                    return Ok(Ok(Variant::Nil));
                }
                return Ok(Err(CallError::InvalidMethod(method.to_string())));
            }

            let func = bridge.field(&object, method)?;
            let args = args
                .iter()
                .map(|arg| to_js(bridge, &session, arg))
                .collect::<rquickjs::Result<Vec<_>>>()?;
            match bridge.invoke(&func, &object, args) {
                Ok(value) => Ok(Ok(to_variant(bridge, &session, &value))),
                Err(err) => Ok(Err(CallError::ScriptException(bridge.take_exception(err)))),
            }
        });

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if let CallError::ScriptException(message) = &err {
                    tracing::error!(target: "script", method, path = %self.script.path(), error = %message, "Script method threw");
                    shared.set_last_error(message.clone());
                }
                Err(err)
            }
            Err(err) => Err(CallError::ScriptException(err.to_string())),
        }
    }

    pub fn has_method(&self, method: &str) -> bool {
        if self.script.has_method(method) {
            return true;
        }
        let Ok(shared) = self.script.shared() else {
            return false;
        };
        let key = self.key;
        shared
            .with(|bridge| match bridge.instance(key)? {
                Some(object) => Ok(bridge.is_callable(&object.into_value(), method)?),
                None => Ok(false),
            })
            .unwrap_or(false)
    }

    /// 宿主通知转发到 `_notification`
    pub fn notification(&self, what: i64) {
        if let Err(err) = self.call("_notification", &[Variant::Int(what)]) {
            tracing::debug!(target: "script", what, error = %err, "Notification not delivered");
        }
    }

    /// 脚本声明的属性名
    pub fn property_list(&self) -> Vec<String> {
        self.script.member_names()
    }
}

impl Drop for ScriptInstance {
    fn drop(&mut self) {
        let live = {
            let mut state = self.script.state.borrow_mut();
            if state.instances.get(&self.owner) == Some(&self.key) {
                state.instances.remove(&self.owner);
                true
            } else {
                false
            }
        };
        if live {
            if let Ok(shared) = self.script.shared() {
                shared.queue_release(PendingRelease::Instance(self.key));
            }
        }
    }
}

impl std::fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("owner", &self.owner)
            .field("script", &self.script.path())
            .field("live", &self.is_live())
            .finish()
    }
}
