//! 带私有数据槽的脚本类
//!
//! 两种不透明的装箱对象：宿主对象包装器与复合值盒子。槽里的 Rust 值
//! 在脚本 GC 回收对象时被 drop，这就是私有数据的终结回调。

use crate::binder::{NativeSlot, Ownership};
use crate::variant::{Composite, ObjectId};
use rquickjs::class::Trace;
use rquickjs::{qjs, Class, Ctx, FromJs, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;

/// 宿主对象包装器
#[derive(Trace)]
#[rquickjs::class]
pub struct HostObject {
    #[qjs(skip_trace)]
    pub(crate) slot: NativeSlot,
    /// 脚本自有包装器登记在非拥有缓存里，终结时移除
    #[qjs(skip_trace)]
    pub(crate) cache: Option<Weak<RefCell<ScriptWrapperCache>>>,
}

impl Drop for HostObject {
    fn drop(&mut self) {
        let Some(cache) = self.cache.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let object = self.slot.object();
        match cache.try_borrow_mut() {
            Ok(mut cache) => {
                cache.remove(object);
            }
            Err(_) => tracing::error!(
                target: "script.binding",
                %object,
                "Wrapper cache busy during finalization"
            ),
        };
    }
}

/// 脚本自有包装器的非拥有缓存
///
/// 内置引擎没有 `WeakRef`。这里只记原始值，不占引用计数，包装器照常被
/// 回收；条目在 [`HostObject`] 终结时移除，所以仍在表里的条目一定指向活着
/// 的包装器。借用从不跨越可能触发 GC 的调用。
#[derive(Default)]
pub struct ScriptWrapperCache {
    entries: HashMap<ObjectId, qjs::JSValue>,
}

impl std::fmt::Debug for ScriptWrapperCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl ScriptWrapperCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: ObjectId, wrapper: &Value<'_>) {
        self.entries.insert(object, wrapper.as_raw());
    }

    pub fn remove(&mut self, object: ObjectId) -> bool {
        self.entries.remove(&object).is_some()
    }

    pub fn contains(&self, object: ObjectId) -> bool {
        self.entries.contains_key(&object)
    }

    pub fn objects(&self) -> Vec<ObjectId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 取回缓存的脚本自有包装器
pub fn cached_script_wrapper<'js>(
    ctx: &Ctx<'js>,
    cache: &RefCell<ScriptWrapperCache>,
    object: ObjectId,
) -> Option<Value<'js>> {
    let raw = cache.borrow().entries.get(&object).copied()?;
    // SAFETY: 条目只在包装器存活期间存在，包装器属于本上下文所在的运行时。
    // 先补一次引用计数再交给 `Value`，它 drop 时恰好抵消。
    Some(unsafe { Value::from_raw(ctx.clone(), qjs::JS_DupValue(raw)) })
}

/// 复合值盒子：宿主值的堆上副本，由脚本包装器独占
#[derive(Trace)]
#[rquickjs::class]
pub struct CompositeBox {
    #[qjs(skip_trace)]
    pub(crate) value: Composite,
}

/// 反查宿主对象包装器
pub fn host_object<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Option<Class<'js, HostObject>> {
    if !value.is_object() {
        return None;
    }
    Class::<HostObject>::from_js(ctx, value.clone()).ok()
}

/// 包装器上的对象标识与所有权
pub fn slot_of<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Option<(ObjectId, Ownership, bool)> {
    let class = host_object(ctx, value)?;
    let object = class.borrow();
    Some((
        object.slot.object(),
        object.slot.ownership(),
        object.slot.is_live(),
    ))
}

pub fn composite_box<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Option<Class<'js, CompositeBox>> {
    if !value.is_object() {
        return None;
    }
    Class::<CompositeBox>::from_js(ctx, value.clone()).ok()
}

/// 复合值盒子的副本
pub fn composite_of<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Option<Composite> {
    let boxed = composite_box(ctx, value)?;
    let inner = boxed.borrow();
    Some(inner.value.clone())
}
