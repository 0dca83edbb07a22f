//! 对象绑定的所有权记账
//!
//! 每个宿主对象包装器都携带一个 [`NativeSlot`]：对象标识加上所有权标签。
//! 只有 `ScriptOwned` 的槽会在包装器被脚本 GC 回收时销毁宿主对象；
//! `NativeOwned` 的对象由宿主管理，脚本侧永远不会删除它。
//!
//! [`WrapperTable`] 记录每个活着的宿主对象当前由哪一侧的包装器持有，
//! 保证同一绑定会话内一个对象最多只有一个包装器。

use crate::host::HostObjectSystem;
use crate::variant::ObjectId;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

/// 所有权标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// 宿主构造，脚本只是拿到了它
    NativeOwned,
    /// 脚本 `new` 出来的，生命周期跟随脚本包装器
    ScriptOwned,
}

/// 活动包装器表
#[derive(Debug, Default)]
pub struct WrapperTable {
    live: HashMap<ObjectId, Ownership>,
    /// 宿主已自行销毁、但包装器尚未回收的对象
    gone: HashSet<ObjectId>,
}

impl WrapperTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新包装器；对象已有包装器时返回 false
    pub fn register(&mut self, object: ObjectId, ownership: Ownership) -> bool {
        if let Some(existing) = self.live.get(&object) {
            debug_assert!(
                false,
                "object {} already wrapped as {:?}, refusing second {:?} wrapper",
                object, existing, ownership
            );
            tracing::error!(
                target: "script.binding",
                %object,
                ?existing,
                ?ownership,
                "Refusing to wrap an object twice"
            );
            return false;
        }
        self.live.insert(object, ownership);
        true
    }

    /// 包装器释放；只有登记它的一侧才能释放
    pub fn release(&mut self, object: ObjectId, ownership: Ownership) -> bool {
        match self.live.get(&object) {
            Some(existing) if *existing == ownership => {
                self.live.remove(&object);
                true
            }
            Some(existing) => {
                tracing::error!(
                    target: "script.binding",
                    %object,
                    ?existing,
                    ?ownership,
                    "Wrapper released by the wrong owner"
                );
                false
            }
            None => false,
        }
    }

    /// 宿主报告对象已销毁；返回原先的所有权
    pub fn host_destroyed(&mut self, object: ObjectId) -> Option<Ownership> {
        let ownership = self.live.remove(&object)?;
        self.gone.insert(object);
        Some(ownership)
    }

    /// 包装器回收时查询并清除“已被宿主销毁”标记
    fn take_gone(&mut self, object: ObjectId) -> bool {
        self.gone.remove(&object)
    }

    pub fn ownership(&self, object: ObjectId) -> Option<Ownership> {
        self.live.get(&object).copied()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.gone.clear();
    }
}

/// 宿主对象包装器的私有数据
///
/// 脚本引擎在回收包装器时 drop 这个槽。
pub struct NativeSlot {
    object: ObjectId,
    class: String,
    ownership: Ownership,
    host: Rc<dyn HostObjectSystem>,
    wrappers: Weak<RefCell<WrapperTable>>,
    detached: Cell<bool>,
}

impl NativeSlot {
    pub fn new(
        object: ObjectId,
        class: impl Into<String>,
        ownership: Ownership,
        host: Rc<dyn HostObjectSystem>,
        wrappers: &Rc<RefCell<WrapperTable>>,
    ) -> Self {
        Self {
            object,
            class: class.into(),
            ownership,
            host,
            wrappers: Rc::downgrade(wrappers),
            detached: Cell::new(false),
        }
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// 宿主已经销毁了对象：之后既不能调用，也不能再销毁
    pub fn detach(&self) {
        self.detached.set(true);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.get()
    }

    /// 对象仍可调用
    pub fn is_live(&self) -> bool {
        !self.detached.get() && self.host.is_alive(self.object)
    }
}

impl Drop for NativeSlot {
    fn drop(&mut self) {
        if let Some(wrappers) = self.wrappers.upgrade() {
            match wrappers.try_borrow_mut() {
                Ok(mut table) => {
                    if table.take_gone(self.object) {
                        self.detached.set(true);
                    } else {
                        table.release(self.object, self.ownership);
                    }
                }
                Err(_) => tracing::warn!(
                    target: "script.binding",
                    object = %self.object,
                    "Wrapper table busy during finalization"
                ),
            }
        }

        if self.ownership == Ownership::ScriptOwned && !self.detached.replace(true) {
            tracing::trace!(target: "script.binding", object = %self.object, class = %self.class, "Destroying script-owned object");
            self.host.destroy(self.object);
        }
    }
}

impl fmt::Debug for NativeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeSlot")
            .field("object", &self.object)
            .field("class", &self.class)
            .field("ownership", &self.ownership)
            .field("detached", &self.detached.get())
            .finish()
    }
}
