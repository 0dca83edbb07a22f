//! 绑定会话
//!
//! 一次语言初始化对应一个会话：宿主对象系统、类注册表、单例表与
//! 活动包装器表。每个蹦床闭包都捕获一份 `Rc<BindingSession>`。

use super::classes::ScriptWrapperCache;
use crate::binder::WrapperTable;
use crate::config::BindingConfig;
use crate::core::error::RegistryResult;
use crate::host::HostObjectSystem;
use crate::registry::{ClassRegistry, SingletonTable};
use crate::variant::ObjectId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub struct BindingSession {
    pub host: Rc<dyn HostObjectSystem>,
    pub registry: RefCell<ClassRegistry>,
    pub singletons: RefCell<SingletonTable>,
    pub wrappers: Rc<RefCell<WrapperTable>>,
    /// 脚本自有包装器（宿主对象包装器表之外的非拥有索引）
    pub script_wrappers: Rc<RefCell<ScriptWrapperCache>>,
    pub config: BindingConfig,
    /// 正在创建的脚本实例；继承宿主类的脚本在 `super()` 中认领它的宿主对象
    pub adopting: Cell<Option<Adoption>>,
}

/// 待认领的宿主对象与创建它的脚本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adoption {
    pub owner: ObjectId,
    /// 脚本资源的构造函数键
    pub script: u64,
}

impl BindingSession {
    pub fn new(host: Rc<dyn HostObjectSystem>, config: BindingConfig) -> Self {
        Self {
            host,
            registry: RefCell::new(ClassRegistry::new()),
            singletons: RefCell::new(SingletonTable::new()),
            wrappers: Rc::new(RefCell::new(WrapperTable::new())),
            script_wrappers: Rc::new(RefCell::new(ScriptWrapperCache::new())),
            config,
            adopting: Cell::new(None),
        }
    }

    /// 清空并整树重建注册表与单例表
    pub fn rebuild(&self) -> RegistryResult<()> {
        let mut singletons = self.singletons.borrow_mut();
        let mut registry = self.registry.borrow_mut();
        singletons.reset();
        registry.reset();

        singletons.build(self.host.as_ref());
        registry.build(
            self.host.as_ref(),
            &self.config.root_class_alias,
            &singletons,
        )?;
        if self.config.register_builtins {
            registry.register_builtins()?;
        }
        Ok(())
    }
}
