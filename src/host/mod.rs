//! 宿主对象系统接口
//!
//! 绑定层只消费宿主反射系统的一小部分：类层级枚举、方法/属性反射表、
//! 按名字的动态调用以及对象构造/销毁原语。[`HostObjectSystem`] 就是这部分
//! 接口；[`ClassDb`] 是进程内实现，供命令行工具与测试使用。

pub mod class_db;

pub use class_db::{demo_class_db, ClassDb, ClassDecl, Instance, NativeMethod};

use crate::core::error::{CallError, CallResult};
use crate::variant::{ObjectId, Variant};
use bitflags::bitflags;
use std::fmt;
use std::rc::Rc;

bitflags! {
    /// 方法标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        const NORMAL = 1 << 0;
        const CONST = 1 << 1;
        /// 仅供脚本覆盖的虚方法，宿主侧没有实现
        const VIRTUAL = 1 << 2;
        /// 不向脚本公开
        const NOSCRIPT = 1 << 3;
    }
}

bitflags! {
    /// 属性用途标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyUsage: u32 {
        const STORAGE = 1 << 0;
        const EDITOR = 1 << 1;
        /// 编辑器分组标题，不是真正的属性
        const GROUP = 1 << 2;
        /// 编辑器分类标题，不是真正的属性
        const CATEGORY = 1 << 3;
        const DEFAULT = Self::STORAGE.bits() | Self::EDITOR.bits();
    }
}

/// 方法反射信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub name: String,
    pub flags: MethodFlags,
    pub arg_count: usize,
}

impl MethodInfo {
    pub fn new(name: impl Into<String>, arg_count: usize) -> Self {
        Self {
            name: name.into(),
            flags: MethodFlags::NORMAL,
            arg_count,
        }
    }

    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    /// 是否应该绑定到脚本
    pub fn is_scriptable(&self) -> bool {
        !self
            .flags
            .intersects(MethodFlags::VIRTUAL | MethodFlags::NOSCRIPT)
    }
}

/// 属性反射信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: String,
    pub usage: PropertyUsage,
}

impl PropertyInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: PropertyUsage::DEFAULT,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: PropertyUsage::GROUP,
        }
    }

    pub fn category(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: PropertyUsage::CATEGORY,
        }
    }

    /// 分组/分类元数据不生成访问器
    pub fn is_scriptable(&self) -> bool {
        !self
            .usage
            .intersects(PropertyUsage::GROUP | PropertyUsage::CATEGORY)
    }
}

/// 方法描述符
///
/// 脚本自有对象跳过按名字的动态调用，直接通过描述符调用宿主方法。
#[derive(Clone)]
pub struct MethodBind {
    pub name: String,
    pub arity: usize,
    func: Rc<dyn Fn(ObjectId, &[Variant]) -> CallResult<Variant>>,
}

impl MethodBind {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        func: impl Fn(ObjectId, &[Variant]) -> CallResult<Variant> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            func: Rc::new(func),
        }
    }

    pub fn invoke(&self, object: ObjectId, args: &[Variant]) -> CallResult<Variant> {
        if args.len() != self.arity {
            return Err(CallError::ArgumentCount {
                expected: self.arity,
                given: args.len(),
            });
        }
        (self.func)(object, args)
    }
}

impl fmt::Debug for MethodBind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBind")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// 宿主对象系统
///
/// 所有方法都在脚本线程上调用。实现不得在这些回调中重新进入脚本引擎。
pub trait HostObjectSystem {
    /// 通用基类
    fn root_class(&self) -> String;

    fn parent_class(&self, class: &str) -> Option<String>;

    /// 直接子类，按名字排序
    fn list_subclasses(&self, class: &str) -> Vec<String>;

    /// 类自身声明的方法（不含继承的）
    fn list_methods(&self, class: &str) -> Vec<MethodInfo>;

    /// 类自身声明的属性（不含继承的）
    fn list_properties(&self, class: &str) -> Vec<PropertyInfo>;

    fn can_instance(&self, class: &str) -> bool;

    fn construct(&self, class: &str) -> Option<ObjectId>;

    fn destroy(&self, object: ObjectId);

    fn is_alive(&self, object: ObjectId) -> bool;

    fn class_of(&self, object: ObjectId) -> Option<String>;

    /// 按名字动态调用
    fn call(&self, object: ObjectId, method: &str, args: &[Variant]) -> CallResult<Variant>;

    /// 查找方法描述符（沿继承链）
    fn find_method(&self, class: &str, method: &str) -> Option<MethodBind>;

    fn get_property(&self, object: ObjectId, name: &str) -> Option<Variant>;

    fn set_property(&self, object: ObjectId, name: &str, value: Variant) -> bool;

    /// 全局单例（名字, 对象）
    fn singletons(&self) -> Vec<(String, ObjectId)>;

    /// `class` 是否为 `ancestor` 或其子类
    fn is_parent_class(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.parent_class(&name);
        }
        false
    }
}
