//! QuickJS 后端
//!
//! 通过 `rquickjs` 把宿主类层级、单例与内置值类型暴露给脚本。
//!
//! Rust 侧从不跨调用拥有 JS 值。所有需要长期存活的脚本对象（原型、宿主
//! 自有包装器、编译好的构造函数、脚本实例）都放在一个隐藏的全局对象
//! `__bridge` 里，由一段预置脚本创建；运行时销毁时它们随上下文一起释放。
//! 脚本自有包装器只在 [`classes::ScriptWrapperCache`] 里留一个不计数的索引。

pub mod binder;
pub mod classes;
pub mod marshal;
pub mod registrar;
pub mod session;

pub use classes::{CompositeBox, HostObject};
pub use session::BindingSession;

use crate::variant::ObjectId;
use rquickjs::function::IntoArgs;
use rquickjs::{Ctx, FromJs, Function, Object, Value};

/// 隐藏桥接对象的全局名
pub const BRIDGE_GLOBAL: &str = "__bridge";

/// 创建 `__bridge` 的预置脚本
const PRELUDE: &str = r#"
(function (global) {
  'use strict';
  const wrappers = new Map();
  const prototypes = new Map();
  const scripts = new Map();
  const instances = new Map();
  const isObject = (v) => v !== null && (typeof v === 'object' || typeof v === 'function');

  const bridge = {
    remember(id, obj) { wrappers.set(id, obj); },
    lookup(id) { return wrappers.get(id); },
    forget(id) { return wrappers.delete(id); },

    setPrototype(name, proto) { prototypes.set(name, proto); },
    prototype(name) { return prototypes.get(name); },
    clearPrototypes() { prototypes.clear(); },
    snapshotPrototypes() { return new Map(prototypes); },
    // 把仍指向旧原型的包装器与脚本类链接到新注册的原型
    rebind(previous, extra) {
      const moved = new Map();
      for (const [name, old] of previous) {
        const fresh = prototypes.get(name);
        if (fresh === undefined || fresh === old) continue;
        moved.set(old, fresh);
        if (isObject(old.constructor) && isObject(fresh.constructor)) {
          moved.set(old.constructor, fresh.constructor);
        }
      }
      let count = 0;
      if (moved.size === 0) return count;
      const relink = (obj) => {
        if (!isObject(obj)) return false;
        const to = moved.get(Object.getPrototypeOf(obj));
        if (to === undefined) return false;
        Object.setPrototypeOf(obj, to);
        count += 1;
        return true;
      };
      for (const obj of wrappers.values()) relink(obj);
      for (const obj of extra) relink(obj);
      for (const ctor of scripts.values()) {
        relink(ctor);
        let link = isObject(ctor) ? ctor.prototype : undefined;
        while (isObject(link) && !relink(link)) link = Object.getPrototypeOf(link);
      }
      return count;
    },
    inherits(proto, base) {
      return isObject(proto) && isObject(base) && (proto === base || base.isPrototypeOf(proto));
    },
    createPrototype(parent) {
      return Object.create(parent === undefined ? Object.prototype : parent);
    },
    setPrototypeOf(obj, proto) {
      Object.setPrototypeOf(obj, proto);
      return obj;
    },

    makeClass(name, factory, proto, parent) {
      const ctor = function (...args) {
        if (new.target === undefined) {
          throw new TypeError(`Class constructor ${name} cannot be invoked without 'new'`);
        }
        return factory(new.target.prototype, ...args);
      };
      Object.defineProperty(ctor, 'name', { value: name });
      ctor.prototype = proto;
      Object.defineProperty(proto, 'constructor', { value: ctor, writable: true, configurable: true });
      if (parent !== undefined) Object.setPrototypeOf(ctor, parent);
      return ctor;
    },
    define(target, name, value) {
      Object.defineProperty(target, name, { value, writable: true, configurable: true, enumerable: false });
    },
    accessor(target, name, get, set) {
      Object.defineProperty(target, name, { get, set, configurable: true, enumerable: false });
    },

    setScript(key, ctor) { scripts.set(key, ctor); },
    script(key) { return scripts.get(key); },
    dropScript(key) { scripts.delete(key); },
    setInstance(key, obj) { instances.set(key, obj); },
    instance(key) { return instances.get(key); },
    dropInstance(key) { instances.delete(key); },

    construct(ctor) { return new ctor(); },
    invoke(fn, self, args) { return fn.apply(self, args); },
    has(obj, name) { return isObject(obj) && name in obj; },
    field(obj, name) { return isObject(obj) ? obj[name] : undefined; },
    assign(obj, name, value) {
      if (!isObject(obj)) return false;
      obj[name] = value;
      return true;
    },
    isCallable(obj, name) { return isObject(obj) && typeof obj[name] === 'function'; },
    attach(obj, owner) {
      try {
        Object.defineProperty(obj, '__owner', { value: owner, configurable: true, enumerable: false });
        return true;
      } catch (e) {
        return false;
      }
    },
    ownerOf(obj) {
      return isObject(obj) && Object.prototype.hasOwnProperty.call(obj, '__owner') ? obj.__owner : undefined;
    },
    rebase(obj, from, to) {
      if (isObject(obj) && Object.getPrototypeOf(obj) === from) Object.setPrototypeOf(obj, to);
    },
    inspect(target) {
      const found = { methods: [], members: [], signals: [] };
      if (!isObject(target)) return found;
      for (const key of Object.getOwnPropertyNames(target)) {
        if (key === 'constructor' || key === '__owner') continue;
        const desc = Object.getOwnPropertyDescriptor(target, key);
        const hasValue = desc !== undefined && 'value' in desc;
        if (hasValue && typeof desc.value === 'function') {
          found.methods.push(key);
        } else if (key === 'signals' && hasValue && Array.isArray(desc.value)) {
          for (const signal of desc.value) found.signals.push(String(signal));
        } else {
          found.members.push(key);
        }
      }
      return found;
    },
    validate(source) { new Function(source); },
    describe(error) {
      if (error instanceof Error) return `${error.name}: ${error.message}`;
      return String(error);
    },
    globals() {
      return Object.getOwnPropertyNames(global).filter((key) => key !== '__bridge');
    },
  };

  // 脚本单元通过给 `exports` 赋值导出构造函数
  if (!('exports' in global)) global.exports = undefined;

  Object.defineProperty(global, '__bridge', {
    value: Object.freeze(bridge),
    enumerable: false,
    configurable: false,
    writable: false,
  });
})(globalThis);
"#;

/// 成员发现结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub methods: Vec<String>,
    pub members: Vec<String>,
    pub signals: Vec<String>,
}

/// `__bridge` 的类型化视图
pub struct Bridge<'js> {
    ctx: Ctx<'js>,
    object: Object<'js>,
}

impl<'js> Bridge<'js> {
    /// 在新上下文中安装预置脚本
    pub fn install(ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        ctx.eval::<(), _>(PRELUDE)
    }

    pub fn get(ctx: &Ctx<'js>) -> rquickjs::Result<Self> {
        Ok(Self {
            ctx: ctx.clone(),
            object: ctx.globals().get(BRIDGE_GLOBAL)?,
        })
    }

    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    fn call<A, R>(&self, helper: &str, args: A) -> rquickjs::Result<R>
    where
        A: IntoArgs<'js>,
        R: FromJs<'js>,
    {
        let func: Function<'js> = self.object.get(helper)?;
        func.call(args)
    }

    fn key(id: u64) -> f64 {
        id as f64
    }

    // ======================================================================
    // 包装器缓存
    // ======================================================================

    /// 强引用缓存宿主自有对象的包装器
    pub fn remember(&self, id: ObjectId, wrapper: &Value<'js>) -> rquickjs::Result<()> {
        self.call("remember", (Self::key(id.0), wrapper.clone()))
    }

    pub fn lookup(&self, id: ObjectId) -> rquickjs::Result<Option<Object<'js>>> {
        self.call("lookup", (Self::key(id.0),))
    }

    pub fn forget(&self, id: ObjectId) -> rquickjs::Result<bool> {
        self.call("forget", (Self::key(id.0),))
    }

    // ======================================================================
    // 原型与类
    // ======================================================================

    pub fn set_prototype(&self, class: &str, proto: &Object<'js>) -> rquickjs::Result<()> {
        self.call("setPrototype", (class, proto.clone()))
    }

    pub fn prototype(&self, class: &str) -> rquickjs::Result<Option<Object<'js>>> {
        self.call("prototype", (class,))
    }

    pub fn clear_prototypes(&self) -> rquickjs::Result<()> {
        self.call("clearPrototypes", ())
    }

    /// 注册表重建前的原型快照，交给 [`Bridge::rebind`]
    pub fn snapshot_prototypes(&self) -> rquickjs::Result<Value<'js>> {
        self.call("snapshotPrototypes", ())
    }

    /// 返回被改接的对象数
    pub fn rebind(&self, previous: Value<'js>, extra: Vec<Value<'js>>) -> rquickjs::Result<u32> {
        let array = rquickjs::Array::new(self.ctx.clone())?;
        for (i, obj) in extra.into_iter().enumerate() {
            array.set(i, obj)?;
        }
        self.call("rebind", (previous, array))
    }

    /// `proto` 等于 `base` 或以它为原型链上的一环
    pub fn inherits(&self, proto: &Value<'js>, base: &Value<'js>) -> rquickjs::Result<bool> {
        self.call("inherits", (proto.clone(), base.clone()))
    }

    pub fn create_prototype(&self, parent: Option<&Object<'js>>) -> rquickjs::Result<Object<'js>> {
        match parent {
            Some(parent) => self.call("createPrototype", (parent.clone(),)),
            None => self.call("createPrototype", ()),
        }
    }

    pub fn set_prototype_of(&self, obj: &Value<'js>, proto: &Value<'js>) -> rquickjs::Result<()> {
        self.call::<_, Value<'js>>("setPrototypeOf", (obj.clone(), proto.clone()))
            .map(|_| ())
    }

    /// 以 JS 函数包装工厂，得到可 `new`、可 `extends` 的构造函数
    pub fn make_class(
        &self,
        name: &str,
        factory: Function<'js>,
        proto: &Object<'js>,
        parent: Option<Function<'js>>,
    ) -> rquickjs::Result<Function<'js>> {
        match parent {
            Some(parent) => self.call("makeClass", (name, factory, proto.clone(), parent)),
            None => self.call("makeClass", (name, factory, proto.clone())),
        }
    }

    /// 不可枚举的数据属性
    pub fn define(&self, target: &Object<'js>, name: &str, value: Value<'js>) -> rquickjs::Result<()> {
        self.call("define", (target.clone(), name, value))
    }

    pub fn accessor(
        &self,
        target: &Object<'js>,
        name: &str,
        get: Function<'js>,
        set: Function<'js>,
    ) -> rquickjs::Result<()> {
        self.call("accessor", (target.clone(), name, get, set))
    }

    // ======================================================================
    // 脚本构造函数与实例
    // ======================================================================

    pub fn set_script(&self, key: u64, ctor: &Value<'js>) -> rquickjs::Result<()> {
        self.call("setScript", (Self::key(key), ctor.clone()))
    }

    pub fn script(&self, key: u64) -> rquickjs::Result<Option<Function<'js>>> {
        self.call("script", (Self::key(key),))
    }

    pub fn drop_script(&self, key: u64) -> rquickjs::Result<()> {
        self.call("dropScript", (Self::key(key),))
    }

    pub fn set_instance(&self, key: u64, obj: &Value<'js>) -> rquickjs::Result<()> {
        self.call("setInstance", (Self::key(key), obj.clone()))
    }

    pub fn instance(&self, key: u64) -> rquickjs::Result<Option<Object<'js>>> {
        self.call("instance", (Self::key(key),))
    }

    pub fn drop_instance(&self, key: u64) -> rquickjs::Result<()> {
        self.call("dropInstance", (Self::key(key),))
    }

    // ======================================================================
    // 通用反射
    // ======================================================================

    pub fn construct(&self, ctor: &Function<'js>) -> rquickjs::Result<Value<'js>> {
        self.call("construct", (ctor.clone(),))
    }

    pub fn invoke(
        &self,
        func: &Value<'js>,
        this: &Value<'js>,
        args: Vec<Value<'js>>,
    ) -> rquickjs::Result<Value<'js>> {
        let array = rquickjs::Array::new(self.ctx.clone())?;
        for (i, arg) in args.into_iter().enumerate() {
            array.set(i, arg)?;
        }
        self.call("invoke", (func.clone(), this.clone(), array))
    }

    pub fn has(&self, obj: &Value<'js>, name: &str) -> rquickjs::Result<bool> {
        self.call("has", (obj.clone(), name))
    }

    pub fn field(&self, obj: &Value<'js>, name: &str) -> rquickjs::Result<Value<'js>> {
        self.call("field", (obj.clone(), name))
    }

    pub fn assign(&self, obj: &Value<'js>, name: &str, value: Value<'js>) -> rquickjs::Result<bool> {
        self.call("assign", (obj.clone(), name, value))
    }

    pub fn is_callable(&self, obj: &Value<'js>, name: &str) -> rquickjs::Result<bool> {
        self.call("isCallable", (obj.clone(), name))
    }

    /// 给脚本实例对象挂上宿主包装器（不可枚举的 `__owner`）
    pub fn attach(&self, obj: &Value<'js>, owner: &Value<'js>) -> rquickjs::Result<bool> {
        self.call("attach", (obj.clone(), owner.clone()))
    }

    pub fn owner_of(&self, obj: &Value<'js>) -> rquickjs::Result<Value<'js>> {
        self.call("ownerOf", (obj.clone(),))
    }

    pub fn rebase(&self, obj: &Value<'js>, from: &Value<'js>, to: &Value<'js>) -> rquickjs::Result<()> {
        self.call("rebase", (obj.clone(), from.clone(), to.clone()))
    }

    pub fn inspect(&self, target: &Value<'js>) -> rquickjs::Result<Discovered> {
        let found: Object<'js> = self.call("inspect", (target.clone(),))?;
        Ok(Discovered {
            methods: found.get("methods")?,
            members: found.get("members")?,
            signals: found.get("signals")?,
        })
    }

    /// 只编译不执行
    pub fn validate(&self, source: &str) -> rquickjs::Result<()> {
        self.call("validate", (source,))
    }

    pub fn describe(&self, error: Value<'js>) -> rquickjs::Result<String> {
        self.call("describe", (error,))
    }

    pub fn globals(&self) -> rquickjs::Result<Vec<String>> {
        self.call("globals", ())
    }

    /// 取出挂起的异常并转成消息
    pub fn take_exception(&self, err: rquickjs::Error) -> String {
        match err {
            rquickjs::Error::Exception => {
                let exception = self.ctx.catch();
                self.describe(exception)
                    .unwrap_or_else(|_| "Uncaught exception".to_string())
            }
            other => other.to_string(),
        }
    }
}
