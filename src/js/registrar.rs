//! 类注册器
//!
//! 把 [`ClassRegistry`](crate::registry::ClassRegistry) 里的绑定逐个变成脚本
//! 构造函数与原型。注册表已经是父类优先的顺序，所以子类创建原型时父类原型
//! 一定已经存在。
//!
//! 所有方法共用同一个按名字参数化的蹦床；属性共用一对 get/set 蹦床。

use super::binder::{self, MethodRef};
use super::classes::cached_script_wrapper;
use super::marshal::to_variant;
use super::session::BindingSession;
use super::Bridge;
use crate::registry::{BindingKind, ClassBinding, ClassIndex};
use crate::variant::VariantType;
use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Function, Object, Value};
use std::collections::BTreeSet;
use std::rc::Rc;

/// 在当前上下文中注册全部绑定、单例与打印函数
pub fn register_all<'js>(ctx: &Ctx<'js>, session: &Rc<BindingSession>) -> rquickjs::Result<()> {
    let bridge = Bridge::get(ctx)?;
    let previous = bridge.snapshot_prototypes()?;
    bridge.clear_prototypes()?;

    let (generation, bindings): (u64, Vec<(ClassIndex, ClassBinding)>) = {
        let registry = session.registry.borrow();
        (
            registry.generation(),
            registry
                .iter()
                .map(|(index, binding)| (index, binding.clone()))
                .collect(),
        )
    };

    for (index, binding) in &bindings {
        let parent = binding
            .parent
            .and_then(|p| bindings.get(p.0))
            .map(|(_, parent)| parent.name.clone());
        match binding.kind {
            BindingKind::Class => {
                register_class(&bridge, session, generation, *index, binding, parent.as_deref())?
            }
            BindingKind::Builtin(ty) => register_builtin(&bridge, session, ty, binding)?,
        }
    }

    register_singletons(&bridge, session)?;
    register_print(ctx, session)?;
    rebind_wrappers(&bridge, session, previous)?;

    tracing::debug!(
        target: "script.binding",
        classes = bindings.len(),
        singletons = session.singletons.borrow().len(),
        generation,
        "Bindings registered"
    );
    Ok(())
}

/// 重建后把已有包装器与脚本类改接到新原型，`instanceof` 才继续成立
fn rebind_wrappers<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    previous: Value<'js>,
) -> rquickjs::Result<()> {
    let objects = session.script_wrappers.borrow().objects();
    let script_owned = objects
        .into_iter()
        .filter_map(|object| cached_script_wrapper(bridge.ctx(), &session.script_wrappers, object))
        .collect();
    let relinked = bridge.rebind(previous, script_owned)?;
    if relinked > 0 {
        tracing::debug!(target: "script.binding", relinked, "Wrappers rebased onto rebuilt prototypes");
    }
    Ok(())
}

// ============================================================================
// 宿主类
// ============================================================================

fn register_class<'js>(
    bridge: &Bridge<'js>,
    session: &Rc<BindingSession>,
    generation: u64,
    index: ClassIndex,
    binding: &ClassBinding,
    parent: Option<&str>,
) -> rquickjs::Result<()> {
    let ctx = bridge.ctx();

    let parent_proto = match parent {
        Some(parent) => bridge.prototype(parent)?,
        None => None,
    };
    let proto = bridge.create_prototype(parent_proto.as_ref())?;

    for (slot, entry) in binding.methods.iter().enumerate() {
        let method = MethodRef {
            generation,
            class: index,
            method: slot,
            name: entry.name.clone(),
        };
        let session = session.clone();
        let trampoline = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, this: This<Value<'js>>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let bridge = Bridge::get(&ctx)?;
                binder::dispatch(&bridge, &session, &method, &this.0, &args.0)
            },
        )?;
        bridge.define(&proto, &entry.name, trampoline.into_value())?;
    }

    for property in &binding.properties {
        let (get, set) = property_trampolines(ctx, session, property, false)?;
        bridge.accessor(&proto, property, get, set)?;
    }

    let class = binding.name.clone();
    let factory_session = session.clone();
    let factory = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, proto: Value<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let bridge = Bridge::get(&ctx)?;
            binder::construct(&bridge, &factory_session, &class, proto, &args.0)
        },
    )?;

    let parent_ctor = match &parent_proto {
        Some(parent_proto) => parent_proto.get::<_, Option<Function<'js>>>("constructor")?,
        None => None,
    };
    let ctor = bridge.make_class(&binding.script_name, factory, &proto, parent_ctor)?;

    ctx.globals().set(binding.script_name.as_str(), ctor)?;
    bridge.set_prototype(&binding.name, &proto)?;

    tracing::trace!(
        target: "script.binding",
        class = %binding.name,
        script_name = %binding.script_name,
        methods = binding.methods.len(),
        properties = binding.properties.len(),
        "Class registered"
    );
    Ok(())
}

fn property_trampolines<'js>(
    ctx: &Ctx<'js>,
    session: &Rc<BindingSession>,
    property: &str,
    builtin: bool,
) -> rquickjs::Result<(Function<'js>, Function<'js>)> {
    let get_session = session.clone();
    let get_name = property.to_string();
    let get = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let bridge = Bridge::get(&ctx)?;
            if builtin {
                binder::get_builtin_property(&bridge, &get_session, &this.0, &get_name)
            } else {
                binder::get_property(&bridge, &get_session, &this.0, &get_name)
            }
        },
    )?;

    let set_session = session.clone();
    let set_name = property.to_string();
    let set = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>, value: Value<'js>| -> rquickjs::Result<()> {
            let bridge = Bridge::get(&ctx)?;
            if builtin {
                binder::set_builtin_property(&bridge, &set_session, &this.0, &set_name, &value)
            } else {
                binder::set_property(&bridge, &set_session, &this.0, &set_name, &value)
            }
        },
    )?;

    Ok((get, set))
}

// ============================================================================
// 内置复合值类型
// ============================================================================

fn register_builtin<'js>(
    bridge: &Bridge<'js>,
    session: &Rc<BindingSession>,
    ty: VariantType,
    binding: &ClassBinding,
) -> rquickjs::Result<()> {
    let ctx = bridge.ctx();
    let proto = bridge.create_prototype(None)?;

    for method in binding.method_names() {
        let session = session.clone();
        let name = method.to_string();
        let trampoline = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, this: This<Value<'js>>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let bridge = Bridge::get(&ctx)?;
                binder::dispatch_builtin(&bridge, &session, &name, &this.0, &args.0)
            },
        )?;
        bridge.define(&proto, method, trampoline.into_value())?;
    }

    for property in &binding.properties {
        let (get, set) = property_trampolines(ctx, session, property, true)?;
        bridge.accessor(&proto, property, get, set)?;
    }

    // 脚本侧打印复合值时使用宿主的字符串形式
    let to_string = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>| -> String {
            super::classes::composite_of(&ctx, &this.0)
                .map(|value| value.to_string())
                .unwrap_or_default()
        },
    )?;
    bridge.define(&proto, "toString", to_string.into_value())?;

    let factory_session = session.clone();
    let factory = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, proto: Value<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let bridge = Bridge::get(&ctx)?;
            binder::construct_builtin(&bridge, &factory_session, ty, proto, &args.0)
        },
    )?;
    let ctor = bridge.make_class(&binding.script_name, factory, &proto, None)?;

    ctx.globals().set(binding.script_name.as_str(), ctor)?;
    bridge.set_prototype(ty.name(), &proto)?;
    Ok(())
}

// ============================================================================
// 单例
// ============================================================================

/// 单例是普通对象，不可构造；方法沿宿主继承链收集
fn register_singletons<'js>(bridge: &Bridge<'js>, session: &Rc<BindingSession>) -> rquickjs::Result<()> {
    let ctx = bridge.ctx();
    let singletons: Vec<(String, String)> = session
        .singletons
        .borrow()
        .iter()
        .filter_map(|(name, object)| {
            let class = session.host.class_of(object)?;
            Some((name.to_string(), class))
        })
        .collect();

    for (name, class) in singletons {
        let object = Object::new(ctx.clone())?;
        for method in singleton_methods(session, &class) {
            let session = session.clone();
            let singleton = name.clone();
            let method_name = method.clone();
            let trampoline = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                    let bridge = Bridge::get(&ctx)?;
                    binder::call_singleton(&bridge, &session, &singleton, &method_name, &args.0)
                },
            )?;
            bridge.define(&object, &method, trampoline.into_value())?;
        }
        ctx.globals().set(name.as_str(), object)?;
        tracing::trace!(target: "script.binding", singleton = %name, class = %class, "Singleton registered");
    }
    Ok(())
}

fn singleton_methods(session: &BindingSession, class: &str) -> BTreeSet<String> {
    let host = session.host.as_ref();
    let mut methods = BTreeSet::new();
    let mut current = Some(class.to_string());
    while let Some(class) = current {
        methods.extend(
            host.list_methods(&class)
                .into_iter()
                .filter(|m| m.is_scriptable())
                .map(|m| m.name),
        );
        current = host.parent_class(&class);
    }
    methods
}

// ============================================================================
// 打印
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum PrintKind {
    Plain,
    Tabs,
    Spaces,
    Error,
    Raw,
    Debug,
}

impl PrintKind {
    const ALL: [(&'static str, PrintKind); 7] = [
        ("print", PrintKind::Plain),
        ("printt", PrintKind::Tabs),
        ("prints", PrintKind::Spaces),
        ("printerr", PrintKind::Error),
        ("printe", PrintKind::Error),
        ("printraw", PrintKind::Raw),
        ("printd", PrintKind::Debug),
    ];

    fn separator(self) -> &'static str {
        match self {
            PrintKind::Tabs => "\t",
            PrintKind::Spaces => " ",
            _ => "",
        }
    }
}

fn register_print<'js>(ctx: &Ctx<'js>, session: &Rc<BindingSession>) -> rquickjs::Result<()> {
    for (name, kind) in PrintKind::ALL {
        let session = session.clone();
        let print = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
                let bridge = Bridge::get(&ctx)?;
                let line = args
                    .0
                    .iter()
                    .map(|arg| to_variant(&bridge, &session, arg).to_string())
                    .collect::<Vec<_>>()
                    .join(kind.separator());
                match kind {
                    PrintKind::Error => tracing::error!(target: "script.print", "{}", line),
                    PrintKind::Debug => tracing::debug!(target: "script.print", "{}", line),
                    PrintKind::Raw => tracing::info!(target: "script.print", raw = true, "{}", line),
                    _ => tracing::info!(target: "script.print", "{}", line),
                }
                Ok(())
            },
        )?;
        ctx.globals().set(name, print)?;
    }
    Ok(())
}
