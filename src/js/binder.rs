//! 对象绑定器
//!
//! - 构造路径：脚本 `new` 一个可实例化的宿主类，创建新的宿主对象，标记为
//!   `ScriptOwned`。
//! - 绑定路径：宿主已有对象，在其进入脚本时挂上包装器，标记为 `NativeOwned`。
//! - 分派：`NativeOwned` 走按名字的动态调用；`ScriptOwned` 直接调用方法
//!   描述符。
//!
//! 所有失败都以 JS 异常抛给脚本，从不中止宿主。

use super::classes::{cached_script_wrapper, composite_box, host_object, slot_of, HostObject};
use super::marshal::{box_composite, to_js, to_variant};
use super::session::{Adoption, BindingSession};
use super::Bridge;
use crate::binder::{NativeSlot, Ownership};
use crate::core::error::{BindingError, CallError};
use crate::registry::ClassIndex;
use crate::variant::{Composite, ObjectId, Operator, Variant, VariantType};
use rquickjs::{Class, Ctx, Exception, IntoJs, Value};
use std::rc::Rc;

/// 蹦床在注册时捕获的方法表坐标
#[derive(Debug, Clone)]
pub struct MethodRef {
    /// 注册时的注册表代数；不一致时退回按名字调用
    pub generation: u64,
    pub class: ClassIndex,
    pub method: usize,
    pub name: String,
}

/// 把调用错误转成 JS 异常
pub fn throw_call_error<'js>(ctx: &Ctx<'js>, err: &CallError) -> rquickjs::Error {
    let message = err.to_string();
    match err {
        CallError::ArgumentCount { .. } | CallError::InvalidArgument { .. } => {
            Exception::throw_type(ctx, &message)
        }
        CallError::InstanceIsNull => Exception::throw_reference(ctx, &message),
        _ => Exception::throw_message(ctx, &message),
    }
}

fn marshal_args<'js>(bridge: &Bridge<'js>, session: &BindingSession, args: &[Value<'js>]) -> Vec<Variant> {
    args.iter().map(|arg| to_variant(bridge, session, arg)).collect()
}

fn finish_call<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    method: &str,
    result: Result<Variant, CallError>,
) -> rquickjs::Result<Value<'js>> {
    match result {
        Ok(value) => to_js(bridge, session, &value),
        Err(err) => {
            tracing::debug!(target: "script.binding", method, error = %err, "Native call failed");
            Err(throw_call_error(bridge.ctx(), &err))
        }
    }
}

// ============================================================================
// 宿主对象
// ============================================================================

/// 绑定路径：为宿主已有的对象取得（或创建）唯一的包装器
pub fn wrap_native<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    object: ObjectId,
) -> rquickjs::Result<Value<'js>> {
    let ctx = bridge.ctx();

    if let Some(wrapper) = bridge.lookup(object)? {
        return Ok(wrapper.into_value());
    }

    if let Some(wrapper) = cached_script_wrapper(ctx, &session.script_wrappers, object) {
        return Ok(wrapper);
    }
    if session.wrappers.borrow().ownership(object) == Some(Ownership::ScriptOwned) {
        tracing::warn!(target: "script.marshal", %object, "Script-owned wrapper already finalized, converting to null");
        return Ok(Value::new_null(ctx.clone()));
    }

    let Some(class) = session.host.class_of(object) else {
        tracing::debug!(target: "script.marshal", %object, "Object is gone, converting to null");
        return Ok(Value::new_null(ctx.clone()));
    };

    let registered = session.registry.borrow().find(&class).is_some();
    let proto = if registered {
        bridge.prototype(&class)?
    } else {
        None
    };
    let Some(proto) = proto else {
        let err = BindingError::UnregisteredClass(class.to_string());
        tracing::warn!(target: "script.marshal", %err, "Converting to null");
        return Ok(Value::new_null(ctx.clone()));
    };

    if !session
        .wrappers
        .borrow_mut()
        .register(object, Ownership::NativeOwned)
    {
        return Ok(Value::new_null(ctx.clone()));
    }
    let slot = NativeSlot::new(
        object,
        class,
        Ownership::NativeOwned,
        session.host.clone(),
        &session.wrappers,
    );
    let wrapper = Class::instance(ctx.clone(), HostObject { slot, cache: None })?.into_js(ctx)?;
    bridge.set_prototype_of(&wrapper, &proto.into_value())?;
    bridge.remember(object, &wrapper)?;
    Ok(wrapper)
}

/// 构造路径：脚本 `new` 宿主类
///
/// `proto` 是 `new.target.prototype`，脚本子类化宿主类时实例拿到子类原型。
/// 额外参数转交给宿主的 `_init`。
pub fn construct<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    class: &str,
    proto: Value<'js>,
    args: &[Value<'js>],
) -> rquickjs::Result<Value<'js>> {
    let ctx = bridge.ctx();

    if let Some(adoption) = session.adopting.get() {
        if adopts(bridge, session, adoption, class, &proto)? {
            session.adopting.set(None);
            let owner = adoption.owner;
            let wrapper = wrap_native(bridge, session, owner)?;
            if !wrapper.is_null() {
                bridge.set_prototype_of(&wrapper, &proto)?;
                tracing::trace!(target: "script.binding", %owner, class, "Script instance adopted its owner");
                return Ok(wrapper);
            }
        }
    }

    if !session.host.can_instance(class) {
        let err = BindingError::NotInstantiable(class.to_string());
        return Err(Exception::throw_type(ctx, &err.to_string()));
    }
    let Some(object) = session.host.construct(class) else {
        return Err(Exception::throw_message(
            ctx,
            &format!("Failed to construct '{}'", class),
        ));
    };

    session
        .wrappers
        .borrow_mut()
        .register(object, Ownership::ScriptOwned);
    let slot = NativeSlot::new(
        object,
        class,
        Ownership::ScriptOwned,
        session.host.clone(),
        &session.wrappers,
    );
    let cache = Some(Rc::downgrade(&session.script_wrappers));
    let wrapper = Class::instance(ctx.clone(), HostObject { slot, cache })?.into_js(ctx)?;
    bridge.set_prototype_of(&wrapper, &proto)?;
    session.script_wrappers.borrow_mut().insert(object, &wrapper);

    if !args.is_empty() {
        let args = marshal_args(bridge, session, args);
        if let Err(err) = session.host.call(object, "_init", &args) {
            return Err(throw_call_error(ctx, &err));
        }
    }

    tracing::trace!(target: "script.binding", %object, class, "Script constructed host object");
    Ok(wrapper)
}

/// 只有 `new.target` 是正在实例化的脚本类（或其子类）时才认领宿主对象；
/// 脚本构造函数里嵌套的普通 `new` 照常构造新对象
fn adopts<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    adoption: Adoption,
    class: &str,
    proto: &Value<'js>,
) -> rquickjs::Result<bool> {
    let inherits_class = session
        .host
        .class_of(adoption.owner)
        .is_some_and(|owner_class| session.host.is_parent_class(&owner_class, class));
    if !inherits_class {
        return Ok(false);
    }
    let Some(script) = bridge.script(adoption.script)? else {
        return Ok(false);
    };
    let script_proto = bridge.field(&script.into_value(), "prototype")?;
    bridge.inherits(proto, &script_proto)
}

/// 分派宿主方法
pub fn dispatch<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    method: &MethodRef,
    this: &Value<'js>,
    args: &[Value<'js>],
) -> rquickjs::Result<Value<'js>> {
    let ctx = bridge.ctx();
    let Some((object, ownership, live)) = slot_of(ctx, this) else {
        return Err(Exception::throw_type(
            ctx,
            &format!("Illegal invocation of '{}': receiver is not a host object", method.name),
        ));
    };
    if !live {
        return Err(throw_call_error(ctx, &CallError::InstanceIsNull));
    }

    let bind = {
        let registry = session.registry.borrow();
        if registry.generation() == method.generation {
            registry
                .method(method.class, method.method)
                .and_then(|entry| entry.bind.clone())
        } else {
            None
        }
    };

    let args = marshal_args(bridge, session, args);
    let result = match (ownership, bind) {
        (Ownership::ScriptOwned, Some(bind)) => bind.invoke(object, &args),
        _ => session.host.call(object, &method.name, &args),
    };
    finish_call(bridge, session, &method.name, result)
}

/// 属性读取：失败退化为 undefined
pub fn get_property<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    this: &Value<'js>,
    name: &str,
) -> rquickjs::Result<Value<'js>> {
    let ctx = bridge.ctx();
    match slot_of(ctx, this) {
        Some((object, _, true)) => match session.host.get_property(object, name) {
            Some(value) => to_js(bridge, session, &value),
            None => Ok(Value::new_undefined(ctx.clone())),
        },
        _ => Ok(Value::new_undefined(ctx.clone())),
    }
}

/// 属性写入：宿主拒绝时只记日志
pub fn set_property<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    this: &Value<'js>,
    name: &str,
    value: &Value<'js>,
) -> rquickjs::Result<()> {
    let ctx = bridge.ctx();
    let Some((object, _, live)) = slot_of(ctx, this) else {
        return Err(Exception::throw_type(
            ctx,
            &format!("Cannot set '{}': receiver is not a host object", name),
        ));
    };
    if !live {
        return Err(throw_call_error(ctx, &CallError::InstanceIsNull));
    }
    let value = to_variant(bridge, session, value);
    if !session.host.set_property(object, name, value) {
        tracing::warn!(target: "script.binding", %object, property = name, "Host rejected property assignment");
    }
    Ok(())
}

/// 单例方法：调用时才按名字解析单例对象
pub fn call_singleton<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    singleton: &str,
    method: &str,
    args: &[Value<'js>],
) -> rquickjs::Result<Value<'js>> {
    let ctx = bridge.ctx();
    let Some(object) = session.singletons.borrow().get(singleton) else {
        return Err(Exception::throw_reference(
            ctx,
            &format!("Singleton '{}' is not registered", singleton),
        ));
    };
    let args = marshal_args(bridge, session, args);
    let result = session.host.call(object, method, &args);
    finish_call(bridge, session, method, result)
}

/// 宿主报告对象已销毁：解除包装器，不再由脚本侧销毁
pub fn release_native<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    object: ObjectId,
) -> rquickjs::Result<()> {
    let ctx = bridge.ctx();
    let previous = session.wrappers.borrow_mut().host_destroyed(object);
    let wrapper = match bridge.lookup(object)? {
        Some(wrapper) => Some(wrapper.into_value()),
        None => cached_script_wrapper(ctx, &session.script_wrappers, object),
    };
    if let Some(wrapper) = wrapper {
        if let Some(class) = host_object(ctx, &wrapper) {
            class.borrow().slot.detach();
        }
    }
    bridge.forget(object)?;
    session.script_wrappers.borrow_mut().remove(object);
    tracing::trace!(target: "script.binding", %object, ?previous, "Host object released");
    Ok(())
}

/// 脚本实例释放后，把认领过的宿主包装器恢复成注册类的原型
pub fn restore_prototype<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    wrapper: &Value<'js>,
) -> rquickjs::Result<()> {
    let Some(class) = host_object(bridge.ctx(), wrapper) else {
        return Ok(());
    };
    let name = class.borrow().slot.class().to_string();
    if session.registry.borrow().find(&name).is_none() {
        return Ok(());
    }
    if let Some(proto) = bridge.prototype(&name)? {
        bridge.set_prototype_of(wrapper, &proto.into_value())?;
    }
    Ok(())
}

// ============================================================================
// 内置复合值
// ============================================================================

pub fn construct_builtin<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    ty: VariantType,
    proto: Value<'js>,
    args: &[Value<'js>],
) -> rquickjs::Result<Value<'js>> {
    let args = marshal_args(bridge, session, args);
    match Composite::construct(ty, &args) {
        Ok(value) => box_composite(bridge, session, value, Some(proto)),
        Err(err) => Err(throw_call_error(bridge.ctx(), &err)),
    }
}

/// 复合值方法与运算符
pub fn dispatch_builtin<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    method: &str,
    this: &Value<'js>,
    args: &[Value<'js>],
) -> rquickjs::Result<Value<'js>> {
    let ctx = bridge.ctx();
    // 参数先复制出来，`a.add(a)` 这类自引用调用不会与下面的可变借用冲突
    let args = marshal_args(bridge, session, args);
    let Some(boxed) = composite_box(ctx, this) else {
        return Err(Exception::throw_type(
            ctx,
            &format!("Illegal invocation of '{}': receiver is not a value type", method),
        ));
    };

    let result = match Operator::from_script_name(method) {
        Some(op) => {
            let value = boxed.borrow().value.clone();
            value.evaluate(op, args.first())
        }
        None => boxed.borrow_mut().value.call(method, &args),
    };
    finish_call(bridge, session, method, result)
}

pub fn get_builtin_property<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    this: &Value<'js>,
    name: &str,
) -> rquickjs::Result<Value<'js>> {
    let ctx = bridge.ctx();
    let value = composite_box(ctx, this).and_then(|boxed| boxed.borrow().value.get(name));
    match value {
        Some(value) => to_js(bridge, session, &value),
        None => Ok(Value::new_undefined(ctx.clone())),
    }
}

pub fn set_builtin_property<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    this: &Value<'js>,
    name: &str,
    value: &Value<'js>,
) -> rquickjs::Result<()> {
    let ctx = bridge.ctx();
    let value = to_variant(bridge, session, value);
    let Some(boxed) = composite_box(ctx, this) else {
        return Err(Exception::throw_type(
            ctx,
            &format!("Cannot set '{}': receiver is not a value type", name),
        ));
    };
    let result = boxed.borrow_mut().value.set(name, &value);
    result.map_err(|err| throw_call_error(ctx, &err))
}
