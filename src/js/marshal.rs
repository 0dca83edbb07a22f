//! 值转换
//!
//! `to_js`：宿主值 -> 脚本值；`to_variant`：脚本值 -> 宿主值。
//!
//! 转换从不抛错：未注册的类、过深的嵌套以及无法识别的脚本对象都会
//! 退化成 Null/Nil 并记录日志，因为脚本经常试探性地读取属性。

use super::binder;
use super::classes::{composite_box, slot_of, CompositeBox};
use super::session::BindingSession;
use super::Bridge;
use crate::core::error::BindingError;
use crate::variant::{Composite, Variant};
use rquickjs::{Array, Class, IntoJs, Value};

/// 宿主值 -> 脚本值
pub fn to_js<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    value: &Variant,
) -> rquickjs::Result<Value<'js>> {
    to_js_depth(bridge, session, value, 0)
}

fn to_js_depth<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    value: &Variant,
    depth: usize,
) -> rquickjs::Result<Value<'js>> {
    let ctx = bridge.ctx();
    match value {
        Variant::Nil => Ok(Value::new_null(ctx.clone())),
        Variant::Bool(b) => Ok(Value::new_bool(ctx.clone(), *b)),
        Variant::Int(i) => Ok(match i32::try_from(*i) {
            Ok(small) => Value::new_int(ctx.clone(), small),
            Err(_) => Value::new_float(ctx.clone(), *i as f64),
        }),
        Variant::Real(r) => Ok(Value::new_float(ctx.clone(), *r)),
        Variant::String(s) => s.as_str().into_js(ctx),
        Variant::Object(id) => binder::wrap_native(bridge, session, *id),
        Variant::Composite(c) => box_composite(bridge, session, c.clone(), None),
        Variant::Array(items) => {
            if depth >= session.config.max_marshal_depth {
                tracing::warn!(target: "script.marshal", depth, "Array nesting too deep, converting to null");
                return Ok(Value::new_null(ctx.clone()));
            }
            let array = Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                array.set(i, to_js_depth(bridge, session, item, depth + 1)?)?;
            }
            Ok(array.into_value())
        }
    }
}

/// 把复合值复制进一个新盒子
///
/// `proto` 为空时使用该类型注册的原型；类型未注册时返回 Null。
pub fn box_composite<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    value: Composite,
    proto: Option<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let ctx = bridge.ctx();
    let ty = value.get_type();

    let proto = match proto {
        Some(proto) => proto,
        None => {
            let registered = if session.registry.borrow().builtin(ty).is_some() {
                bridge.prototype(ty.name())?
            } else {
                None
            };
            match registered {
                Some(proto) => proto.into_value(),
                None => {
                    let err = BindingError::UnregisteredClass(ty.name().to_string());
                    tracing::warn!(target: "script.marshal", %err, "Converting to null");
                    return Ok(Value::new_null(ctx.clone()));
                }
            }
        }
    };

    let boxed = Class::instance(ctx.clone(), CompositeBox { value })?.into_js(ctx)?;
    bridge.set_prototype_of(&boxed, &proto)?;
    Ok(boxed)
}

/// 脚本值 -> 宿主值
pub fn to_variant<'js>(bridge: &Bridge<'js>, session: &BindingSession, value: &Value<'js>) -> Variant {
    to_variant_depth(bridge, session, value, 0)
}

fn to_variant_depth<'js>(
    bridge: &Bridge<'js>,
    session: &BindingSession,
    value: &Value<'js>,
    depth: usize,
) -> Variant {
    if depth > session.config.max_marshal_depth {
        tracing::warn!(target: "script.marshal", depth, "Value nesting too deep, converting to nil");
        return Variant::Nil;
    }
    if value.is_undefined() || value.is_null() {
        return Variant::Nil;
    }
    if let Some(b) = value.as_bool() {
        return Variant::Bool(b);
    }
    if let Some(i) = value.as_int() {
        return Variant::Int(i as i64);
    }
    if let Some(r) = value.as_float() {
        return Variant::Real(r);
    }
    if let Some(s) = value.as_string() {
        return match s.to_string() {
            Ok(s) => Variant::String(s),
            Err(err) => {
                tracing::warn!(target: "script.marshal", error = %err, "Unreadable string");
                Variant::Nil
            }
        };
    }
    if value.is_function() {
        return Variant::Nil;
    }
    if let Some(array) = value.as_array() {
        return Variant::Array(
            array
                .iter::<Value<'js>>()
                .map(|item| match item {
                    Ok(item) => to_variant_depth(bridge, session, &item, depth + 1),
                    Err(_) => Variant::Nil,
                })
                .collect(),
        );
    }

    let ctx = bridge.ctx();
    if let Some((object, _, _)) = slot_of(ctx, value) {
        return Variant::Object(object);
    }
    if let Some(boxed) = composite_box(ctx, value) {
        let inner = boxed.borrow();
        return Variant::Composite(inner.value.clone());
    }

    // 脚本实例对象代表它的宿主对象
    match bridge.owner_of(value) {
        Ok(owner) if !owner.is_undefined() => to_variant_depth(bridge, session, &owner, depth + 1),
        _ => Variant::Nil,
    }
}
