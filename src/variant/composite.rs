//! 复合值类型
//!
//! 数学/几何类值类型（向量、矩形、变换、颜色）以及路径、资源ID、字典。
//! 宿主侧按值传递；脚本侧每个值被复制到堆上，由脚本包装对象独占，
//! 包装对象被回收时释放且只释放一次。
//!
//! 每个类型都向注册器提供：方法表、属性表、构造函数、属性读写以及
//! 代数运算符（加减乘除、取负、相等、排序）。

use super::{Variant, VariantType};
use crate::core::error::{CallError, CallResult};
use crate::variant_arg;
use glam::{Affine2, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect2 {
    pub position: Vec2,
    pub size: Vec2,
}

impl Rect2 {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            size: Vec2::new(width, height),
        }
    }

    pub fn end(&self) -> Vec2 {
        self.position + self.size
    }

    pub fn area(&self) -> f32 {
        self.size.x * self.size.y
    }

    pub fn has_point(&self, point: Vec2) -> bool {
        let end = self.end();
        point.x >= self.position.x && point.y >= self.position.y && point.x < end.x && point.y < end.y
    }

    pub fn intersects(&self, other: &Rect2) -> bool {
        let (a_end, b_end) = (self.end(), other.end());
        self.position.x < b_end.x
            && other.position.x < a_end.x
            && self.position.y < b_end.y
            && other.position.y < a_end.y
    }

    pub fn merge(&self, other: &Rect2) -> Rect2 {
        let position = self.position.min(other.position);
        let end = self.end().max(other.end());
        Rect2 {
            position,
            size: end - position,
        }
    }

    pub fn grow(&self, by: f32) -> Rect2 {
        Rect2 {
            position: self.position - Vec2::splat(by),
            size: self.size + Vec2::splat(by * 2.0),
        }
    }
}

/// RGBA 颜色，分量范围 0..1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::rgba(0.0, 0.0, 0.0, 1.0)
    }
}

impl Color {
    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self::rgba(f(self.r), f(self.g), f(self.b), f(self.a))
    }

    fn zip(self, other: Color, f: impl Fn(f32, f32) -> f32) -> Self {
        Self::rgba(
            f(self.r, other.r),
            f(self.g, other.g),
            f(self.b, other.b),
            f(self.a, other.a),
        )
    }

    pub fn inverted(self) -> Self {
        Self::rgba(1.0 - self.r, 1.0 - self.g, 1.0 - self.b, self.a)
    }

    pub fn gray(self) -> f32 {
        (self.r + self.g + self.b) / 3.0
    }

    pub fn to_html(self, with_alpha: bool) -> String {
        let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        let mut html = format!("{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b));
        if with_alpha {
            html.push_str(&format!("{:02x}", byte(self.a)));
        }
        html
    }
}

/// 节点路径，如 `/root/Player` 或 `../Sprite`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodePath(pub String);

impl NodePath {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }
}

/// 宿主资源 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Rid(pub u64);

/// 字典，键为字符串
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dictionary(pub BTreeMap<String, Variant>);

/// 复合值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Composite {
    Vector2(Vec2),
    Vector3(Vec3),
    Rect2(Rect2),
    Transform2D(Affine2),
    Color(Color),
    NodePath(NodePath),
    Rid(Rid),
    Dictionary(Dictionary),
}

/// 以固定名字绑定到脚本侧的代数运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Equal,
    Less,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
        Operator::Negate,
        Operator::Equal,
        Operator::Less,
    ];

    /// 脚本侧方法名
    pub fn script_name(self) -> &'static str {
        match self {
            Operator::Add => "add",
            Operator::Subtract => "subtract",
            Operator::Multiply => "multiply",
            Operator::Divide => "divide",
            Operator::Negate => "negate",
            Operator::Equal => "equals",
            Operator::Less => "less",
        }
    }

    pub fn from_script_name(name: &str) -> Option<Operator> {
        Self::ALL.into_iter().find(|op| op.script_name() == name)
    }

    pub fn is_unary(self) -> bool {
        matches!(self, Operator::Negate)
    }
}

fn vec2_arg(args: &[Variant], index: usize) -> CallResult<Vec2> {
    match args.get(index) {
        Some(Variant::Composite(Composite::Vector2(v))) => Ok(*v),
        Some(other) => Err(CallError::InvalidArgument {
            index,
            expected: VariantType::Vector2,
            found: other.get_type(),
        }),
        None => Err(CallError::ArgumentCount {
            expected: index + 1,
            given: args.len(),
        }),
    }
}

fn vec3_arg(args: &[Variant], index: usize) -> CallResult<Vec3> {
    match args.get(index) {
        Some(Variant::Composite(Composite::Vector3(v))) => Ok(*v),
        Some(other) => Err(CallError::InvalidArgument {
            index,
            expected: VariantType::Vector3,
            found: other.get_type(),
        }),
        None => Err(CallError::ArgumentCount {
            expected: index + 1,
            given: args.len(),
        }),
    }
}

fn rect_arg(args: &[Variant], index: usize) -> CallResult<Rect2> {
    match args.get(index) {
        Some(Variant::Composite(Composite::Rect2(r))) => Ok(*r),
        Some(other) => Err(CallError::InvalidArgument {
            index,
            expected: VariantType::Rect2,
            found: other.get_type(),
        }),
        None => Err(CallError::ArgumentCount {
            expected: index + 1,
            given: args.len(),
        }),
    }
}

fn color_arg(args: &[Variant], index: usize) -> CallResult<Color> {
    match args.get(index) {
        Some(Variant::Composite(Composite::Color(c))) => Ok(*c),
        Some(other) => Err(CallError::InvalidArgument {
            index,
            expected: VariantType::Color,
            found: other.get_type(),
        }),
        None => Err(CallError::ArgumentCount {
            expected: index + 1,
            given: args.len(),
        }),
    }
}

fn real_arg(args: &[Variant], index: usize) -> CallResult<f32> {
    variant_arg!(args, index, Real).map(|r| r as f32)
}

fn expect_args(args: &[Variant], expected: usize) -> CallResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(CallError::ArgumentCount {
            expected,
            given: args.len(),
        })
    }
}

impl Composite {
    pub fn get_type(&self) -> VariantType {
        match self {
            Composite::Vector2(_) => VariantType::Vector2,
            Composite::Vector3(_) => VariantType::Vector3,
            Composite::Rect2(_) => VariantType::Rect2,
            Composite::Transform2D(_) => VariantType::Transform2D,
            Composite::Color(_) => VariantType::Color,
            Composite::NodePath(_) => VariantType::NodePath,
            Composite::Rid(_) => VariantType::Rid,
            Composite::Dictionary(_) => VariantType::Dictionary,
        }
    }

    /// 该类型向脚本公开的方法名
    pub fn method_names(ty: VariantType) -> &'static [&'static str] {
        match ty {
            VariantType::Vector2 => &[
                "length",
                "length_squared",
                "normalized",
                "dot",
                "distance_to",
                "angle",
                "abs",
                "lerp",
                "rotated",
            ],
            VariantType::Vector3 => &[
                "length",
                "length_squared",
                "normalized",
                "dot",
                "cross",
                "distance_to",
                "abs",
                "lerp",
            ],
            VariantType::Rect2 => &[
                "get_area",
                "get_center",
                "has_point",
                "intersects",
                "merge",
                "grow",
            ],
            VariantType::Transform2D => &[
                "get_origin",
                "get_rotation",
                "get_scale",
                "inverse",
                "xform",
                "rotated",
                "translated",
            ],
            VariantType::Color => &["to_html", "inverted", "lerp", "gray"],
            VariantType::NodePath => &["get_name_count", "get_name", "is_absolute", "is_empty"],
            VariantType::Rid => &["get_id"],
            VariantType::Dictionary => &[
                "size", "empty", "has", "get", "set", "erase", "keys", "values", "clear",
            ],
            _ => &[],
        }
    }

    /// 该类型向脚本公开的属性名
    pub fn property_names(ty: VariantType) -> &'static [&'static str] {
        match ty {
            VariantType::Vector2 => &["x", "y"],
            VariantType::Vector3 => &["x", "y", "z"],
            VariantType::Rect2 => &["position", "size", "end"],
            VariantType::Transform2D => &["x", "y", "origin"],
            VariantType::Color => &["r", "g", "b", "a"],
            _ => &[],
        }
    }

    /// 脚本侧 `new Vector2(...)` 等构造
    pub fn construct(ty: VariantType, args: &[Variant]) -> CallResult<Composite> {
        let composite = match (ty, args.len()) {
            (VariantType::Vector2, 0) => Composite::Vector2(Vec2::ZERO),
            (VariantType::Vector2, 2) => {
                Composite::Vector2(Vec2::new(real_arg(args, 0)?, real_arg(args, 1)?))
            }
            (VariantType::Vector3, 0) => Composite::Vector3(Vec3::ZERO),
            (VariantType::Vector3, 3) => Composite::Vector3(Vec3::new(
                real_arg(args, 0)?,
                real_arg(args, 1)?,
                real_arg(args, 2)?,
            )),
            (VariantType::Rect2, 0) => Composite::Rect2(Rect2::default()),
            (VariantType::Rect2, 2) => Composite::Rect2(Rect2 {
                position: vec2_arg(args, 0)?,
                size: vec2_arg(args, 1)?,
            }),
            (VariantType::Rect2, 4) => Composite::Rect2(Rect2::new(
                real_arg(args, 0)?,
                real_arg(args, 1)?,
                real_arg(args, 2)?,
                real_arg(args, 3)?,
            )),
            (VariantType::Transform2D, 0) => Composite::Transform2D(Affine2::IDENTITY),
            (VariantType::Transform2D, 2) => Composite::Transform2D(
                Affine2::from_angle_translation(real_arg(args, 0)?, vec2_arg(args, 1)?),
            ),
            (VariantType::Color, 0) => Composite::Color(Color::default()),
            (VariantType::Color, 3) => Composite::Color(Color::rgba(
                real_arg(args, 0)?,
                real_arg(args, 1)?,
                real_arg(args, 2)?,
                1.0,
            )),
            (VariantType::Color, 4) => Composite::Color(Color::rgba(
                real_arg(args, 0)?,
                real_arg(args, 1)?,
                real_arg(args, 2)?,
                real_arg(args, 3)?,
            )),
            (VariantType::NodePath, 0) => Composite::NodePath(NodePath::default()),
            (VariantType::NodePath, 1) => {
                Composite::NodePath(NodePath(variant_arg!(args, 0, String)?))
            }
            (VariantType::Rid, 0) => Composite::Rid(Rid::default()),
            (VariantType::Rid, 1) => Composite::Rid(Rid(variant_arg!(args, 0, Int)? as u64)),
            (VariantType::Dictionary, 0) => Composite::Dictionary(Dictionary::default()),
            (ty, given) if ty.is_composite() => {
                return Err(CallError::ArgumentCount {
                    expected: Self::default_arity(ty),
                    given,
                })
            }
            (ty, _) => return Err(CallError::InvalidMethod(ty.name().to_string())),
        };
        Ok(composite)
    }

    fn default_arity(ty: VariantType) -> usize {
        match ty {
            VariantType::Vector2 | VariantType::Rect2 | VariantType::Transform2D => 2,
            VariantType::Vector3 | VariantType::Color => 3,
            VariantType::NodePath | VariantType::Rid => 1,
            _ => 0,
        }
    }

    pub fn get(&self, name: &str) -> Option<Variant> {
        let value: Variant = match (self, name) {
            (Composite::Vector2(v), "x") => v.x.into(),
            (Composite::Vector2(v), "y") => v.y.into(),
            (Composite::Vector3(v), "x") => v.x.into(),
            (Composite::Vector3(v), "y") => v.y.into(),
            (Composite::Vector3(v), "z") => v.z.into(),
            (Composite::Rect2(r), "position") => r.position.into(),
            (Composite::Rect2(r), "size") => r.size.into(),
            (Composite::Rect2(r), "end") => r.end().into(),
            (Composite::Transform2D(t), "x") => t.matrix2.x_axis.into(),
            (Composite::Transform2D(t), "y") => t.matrix2.y_axis.into(),
            (Composite::Transform2D(t), "origin") => t.translation.into(),
            (Composite::Color(c), "r") => c.r.into(),
            (Composite::Color(c), "g") => c.g.into(),
            (Composite::Color(c), "b") => c.b.into(),
            (Composite::Color(c), "a") => c.a.into(),
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, name: &str, value: &Variant) -> CallResult<()> {
        let args = std::slice::from_ref(value);
        match (self, name) {
            (Composite::Vector2(v), "x") => v.x = real_arg(args, 0)?,
            (Composite::Vector2(v), "y") => v.y = real_arg(args, 0)?,
            (Composite::Vector3(v), "x") => v.x = real_arg(args, 0)?,
            (Composite::Vector3(v), "y") => v.y = real_arg(args, 0)?,
            (Composite::Vector3(v), "z") => v.z = real_arg(args, 0)?,
            (Composite::Rect2(r), "position") => r.position = vec2_arg(args, 0)?,
            (Composite::Rect2(r), "size") => r.size = vec2_arg(args, 0)?,
            (Composite::Rect2(r), "end") => r.size = vec2_arg(args, 0)? - r.position,
            (Composite::Transform2D(t), "x") => t.matrix2.x_axis = vec2_arg(args, 0)?,
            (Composite::Transform2D(t), "y") => t.matrix2.y_axis = vec2_arg(args, 0)?,
            (Composite::Transform2D(t), "origin") => t.translation = vec2_arg(args, 0)?,
            (Composite::Color(c), "r") => c.r = real_arg(args, 0)?,
            (Composite::Color(c), "g") => c.g = real_arg(args, 0)?,
            (Composite::Color(c), "b") => c.b = real_arg(args, 0)?,
            (Composite::Color(c), "a") => c.a = real_arg(args, 0)?,
            (_, name) => return Err(CallError::InvalidMethod(name.to_string())),
        }
        Ok(())
    }

    /// 按名字调用方法
    pub fn call(&mut self, method: &str, args: &[Variant]) -> CallResult<Variant> {
        let ty = self.get_type();
        match self {
            Composite::Vector2(v) => {
                let v = *v;
                match method {
                    "length" => Ok(v.length().into()),
                    "length_squared" => Ok(v.length_squared().into()),
                    "normalized" => Ok(v.normalize_or_zero().into()),
                    "dot" => Ok(v.dot(vec2_arg(args, 0)?).into()),
                    "distance_to" => Ok(v.distance(vec2_arg(args, 0)?).into()),
                    "angle" => Ok(v.y.atan2(v.x).into()),
                    "abs" => Ok(v.abs().into()),
                    "lerp" => Ok(v.lerp(vec2_arg(args, 0)?, real_arg(args, 1)?).into()),
                    "rotated" => Ok(Vec2::from_angle(real_arg(args, 0)?).rotate(v).into()),
                    _ => Err(Self::not_found(ty, method)),
                }
            }
            Composite::Vector3(v) => {
                let v = *v;
                match method {
                    "length" => Ok(v.length().into()),
                    "length_squared" => Ok(v.length_squared().into()),
                    "normalized" => Ok(v.normalize_or_zero().into()),
                    "dot" => Ok(v.dot(vec3_arg(args, 0)?).into()),
                    "cross" => Ok(v.cross(vec3_arg(args, 0)?).into()),
                    "distance_to" => Ok(v.distance(vec3_arg(args, 0)?).into()),
                    "abs" => Ok(v.abs().into()),
                    "lerp" => Ok(v.lerp(vec3_arg(args, 0)?, real_arg(args, 1)?).into()),
                    _ => Err(Self::not_found(ty, method)),
                }
            }
            Composite::Rect2(r) => match method {
                "get_area" => Ok(r.area().into()),
                "get_center" => Ok((r.position + r.size * 0.5).into()),
                "has_point" => Ok(r.has_point(vec2_arg(args, 0)?).into()),
                "intersects" => Ok(r.intersects(&rect_arg(args, 0)?).into()),
                "merge" => Ok(r.merge(&rect_arg(args, 0)?).into()),
                "grow" => Ok(r.grow(real_arg(args, 0)?).into()),
                _ => Err(Self::not_found(ty, method)),
            },
            Composite::Transform2D(t) => match method {
                "get_origin" => Ok(t.translation.into()),
                "get_rotation" => Ok(t.matrix2.x_axis.y.atan2(t.matrix2.x_axis.x).into()),
                "get_scale" => Ok(
                    Vec2::new(t.matrix2.x_axis.length(), t.matrix2.y_axis.length()).into(),
                ),
                "inverse" => Ok(t.inverse().into()),
                "xform" => Ok(t.transform_point2(vec2_arg(args, 0)?).into()),
                "rotated" => Ok((Affine2::from_angle(real_arg(args, 0)?) * *t).into()),
                "translated" => {
                    let mut moved = *t;
                    moved.translation += vec2_arg(args, 0)?;
                    Ok(moved.into())
                }
                _ => Err(Self::not_found(ty, method)),
            },
            Composite::Color(c) => match method {
                "to_html" => {
                    let with_alpha = match args.first() {
                        Some(flag) => flag.booleanize(),
                        None => true,
                    };
                    Ok(c.to_html(with_alpha).into())
                }
                "inverted" => Ok(c.inverted().into()),
                "gray" => Ok(c.gray().into()),
                "lerp" => {
                    let to = color_arg(args, 0)?;
                    let weight = real_arg(args, 1)?;
                    Ok(c.zip(to, |a, b| a + (b - a) * weight).into())
                }
                _ => Err(Self::not_found(ty, method)),
            },
            Composite::NodePath(path) => match method {
                "get_name_count" => Ok(Variant::Int(path.names().count() as i64)),
                "get_name" => {
                    let index = variant_arg!(args, 0, Int)?;
                    Ok(path
                        .names()
                        .nth(index.max(0) as usize)
                        .map(Variant::from)
                        .unwrap_or_default())
                }
                "is_absolute" => Ok(path.is_absolute().into()),
                "is_empty" => Ok(path.0.is_empty().into()),
                _ => Err(Self::not_found(ty, method)),
            },
            Composite::Rid(rid) => match method {
                "get_id" => Ok(Variant::Int(rid.0 as i64)),
                _ => Err(Self::not_found(ty, method)),
            },
            Composite::Dictionary(dict) => match method {
                "size" => Ok(Variant::Int(dict.0.len() as i64)),
                "empty" => Ok(dict.0.is_empty().into()),
                "has" => Ok(dict.0.contains_key(&variant_arg!(args, 0, String)?).into()),
                "get" => {
                    let key = variant_arg!(args, 0, String)?;
                    let fallback = args.get(1).cloned().unwrap_or_default();
                    Ok(dict.0.get(&key).cloned().unwrap_or(fallback))
                }
                "set" => {
                    expect_args(args, 2)?;
                    let key = variant_arg!(args, 0, String)?;
                    dict.0.insert(key, args[1].clone());
                    Ok(Variant::Nil)
                }
                "erase" => Ok(dict.0.remove(&variant_arg!(args, 0, String)?).is_some().into()),
                "keys" => Ok(Variant::Array(
                    dict.0.keys().cloned().map(Variant::String).collect(),
                )),
                "values" => Ok(Variant::Array(dict.0.values().cloned().collect())),
                "clear" => {
                    dict.0.clear();
                    Ok(Variant::Nil)
                }
                _ => Err(Self::not_found(ty, method)),
            },
        }
    }

    fn not_found(ty: VariantType, method: &str) -> CallError {
        CallError::MethodNotFound {
            class: ty.name().to_string(),
            method: method.to_string(),
        }
    }

    /// 运算符求值，`rhs` 对一元运算为 `None`
    pub fn evaluate(&self, op: Operator, rhs: Option<&Variant>) -> CallResult<Variant> {
        let rhs_args: &[Variant] = match rhs {
            Some(value) => std::slice::from_ref(value),
            None if op.is_unary() => &[],
            None => {
                return Err(CallError::ArgumentCount {
                    expected: 1,
                    given: 0,
                })
            }
        };

        if op == Operator::Equal {
            let equal = matches!(rhs, Some(Variant::Composite(other)) if other == self);
            return Ok(equal.into());
        }

        let unsupported = || CallError::InvalidMethod(format!(
            "{}.{}",
            self.get_type().name(),
            op.script_name()
        ));

        match (self, op) {
            (Composite::Vector2(v), Operator::Negate) => Ok((-*v).into()),
            (Composite::Vector2(v), Operator::Add) => Ok((*v + vec2_arg(rhs_args, 0)?).into()),
            (Composite::Vector2(v), Operator::Subtract) => {
                Ok((*v - vec2_arg(rhs_args, 0)?).into())
            }
            (Composite::Vector2(v), Operator::Multiply) => match rhs {
                Some(Variant::Composite(Composite::Vector2(o))) => Ok((*v * *o).into()),
                _ => Ok((*v * real_arg(rhs_args, 0)?).into()),
            },
            (Composite::Vector2(v), Operator::Divide) => match rhs {
                Some(Variant::Composite(Composite::Vector2(o))) => Ok((*v / *o).into()),
                _ => Ok((*v / real_arg(rhs_args, 0)?).into()),
            },
            (Composite::Vector2(v), Operator::Less) => {
                let o = vec2_arg(rhs_args, 0)?;
                Ok((if v.x == o.x { v.y < o.y } else { v.x < o.x }).into())
            }
            (Composite::Vector3(v), Operator::Negate) => Ok((-*v).into()),
            (Composite::Vector3(v), Operator::Add) => Ok((*v + vec3_arg(rhs_args, 0)?).into()),
            (Composite::Vector3(v), Operator::Subtract) => {
                Ok((*v - vec3_arg(rhs_args, 0)?).into())
            }
            (Composite::Vector3(v), Operator::Multiply) => match rhs {
                Some(Variant::Composite(Composite::Vector3(o))) => Ok((*v * *o).into()),
                _ => Ok((*v * real_arg(rhs_args, 0)?).into()),
            },
            (Composite::Vector3(v), Operator::Divide) => match rhs {
                Some(Variant::Composite(Composite::Vector3(o))) => Ok((*v / *o).into()),
                _ => Ok((*v / real_arg(rhs_args, 0)?).into()),
            },
            (Composite::Vector3(v), Operator::Less) => {
                let o = vec3_arg(rhs_args, 0)?;
                let less = if v.x != o.x {
                    v.x < o.x
                } else if v.y != o.y {
                    v.y < o.y
                } else {
                    v.z < o.z
                };
                Ok(less.into())
            }
            (Composite::Transform2D(t), Operator::Multiply) => match rhs {
                Some(Variant::Composite(Composite::Transform2D(o))) => Ok((*t * *o).into()),
                Some(Variant::Composite(Composite::Vector2(p))) => {
                    Ok(t.transform_point2(*p).into())
                }
                Some(other) => Err(CallError::InvalidArgument {
                    index: 0,
                    expected: VariantType::Transform2D,
                    found: other.get_type(),
                }),
                None => Err(unsupported()),
            },
            (Composite::Color(c), Operator::Negate) => Ok(c.map(|x| 1.0 - x).into()),
            (Composite::Color(c), Operator::Add) => {
                Ok(c.zip(color_arg(rhs_args, 0)?, |a, b| a + b).into())
            }
            (Composite::Color(c), Operator::Subtract) => {
                Ok(c.zip(color_arg(rhs_args, 0)?, |a, b| a - b).into())
            }
            (Composite::Color(c), Operator::Multiply) => match rhs {
                Some(Variant::Composite(Composite::Color(o))) => Ok(c.zip(*o, |a, b| a * b).into()),
                _ => {
                    let s = real_arg(rhs_args, 0)?;
                    Ok(c.map(|x| x * s).into())
                }
            },
            (Composite::Color(c), Operator::Divide) => match rhs {
                Some(Variant::Composite(Composite::Color(o))) => Ok(c.zip(*o, |a, b| a / b).into()),
                _ => {
                    let s = real_arg(rhs_args, 0)?;
                    Ok(c.map(|x| x / s).into())
                }
            },
            (Composite::Rid(a), Operator::Less) => match rhs {
                Some(Variant::Composite(Composite::Rid(b))) => Ok((a < b).into()),
                Some(other) => Err(CallError::InvalidArgument {
                    index: 0,
                    expected: VariantType::Rid,
                    found: other.get_type(),
                }),
                None => Err(unsupported()),
            },
            _ => Err(unsupported()),
        }
    }
}

impl fmt::Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Composite::Vector2(v) => write!(f, "({}, {})", v.x, v.y),
            Composite::Vector3(v) => write!(f, "({}, {}, {})", v.x, v.y, v.z),
            Composite::Rect2(r) => write!(
                f,
                "({}, {}, {}, {})",
                r.position.x, r.position.y, r.size.x, r.size.y
            ),
            Composite::Transform2D(t) => write!(
                f,
                "(({}, {}), ({}, {}), ({}, {}))",
                t.matrix2.x_axis.x,
                t.matrix2.x_axis.y,
                t.matrix2.y_axis.x,
                t.matrix2.y_axis.y,
                t.translation.x,
                t.translation.y
            ),
            Composite::Color(c) => write!(f, "{},{},{},{}", c.r, c.g, c.b, c.a),
            Composite::NodePath(p) => f.write_str(&p.0),
            Composite::Rid(rid) => write!(f, "[RID:{}]", rid.0),
            Composite::Dictionary(d) => {
                f.write_str("{")?;
                for (i, (k, v)) in d.0.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

macro_rules! impl_into_composite {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Composite {
                fn from(value: $ty) -> Self {
                    Composite::$variant(value)
                }
            }
        )*
    };
}

impl_into_composite!(
    Vec2 => Vector2,
    Vec3 => Vector3,
    Rect2 => Rect2,
    Affine2 => Transform2D,
    Color => Color,
    NodePath => NodePath,
    Rid => Rid,
    Dictionary => Dictionary,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_operators() {
        let a = Composite::Vector2(Vec2::new(1.0, 2.0));
        let b = Variant::from(Vec2::new(3.0, 4.0));

        assert_eq!(
            a.evaluate(Operator::Add, Some(&b)).unwrap(),
            Variant::from(Vec2::new(4.0, 6.0))
        );
        assert_eq!(
            a.evaluate(Operator::Multiply, Some(&Variant::Real(2.0))).unwrap(),
            Variant::from(Vec2::new(2.0, 4.0))
        );
        assert_eq!(
            a.evaluate(Operator::Negate, None).unwrap(),
            Variant::from(Vec2::new(-1.0, -2.0))
        );
        assert_eq!(a.evaluate(Operator::Less, Some(&b)).unwrap(), Variant::Bool(true));
        assert_eq!(
            a.evaluate(Operator::Equal, Some(&Variant::from(Vec2::new(1.0, 2.0))))
                .unwrap(),
            Variant::Bool(true)
        );
    }

    #[test]
    fn test_unsupported_operator_is_an_error() {
        let path = Composite::NodePath(NodePath("/root".into()));
        assert!(matches!(
            path.evaluate(Operator::Add, Some(&Variant::Nil)),
            Err(CallError::InvalidMethod(_))
        ));
    }

    #[test]
    fn test_construct_and_properties() {
        let mut rect = Composite::construct(
            VariantType::Rect2,
            &[1.into(), 2.into(), 10.into(), 20.into()],
        )
        .unwrap();
        assert_eq!(rect.get("end"), Some(Variant::from(Vec2::new(11.0, 22.0))));

        rect.set("size", &Variant::from(Vec2::new(1.0, 1.0))).unwrap();
        assert_eq!(rect.call("get_area", &[]).unwrap(), Variant::Real(1.0));

        assert_eq!(
            Composite::construct(VariantType::Vector3, &[1.into()]),
            Err(CallError::ArgumentCount { expected: 3, given: 1 })
        );
    }

    #[test]
    fn test_dictionary_methods_mutate_boxed_copy() {
        let mut dict = Composite::Dictionary(Dictionary::default());
        dict.call("set", &["hp".into(), 10.into()]).unwrap();
        assert_eq!(dict.call("get", &["hp".into()]).unwrap(), Variant::Int(10));
        assert_eq!(dict.call("size", &[]).unwrap(), Variant::Int(1));
        assert!(matches!(
            dict.call("frobnicate", &[]),
            Err(CallError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn test_transform_multiply_vector() {
        let t = Composite::Transform2D(Affine2::from_translation(Vec2::new(5.0, 0.0)));
        let p = Variant::from(Vec2::new(1.0, 1.0));
        assert_eq!(
            t.evaluate(Operator::Multiply, Some(&p)).unwrap(),
            Variant::from(Vec2::new(6.0, 1.0))
        );
    }

    #[test]
    fn test_every_composite_lists_members() {
        for ty in VariantType::COMPOSITES {
            assert!(!Composite::method_names(ty).is_empty(), "{ty} has no methods");
            assert!(Composite::construct(ty, &[]).is_ok());
        }
    }
}
