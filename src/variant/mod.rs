//! 宿主侧的标签值（Variant）
//!
//! 宿主对象模型是静态类型的，所有跨越脚本边界的值都先落到这个封闭枚举上。
//! 复合值（向量、矩形、变换、颜色、路径、资源ID、字典）在宿主侧是值语义，
//! 在脚本侧以不透明的装箱对象出现，见 [`composite`]。

pub mod composite;

pub use composite::{Color, Composite, Dictionary, NodePath, Operator, Rect2, Rid};

use serde::{Deserialize, Serialize};
use std::fmt;

/// 宿主对象标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Variant 的类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantType {
    Nil,
    Bool,
    Int,
    Real,
    String,
    Object,
    Vector2,
    Vector3,
    Rect2,
    Transform2D,
    Color,
    NodePath,
    Rid,
    Dictionary,
    Array,
}

impl VariantType {
    /// 以复合值句柄形式装箱的类型，按注册顺序排列
    pub const COMPOSITES: [VariantType; 8] = [
        VariantType::Vector2,
        VariantType::Vector3,
        VariantType::Rect2,
        VariantType::Transform2D,
        VariantType::Color,
        VariantType::NodePath,
        VariantType::Rid,
        VariantType::Dictionary,
    ];

    /// 宿主侧的类型名（同时也是脚本侧的构造函数名）
    pub fn name(self) -> &'static str {
        match self {
            VariantType::Nil => "Nil",
            VariantType::Bool => "bool",
            VariantType::Int => "int",
            VariantType::Real => "float",
            VariantType::String => "String",
            VariantType::Object => "Object",
            VariantType::Vector2 => "Vector2",
            VariantType::Vector3 => "Vector3",
            VariantType::Rect2 => "Rect2",
            VariantType::Transform2D => "Transform2D",
            VariantType::Color => "Color",
            VariantType::NodePath => "NodePath",
            VariantType::Rid => "RID",
            VariantType::Dictionary => "Dictionary",
            VariantType::Array => "Array",
        }
    }

    /// 按类型名查找复合类型
    pub fn composite_from_name(name: &str) -> Option<VariantType> {
        Self::COMPOSITES.into_iter().find(|ty| ty.name() == name)
    }

    pub fn is_composite(self) -> bool {
        Self::COMPOSITES.contains(&self)
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 标签值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Real(f64),
    String(String),
    Object(ObjectId),
    Composite(Composite),
    Array(Vec<Variant>),
}

impl Variant {
    pub fn get_type(&self) -> VariantType {
        match self {
            Variant::Nil => VariantType::Nil,
            Variant::Bool(_) => VariantType::Bool,
            Variant::Int(_) => VariantType::Int,
            Variant::Real(_) => VariantType::Real,
            Variant::String(_) => VariantType::String,
            Variant::Object(_) => VariantType::Object,
            Variant::Composite(c) => c.get_type(),
            Variant::Array(_) => VariantType::Array,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// 整数视图，整值的实数也可以读成整数
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(i) => Some(*i),
            Variant::Real(r) if r.fract() == 0.0 && r.is_finite() => Some(*r as i64),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Variant::Int(i) => Some(*i as f64),
            Variant::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Variant::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            Variant::Composite(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Variant::Array(items) => Some(items),
            _ => None,
        }
    }

    /// 宿主的真值语义
    pub fn booleanize(&self) -> bool {
        match self {
            Variant::Nil => false,
            Variant::Bool(b) => *b,
            Variant::Int(i) => *i != 0,
            Variant::Real(r) => *r != 0.0,
            Variant::String(s) => !s.is_empty(),
            Variant::Object(_) | Variant::Composite(_) => true,
            Variant::Array(items) => !items.is_empty(),
        }
    }
}

/// 数值跨类型比较：`Int(2) == Real(2.0)`，与宿主的比较语义一致
impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Nil, Variant::Nil) => true,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Real(a), Variant::Real(b)) => a == b,
            (Variant::Int(a), Variant::Real(b)) | (Variant::Real(b), Variant::Int(a)) => {
                *a as f64 == *b
            }
            (Variant::String(a), Variant::String(b)) => a == b,
            (Variant::Object(a), Variant::Object(b)) => a == b,
            (Variant::Composite(a), Variant::Composite(b)) => a == b,
            (Variant::Array(a), Variant::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Nil => f.write_str("Null"),
            Variant::Bool(true) => f.write_str("True"),
            Variant::Bool(false) => f.write_str("False"),
            Variant::Int(i) => write!(f, "{}", i),
            Variant::Real(r) => write!(f, "{}", r),
            Variant::String(s) => f.write_str(s),
            Variant::Object(id) => write!(f, "[Object:{}]", id),
            Variant::Composite(c) => write!(f, "{}", c),
            Variant::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(value as i64)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int(value)
    }
}

impl From<f32> for Variant {
    fn from(value: f32) -> Self {
        Variant::Real(value as f64)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Real(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<ObjectId> for Variant {
    fn from(value: ObjectId) -> Self {
        Variant::Object(value)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(value: Vec<Variant>) -> Self {
        Variant::Array(value)
    }
}

macro_rules! impl_from_composite {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Variant::Composite(value.into())
                }
            }
        )*
    };
}

impl_from_composite!(
    Composite,
    glam::Vec2,
    glam::Vec3,
    glam::Affine2,
    Rect2,
    Color,
    NodePath,
    Rid,
    Dictionary,
);
