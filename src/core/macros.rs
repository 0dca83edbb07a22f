//! 核心宏定义
//!
//! 提供统一的宏来减少代码重复

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// struct MyStruct {
///     field1: u32,
///     field2: String,
/// }
///
/// game_engine_js::impl_default!(MyStruct {
///     field1: 0,
///     field2: String::new(),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

/// 从参数切片中按类型取出第 N 个参数
///
/// 类型不匹配时返回 `CallError::InvalidArgument`，参数不足时返回
/// `CallError::ArgumentCount`。数值参数允许 Int/Real 互转。
///
/// 使用示例:
/// ```rust
/// use game_engine_js::{variant_arg, CallError, Variant};
///
/// fn add(args: &[Variant]) -> Result<Variant, CallError> {
///     let a = variant_arg!(args, 0, Int)?;
///     let b = variant_arg!(args, 1, Int)?;
///     Ok(Variant::Int(a + b))
/// }
/// assert_eq!(add(&[Variant::Int(1), Variant::Int(2)]).unwrap(), Variant::Int(3));
/// ```
#[macro_export]
macro_rules! variant_arg {
    (@get $args:expr, $index:expr, $ty:ident, $extract:expr) => {{
        let args: &[$crate::Variant] = $args;
        match args.get($index) {
            None => Err($crate::CallError::ArgumentCount {
                expected: $index + 1,
                given: args.len(),
            }),
            Some(value) => ($extract)(value).ok_or_else(|| $crate::CallError::InvalidArgument {
                index: $index,
                expected: $crate::VariantType::$ty,
                found: value.get_type(),
            }),
        }
    }};
    ($args:expr, $index:expr, Int) => {
        $crate::variant_arg!(@get $args, $index, Int, |v: &$crate::Variant| v.as_int())
    };
    ($args:expr, $index:expr, Real) => {
        $crate::variant_arg!(@get $args, $index, Real, |v: &$crate::Variant| v.as_real())
    };
    ($args:expr, $index:expr, Bool) => {
        $crate::variant_arg!(@get $args, $index, Bool, |v: &$crate::Variant| v.as_bool())
    };
    ($args:expr, $index:expr, String) => {
        $crate::variant_arg!(@get $args, $index, String, |v: &$crate::Variant| v.as_str().map(str::to_owned))
    };
    ($args:expr, $index:expr, Object) => {
        $crate::variant_arg!(@get $args, $index, Object, |v: &$crate::Variant| v.as_object())
    };
}
