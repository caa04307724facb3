//! 核心宏定义
//!
//! 提供统一的宏来减少 `Default` 实现的重复代码

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```ignore
/// impl_default!(ParticleSystemConfig {
///     enable_multi_threading: true,
///     parallel_threshold: 8,
///     // ...
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
