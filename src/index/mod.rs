pub mod inverted;

use crate::core::{AttributeKey, RegistryError};

/// 注册表抽象：四个客户端操作。
///
/// ## 契约（重要）
/// - `get` 只命中属性集与查询**完全相等**的条目；超集不算。
/// - `filter` 返回属性集为查询超集的全部条目（含精确命中）；空查询返回空，
///   不是 match-all。
/// - `set` / `delete` 总是成功（upsert / 缺失 no-op）。
/// - 带缓存的实现会在 `get` / `filter` 中填充缓存，所以接收者是 `&mut self`。
pub trait Registry<P> {
    fn get(&mut self, key: &AttributeKey) -> Result<&P, RegistryError>;
    fn filter(&mut self, key: &AttributeKey) -> Vec<(&AttributeKey, &P)>;
    fn set(&mut self, key: AttributeKey, payload: P);
    fn delete(&mut self, key: &AttributeKey);
}

pub use inverted::AttributeIndex;
