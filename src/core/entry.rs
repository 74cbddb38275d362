use serde::{Deserialize, Serialize};

use crate::core::key::AttributeKey;

/// 条目的稳定标识：桶与缓存只存 id，不复制条目本体。
/// payload 原地更新后，所有持有 id 的缓存槽自动看到新值。
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

/// 存储条目。attributes 在创建后不可变（是条目的身份）；payload 可原地替换。
///
/// `get_cache_ref` / `filter_cache_refs` 是反向引用：只记录“此条目当前占用
/// 哪些缓存槽”，不拥有槽内容。删除条目时靠它们做定向失效，免全缓存扫描。
#[derive(Clone, Debug)]
pub struct Entry<P> {
    pub id: EntryId,
    pub attributes: AttributeKey,
    pub payload: P,
    /// get-cache 中指向本条目的槽（至多一个）
    pub get_cache_ref: Option<String>,
    /// filter-cache 中结果集包含本条目的所有槽
    pub filter_cache_refs: Vec<String>,
}

impl<P> Entry<P> {
    pub fn new(id: EntryId, attributes: AttributeKey, payload: P) -> Self {
        Self {
            id,
            attributes,
            payload,
            get_cache_ref: None,
            filter_cache_refs: Vec::new(),
        }
    }

    /// 登记一个 filter-cache 反向引用（去重）
    pub fn push_filter_ref(&mut self, hash: &str) {
        if !self.filter_cache_refs.iter().any(|h| h == hash) {
            self.filter_cache_refs.push(hash.to_string());
        }
    }

    /// 注销一个 filter-cache 反向引用；不存在则 no-op
    pub fn drop_filter_ref(&mut self, hash: &str) {
        if let Some(i) = self.filter_cache_refs.iter().position(|h| h == hash) {
            self.filter_cache_refs.swap_remove(i);
        }
    }
}
