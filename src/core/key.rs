use std::collections::btree_map;
use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// name/value 之间的分隔符（base64 编码后拼接，原文出现 `:` 不会碰撞）
const HASH_KV_DELIMITER: char = ':';
/// pair 之间的分隔符
const HASH_PAIR_DELIMITER: char = ',';

/// 属性键：一组 (name, value) 字符串对，name 唯一、无序。
///
/// ## 契约
/// - 相等 = 尺寸相同且每个 name 的 value 相同（不存在部分匹配）。
/// - 内部用 BTreeMap：迭代天然按 name 字典序，`cache_hash` 不依赖插入顺序。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeKey(BTreeMap<String, String>);

impl AttributeKey {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// 插入一对属性；name 已存在时替换并返回旧 value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按 name 字典序迭代
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// self 的每一对 (name, value) 是否都出现在 other 中（other 可以更多）
    pub fn is_subset_of(&self, other: &AttributeKey) -> bool {
        self.0
            .iter()
            .all(|(name, value)| other.get(name) == Some(value.as_str()))
    }

    /// 规范化缓存键：name 字典序，逐对输出 `b64(name):b64(value),`。
    /// 同样的 pair 集合无论插入顺序，产出的串逐字节相同。
    pub fn cache_hash(&self) -> String {
        let mut hash = String::new();
        for (name, value) in self.0.iter() {
            hash.push_str(&BASE64.encode(name.as_bytes()));
            hash.push(HASH_KV_DELIMITER);
            hash.push_str(&BASE64.encode(value.as_bytes()));
            hash.push(HASH_PAIR_DELIMITER);
        }
        hash
    }

    /// 估算堆占用（name/value 字节数，不含 BTreeMap 结点开销）
    pub(crate) fn estimated_bytes(&self) -> u64 {
        self.0
            .iter()
            .map(|(name, value)| (name.len() + value.len()) as u64)
            .sum()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for AttributeKey {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }
}
