use std::collections::{BTreeSet, HashMap};

use crate::core::{AttributeKey, Entry, EntryId, RegistryError};
use crate::index::Registry;
use crate::stats::IndexStats;

/// 倒排属性索引：条目的唯一属主。
///
/// - `entries` 是 arena：桶和缓存只存 `EntryId`，payload 原地更新对所有
///   持有者可见。
/// - `buckets`：name → value → 有序 id 集。一个条目在它自己的每个
///   (name, value) 对应的槽中恰好出现一次；槽清空后立即剪除（父 name
///   映射同理），不留空容器。
pub struct AttributeIndex<P> {
    entries: HashMap<EntryId, Entry<P>>,
    buckets: HashMap<String, HashMap<String, BTreeSet<EntryId>>>,
    next_id: u64,
}

impl<P> Default for AttributeIndex<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> AttributeIndex<P> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            buckets: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry<P>> {
        self.entries.get(&id)
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry<P>> {
        self.entries.get_mut(&id)
    }

    pub fn payload(&self, id: EntryId) -> Option<&P> {
        self.entries.get(&id).map(|e| &e.payload)
    }

    /// 查询中每个 (name, value) 对应的桶；缺失的桶直接跳过——缺失不是错误，
    /// 只说明没有条目能满足整个查询（见 `intersect` 的早退）。
    fn lookup_buckets(&self, query: &AttributeKey) -> Vec<&BTreeSet<EntryId>> {
        query
            .iter()
            .filter_map(|(name, value)| self.buckets.get(name).and_then(|m| m.get(value)))
            .collect()
    }

    /// 跨桶求交：按 id 计数，命中桶数 == 查询 name 数才入选。
    /// `required` 必须是**查询**的 name 数而非现存桶数：查询里出现未知属性时
    /// 任何条目都不可能集齐，结果为空。
    fn intersect(bucket_sets: &[&BTreeSet<EntryId>], required: usize) -> Vec<EntryId> {
        if required == 0 || bucket_sets.len() < required {
            return Vec::new();
        }
        let mut counter: HashMap<EntryId, usize> = HashMap::new();
        for set in bucket_sets {
            for &id in set.iter() {
                *counter.entry(id).or_insert(0) += 1;
            }
        }
        let mut out: Vec<EntryId> = counter
            .into_iter()
            .filter(|&(_, count)| count == required)
            .map(|(id, _)| id)
            .collect();
        // id 即插入序，排序后结果确定
        out.sort_unstable();
        out
    }

    /// 超集匹配：属性集包含查询全部 pair 的条目 id（含精确命中），按 id 升序。
    /// 空查询返回空集，不支持 match-all。
    pub fn filter_ids(&self, query: &AttributeKey) -> Vec<EntryId> {
        Self::intersect(&self.lookup_buckets(query), query.len())
    }

    /// 精确匹配：超集结果中属性数与查询相同的那一个。只读，无副作用。
    pub fn exact(&self, query: &AttributeKey) -> Option<EntryId> {
        self.filter_ids(query).into_iter().find(|id| {
            self.entries
                .get(id)
                .is_some_and(|e| e.attributes.len() == query.len())
        })
    }

    /// upsert：精确命中则原地替换 payload（身份不变，已有缓存引用继续有效）；
    /// 否则建新条目并写入它每个 (name, value) 的桶。
    pub fn upsert(&mut self, key: AttributeKey, payload: P) -> EntryId {
        if let Some(id) = self.exact(&key) {
            if let Some(e) = self.entries.get_mut(&id) {
                e.payload = payload;
            }
            tracing::trace!(id = id.0, "upsert: payload replaced in place");
            return id;
        }

        let id = EntryId(self.next_id);
        self.next_id += 1;
        for (name, value) in key.iter() {
            self.buckets
                .entry(name.clone())
                .or_default()
                .entry(value.clone())
                .or_default()
                .insert(id);
        }
        tracing::debug!(id = id.0, attrs = key.len(), "upsert: new entry indexed");
        self.entries.insert(id, Entry::new(id, key, payload));
        id
    }

    /// 精确删除。成功时把 id 从**被删条目自身**每个属性对应的桶中移除
    /// （不是只按查询的 pair 删，否则查询为真子集时会留下悬挂引用），
    /// 剪除空 value 槽与空 name 映射，返回带反向引用的条目供上层做
    /// 缓存失效。未命中返回 None，no-op。
    pub fn remove(&mut self, query: &AttributeKey) -> Option<Entry<P>> {
        let id = self.exact(query)?;
        let entry = self.entries.remove(&id)?;

        for (name, value) in entry.attributes.iter() {
            let Some(values) = self.buckets.get_mut(name) else {
                continue;
            };
            if let Some(ids) = values.get_mut(value) {
                ids.remove(&id);
                if ids.is_empty() {
                    values.remove(value);
                }
            }
            if values.is_empty() {
                self.buckets.remove(name);
            }
        }

        tracing::debug!(id = id.0, "remove: entry unindexed from all buckets");
        Some(entry)
    }

    pub fn stats(&self) -> IndexStats {
        let mut bucket_slot_count = 0;
        let mut postings_total = 0;
        let mut bucket_bytes = 0u64;
        for (name, values) in &self.buckets {
            bucket_slot_count += values.len();
            for (value, ids) in values {
                postings_total += ids.len();
                bucket_bytes += (name.len() + value.len()) as u64
                    + (ids.len() * std::mem::size_of::<EntryId>()) as u64;
            }
        }

        // payload 是泛型，估算只覆盖 key 与反向引用字符串
        let entry_bytes: u64 = self
            .entries
            .values()
            .map(|e| {
                e.attributes.estimated_bytes()
                    + e.get_cache_ref.as_ref().map_or(0, |h| h.len() as u64)
                    + e.filter_cache_refs.iter().map(|h| h.len() as u64).sum::<u64>()
            })
            .sum();

        IndexStats {
            entry_count: self.entries.len(),
            attr_name_count: self.buckets.len(),
            bucket_slot_count,
            postings_total,
            estimated_bytes: entry_bytes + bucket_bytes,
        }
    }
}

/// 不带缓存的直通实现（基线对照走同一契约）
impl<P> Registry<P> for AttributeIndex<P> {
    fn get(&mut self, key: &AttributeKey) -> Result<&P, RegistryError> {
        let id = self.exact(key).ok_or(RegistryError::NotFound)?;
        self.payload(id).ok_or(RegistryError::NotFound)
    }

    fn filter(&mut self, key: &AttributeKey) -> Vec<(&AttributeKey, &P)> {
        self.filter_ids(key)
            .into_iter()
            .filter_map(|id| self.entry(id))
            .map(|e| (&e.attributes, &e.payload))
            .collect()
    }

    fn set(&mut self, key: AttributeKey, payload: P) {
        self.upsert(key, payload);
    }

    fn delete(&mut self, key: &AttributeKey) {
        self.remove(key);
    }
}
