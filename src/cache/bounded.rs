use std::collections::{HashMap, VecDeque};

use crate::stats::CacheStats;

/// 定容缓存：规范化 hash 串 → 任意值，更新序淘汰。
///
/// ## 契约（重要）
/// - recency 只在 `update` 时前移，`get` / `get_mut` 不动——是 update-recency
///   策略，不是经典 access-recency LRU，必须原样保持。
/// - 任何时刻 recency 中的 hash 集合与 store 的键集合完全一致。
/// - `update` 先删后插，单次调用最多超容一条，淘汰最旧一条即足够。
pub struct BoundedCache<V> {
    store: HashMap<String, V>,
    /// 更新序；队首最旧
    recency: VecDeque<String>,
    capacity: usize,
}

impl<V> BoundedCache<V> {
    /// capacity 必须为正（构造期配置，不设默认值）
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        Self {
            store: HashMap::with_capacity(capacity),
            recency: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.store.contains_key(hash)
    }

    /// 读取，不影响淘汰顺序
    pub fn get(&self, hash: &str) -> Option<&V> {
        self.store.get(hash)
    }

    /// 原地改写一个槽（同样不影响淘汰顺序），用于 delete 传播时回写缩短后的
    /// filter 结果
    pub fn get_mut(&mut self, hash: &str) -> Option<&mut V> {
        self.store.get_mut(hash)
    }

    /// 写入/替换并前移到最新。超容时淘汰最旧一条并返还给调用方，
    /// 由调用方负责清理被淘汰值里的反向引用。
    pub fn update(&mut self, hash: String, value: V) -> Option<(String, V)> {
        if self.store.contains_key(&hash) {
            // 先删后插：重复 update 不算增长，且移动到最新
            self.detach(&hash);
        }
        self.recency.push_back(hash.clone());
        self.store.insert(hash, value);

        if self.store.len() <= self.capacity {
            return None;
        }
        let oldest = self.recency.pop_front()?;
        let evicted = self.store.remove(&oldest)?;
        tracing::debug!(hash = %oldest, "cache: evicted oldest slot");
        Some((oldest, evicted))
    }

    /// 无条件移除（store + recency）；缺失时 no-op
    pub fn remove(&mut self, hash: &str) -> Option<V> {
        let value = self.store.remove(hash)?;
        if let Some(i) = self.recency.iter().position(|h| h == hash) {
            self.recency.remove(i);
        }
        Some(value)
    }

    fn detach(&mut self, hash: &str) {
        self.store.remove(hash);
        if let Some(i) = self.recency.iter().position(|h| h == hash) {
            self.recency.remove(i);
        }
    }

    pub fn stats(&self, hits: u64, misses: u64) -> CacheStats {
        CacheStats {
            slot_count: self.store.len(),
            recency_len: self.recency.len(),
            capacity: self.capacity,
            hits,
            misses,
        }
    }

    #[cfg(test)]
    fn recency_order(&self) -> Vec<&str> {
        self.recency.iter().map(|h| h.as_str()).collect()
    }
}
