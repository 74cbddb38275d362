use crate::cache::bounded::BoundedCache;
use crate::core::{AttributeKey, EntryId, RegistryError};
use crate::index::{AttributeIndex, Registry};
use crate::stats::RegistryReport;

/// 带缓存的注册表：一个倒排索引 + 两个定容缓存（get 缓存单条目，filter
/// 缓存结果 id 列表）。
///
/// 一致性靠条目上的反向引用维持：
/// - 缓存槽只存 `EntryId`，`set` 原地替换 payload 后所有已缓存结果自动
///   看到新值，不需要失效。
/// - `delete` 拿到被删条目的反向引用，按 hash 定向清掉两个缓存里的槽，
///   代价是 O(引用该条目的槽数) 而非全缓存扫描。
/// - 缓存淘汰反过来清掉被淘汰条目上的反向引用。
///
/// 索引变更与缓存传播在同一次同步调用内完成，对外不可见中间态。
/// 单写者设计：并发使用时需在外层对四个操作整体加一把锁。
pub struct CoherentRegistry<P> {
    index: AttributeIndex<P>,
    get_cache: BoundedCache<EntryId>,
    filter_cache: BoundedCache<Vec<EntryId>>,
    get_hits: u64,
    get_misses: u64,
    filter_hits: u64,
    filter_misses: u64,
}

impl<P> CoherentRegistry<P> {
    /// 两个缓存容量都是显式构造参数（正整数）
    pub fn with_capacity(get_capacity: usize, filter_capacity: usize) -> Self {
        Self {
            index: AttributeIndex::new(),
            get_cache: BoundedCache::with_capacity(get_capacity),
            filter_cache: BoundedCache::with_capacity(filter_capacity),
            get_hits: 0,
            get_misses: 0,
            filter_hits: 0,
            filter_misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// 精确匹配，缓存未命中时从索引解析并填充 get 缓存
    pub fn get(&mut self, key: &AttributeKey) -> Result<&P, RegistryError> {
        let hash = key.cache_hash();

        let cached = self.get_cache.get(&hash).copied();
        if let Some(id) = cached {
            self.get_hits += 1;
            return self.index.payload(id).ok_or(RegistryError::NotFound);
        }

        self.get_misses += 1;
        let id = self.index.exact(key).ok_or(RegistryError::NotFound)?;

        if let Some((_, evicted_id)) = self.get_cache.update(hash.clone(), id) {
            // 被挤出的条目不再占用 get 缓存槽
            if let Some(e) = self.index.entry_mut(evicted_id) {
                e.get_cache_ref = None;
            }
        }
        if let Some(e) = self.index.entry_mut(id) {
            e.get_cache_ref = Some(hash);
        }

        self.index.payload(id).ok_or(RegistryError::NotFound)
    }

    /// 超集匹配，缓存未命中时从索引解析并填充 filter 缓存。
    /// 返回物化后的 (key, payload) 列表，按条目插入序。
    pub fn filter(&mut self, key: &AttributeKey) -> Vec<(&AttributeKey, &P)> {
        let hash = key.cache_hash();

        if self.filter_cache.contains(&hash) {
            self.filter_hits += 1;
        } else {
            self.filter_misses += 1;
            let ids = self.index.filter_ids(key);

            if let Some((evicted_hash, evicted_ids)) =
                self.filter_cache.update(hash.clone(), ids.clone())
            {
                for id in evicted_ids {
                    if let Some(e) = self.index.entry_mut(id) {
                        e.drop_filter_ref(&evicted_hash);
                    }
                }
            }
            for &id in &ids {
                if let Some(e) = self.index.entry_mut(id) {
                    e.push_filter_ref(&hash);
                }
            }
        }

        let ids = self.filter_cache.get(&hash).cloned().unwrap_or_default();
        ids.into_iter()
            .filter_map(|id| self.index.entry(id))
            .map(|e| (&e.attributes, &e.payload))
            .collect()
    }

    /// upsert。不做任何缓存失效：payload 原地替换，缓存槽持有的 id 不变。
    pub fn set(&mut self, key: AttributeKey, payload: P) {
        self.index.upsert(key, payload);
    }

    /// 精确删除并同步清理两个缓存；未命中 no-op
    pub fn delete(&mut self, key: &AttributeKey) {
        let Some(removed) = self.index.remove(key) else {
            return;
        };

        if let Some(hash) = removed.get_cache_ref.as_deref() {
            self.get_cache.remove(hash);
        }

        for hash in &removed.filter_cache_refs {
            // 槽内列表缩短后原地回写（不动 recency）；清空则整槽移除
            let now_empty = match self.filter_cache.get_mut(hash) {
                Some(ids) => {
                    ids.retain(|&id| id != removed.id);
                    ids.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.filter_cache.remove(hash);
            }
        }

        tracing::debug!(
            id = removed.id.0,
            filter_refs = removed.filter_cache_refs.len(),
            "delete: entry destroyed, cache slots purged"
        );
    }

    pub fn report(&self) -> RegistryReport {
        RegistryReport {
            index: self.index.stats(),
            get_cache: self.get_cache.stats(self.get_hits, self.get_misses),
            filter_cache: self.filter_cache.stats(self.filter_hits, self.filter_misses),
        }
    }
}

impl<P> Registry<P> for CoherentRegistry<P> {
    fn get(&mut self, key: &AttributeKey) -> Result<&P, RegistryError> {
        CoherentRegistry::get(self, key)
    }

    fn filter(&mut self, key: &AttributeKey) -> Vec<(&AttributeKey, &P)> {
        CoherentRegistry::filter(self, key)
    }

    fn set(&mut self, key: AttributeKey, payload: P) {
        CoherentRegistry::set(self, key, payload)
    }

    fn delete(&mut self, key: &AttributeKey) {
        CoherentRegistry::delete(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pairs: &[(&str, &str)]) -> AttributeKey {
        pairs.iter().copied().collect()
    }

    fn init_logs() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[test]
    fn get_populates_cache_and_hits_afterwards() {
        init_logs();
        let mut reg = CoherentRegistry::with_capacity(4, 4);
        reg.set(key(&[("a", "1")]), "v1");

        assert_eq!(reg.get(&key(&[("a", "1")])), Ok(&"v1"));
        assert_eq!(reg.get(&key(&[("a", "1")])), Ok(&"v1"));

        let r = reg.report();
        assert_eq!(r.get_cache.slot_count, 1);
        assert_eq!(r.get_cache.misses, 1);
        assert_eq!(r.get_cache.hits, 1);

        // 条目上登记了 get 缓存反向引用
        let id = reg.index.exact(&key(&[("a", "1")])).unwrap();
        let entry = reg.index.entry(id).unwrap();
        assert_eq!(
            entry.get_cache_ref.as_deref(),
            Some(key(&[("a", "1")]).cache_hash().as_str())
        );
    }

    #[test]
    fn get_miss_is_not_found_and_caches_nothing() {
        let mut reg: CoherentRegistry<&str> = CoherentRegistry::with_capacity(4, 4);
        assert_eq!(reg.get(&key(&[("a", "1")])), Err(RegistryError::NotFound));
        assert_eq!(reg.report().get_cache.slot_count, 0);
    }

    #[test]
    fn superset_query_is_not_an_exact_get() {
        let mut reg = CoherentRegistry::with_capacity(4, 4);
        reg.set(key(&[("a", "1"), ("b", "2")]), "ab");

        assert_eq!(reg.get(&key(&[("a", "1")])), Err(RegistryError::NotFound));
        assert_eq!(reg.filter(&key(&[("a", "1")])).len(), 1);
    }

    #[test]
    fn set_updates_cached_payload_without_invalidation() {
        let mut reg = CoherentRegistry::with_capacity(4, 4);
        let k = key(&[("a", "1")]);
        reg.set(k.clone(), "v1");

        assert_eq!(reg.get(&k), Ok(&"v1"));
        reg.set(k.clone(), "v2");

        // 缓存命中（不是重新解析），但 payload 已是新值
        assert_eq!(reg.get(&k), Ok(&"v2"));
        let r = reg.report();
        assert_eq!(r.get_cache.hits, 1);
        assert_eq!(r.index.entry_count, 1);
    }

    #[test]
    fn set_updates_cached_filter_results_too() {
        let mut reg = CoherentRegistry::with_capacity(4, 4);
        let k = key(&[("a", "1"), ("b", "2")]);
        reg.set(k.clone(), 1);

        assert_eq!(reg.filter(&key(&[("a", "1")])), vec![(&k, &1)]);
        reg.set(k.clone(), 2);

        // filter 缓存命中，物化结果透出新 payload
        assert_eq!(reg.filter(&key(&[("a", "1")])), vec![(&k, &2)]);
        assert_eq!(reg.report().filter_cache.hits, 1);
    }

    #[test]
    fn delete_purges_both_caches() {
        init_logs();
        let mut reg = CoherentRegistry::with_capacity(4, 4);
        let k = key(&[("a", "1"), ("b", "2")]);
        reg.set(k.clone(), "v");

        // 同一条目同时进入两个缓存
        assert!(reg.get(&k).is_ok());
        assert_eq!(reg.filter(&key(&[("a", "1")])).len(), 1);
        assert_eq!(reg.report().get_cache.slot_count, 1);
        assert_eq!(reg.report().filter_cache.slot_count, 1);

        reg.delete(&k);

        let r = reg.report();
        assert_eq!(r.index.entry_count, 0);
        assert_eq!(r.get_cache.slot_count, 0);
        assert_eq!(r.filter_cache.slot_count, 0);
        // recency 同步收缩
        assert_eq!(r.get_cache.recency_len, 0);
        assert_eq!(r.filter_cache.recency_len, 0);

        assert_eq!(reg.get(&k), Err(RegistryError::NotFound));
    }

    #[test]
    fn delete_shortens_shared_filter_slot_in_place() {
        let mut reg = CoherentRegistry::with_capacity(4, 4);
        let k1 = key(&[("a", "1"), ("b", "2")]);
        let k2 = key(&[("a", "1"), ("c", "3")]);
        reg.set(k1.clone(), "ab");
        reg.set(k2.clone(), "ac");

        assert_eq!(reg.filter(&key(&[("a", "1")])).len(), 2);
        reg.delete(&k1);

        // 槽还在，但列表已缩短；后续查询是缓存命中
        assert_eq!(reg.report().filter_cache.slot_count, 1);
        assert_eq!(reg.filter(&key(&[("a", "1")])), vec![(&k2, &"ac")]);
        assert_eq!(reg.report().filter_cache.hits, 1);
    }

    #[test]
    fn delete_missing_is_noop() {
        let mut reg: CoherentRegistry<&str> = CoherentRegistry::with_capacity(4, 4);
        reg.set(key(&[("a", "1")]), "v");
        reg.delete(&key(&[("a", "2")]));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn get_cache_eviction_clears_back_reference() {
        let mut reg = CoherentRegistry::with_capacity(1, 4);
        let k1 = key(&[("a", "1")]);
        let k2 = key(&[("b", "2")]);
        reg.set(k1.clone(), 1);
        reg.set(k2.clone(), 2);

        assert!(reg.get(&k1).is_ok());
        assert!(reg.get(&k2).is_ok());

        // 容量 1：k1 槽被挤出，条目上的反向引用必须已清空
        assert_eq!(reg.report().get_cache.slot_count, 1);
        let id1 = reg.index.exact(&k1).unwrap();
        assert_eq!(reg.index.entry(id1).unwrap().get_cache_ref, None);
        let id2 = reg.index.exact(&k2).unwrap();
        assert!(reg.index.entry(id2).unwrap().get_cache_ref.is_some());
    }

    #[test]
    fn filter_cache_eviction_clears_back_references() {
        let mut reg = CoherentRegistry::with_capacity(4, 1);
        let k = key(&[("a", "1"), ("b", "2")]);
        reg.set(k.clone(), 1);

        reg.filter(&key(&[("a", "1")]));
        let id = reg.index.exact(&k).unwrap();
        assert_eq!(reg.index.entry(id).unwrap().filter_cache_refs.len(), 1);

        // 第二个查询挤出第一个槽：旧 hash 从反向引用中消失，新 hash 登记
        reg.filter(&key(&[("b", "2")]));
        let refs = &reg.index.entry(id).unwrap().filter_cache_refs;
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0], key(&[("b", "2")]).cache_hash());
    }

    #[test]
    fn reads_do_not_refresh_eviction_order() {
        let mut reg = CoherentRegistry::with_capacity(2, 4);
        let k1 = key(&[("a", "1")]);
        let k2 = key(&[("b", "2")]);
        let k3 = key(&[("c", "3")]);
        reg.set(k1.clone(), 1);
        reg.set(k2.clone(), 2);
        reg.set(k3.clone(), 3);

        assert!(reg.get(&k1).is_ok());
        assert!(reg.get(&k2).is_ok());
        // 反复命中 k1 不改变更新序
        for _ in 0..5 {
            assert!(reg.get(&k1).is_ok());
        }

        // k3 入缓存时挤出的仍是最旧的 k1
        assert!(reg.get(&k3).is_ok());
        let id1 = reg.index.exact(&k1).unwrap();
        assert_eq!(reg.index.entry(id1).unwrap().get_cache_ref, None);
    }

    #[test]
    fn filter_result_order_is_insertion_order() {
        let mut reg = CoherentRegistry::with_capacity(4, 4);
        let k1 = key(&[("a", "1"), ("n", "1")]);
        let k2 = key(&[("a", "1"), ("n", "2")]);
        let k3 = key(&[("a", "1"), ("n", "3")]);
        reg.set(k2.clone(), 2);
        reg.set(k1.clone(), 1);
        reg.set(k3.clone(), 3);

        let hits = reg.filter(&key(&[("a", "1")]));
        let payloads: Vec<i32> = hits.iter().map(|&(_, p)| *p).collect();
        assert_eq!(payloads, vec![2, 1, 3]);
    }

    #[test]
    fn opaque_payload_round_trip() {
        // payload 对核心不透明：任意类型，包括动态 JSON
        let mut reg = CoherentRegistry::with_capacity(4, 4);
        let k = key(&[("service", "api"), ("region", "eu")]);
        reg.set(k.clone(), serde_json::json!({ "qps": 120, "ok": true }));

        let got = reg.get(&k).unwrap();
        assert_eq!(got["qps"], 120);

        reg.set(k.clone(), serde_json::json!({ "qps": 250 }));
        assert_eq!(reg.get(&k).unwrap()["qps"], 250);
    }

    #[test]
    fn works_through_registry_trait_object_bound() {
        fn exercise<R: Registry<u32>>(reg: &mut R) {
            reg.set([("a", "1")].into_iter().collect(), 7);
            assert_eq!(reg.get(&[("a", "1")].into_iter().collect()), Ok(&7));
            reg.delete(&[("a", "1")].into_iter().collect());
        }

        let mut cached: CoherentRegistry<u32> = CoherentRegistry::with_capacity(2, 2);
        exercise(&mut cached);
        assert!(cached.is_empty());

        let mut plain: AttributeIndex<u32> = AttributeIndex::new();
        exercise(&mut plain);
        assert!(plain.is_empty());
    }
}
