use std::fmt;

use serde::Serialize;

/// 注册表占用统计：索引 + 两个缓存
#[derive(Clone, Debug, Default, Serialize)]
pub struct RegistryReport {
    pub index: IndexStats,
    pub get_cache: CacheStats,
    pub filter_cache: CacheStats,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct IndexStats {
    /// 活跃条目数（arena）
    pub entry_count: usize,
    /// 倒排索引：不同属性 name 数量
    pub attr_name_count: usize,
    /// 倒排索引：(name, value) 槽总数
    pub bucket_slot_count: usize,
    /// 所有槽内 EntryId 总数
    pub postings_total: usize,
    /// 估算内存（字节，不含泛型 payload）
    pub estimated_bytes: u64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CacheStats {
    /// 当前槽数
    pub slot_count: usize,
    /// recency 列表长度（不变式：恒等于 slot_count）
    pub recency_len: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

impl fmt::Display for RegistryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "index:")?;
        writeln!(f, "  entries:      {:>8}", self.index.entry_count)?;
        writeln!(f, "  attr names:   {:>8}", self.index.attr_name_count)?;
        writeln!(f, "  bucket slots: {:>8}", self.index.bucket_slot_count)?;
        writeln!(f, "  postings:     {:>8}", self.index.postings_total)?;
        writeln!(
            f,
            "  estimated:    {:>8}",
            human_bytes(self.index.estimated_bytes)
        )?;
        for (label, c) in [("get-cache", &self.get_cache), ("filter-cache", &self.filter_cache)] {
            writeln!(f, "{}:", label)?;
            writeln!(f, "  slots:    {:>6} / {}", c.slot_count, c.capacity)?;
            writeln!(f, "  hits:     {:>6}", c.hits)?;
            writeln!(f, "  misses:   {:>6}", c.misses)?;
        }
        Ok(())
    }
}
