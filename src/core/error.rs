/// 唯一的失败类型：精确匹配 get 未命中。
/// 其余操作（filter / set / delete）都是全函数，不会失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no entry matches the exact attribute key")]
    NotFound,
}
