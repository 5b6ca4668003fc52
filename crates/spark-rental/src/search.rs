//! 连续子序列检索。

/// 返回 `needle` 在 `haystack` 中首次出现的下标；空 `needle` 在位置 0 命中。
pub(crate) fn find<T: PartialEq>(haystack: &[T], needle: &[T]) -> Option<usize> {
    match needle {
        [] => Some(0),
        [single] => haystack.iter().position(|item| item == single),
        _ if needle.len() > haystack.len() => None,
        _ => haystack.windows(needle.len()).position(|window| window == needle),
    }
}
