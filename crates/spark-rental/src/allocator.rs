//! 定长块分配器。
//!
//! # 模块角色（Why）
//! - 构建器扩容时只需要“至少 N 个元素的连续块”，分配器把这一需求与具体的内存来源解耦；
//! - 默认实现按 2 的幂分桶缓存空闲块，峰值过后每个桶只保留有限数量，超出部分交还全局分配器。
//!
//! # 契约说明（What）
//! - 租出的块长度不小于请求长度，内容未定义；
//! - 长度不是桶尺寸或超过缓存上限的块在回收时直接释放。

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use spin::Mutex;

use crate::{
    config::{self, RentalConfig},
    element::Element,
    registry,
};

/// 最小桶长度（元素个数）；更小的请求向上取整到该长度。
pub const MIN_BLOCK_LEN: usize = 16;

/// `ArrayPool` 描述构建器背后的定长块分配器。
///
/// # 设计初衷（Why）
/// - 构建器只关心“至少 N 个元素的连续块”，不关心块来自自由链表、`mmap` 还是测试探针；
/// - 把租借与回收抽象为 trait，允许调用方注入自定义分配策略，也让测试能够记录回收事件。
///
/// # 契约定义（What）
/// - `rent(minimum_len)`：返回长度 `>= minimum_len` 的块，可以超额供给；内容未定义（可能残留旧数据）；
///   `minimum_len == 0` 时允许返回空块。
/// - `reclaim(block)`：收回一块内存；调用方保证不会传入空块，也不会对同一块重复归还。
/// - 实现必须线程安全，且两个方法都不得 panic；分配失败按进程级致命错误处理。
pub trait ArrayPool<T>: Send + Sync + 'static {
    fn rent(&self, minimum_len: usize) -> Box<[T]>;

    fn reclaim(&self, block: Box<[T]>);
}

/// `SharedArrayPool` 是按 2 的幂分桶的默认块分配器。
///
/// # 核心机制（How）
/// - 每个桶维护 `spin::Mutex<Vec<Box<[T]>>>` 作为自由链表，租借时弹出、回收时压入；
/// - 桶长度从 [`MIN_BLOCK_LEN`] 翻倍到 `max_pooled_len`；超出上限的请求精确分配，归还时直接释放；
/// - 每个桶最多保留 `bucket_depth` 个块，超出部分交还全局分配器，防止峰值后的内存滞留。
///
/// # 契约说明（What）
/// - **线程安全**：自由链表由自旋锁保护，统计使用 `Relaxed` 原子计数；
/// - **后置条件**：`rent(n)` 返回的块长度 `>= n`；长度不是桶尺寸的块在回收时被丢弃而不是缓存。
///
/// # 设计权衡（Trade-offs）
/// - 自旋锁临界区只包含一次 `Vec::push/pop`，竞争窗口极短，比阻塞锁更轻；
/// - 复用块默认不清零；需要干净内容时使用 [`rent_zeroed`](Self::rent_zeroed) 或打开 `clear_on_reclaim`。
pub struct SharedArrayPool<T: Element> {
    buckets: Box<[Mutex<Vec<Box<[T]>>>]>,
    bucket_depth: usize,
    max_pooled_len: usize,
    clear_on_reclaim: bool,
    metrics: ArrayMetrics,
}

impl<T: Element> SharedArrayPool<T> {
    /// 使用生效中的进程配置创建独立实例。
    pub fn new() -> Self {
        Self::with_config(config::active())
    }

    /// 使用显式配置创建独立实例；配置需已通过校验。
    pub fn with_config(config: &RentalConfig) -> Self {
        let bucket_count = bucket_index(config.max_pooled_len) + 1;
        let buckets = (0..bucket_count)
            .map(|_| Mutex::new(Vec::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buckets,
            bucket_depth: config.bucket_depth,
            max_pooled_len: config.max_pooled_len,
            clear_on_reclaim: config.clear_on_reclaim,
            metrics: ArrayMetrics::default(),
        }
    }

    /// 进程级共享实例，按元素类型各一份，首次访问时按生效配置惰性创建。
    pub fn shared() -> Arc<Self> {
        Arc::clone(registry::get_or_init(|| Arc::new(Self::new())))
    }

    /// 租借并以 `T::default()` 填充整块。
    pub fn rent_zeroed(&self, minimum_len: usize) -> Box<[T]> {
        let mut block = self.rent(minimum_len);
        block.fill(T::default());
        block
    }

    /// 清空全部自由链表，返回释放的元素总数。
    pub fn trim(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| {
                let drained = core::mem::take(&mut *bucket.lock());
                drained.iter().map(|block| block.len()).sum::<usize>()
            })
            .sum()
    }

    /// 读取统计快照。
    pub fn stats(&self) -> ArrayPoolStats {
        let (idle_blocks, idle_elements) =
            self.buckets.iter().fold((0, 0), |(blocks, elements), bucket| {
                let list = bucket.lock();
                let bucket_elements: usize = list.iter().map(|block| block.len()).sum();
                (blocks + list.len(), elements + bucket_elements)
            });
        ArrayPoolStats {
            rented: self.metrics.rented.load(Ordering::Relaxed),
            reused: self.metrics.reused.load(Ordering::Relaxed),
            allocated: self.metrics.allocated.load(Ordering::Relaxed),
            retained: self.metrics.retained.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
            idle_blocks,
            idle_elements,
        }
    }

    fn pooled_bucket(&self, len: usize) -> Option<usize> {
        (len <= self.max_pooled_len).then(|| bucket_index(len))
    }

    fn fresh_block(&self, len: usize) -> Box<[T]> {
        self.metrics.allocated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(len, "allocating fresh block");
        vec![T::default(); len].into_boxed_slice()
    }
}

impl<T: Element> Default for SharedArrayPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> ArrayPool<T> for SharedArrayPool<T> {
    fn rent(&self, minimum_len: usize) -> Box<[T]> {
        if minimum_len == 0 {
            return Box::default();
        }
        self.metrics.rented.fetch_add(1, Ordering::Relaxed);
        let Some(index) = self.pooled_bucket(minimum_len) else {
            return self.fresh_block(minimum_len);
        };
        let reused = self.buckets[index].lock().pop();
        match reused {
            Some(block) => {
                self.metrics.reused.fetch_add(1, Ordering::Relaxed);
                block
            }
            None => self.fresh_block(MIN_BLOCK_LEN << index),
        }
    }

    fn reclaim(&self, mut block: Box<[T]>) {
        let len = block.len();
        let index = match self.pooled_bucket(len) {
            Some(index) if len == MIN_BLOCK_LEN << index => index,
            _ => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(len, "block length is not a bucket size; released to the heap");
                return;
            }
        };
        if self.clear_on_reclaim {
            block.fill(T::default());
        }
        let mut list = self.buckets[index].lock();
        if list.len() < self.bucket_depth {
            list.push(block);
            drop(list);
            self.metrics.retained.fetch_add(1, Ordering::Relaxed);
        } else {
            drop(list);
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(len, "bucket full; block released to the heap");
        }
    }
}

/// 数组池统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArrayPoolStats {
    /// 非空租借次数。
    pub rented: u64,
    /// 由自由链表满足的租借次数。
    pub reused: u64,
    /// 新分配的块数。
    pub allocated: u64,
    /// 被放回自由链表的块数。
    pub retained: u64,
    /// 回收时因桶满、超长或尺寸不符而释放的块数。
    pub dropped: u64,
    /// 当前空闲块数量。
    pub idle_blocks: usize,
    /// 当前空闲元素总数。
    pub idle_elements: usize,
}

impl ArrayPoolStats {
    /// 复用率（0.0 ~ 1.0）。
    pub fn reuse_rate(&self) -> f64 {
        if self.rented == 0 {
            0.0
        } else {
            self.reused as f64 / self.rented as f64
        }
    }
}

#[derive(Default)]
struct ArrayMetrics {
    rented: AtomicU64,
    reused: AtomicU64,
    allocated: AtomicU64,
    retained: AtomicU64,
    dropped: AtomicU64,
}

/// 将长度映射到桶下标：向上取整到 2 的幂，再以 `MIN_BLOCK_LEN` 为 0 号桶。
fn bucket_index(len: usize) -> usize {
    let rounded = len.max(MIN_BLOCK_LEN).next_power_of_two();
    (rounded.trailing_zeros() - MIN_BLOCK_LEN.trailing_zeros()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool(depth: usize) -> SharedArrayPool<u8> {
        let config = RentalConfig::builder()
            .bucket_depth(depth)
            .max_pooled_len(256)
            .build()
            .expect("合法配置");
        SharedArrayPool::with_config(&config)
    }

    #[test]
    fn bucket_index_rounds_up_to_power_of_two() {
        assert_eq!(bucket_index(1), 0);
        assert_eq!(bucket_index(16), 0);
        assert_eq!(bucket_index(17), 1);
        assert_eq!(bucket_index(32), 1);
        assert_eq!(bucket_index(33), 2);
    }

    #[test]
    fn rent_over_provisions_to_bucket_size() {
        let pool = small_pool(4);
        assert_eq!(pool.rent(1).len(), 16);
        assert_eq!(pool.rent(100).len(), 128);
        assert!(pool.rent(0).is_empty(), "零长度请求返回空块");
    }

    #[test]
    fn reclaimed_block_is_reused_without_clearing() {
        let pool = small_pool(4);
        let mut block = pool.rent(20);
        block[0] = 42;
        let address = block.as_ptr();
        pool.reclaim(block);

        let again = pool.rent(30);
        assert_eq!(again.as_ptr(), address, "同桶租借应复用同一块");
        assert_eq!(again[0], 42, "默认不清零");

        let stats = pool.stats();
        assert_eq!(stats.rented, 2);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.allocated, 1);
    }

    #[test]
    fn rent_zeroed_resets_stale_content() {
        let pool = small_pool(4);
        let mut block = pool.rent(16);
        block.fill(9);
        pool.reclaim(block);
        assert!(pool.rent_zeroed(16).iter().all(|&b| b == 0));
    }

    #[test]
    fn full_bucket_and_foreign_lengths_are_dropped() {
        let pool = small_pool(1);
        pool.reclaim(pool.rent(16));
        pool.reclaim(vec![0u8; 16].into_boxed_slice());
        pool.reclaim(vec![0u8; 17].into_boxed_slice());
        pool.reclaim(pool.rent(1000));

        let stats = pool.stats();
        assert_eq!(stats.retained, 1);
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.idle_blocks, 1);
        assert_eq!(pool.trim(), 16);
        assert_eq!(pool.stats().idle_blocks, 0);
    }

    #[test]
    fn oversize_requests_are_exact() {
        let pool = small_pool(4);
        assert_eq!(pool.rent(300).len(), 300);
    }
}
