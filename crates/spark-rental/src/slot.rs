//! 无锁槽位池。
//!
//! # 模块角色（Why）
//! - 构建器对象在热路径上被反复租借与归还；为每次租借分配一个新对象会把分配器推到关键路径上；
//! - 槽位池以固定容量缓存对象，满了就丢弃，不阻塞、不报错，也不需要锁。
//!
//! # 核心机制（How）
//! - 每个槽位是一个 `AtomicPtr<O>`：空指针表示空槽，非空指针指向经 `Box::into_raw` 转移所有权的对象；
//! - `try_take` 用 `swap(null)` 认领对象：同一对象只可能被一个调用方换出；
//! - `try_put` 用 `compare_exchange(null, ptr)` 占位：只有观察到空槽的那一次交换能成功；
//! - 共享形态额外提供单对象快速通道，并在首次溢出时才分配槽位数组（`OnceLock` 一次性初始化）。
//!
//! # 契约说明（What）
//! - 槽位之间没有顺序语义，`try_take` 可能返回任意驻留对象；
//! - 容量在构造时固定，之后不会扩缩；
//! - 池被销毁时，仍驻留的对象随之释放。

use core::{fmt, marker::PhantomData, ptr};
use std::sync::OnceLock;

use crate::{
    config,
    registry,
    sync::{AtomicPtr, AtomicU64, Ordering},
};

/// 单个槽位：最多容纳一个对象。
struct Slot<O> {
    ptr: AtomicPtr<O>,
    _owns: PhantomData<Box<O>>,
}

// SAFETY: 槽位只通过原子交换在线程间转移 `Box<O>` 的所有权，不会出现两个线程同时
// 访问同一个 `O`；因此只要 `O: Send`，跨线程共享 `&Slot<O>` 就是安全的。
unsafe impl<O: Send> Sync for Slot<O> {}
// SAFETY: 槽位独占其中的对象，移动槽位等价于移动 `Box<O>`。
unsafe impl<O: Send> Send for Slot<O> {}

impl<O> Slot<O> {
    fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
            _owns: PhantomData,
        }
    }

    fn is_occupied(&self) -> bool {
        !self.ptr.load(Ordering::Relaxed).is_null()
    }

    fn take(&self) -> Option<Box<O>> {
        // 先做一次廉价的读，空槽无需发起交换。
        if !self.is_occupied() {
            return None;
        }
        let raw = self.ptr.swap(ptr::null_mut(), Ordering::AcqRel);
        if raw.is_null() {
            return None;
        }
        // SAFETY: 非空指针只可能来自 `offer` 中的 `Box::into_raw`，且 `swap` 保证
        // 只有本次调用拿到它，所有权在此唯一地回到 `Box`。
        Some(unsafe { Box::from_raw(raw) })
    }

    fn offer(&self, object: Box<O>) -> Result<(), Box<O>> {
        if self.is_occupied() {
            return Err(object);
        }
        let raw = Box::into_raw(object);
        match self
            .ptr
            .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            // SAFETY: 交换失败说明 `raw` 从未被发布到槽位中，仍由本线程独占。
            Err(_) => Err(unsafe { Box::from_raw(raw) }),
        }
    }
}

impl<O> Drop for Slot<O> {
    fn drop(&mut self) {
        drop(self.take());
    }
}

/// `SlotPool` 是固定容量的无锁对象回收池。
///
/// # 部署形态
/// - **私有实例**：[`SlotPool::new`] 创建，槽位数组立即分配，由所属组件持有；
/// - **共享实例**：[`SlotPool::shared`] 返回进程级单例，先尝试单对象快速通道，
///   溢出槽位数组在第一次需要时才分配。
///
/// # 契约说明（What）
/// - 任意数量的线程可以并发调用 `try_take` / `try_put`；
/// - 一次成功的 `try_take` 之后，对象只属于调用方，池中不再有它的引用；
/// - `try_put` 在池满时丢弃对象并返回 `false`。
///
/// # 示例
/// ```rust
/// use spark_rental::SlotPool;
///
/// let pool = SlotPool::new(2);
/// assert!(pool.try_put(Box::new(String::from("frame"))));
/// let reused = pool.try_take().expect("刚归还的对象应可取回");
/// assert_eq!(reused.as_str(), "frame");
/// assert!(pool.try_take().is_none());
/// ```
pub struct SlotPool<O> {
    fast_lane: Option<Slot<O>>,
    slots: OnceLock<Box<[Slot<O>]>>,
    capacity: usize,
    counters: SlotCounters,
}

impl<O> SlotPool<O> {
    /// 创建容量为 `capacity` 的私有池。
    pub fn new(capacity: usize) -> Self {
        Self {
            fast_lane: None,
            slots: OnceLock::from(allocate_slots(capacity)),
            capacity,
            counters: SlotCounters::new(),
        }
    }

    fn with_fast_lane(overflow: usize) -> Self {
        Self {
            fast_lane: Some(Slot::new()),
            slots: OnceLock::new(),
            capacity: overflow,
            counters: SlotCounters::new(),
        }
    }

    /// 取出任意一个驻留对象；池为空时返回 `None`。
    pub fn try_take(&self) -> Option<Box<O>> {
        let found = self
            .fast_lane
            .as_ref()
            .and_then(Slot::take)
            .or_else(|| self.slots.get()?.iter().find_map(Slot::take));
        match found {
            Some(object) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(object)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 归还对象；池满时对象被丢弃并返回 `false`。
    pub fn try_put(&self, object: Box<O>) -> bool {
        let object = match &self.fast_lane {
            Some(lane) => match lane.offer(object) {
                Ok(()) => return self.accepted(),
                Err(object) => object,
            },
            None => object,
        };

        let slots = self.slots.get_or_init(|| {
            tracing::debug!(slots = self.capacity, "shared slot pool overflow initialized");
            allocate_slots(self.capacity)
        });
        let mut pending = object;
        for slot in slots.iter() {
            match slot.offer(pending) {
                Ok(()) => return self.accepted(),
                Err(object) => pending = object,
            }
        }

        drop(pending);
        self.counters.drops.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(capacity = self.capacity(), "slot pool full; object dropped");
        false
    }

    fn accepted(&self) -> bool {
        self.counters.returns.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// 可驻留对象的总数（含快速通道）。
    pub fn capacity(&self) -> usize {
        self.capacity + usize::from(self.fast_lane.is_some())
    }

    /// 当前驻留对象数的瞬时快照；并发修改下仅供观测。
    pub fn len(&self) -> usize {
        let lane = self
            .fast_lane
            .as_ref()
            .is_some_and(Slot::is_occupied);
        let resident = self
            .slots
            .get()
            .map_or(0, |slots| slots.iter().filter(|slot| slot.is_occupied()).count());
        resident + usize::from(lane)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取出并释放所有驻留对象，返回释放数量。
    pub fn clear(&self) -> usize {
        let mut drained = 0;
        while let Some(object) = self
            .fast_lane
            .as_ref()
            .and_then(Slot::take)
            .or_else(|| self.slots.get()?.iter().find_map(Slot::take))
        {
            drop(object);
            drained += 1;
        }
        drained
    }

    /// 读取统计快照。
    pub fn stats(&self) -> SlotPoolStats {
        SlotPoolStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            returns: self.counters.returns.load(Ordering::Relaxed),
            drops: self.counters.drops.load(Ordering::Relaxed),
        }
    }
}

impl<O: Send + 'static> SlotPool<O> {
    /// 进程级共享池，按对象类型各一份。
    ///
    /// # 教案式说明
    /// - **意图（Why）**：没有明确归属组件的对象也能复用，单线程突发场景优先命中快速通道；
    /// - **逻辑（How）**：实例经类型注册表先到先得地发布，竞争失败方的候选实例被丢弃，
    ///   调用方永远只看到一个池；溢出槽位数量取自生效配置的 `shared_slots`；
    /// - **契约（What）**：返回 `'static` 引用，进程生命周期内不会被替换。
    pub fn shared() -> &'static Self {
        registry::get_or_init(|| Self::with_fast_lane(config::active().shared_slots))
    }
}

impl<O> fmt::Debug for SlotPool<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPool")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("fast_lane", &self.fast_lane.is_some())
            .finish()
    }
}

fn allocate_slots<O>(capacity: usize) -> Box<[Slot<O>]> {
    (0..capacity).map(|_| Slot::new()).collect()
}

struct SlotCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    returns: AtomicU64,
    drops: AtomicU64,
}

impl SlotCounters {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }
}

/// 槽位池统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotPoolStats {
    /// 取到驻留对象的次数。
    pub hits: u64,
    /// 池为空、调用方需要自行构造的次数。
    pub misses: u64,
    /// 成功驻留的归还次数。
    pub returns: u64,
    /// 池满被丢弃的归还次数。
    pub drops: u64,
}

impl SlotPoolStats {
    /// 命中率（0.0 ~ 1.0）。
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
