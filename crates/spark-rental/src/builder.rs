//! 池化的可增长缓冲构建器。
//!
//! # 模块角色（Why）
//! - 报文头拼装、文本模板展开等场景需要“先写、再插、再替换”的可变序列，
//!   `Vec<T>` 每次构建都要重新向分配器申请内存，构建完成后又整体释放；
//! - 本模块把构建器拆成两部分复用：内存块来自 [`ArrayPool`]，构建器状态本身驻留在 [`SlotPool`]。
//!
//! # 核心逻辑（How）
//! - `BuilderCore` 只保存租约与写入游标，已写/剩余视图都由二者实时推导；
//! - 扩容时租一块更大的块，只复制已写前缀，旧块立即归还；
//! - 归还时先释放租约、游标归零，再把状态对象交给槽位池，池满则直接丢弃。
//!
//! # 契约说明（What）
//! - 单个 [`BufferBuilder`] 只有一个写者；它可以在线程间移交，但不能被共享写入；
//! - 非法参数（插入位置越界、空替换模式等）在默认方法中 panic，`try_*` 变体返回 [`RentalError`]；
//! - 复用得到的内存不保证清零，未写区域的内容未定义。

use core::{cmp::Ordering, fmt, mem};
use std::{io, sync::Arc};

use bytes::{BufMut, Bytes, buf::UninitSlice};

use crate::{
    allocator::{ArrayPool, SharedArrayPool},
    config,
    element::Element,
    error::RentalError,
    lease::BlockLease,
    search,
    slot::{SlotPool, SlotPoolStats},
};

/// `BufMut::chunk_mut` 在缓冲写满时一次预留的元素数。
const CHUNK_RESERVE: usize = 64;

/// 可在池中驻留的构建器状态。
pub(crate) struct BuilderCore<T: Element> {
    lease: BlockLease<T>,
    written: usize,
}

impl<T: Element> BuilderCore<T> {
    fn fresh() -> Box<Self> {
        Box::new(Self {
            lease: BlockLease::empty(),
            written: 0,
        })
    }
}

enum Backing<T: Element> {
    Private(Arc<SlotPool<BuilderCore<T>>>),
    Global(&'static SlotPool<BuilderCore<T>>),
}

impl<T: Element> Clone for Backing<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Private(pool) => Self::Private(Arc::clone(pool)),
            Self::Global(pool) => Self::Global(*pool),
        }
    }
}

/// `BuilderPool` 负责租出 [`BufferBuilder`] 并回收它们的状态。
///
/// # 设计初衷（Why）
/// - 不同组件的构建器负载差异很大：编解码器希望独占一个小池以避免与其他组件争抢，
///   零散调用方则只需要一个进程级共享池；
/// - 分配策略同样可替换：测试可以注入记录型分配器，验证每块内存恰好归还一次。
///
/// # 逻辑解析（How）
/// - 私有池持有 `Arc<SlotPool>`，容量默认取配置中的 `builder_slots`；
/// - 共享池引用 `SlotPool::shared()`，因而享有单对象快速通道；
/// - 句柄可廉价克隆，每个构建器都持有一份，用于归还时找到来源。
///
/// # 契约说明（What）
/// - 池中驻留的状态总是“空租约、游标为 0”；
/// - 池满时归还的状态被丢弃，不影响调用方。
pub struct BuilderPool<T: Element> {
    backing: Backing<T>,
    allocator: Arc<dyn ArrayPool<T>>,
}

impl<T: Element> Clone for BuilderPool<T> {
    fn clone(&self) -> Self {
        Self {
            backing: self.backing.clone(),
            allocator: Arc::clone(&self.allocator),
        }
    }
}

impl<T: Element> BuilderPool<T> {
    /// 私有池，容量取生效配置的 `builder_slots`。
    pub fn new() -> Self {
        Self::with_capacity(config::active().builder_slots)
    }

    /// 指定槽位数量的私有池，内存块来自共享数组池。
    pub fn with_capacity(slots: usize) -> Self {
        Self::with_allocator(slots, SharedArrayPool::<T>::shared())
    }

    /// 指定槽位数量与块分配器的私有池。
    pub fn with_allocator(slots: usize, allocator: Arc<dyn ArrayPool<T>>) -> Self {
        Self {
            backing: Backing::Private(Arc::new(SlotPool::new(slots))),
            allocator,
        }
    }

    /// 进程级共享池的句柄。
    pub fn shared() -> Self {
        Self {
            backing: Backing::Global(SlotPool::shared()),
            allocator: SharedArrayPool::<T>::shared(),
        }
    }

    /// 租出一个构建器；`hint > 0` 时预先租借至少 `hint` 个元素。
    pub fn rent(&self, hint: usize) -> BufferBuilder<T> {
        let mut core = self.take_core();
        if hint > 0 {
            core.lease = BlockLease::rent_from(&self.allocator, hint);
        }
        BufferBuilder {
            core: Some(core),
            pool: self.clone(),
        }
    }

    /// 租出一个构建器并直接采用调用方提供的租约，游标从 0 开始。
    pub fn rent_with_lease(&self, lease: BlockLease<T>) -> BufferBuilder<T> {
        let mut core = self.take_core();
        core.lease = lease;
        BufferBuilder {
            core: Some(core),
            pool: self.clone(),
        }
    }

    /// 底层槽位池的统计快照。
    pub fn stats(&self) -> SlotPoolStats {
        self.slots().stats()
    }

    fn slots(&self) -> &SlotPool<BuilderCore<T>> {
        match &self.backing {
            Backing::Private(pool) => pool.as_ref(),
            Backing::Global(pool) => *pool,
        }
    }

    fn take_core(&self) -> Box<BuilderCore<T>> {
        let core = self.slots().try_take().unwrap_or_else(BuilderCore::fresh);
        debug_assert!(core.lease.is_empty() && core.written == 0);
        core
    }

    fn recycle(&self, mut core: Box<BuilderCore<T>>) {
        core.written = 0;
        drop(mem::take(&mut core.lease));
        self.slots().try_put(core);
    }
}

impl<T: Element> Default for BuilderPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> fmt::Debug for BuilderPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self.backing {
            Backing::Private(_) => "private",
            Backing::Global(_) => "shared",
        };
        f.debug_struct("BuilderPool")
            .field("shape", &shape)
            .field("slots", self.slots())
            .finish()
    }
}

/// `BufferBuilder` 是建立在租约之上的可增长序列。
///
/// # 教案式说明
/// - **意图（Why）**：在不反复分配的前提下支持追加、任意位置插入、删除与替换；
/// - **逻辑（How）**：所有编辑都归结为“确保容量、整体平移后缀、拷入新数据”三步，
///   平移使用 `copy_within`，对重叠区间安全；
/// - **契约（What）**：
///   - `len() <= capacity()` 恒成立；
///   - 丢弃构建器等价于 [`give_back`](Self::give_back)；
///   - [`into_lease`](Self::into_lease) 把租约连同已写内容交给调用方，状态照常回池。
///
/// # 示例
/// ```rust
/// use spark_rental::BufferBuilder;
///
/// let mut builder = BufferBuilder::<u8>::rent(16);
/// builder.append(b"aabbaabb");
/// assert_eq!(builder.replace(b"aa", b"c"), 2);
/// assert_eq!(builder.written(), b"cbbcbb");
/// builder.prepend(b"<");
/// builder.append(b">");
/// assert_eq!(builder.written(), b"<cbbcbb>");
/// ```
pub struct BufferBuilder<T: Element> {
    core: Option<Box<BuilderCore<T>>>,
    pool: BuilderPool<T>,
}

impl<T: Element> BufferBuilder<T> {
    /// 从进程级共享池租出构建器。
    pub fn rent(hint: usize) -> Self {
        BuilderPool::shared().rent(hint)
    }

    /// 从进程级共享池租出构建器，并采用调用方提供的租约。
    pub fn rent_with_lease(lease: BlockLease<T>) -> Self {
        BuilderPool::shared().rent_with_lease(lease)
    }

    /// 已写入的元素。
    pub fn written(&self) -> &[T] {
        let core = self.core();
        &core.lease.as_slice()[..core.written]
    }

    pub fn written_mut(&mut self) -> &mut [T] {
        let core = self.core_mut();
        let written = core.written;
        &mut core.lease.as_mut_slice()[..written]
    }

    /// 游标之后的可写区域；写入后需调用 [`advance`](Self::advance) 提交。
    pub fn remaining_mut(&mut self) -> &mut [T] {
        let core = self.core_mut();
        let written = core.written;
        &mut core.lease.as_mut_slice()[written..]
    }

    /// 已写入的元素个数。
    pub fn len(&self) -> usize {
        self.core().written
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前租约容量。
    pub fn capacity(&self) -> usize {
        self.core().lease.len()
    }

    /// 剩余可写元素个数。
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len()
    }

    /// 提交经 [`remaining_mut`](Self::remaining_mut) 直接写入的 `count` 个元素。
    ///
    /// # Panics
    /// `count` 超过剩余容量时 panic。
    #[track_caller]
    pub fn advance(&mut self, count: usize) {
        let remaining = self.remaining();
        if count > remaining {
            panic!("{}", RentalError::AdvanceOutOfRange { count, remaining });
        }
        self.core_mut().written += count;
    }

    /// 游标归零，保留租约。
    pub fn reset(&mut self) {
        self.core_mut().written = 0;
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.written().to_vec()
    }

    /// 保证剩余容量严格大于 `min_extra`。
    ///
    /// # 教案式说明
    /// - **逻辑（How）**：剩余容量不足时租借至少 `min_extra + len + 1` 个元素，
    ///   仅复制已写前缀，旧租约随即归还；多出的 1 个元素让严格不等式在分配器不超额供给时也成立；
    /// - **契约（What）**：返回后 `remaining() > min_extra`；尺寸计算溢出时以 "capacity overflow" panic。
    #[track_caller]
    pub fn ensure_capacity(&mut self, min_extra: usize) {
        let written = self.len();
        let previous = self.capacity();
        if previous - written > min_extra {
            return;
        }
        let Some(target) = min_extra
            .checked_add(written)
            .and_then(|len| len.checked_add(1))
        else {
            panic!("capacity overflow");
        };

        let mut grown = BlockLease::rent_from(&self.pool.allocator, target);
        grown.as_mut_slice()[..written].copy_from_slice(self.written());
        let capacity = grown.len();
        drop(mem::replace(&mut self.core_mut().lease, grown));
        tracing::trace!(previous, capacity, written, "builder grown");
    }

    /// 在末尾追加。
    pub fn append(&mut self, data: &[T]) {
        let end = self.len();
        self.insert(end, data);
    }

    /// 在开头插入。
    pub fn prepend(&mut self, data: &[T]) {
        self.insert(0, data);
    }

    /// 在 `position` 处插入 `data`，原有元素整体后移。
    ///
    /// # Panics
    /// `position > len()` 时 panic；需要错误返回时使用 [`try_insert`](Self::try_insert)。
    #[track_caller]
    pub fn insert(&mut self, position: usize, data: &[T]) {
        enforce(self.try_insert(position, data));
    }

    pub fn try_insert(&mut self, position: usize, data: &[T]) -> Result<(), RentalError> {
        let written = self.len();
        if position > written {
            return Err(RentalError::PositionOutOfRange { position, written });
        }
        let count = data.len();
        if count == 0 {
            return Ok(());
        }
        self.ensure_capacity(count);

        let core = self.core_mut();
        let block = core.lease.as_mut_slice();
        block.copy_within(position..written, position + count);
        block[position..position + count].copy_from_slice(data);
        core.written = written + count;
        Ok(())
    }

    /// 删除 `target` 的全部出现，返回删除次数。
    #[track_caller]
    pub fn remove(&mut self, target: &[T]) -> usize {
        self.replace(target, &[])
    }

    pub fn try_remove(&mut self, target: &[T]) -> Result<usize, RentalError> {
        self.try_replace(target, &[])
    }

    /// 反复从头扫描已写区域，把 `old` 的每次出现改写为 `new`，直到不再出现；返回改写次数。
    ///
    /// # Panics
    /// `old` 为空，或已写区域命中 `old` 而 `new` 又包含 `old` 时 panic。
    ///
    /// 其它变长规则同样可能永不收敛（例如在 `"aab"` 上把 `"ab"` 改写为 `"bbaa"`），
    /// 输入来源不可信时使用 [`try_replace_bounded`](Self::try_replace_bounded)。
    #[track_caller]
    pub fn replace(&mut self, old: &[T], new: &[T]) -> usize {
        enforce(self.try_replace(old, new))
    }

    /// [`replace`](Self::replace) 的可失败版本。
    ///
    /// # 教案式说明
    /// - **逻辑（How）**：每次改写后从下标 0 重新检索，因此改写产生的新匹配同样会被处理；
    ///   等长直接覆盖，变长时先平移匹配之后的后缀再写入；
    /// - **契约（What）**：
    ///   - `old == new`，或已写区域不含 `old`，都不做任何事并返回 0；
    ///   - 空 `old` 返回 [`RentalError::EmptyPattern`]；
    ///   - 存在匹配且 `new` 包含 `old` 时返回 [`RentalError::UnboundedReplacement`]，内容保持不变；
    ///   - 该守卫只拦截必然不收敛的一类规则，增长型规则仍可能无限改写，此时不会返回。
    pub fn try_replace(&mut self, old: &[T], new: &[T]) -> Result<usize, RentalError> {
        self.rewrite(old, new, None)
    }

    /// 最多改写 `max_rewrites` 次的替换。
    ///
    /// 预算恰好够用时返回 `Ok`；用尽后仍有匹配则返回 [`RentalError::RewriteLimitExceeded`]，
    /// 已完成的改写保留在缓冲中。
    pub fn try_replace_bounded(
        &mut self,
        old: &[T],
        new: &[T],
        max_rewrites: usize,
    ) -> Result<usize, RentalError> {
        self.rewrite(old, new, Some(max_rewrites))
    }

    fn rewrite(
        &mut self,
        old: &[T],
        new: &[T],
        budget: Option<usize>,
    ) -> Result<usize, RentalError> {
        if old.is_empty() {
            return Err(RentalError::EmptyPattern);
        }
        if old == new {
            return Ok(0);
        }
        let Some(mut at) = search::find(self.written(), old) else {
            return Ok(0);
        };
        if search::find(new, old).is_some() {
            return Err(RentalError::UnboundedReplacement);
        }

        let mut rewrites = 0;
        loop {
            if let Some(limit) = budget.filter(|limit| rewrites == *limit) {
                return Err(RentalError::RewriteLimitExceeded { limit });
            }
            self.splice(at, old.len(), new);
            rewrites += 1;
            match search::find(self.written(), old) {
                Some(next) => at = next,
                None => return Ok(rewrites),
            }
        }
    }

    fn splice(&mut self, at: usize, old_len: usize, new: &[T]) {
        let written = self.len();
        let tail = at + old_len;
        if new.len() > old_len {
            self.ensure_capacity(new.len() - old_len);
        }

        let core = self.core_mut();
        let block = core.lease.as_mut_slice();
        match new.len().cmp(&old_len) {
            Ordering::Equal => {}
            Ordering::Greater => block.copy_within(tail..written, tail + (new.len() - old_len)),
            Ordering::Less => block.copy_within(tail..written, tail - (old_len - new.len())),
        }
        block[at..at + new.len()].copy_from_slice(new);
        core.written = written - old_len + new.len();
    }

    /// `needle` 首次出现的位置；空 `needle` 返回 `Some(0)`。
    pub fn index_of(&self, needle: &[T]) -> Option<usize> {
        search::find(self.written(), needle)
    }

    pub fn index_of_value(&self, value: T) -> Option<usize> {
        self.written().iter().position(|item| *item == value)
    }

    /// 从 `start` 起检索，返回绝对下标。
    ///
    /// # Panics
    /// `start > len()` 时 panic。
    #[track_caller]
    pub fn index_of_from(&self, needle: &[T], start: usize) -> Option<usize> {
        search::find(self.written_from(start), needle).map(|offset| start + offset)
    }

    #[track_caller]
    pub fn index_of_value_from(&self, value: T, start: usize) -> Option<usize> {
        self.written_from(start)
            .iter()
            .position(|item| *item == value)
            .map(|offset| start + offset)
    }

    pub fn contains(&self, needle: &[T]) -> bool {
        self.index_of(needle).is_some()
    }

    pub fn contains_value(&self, value: T) -> bool {
        self.index_of_value(value).is_some()
    }

    /// 显式归还；等价于丢弃构建器。
    pub fn give_back(self) {
        drop(self);
    }

    /// 归还构建器状态，但把租约（含已写内容）交给调用方。
    pub fn into_lease(mut self) -> BlockLease<T> {
        let Some(mut core) = self.core.take() else {
            return BlockLease::empty();
        };
        let lease = mem::take(&mut core.lease);
        self.pool.recycle(core);
        lease
    }

    #[track_caller]
    fn written_from(&self, start: usize) -> &[T] {
        let written = self.written();
        if start > written.len() {
            panic!(
                "{}",
                RentalError::StartOutOfRange {
                    start,
                    written: written.len(),
                }
            );
        }
        &written[start..]
    }

    fn core(&self) -> &BuilderCore<T> {
        match &self.core {
            Some(core) => core,
            None => unreachable!("builder state is detached only while being returned"),
        }
    }

    fn core_mut(&mut self) -> &mut BuilderCore<T> {
        match &mut self.core {
            Some(core) => core,
            None => unreachable!("builder state is detached only while being returned"),
        }
    }
}

impl<T: Element> Drop for BufferBuilder<T> {
    fn drop(&mut self) {
        if let Some(core) = self.core.take() {
            self.pool.recycle(core);
        }
    }
}

impl<T: Element + fmt::Debug> fmt::Debug for BufferBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferBuilder")
            .field("written", &self.written())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[track_caller]
fn enforce<R>(result: Result<R, RentalError>) -> R {
    match result {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    }
}

impl BufferBuilder<u8> {
    /// 复制已写内容为 [`Bytes`]，便于交给网络层。
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.written())
    }
}

impl io::Write for BufferBuilder<u8> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Write for BufferBuilder<u8> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.append(s.as_bytes());
        Ok(())
    }
}

// SAFETY: `chunk_mut` 只暴露游标之后、租约之内的已初始化内存；`advance_mut` 经
// `advance` 检查不会越过租约容量，因此已写区域始终是初始化过的元素。
unsafe impl BufMut for BufferBuilder<u8> {
    fn remaining_mut(&self) -> usize {
        isize::MAX as usize - self.len()
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        self.advance(cnt);
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        if self.remaining() == 0 {
            self.ensure_capacity(CHUNK_RESERVE);
        }
        UninitSlice::new(BufferBuilder::remaining_mut(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spin::Mutex;
    use tracing_test::traced_test;

    /// 精确供给并记录每次租借与回收的分配器。
    #[derive(Default)]
    struct RecordingAllocator {
        rented: Mutex<Vec<usize>>,
        reclaimed: Mutex<Vec<usize>>,
    }

    impl ArrayPool<u32> for RecordingAllocator {
        fn rent(&self, minimum_len: usize) -> Box<[u32]> {
            self.rented.lock().push(minimum_len);
            vec![0; minimum_len].into_boxed_slice()
        }

        fn reclaim(&self, block: Box<[u32]>) {
            assert!(!block.is_empty(), "空块不应被归还");
            self.reclaimed.lock().push(block.len());
        }
    }

    fn recording_pool(slots: usize) -> (Arc<RecordingAllocator>, BuilderPool<u32>) {
        let allocator = Arc::new(RecordingAllocator::default());
        let erased: Arc<dyn ArrayPool<u32>> = allocator.clone();
        (allocator, BuilderPool::with_allocator(slots, erased))
    }

    #[test]
    fn replace_rescans_from_the_start() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"aabbaabb");
        assert_eq!(builder.replace(b"aa", b"c"), 2);
        assert_eq!(builder.written(), b"cbbcbb");
        assert_eq!(builder.len(), 6);
    }

    #[test]
    fn replace_follows_the_length_law() {
        let mut builder = BufferBuilder::<u8>::rent(4);
        builder.append(b"x-y-z");
        assert_eq!(builder.replace(b"-", b"::"), 2);
        assert_eq!(builder.written(), b"x::y::z");
        assert_eq!(builder.replace(b"::", b"."), 2);
        assert_eq!(builder.written(), b"x.y.z");
        assert_eq!(builder.replace(b".", b"+"), 2);
        assert_eq!(builder.written(), b"x+y+z");
    }

    #[test]
    fn rewrites_can_create_new_matches() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"aaab");
        assert_eq!(builder.replace(b"ab", b"b"), 3, "每次改写后重新扫描");
        assert_eq!(builder.written(), b"b");
    }

    #[test]
    fn remove_deletes_every_occurrence() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"aabbaabb");
        assert_eq!(builder.remove(b"b"), 4);
        assert_eq!(builder.written(), b"aaaa");
        assert_eq!(builder.remove(b"z"), 0);
    }

    #[test]
    fn replace_guards_reject_non_terminating_patterns() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"abc");
        assert_eq!(builder.try_replace(b"", b"x"), Err(RentalError::EmptyPattern));
        assert_eq!(
            builder.try_replace(b"b", b"bb"),
            Err(RentalError::UnboundedReplacement)
        );
        assert_eq!(builder.try_replace(b"b", b"b"), Ok(0));
        assert_eq!(builder.written(), b"abc", "失败的替换不得修改内容");
    }

    #[test]
    fn self_containing_replacement_without_match_is_a_no_op() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"no quotes here");
        assert_eq!(builder.try_replace(b"\"", b"\\\""), Ok(0));
        assert_eq!(builder.replace(b"\"", b"\\\""), 0);
        assert_eq!(builder.written(), b"no quotes here");
    }

    #[test]
    fn bounded_replace_stops_a_diverging_rule() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"aab");
        assert_eq!(
            builder.try_replace_bounded(b"ab", b"bbaa", 50),
            Err(RentalError::RewriteLimitExceeded { limit: 50 })
        );
        assert_eq!(builder.len(), 3 + 50 * 2, "已完成的改写保留在缓冲中");
        assert!(builder.contains(b"ab"), "匹配仍在向右移动");
    }

    #[test]
    fn bounded_replace_succeeds_when_budget_suffices() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"aabbaabb");
        assert_eq!(builder.try_replace_bounded(b"aa", b"c", 2), Ok(2));
        assert_eq!(builder.written(), b"cbbcbb");
        assert_eq!(
            builder.try_replace_bounded(b"b", b"", 0),
            Err(RentalError::RewriteLimitExceeded { limit: 0 })
        );
        assert_eq!(builder.written(), b"cbbcbb");
        assert_eq!(builder.try_replace_bounded(b"z", b"y", 0), Ok(0), "无匹配时不消耗预算");
    }

    #[test]
    fn empty_insert_rents_nothing() {
        let (allocator, pool) = recording_pool(1);
        let mut builder = pool.rent(0);
        builder.append(&[]);
        builder.prepend(&[]);
        assert_eq!(builder.capacity(), 0);
        assert!(allocator.rented.lock().is_empty(), "空数据不触发扩容");
    }

    #[test]
    #[should_panic(expected = "replace pattern must not be empty")]
    fn replace_with_empty_pattern_panics() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.replace(b"", b"x");
    }

    #[test]
    fn insert_splices_at_position() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"held");
        builder.insert(2, b"llo wor");
        assert_eq!(builder.written(), b"hello world");
        builder.prepend(b">");
        builder.append(b"!");
        assert_eq!(builder.written(), b">hello world!");
    }

    #[test]
    fn try_insert_rejects_positions_past_the_cursor() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"ab");
        assert_eq!(
            builder.try_insert(3, b"x"),
            Err(RentalError::PositionOutOfRange {
                position: 3,
                written: 2
            })
        );
    }

    #[test]
    #[should_panic(expected = "insert position 5 exceeds written length 0")]
    fn insert_past_the_cursor_panics() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.insert(5, b"x");
    }

    #[test]
    fn ensure_capacity_is_strict_even_with_exact_allocator() {
        let (_, pool) = recording_pool(2);
        let mut builder = pool.rent(0);
        for extra in [0, 1, 7, 64] {
            builder.ensure_capacity(extra);
            assert!(builder.remaining() > extra, "剩余容量必须严格大于请求");
        }
        builder.append(&[1, 2, 3]);
        builder.ensure_capacity(200);
        assert!(builder.remaining() > 200);
        assert_eq!(builder.written(), &[1, 2, 3], "扩容只搬迁已写前缀");
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn oversized_growth_request_panics() {
        let (_, pool) = recording_pool(1);
        let mut builder = pool.rent(0);
        builder.ensure_capacity(usize::MAX);
    }

    #[test]
    fn every_lease_is_returned_exactly_once() {
        let (allocator, pool) = recording_pool(2);
        let mut builder = pool.rent(4);
        builder.append(&[1, 2, 3, 4]);
        assert_eq!(*allocator.rented.lock(), vec![4, 5], "写满即扩容到 len + n + 1");
        assert_eq!(*allocator.reclaimed.lock(), vec![4], "扩容后旧块立即归还");

        builder.give_back();
        assert_eq!(*allocator.reclaimed.lock(), vec![4, 5]);
        assert_eq!(pool.stats().returns, 1);

        let reused = pool.rent(0);
        assert_eq!(reused.capacity(), 0, "回池状态不携带租约");
        assert!(reused.is_empty());
        assert_eq!(pool.stats().hits, 1);
        drop(reused);
        assert_eq!(allocator.reclaimed.lock().len(), 2, "空租约不触达分配器");
    }

    #[test]
    fn into_lease_hands_written_block_to_caller() {
        let (allocator, pool) = recording_pool(2);
        let mut builder = pool.rent(8);
        builder.append(&[7, 8, 9]);
        let lease = builder.into_lease();

        assert_eq!(&lease.as_slice()[..3], &[7, 8, 9]);
        assert!(allocator.reclaimed.lock().is_empty(), "租约仍由调用方持有");
        assert_eq!(pool.stats().returns, 1, "构建器状态照常回池");

        drop(lease);
        assert_eq!(*allocator.reclaimed.lock(), vec![8]);
    }

    #[test]
    fn rent_with_lease_adopts_caller_block() {
        let (allocator, pool) = recording_pool(1);
        let erased: Arc<dyn ArrayPool<u32>> = allocator.clone();
        let lease = BlockLease::rent_from(&erased, 5);
        let mut builder = pool.rent_with_lease(lease);
        assert_eq!(builder.capacity(), 5);
        assert!(builder.is_empty());

        builder.remaining_mut()[..2].copy_from_slice(&[4, 2]);
        builder.advance(2);
        assert_eq!(builder.written(), &[4, 2]);
        builder.reset();
        assert!(builder.is_empty());
        assert_eq!(builder.capacity(), 5, "reset 保留租约");
    }

    #[test]
    #[should_panic(expected = "cannot advance by 3")]
    fn advance_past_capacity_panics() {
        let (_, pool) = recording_pool(1);
        let mut builder = pool.rent(2);
        builder.advance(3);
    }

    #[test]
    fn full_private_pool_drops_returned_state() {
        let (_, pool) = recording_pool(1);
        let first = pool.rent(0);
        let second = pool.rent(0);
        drop(first);
        drop(second);
        let stats = pool.stats();
        assert_eq!(stats.returns, 1);
        assert_eq!(stats.drops, 1);
    }

    #[test]
    fn search_reports_absolute_positions() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"abcabc");
        assert_eq!(builder.index_of(b"bc"), Some(1));
        assert_eq!(builder.index_of_from(b"bc", 2), Some(4));
        assert_eq!(builder.index_of_value(b'c'), Some(2));
        assert_eq!(builder.index_of_value_from(b'a', 1), Some(3));
        assert_eq!(builder.index_of_from(b"", 6), Some(6), "空序列在起点命中");
        assert_eq!(builder.index_of(b"cab"), Some(2));
        assert_eq!(builder.index_of(b"x"), None);
        assert!(builder.contains(b"ca"));
        assert!(!builder.contains_value(b'z'));
    }

    #[test]
    #[should_panic(expected = "search start 7 exceeds written length 6")]
    fn search_start_past_the_cursor_panics() {
        let mut builder = BufferBuilder::<u8>::rent(0);
        builder.append(b"abcabc");
        builder.index_of_value_from(b'a', 7);
    }

    #[test]
    fn byte_builder_speaks_io_fmt_and_bufmut() {
        use core::fmt::Write as _;

        let mut builder = BufferBuilder::<u8>::rent(0);
        io::Write::write_all(&mut builder, b"GET ").expect("写入不会失败");
        write!(builder, "/{}", "index").expect("格式化不会失败");
        builder.put_slice(b" HTTP/1.1");
        builder.put_u8(b'\r');
        builder.put_u8(b'\n');
        assert_eq!(builder.to_bytes(), Bytes::from_static(b"GET /index HTTP/1.1\r\n"));
    }

    #[traced_test]
    #[test]
    fn growth_is_traced() {
        let (_, pool) = recording_pool(1);
        let mut builder = pool.rent(0);
        builder.append(&[1, 2, 3]);
        assert!(logs_contain("builder grown"));
    }
}
