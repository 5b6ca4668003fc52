//! 租约：一块租来的连续内存及其归还路径。
//!
//! 租约只能移动、不能复制，归还由所有权保证恰好一次；空租约从不触达分配器。

use core::{fmt, mem};
use std::sync::Arc;

use crate::{
    allocator::{ArrayPool, SharedArrayPool},
    element::Element,
};

/// `BlockLease` 独占持有一块从 [`ArrayPool`] 租来的连续内存。
///
/// # 角色定位（Why）
/// - 构建器扩容时需要“换一块更大的内存，旧块还回去”，租约把块与它的来源绑定，
///   保证归还总是回到租借它的那个池；
/// - 仅可移动、不可复制：同一块内存任何时刻只有一个持有者，归还因此是确定且恰好一次的。
///
/// # 结构设计（How）
/// - `block`：底层 `Box<[T]>`，长度即租约容量；
/// - `origin`：来源池；空租约没有来源，归还时也不会触达任何池。
///
/// # 契约说明（What）
/// - 空租约（长度 0）永远不会被转交给 `ArrayPool::reclaim`；
/// - [`release`](Self::release) 与 `Drop` 等价，都把非空块交还来源池；
/// - [`into_boxed_slice`](Self::into_boxed_slice) 解除绑定，块从此由调用方自行管理。
pub struct BlockLease<T: Element> {
    block: Box<[T]>,
    origin: Option<Arc<dyn ArrayPool<T>>>,
}

impl<T: Element> BlockLease<T> {
    /// 不持有任何内存的空租约。
    pub fn empty() -> Self {
        Self {
            block: Box::default(),
            origin: None,
        }
    }

    /// 从进程级共享数组池租借至少 `minimum_len` 个元素。
    pub fn rent(minimum_len: usize) -> Self {
        if minimum_len == 0 {
            return Self::empty();
        }
        let pool: Arc<dyn ArrayPool<T>> = SharedArrayPool::<T>::shared();
        Self::rent_from(&pool, minimum_len)
    }

    /// 从指定分配器租借至少 `minimum_len` 个元素；`minimum_len == 0` 时不触达分配器。
    pub fn rent_from(pool: &Arc<dyn ArrayPool<T>>, minimum_len: usize) -> Self {
        if minimum_len == 0 {
            return Self::empty();
        }
        let block = pool.rent(minimum_len);
        debug_assert!(block.len() >= minimum_len, "ArrayPool::rent 违反最小长度契约");
        Self {
            block,
            origin: Some(Arc::clone(pool)),
        }
    }

    /// 租约容量（元素个数）。
    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// 整块只读视图，不区分已写与未写区域。
    pub fn as_slice(&self) -> &[T] {
        &self.block
    }

    /// 整块可写视图。
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.block
    }

    /// 显式归还；等价于丢弃租约。
    pub fn release(self) {
        drop(self);
    }

    /// 取走底层块，不再归还给来源池。
    pub fn into_boxed_slice(mut self) -> Box<[T]> {
        self.origin = None;
        mem::take(&mut self.block)
    }
}

impl<T: Element> Default for BlockLease<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Element> Drop for BlockLease<T> {
    fn drop(&mut self) {
        if self.block.is_empty() {
            return;
        }
        if let Some(origin) = self.origin.take() {
            origin.reclaim(mem::take(&mut self.block));
        }
    }
}

impl<T: Element> fmt::Debug for BlockLease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockLease")
            .field("len", &self.block.len())
            .field("pooled", &self.origin.is_some())
            .finish()
    }
}
