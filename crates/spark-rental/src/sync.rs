//
// 教案级说明：槽位池的正确性完全依赖原子交换的调度交错，
// 启用 `--cfg loom`（或 `--cfg spark_loom`）时切换到 Loom 的原子类型，
// 让模型检查器能够穷举 `try_take` 与 `try_put` 的所有竞争路径。
#[cfg(not(any(loom, spark_loom)))]
pub(crate) use core::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
#[cfg(any(loom, spark_loom))]
pub(crate) use loom::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
