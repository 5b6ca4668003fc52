//! `spark-rental` 提供池化、可增长的连续缓冲构建器。
//!
//! # 模块定位（Why）
//! - 协议编解码与文本拼装会反复构建长度不定的序列；若每次都向全局分配器申请内存，
//!   热路径上的分配抖动会直接体现在尾延迟上。
//! - 本 crate 将“内存块租借”与“构建器对象复用”拆成两层池：
//!   数组池负责回收定长元素块，槽位池负责回收构建器对象本身。
//!
//! # 设计概要（How）
//! - [`allocator`]：`ArrayPool` 契约与默认的分桶实现 `SharedArrayPool`；
//! - [`lease`]：`BlockLease`，独占持有一块租来的内存，归还恰好一次；
//! - [`slot`]：`SlotPool`，基于 `AtomicPtr` 比较交换的无锁对象池，支持私有实例与进程级共享实例；
//! - [`builder`]：`BufferBuilder`，在租约之上维护写入游标，提供插入、删除、替换与检索。
//!
//! # 契约说明（What）
//! - 单个 `BufferBuilder` 只允许一个写者；跨线程移交所有权是安全的，并发写入不被支持。
//! - 槽位池已满时归还的对象直接丢弃，不阻塞也不报错。
//! - 复用的内存不保证清零，除非配置了 `clear_on_reclaim` 或调用 `rent_zeroed`。

pub mod allocator;
pub mod builder;
pub mod config;
pub mod element;
pub mod error;
pub mod lease;
pub mod slot;

mod registry;
mod search;
mod sync;

pub use allocator::{ArrayPool, ArrayPoolStats, SharedArrayPool};
pub use builder::{BufferBuilder, BuilderPool};
pub use config::{RentalConfig, RentalConfigBuilder, install};
pub use element::Element;
pub use error::{ConfigError, RentalError};
pub use lease::BlockLease;
pub use slot::{SlotPool, SlotPoolStats};
