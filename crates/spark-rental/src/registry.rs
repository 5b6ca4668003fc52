//! 按类型索引的进程级单例表。
//!
//! Rust 的泛型项无法拥有各自独立的 `static`，`SlotPool<O>::shared()` 等入口
//! 因此借助 `TypeId` 把每个具体类型映射到一份泄漏为 `'static` 的实例。
//!
//! 初始化闭包在锁外执行，避免共享池初始化时递归访问本表造成自旋死锁；
//! 插入时先到先得，竞争失败方的候选实例直接丢弃，不会泄漏，也不会有第二个实例被返回。

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::OnceLock,
};

use spin::Mutex;

type Entries = HashMap<TypeId, &'static (dyn Any + Send + Sync)>;

static ENTRIES: OnceLock<Mutex<Entries>> = OnceLock::new();

fn entries() -> &'static Mutex<Entries> {
    ENTRIES.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn get_or_init<V, F>(init: F) -> &'static V
where
    V: Any + Send + Sync,
    F: FnOnce() -> V,
{
    let key = TypeId::of::<V>();
    if let Some(existing) = entries().lock().get(&key).copied() {
        return downcast(existing);
    }

    let candidate = init();
    let mut map = entries().lock();
    let published = *map
        .entry(key)
        .or_insert_with(|| Box::leak(Box::new(candidate)) as &'static (dyn Any + Send + Sync));
    drop(map);
    downcast(published)
}

fn downcast<V: Any>(entry: &'static (dyn Any + Send + Sync)) -> &'static V {
    match entry.downcast_ref::<V>() {
        Some(value) => value,
        None => unreachable!("registry entries are keyed by their own TypeId"),
    }
}
