/// 可被租借块承载的元素类型。
///
/// # 契约说明（What）
/// - `Copy`：块内搬移（插入、替换时的整体平移）按位复制即可完成；
/// - `PartialEq`：检索与替换依赖逐元素比较；
/// - `Default`：分配新块与 `clear_on_reclaim` 清理时的填充值；
/// - `Send + Sync + 'static`：块会在进程级共享池之间流转。
///
/// 该 trait 对所有满足约束的类型自动实现，调用方无需手写。
pub trait Element: Copy + PartialEq + Default + Send + Sync + 'static {}

impl<T> Element for T where T: Copy + PartialEq + Default + Send + Sync + 'static {}
