//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 构建器的编辑操作把越界位置、空模式等输入视为契约违背，默认直接 panic；
//!   `try_*` 变体需要一个稳定的错误类型把同样的判定交还给调用方。
//! - 配置安装与校验同样需要可匹配的错误，便于启动流程统一处理。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，兼容 `std::error::Error`；
//! - 资源耗尽（分配失败）不在此列：它按致命错误处理，不会以 `Result` 形式返回。

use thiserror::Error;

/// 构建器编辑与检索操作的契约违背。
///
/// - **意图 (Why)**：把“调用方传入了不合法参数”与“池内部状态异常”区分开；后者在本 crate 中不存在。
/// - **契约 (What)**：每个变体携带足以复现问题的上下文；panic 路径使用同一条 `Display` 文本。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RentalError {
    /// 插入位置超过当前已写入长度。
    #[error("insert position {position} exceeds written length {written}")]
    PositionOutOfRange { position: usize, written: usize },

    /// 检索起点超过当前已写入长度。
    #[error("search start {start} exceeds written length {written}")]
    StartOutOfRange { start: usize, written: usize },

    /// 提交的写入量超过剩余容量。
    #[error("cannot advance by {count}: only {remaining} elements remain")]
    AdvanceOutOfRange { count: usize, remaining: usize },

    /// 替换模式为空：空序列在每个位置都能匹配，替换循环无法终止。
    #[error("replace pattern must not be empty")]
    EmptyPattern,

    /// 已写区域命中旧序列，而新序列又包含旧序列：每次从头重扫都会再次命中，替换循环无法终止。
    #[error("replacement contains the pattern it replaces; rescanning would never terminate")]
    UnboundedReplacement,

    /// 有界替换用尽改写预算后仍能命中旧序列。
    #[error("replacement still matches after {limit} rewrites")]
    RewriteLimitExceeded { limit: usize },
}

/// 配置校验与安装失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 容量类字段不允许为 0。
    #[error("`{field}` must be greater than zero")]
    ZeroCapacity { field: &'static str },

    /// `max_pooled_len` 必须是不小于最小桶长度的 2 的幂。
    #[error("`max_pooled_len` must be a power of two no smaller than {minimum}, got {value}")]
    InvalidMaxPooledLen { value: usize, minimum: usize },

    /// 进程级配置已经生效（显式安装过，或某个共享池已按默认值初始化）。
    #[error("rental configuration is already installed for this process")]
    AlreadyInstalled,

    /// TOML 文本解析失败。
    #[cfg(feature = "toml-config")]
    #[error("failed to parse rental configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
