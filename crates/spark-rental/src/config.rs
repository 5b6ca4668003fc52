//! 进程级租借配置。
//!
//! # 设计背景（Why）
//! - 槽位数量、分桶深度等参数决定了池在峰值后保留多少内存，不同部署（网关、批处理）取值差异很大；
//! - 共享池在首次使用时惰性初始化，参数必须在那之前确定，因此配置以“进程内安装一次”的方式生效。
//!
//! # 逻辑解析（How）
//! - [`RentalConfig`] 可由 [`RentalConfigBuilder`] 构建，或在启用 `toml-config` 特性时从 TOML 文本解析；
//! - [`install`] 校验后写入 `OnceLock`；任何共享池读取配置时若尚未安装，则固化默认值。
//!
//! # 契约说明（What）
//! - **前置条件**：`install` 必须早于第一次租借；
//! - **后置条件**：配置一经生效不可替换，再次安装返回 [`ConfigError::AlreadyInstalled`]。

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::{allocator::MIN_BLOCK_LEN, error::ConfigError};

static ACTIVE: OnceLock<RentalConfig> = OnceLock::new();

/// 构建器私有槽位池的默认容量。
pub const DEFAULT_BUILDER_SLOTS: usize = 16;
/// 进程级共享槽位池溢出数组的默认容量。
pub const DEFAULT_SHARED_SLOTS: usize = 64;
/// 数组池每个桶最多保留的块数。
pub const DEFAULT_BUCKET_DEPTH: usize = 32;
/// 数组池缓存的最大块长度（元素个数）。
pub const DEFAULT_MAX_POOLED_LEN: usize = 1 << 20;

/// 租借子系统的全部可调参数。
///
/// # 契约说明（What）
/// - `builder_slots`：`BuilderPool::new` 创建的私有槽位池容量；
/// - `shared_slots`：`SlotPool::shared` 的溢出槽位数量（快速通道之外）；
/// - `bucket_depth`：`SharedArrayPool` 每个长度桶保留的空闲块上限；
/// - `max_pooled_len`：超过该长度的块按需精确分配，归还时直接释放；
/// - `clear_on_reclaim`：块回到空闲链表前是否以 `T::default()` 覆盖。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RentalConfig {
    pub builder_slots: usize,
    pub shared_slots: usize,
    pub bucket_depth: usize,
    pub max_pooled_len: usize,
    pub clear_on_reclaim: bool,
}

impl Default for RentalConfig {
    fn default() -> Self {
        Self {
            builder_slots: DEFAULT_BUILDER_SLOTS,
            shared_slots: DEFAULT_SHARED_SLOTS,
            bucket_depth: DEFAULT_BUCKET_DEPTH,
            max_pooled_len: DEFAULT_MAX_POOLED_LEN,
            clear_on_reclaim: false,
        }
    }
}

impl RentalConfig {
    /// 以默认值为起点构建配置。
    pub fn builder() -> RentalConfigBuilder {
        RentalConfigBuilder::default()
    }

    /// 校验字段组合是否合法。
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("builder_slots", self.builder_slots),
            ("shared_slots", self.shared_slots),
            ("bucket_depth", self.bucket_depth),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity { field });
            }
        }
        if !self.max_pooled_len.is_power_of_two() || self.max_pooled_len < MIN_BLOCK_LEN {
            return Err(ConfigError::InvalidMaxPooledLen {
                value: self.max_pooled_len,
                minimum: MIN_BLOCK_LEN,
            });
        }
        Ok(())
    }

    /// 从 TOML 文本解析并校验配置，缺省字段取默认值。
    ///
    /// ```toml
    /// builder_slots = 32
    /// clear_on_reclaim = true
    /// ```
    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

/// [`RentalConfig`] 的链式构建器，`build` 时统一校验。
#[derive(Clone, Debug, Default)]
pub struct RentalConfigBuilder {
    config: RentalConfig,
}

impl RentalConfigBuilder {
    pub fn builder_slots(mut self, slots: usize) -> Self {
        self.config.builder_slots = slots;
        self
    }

    pub fn shared_slots(mut self, slots: usize) -> Self {
        self.config.shared_slots = slots;
        self
    }

    pub fn bucket_depth(mut self, depth: usize) -> Self {
        self.config.bucket_depth = depth;
        self
    }

    pub fn max_pooled_len(mut self, len: usize) -> Self {
        self.config.max_pooled_len = len;
        self
    }

    pub fn clear_on_reclaim(mut self, clear: bool) -> Self {
        self.config.clear_on_reclaim = clear;
        self
    }

    pub fn build(self) -> Result<RentalConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// 为当前进程安装租借配置。
///
/// # 教案式说明
/// - **意图（Why）**：共享池只初始化一次，参数必须先于首次租借确定。
/// - **逻辑（How）**：先校验，再写入 `OnceLock`；写入竞争失败即说明已有配置生效。
/// - **契约（What）**：重复安装，或任一共享池已按默认值初始化后再安装，均返回
///   [`ConfigError::AlreadyInstalled`]。
pub fn install(config: RentalConfig) -> Result<(), ConfigError> {
    config.validate()?;
    ACTIVE
        .set(config)
        .map_err(|_| ConfigError::AlreadyInstalled)?;
    tracing::info!(config = ?active(), "rental configuration installed");
    Ok(())
}

/// 读取生效中的配置；尚未安装时固化默认值。
pub(crate) fn active() -> &'static RentalConfig {
    ACTIVE.get_or_init(RentalConfig::default)
}
