//! # 调度器配置与常量（config）
//!
//! ## Overview
//! - 优先级 / 票数的合法范围与默认值
//! - 内核启动参数 `KernelConfig`，可由环境变量覆盖
//!
//! ## Invariants
//! - 严格优先级范围为 `[0, 7]`，默认 1
//! - 票数范围为 `[1, i32::MAX]`，默认 1

use core::str::FromStr;
use lazy_static::lazy_static;

/// 严格优先级下限
pub const PRIORITY_MIN: u32 = 0;
/// 严格优先级上限
pub const PRIORITY_MAX: u32 = 7;
/// 新线程的默认优先级
pub const PRIORITY_DEFAULT: u32 = 1;

pub const TICKETS_MIN: u32 = 1;
pub const TICKETS_MAX: u32 = i32::MAX as u32;
pub const TICKETS_DEFAULT: u32 = 1;

/// 定时器中断间隔（tick）
pub const TIMER_INTERVAL: u64 = 500;

/// 调度策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Priority,
    Lottery,
}

impl FromStr for SchedulerKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "priority" => Ok(SchedulerKind::Priority),
            "lottery" => Ok(SchedulerKind::Lottery),
            _ => Err(()),
        }
    }
}

/// 内核启动参数
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub scheduler: SchedulerKind,
    /// 彩票调度随机种子，`None` 表示取自系统熵
    pub lottery_seed: Option<u64>,
    pub timer_interval: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::Priority,
            lottery_seed: None,
            timer_interval: TIMER_INTERVAL,
        }
    }
}

impl KernelConfig {
    pub fn priority() -> Self {
        Self::default()
    }

    pub fn lottery() -> Self {
        Self {
            scheduler: SchedulerKind::Lottery,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.lottery_seed = Some(seed);
        self
    }

    /// ## Panics
    /// - 间隔为 0（时钟永远不会前进）
    pub fn with_timer_interval(mut self, ticks: u64) -> Self {
        assert!(ticks > 0, "timer interval must be positive");
        self.timer_interval = ticks;
        self
    }

    /// 从环境变量读取配置
    ///
    /// ## Behavior
    /// - `CUTECORE_SCHEDULER`：`priority` 或 `lottery`
    /// - `CUTECORE_SEED`：彩票调度随机种子
    /// - `CUTECORE_TIMER_INTERVAL`：定时器中断间隔
    /// - 无法解析的值记录警告并回退到默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(kind) = parse_var(&lookup, "CUTECORE_SCHEDULER") {
            config.scheduler = kind;
        }
        config.lottery_seed = parse_var(&lookup, "CUTECORE_SEED");
        if let Some(interval) = parse_var::<u64>(&lookup, "CUTECORE_TIMER_INTERVAL") {
            if interval > 0 {
                config.timer_interval = interval;
            } else {
                log::warn!("ignoring zero CUTECORE_TIMER_INTERVAL");
            }
        }
        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

lazy_static! {
    /// 进程级默认配置，首次使用时从环境变量构造
    pub static ref DEFAULT_CONFIG: KernelConfig = KernelConfig::from_env();
}
