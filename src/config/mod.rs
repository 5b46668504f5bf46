//! Configuration module (spec.md §4.1): hierarchical YAML config with
//! field-level inheritance, fail-closed unknown-key rejection, legacy v1
//! migration and hot-reload.

pub mod legacy;
pub mod model;
pub mod raw;
pub mod resolve;
pub mod watcher;

pub use model::{
    AccountProfile, ConfigSnapshot, EmergencyConfig, ExecutionConfig, InstrumentConfig,
    PortfolioConfig, StrategyParams,
};
pub use resolve::resolve;
pub use watcher::{load_snapshot, watch};
