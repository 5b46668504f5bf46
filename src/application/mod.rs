//! Application layer: the engine's core pipeline (spec.md §4.4-§4.9) and
//! the process topology that runs it (spec.md §4.10-§4.11).

pub mod account_orchestrator;
pub mod decision_pipeline;
pub mod instrument_trader;
pub mod portfolio_manager;
pub mod position_manager;
pub mod reconciliation;
pub mod signal_engine;

pub mod ipc;
pub mod pool_manager;
pub mod worker;
