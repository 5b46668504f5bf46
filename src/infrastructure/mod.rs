//! Adapters implementing the domain's capability traits
//! (`domain::fx_ports`): a broker terminal, a predictor, a sentiment
//! source, a persistence gateway, and the control-plane HTTP surface.

pub mod broker;
pub mod control_api;
pub mod ml;
pub mod persistence;
pub mod sentiment;
