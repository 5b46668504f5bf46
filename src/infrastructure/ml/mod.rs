//! `Predictor` adapters. Model internals are out of scope (spec.md §1).

pub mod smartcore_adapter;

pub use smartcore_adapter::SmartCorePredictor;
