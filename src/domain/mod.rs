//! Core domain types and the simulation orchestrator.

pub mod bar;
pub mod cache;
pub mod config;
pub mod config_validation;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod manager;
pub mod metrics;
pub mod options;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod recorder;
pub mod run;
pub mod signal;
pub mod strategy;
