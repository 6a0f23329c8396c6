//! barreplay: bar-by-bar historical replay for trading strategies.
//!
//! Hexagonal architecture: domain logic in [`domain`], collaborator traits in
//! [`ports`], concrete implementations in [`adapters`]. Built-in strategies
//! and signal functions live in [`strategies`] and [`signals`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod logging;
pub mod ports;
pub mod signals;
pub mod strategies;
