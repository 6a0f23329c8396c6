//! Port traits for the collaborators the simulation talks to.

pub mod config_port;
pub mod order_port;
pub mod repository_port;
