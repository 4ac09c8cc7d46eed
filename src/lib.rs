//! Ops-plan bot: a chat wizard that collects a shift plan and posts it.

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;
pub mod options;
pub mod render;
pub mod roster;
pub mod session;
pub mod transport;
pub mod wizard;
