//! Domain logic for the consistency engine.

pub mod analysis;
pub mod budget;
pub mod commands;
pub mod config;
pub mod deepener;
pub mod location;
pub mod smoother;
pub mod spatial;
