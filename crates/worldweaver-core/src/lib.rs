//! WorldWeaver Core — shared narrative-graph abstractions.
//!
//! This crate defines the storylet data model, the world graph, the
//! improvement report and the collaborator seams (storylet store, clock)
//! that the consistency engine depends on. It contains no infrastructure
//! code.

pub mod clock;
pub mod command;
pub mod error;
pub mod graph;
pub mod report;
pub mod store;
pub mod storylet;
