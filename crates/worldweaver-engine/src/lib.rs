//! WorldWeaver — narrative graph consistency engine.
//!
//! Runs after a batch of storylets is added to a world: assigns every new
//! storylet a grid coordinate derived from its location name, then repairs
//! structural defects (isolated storylets, one-way edges, dead-end
//! variables, abrupt transitions) without ever deleting a storylet.

pub mod application;
pub mod domain;
