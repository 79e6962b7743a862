//! Built-in action types. Each submodule exposes one constructor per type tag;
//! the table in [`crate::registry`] wires them up.

pub mod basic;
pub mod composite;
pub mod messaging;
pub mod naming;
pub mod rest;
pub mod shell;
pub mod sync;
