//! Database entities.

pub mod todo;
