//! Route modules.

pub mod health;
pub mod snapshot;
pub mod sync;
