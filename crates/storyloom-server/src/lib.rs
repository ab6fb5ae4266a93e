//! Storyloom sync server library.
//!
//! Exposes the router pieces and document hosting so integration tests
//! can assemble the app without binding a socket.

pub mod error;
pub mod host;
pub mod routes;
pub mod state;
