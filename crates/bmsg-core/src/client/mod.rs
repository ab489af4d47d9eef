//! Client registry module
//!
//! Tracks known client machines by their stable machine id.

mod registry;
mod types;

pub(crate) use registry::check_machine_id;
pub use registry::ClientRegistry;
pub use types::Client;
