//! Domain module - Core dial logic
//!
//! Profiles, the dial pipeline and the resources it opens.

pub mod auth;
pub mod connection;
pub mod environment;
pub mod profile;
pub mod resource_stack;

pub use auth::StandardAuth;
pub use connection::{Connection, ConnectionHandle};
pub use environment::{DialResult, Environment};
pub use profile::Profile;
pub use resource_stack::{Closer, ResourceStack, closer_fn};
