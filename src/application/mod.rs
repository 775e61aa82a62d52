// Application layer - the service surface any client (CLI, API) consumes.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
