//! Database models and queries

pub mod analyses;
pub mod connection;
pub mod init;
pub mod models;

pub use analyses::*;
pub use connection::*;
pub use init::*;
pub use models::*;
