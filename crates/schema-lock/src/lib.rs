pub mod coordinator;
pub mod error;
pub mod scripts;

pub use coordinator::SchemaLockCoordinator;
