pub mod migration;
pub mod task;
