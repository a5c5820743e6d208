pub mod error;
pub mod lifecycle;
pub mod processor;
pub mod strategy;
