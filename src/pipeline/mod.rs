pub mod aggregate;
pub mod orchestrator;
pub mod render;
pub mod report;
pub mod retrieve;

pub use orchestrator::{RunOutcome, run};
