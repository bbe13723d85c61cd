pub mod budget;
pub mod control;
pub mod pipeline;
pub mod scheduler;

pub use budget::{CycleBudget, CycleError};
pub use pipeline::{CycleReport, Pipeline};
pub use scheduler::Scheduler;
