//! The graph-structured workflow: supervisor, router, consolidator, and
//! the driver that runs one session to completion.

mod consolidator;
mod driver;
pub mod format;
pub mod merge;
mod router;
mod supervisor;

pub use consolidator::Consolidator;
pub use driver::{NodeUpdate, WorkflowDriver, WorkflowEvent};
pub use router::{NodeName, route};
pub use supervisor::Supervisor;
