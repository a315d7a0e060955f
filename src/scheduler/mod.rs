//! Work queues, the decaying poll schedule and the orchestrator that runs
//! poll passes.
//!
//! Each [`WorkKind`] has its own queue and worker pool. Workers coordinate
//! only through the store; the poll-run flag keeps passes for one campaign
//! from overlapping.

mod orchestrator;
mod queue;
mod schedule;

pub use orchestrator::{
    Orchestrator, OrchestratorParts, PassOutcome, PollPassReport, PollTrigger, SweepReport,
    run_sweep_loop, schedule_polls,
};
pub use queue::{
    QueueError, QueueSettings, WorkFailure, WorkHandler, WorkKind, WorkQueues, WorkUnit,
};
pub use schedule::{PollSchedule, PollTier};
