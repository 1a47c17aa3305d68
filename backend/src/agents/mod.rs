// Agent Schedules
//
// Scheduled AI agent tasks: a due schedule is claimed by the poller, run,
// recorded and put back in the queue with its next due time.

pub mod executor;
pub mod schedule;

pub use executor::{
    AgentExecutionStatus, AgentRunOutcome, AgentScheduleSweep, AgentTaskExecution, AgentTaskRunner,
    LogOnlyAgentRunner,
};
pub use schedule::{AgentSchedule, ScheduleFrequency, ScheduleStatus};
