//! Data models for finsight.

mod insight;
mod task;

pub use insight::{Insight, InsightAnalysis, InsightStatus, NewInsight};
pub use task::{
    task_types, HealthStatus, QueueHealth, Task, TaskPayload, TaskStats, TaskStatus,
    ENTITY_INSIGHT,
};
