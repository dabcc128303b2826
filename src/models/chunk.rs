use uuid::Uuid;

use super::time_range::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Fetching,
    Succeeded,
    Failed,
}

/// One bounded sub-range requested from the provider in a single call.
/// Transient: created by the planner or gap detector, consumed within a run.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: Uuid,
    pub range: TimeRange,
    pub attempt_count: u32,
    pub status: ChunkStatus,
}

impl Chunk {
    pub fn new(range: TimeRange) -> Self {
        Self {
            id: Uuid::new_v4(),
            range,
            attempt_count: 0,
            status: ChunkStatus::Pending,
        }
    }
}
