//! Snapshot of executor state, exposed for telemetry and tests.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub threads: usize,
    pub free_threads: usize,
    pub queue_len: usize,
    pub running: bool,
}
