//! Debugging feature flags.
//!
//! Toggle individual diagnostics here; keep them `false` by default so release
//! builds remain quiet.

pub struct DebugFlags {
    /// Emit every job status transition with its timestamps.
    pub print_job_transitions: bool,
    /// Emit the parsed job spec chosen for each task.
    pub print_dispatch: bool,
    /// Emit artifact sizes and timings on write/read.
    pub print_artifact_io: bool,
    /// Emit market-data cache hits and misses.
    pub print_market_cache: bool,
}

pub const DEBUG_FLAGS: DebugFlags = DebugFlags {
    print_job_transitions: false,
    print_dispatch: false,
    print_artifact_io: false,
    print_market_cache: false,
};
