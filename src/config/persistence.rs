//! Artifact persistence and store configuration

pub struct ArtifactConfig {
    /// Blob name prefix for simulated path matrices
    pub prefix: &'static str,
    pub extension: &'static str,
    /// Current version of the artifact serialization format
    pub version: u32,
    /// zstd compression level used when writing artifacts
    pub compression_level: i32,
    /// Default directory for the file-backed blob store
    pub directory: &'static str,
    /// Rows returned by a path subset query when no limit is given
    pub default_subset_limit: usize,
    /// Most decoded bytes accepted from one artifact
    pub max_decoded_bytes: u64,
}

pub struct PersistenceConfig {
    pub artifacts: ArtifactConfig,
    /// Maximum jobs returned by a listing
    pub list_limit: usize,
    /// Size of the recent/running lists in statistics
    pub stats_limit: usize,
}

pub const PERSISTENCE: PersistenceConfig = PersistenceConfig {
    artifacts: ArtifactConfig {
        prefix: "mc_paths_",
        extension: "bin",
        version: 1,
        compression_level: 3,
        directory: "artifacts",
        default_subset_limit: 100,
        max_decoded_bytes: 256 * 1024 * 1024,
    },
    list_limit: 200,
    stats_limit: 10,
};

/// Blob name holding the path artifact of a job
/// Example: "mc_paths_3f2a....bin"
pub fn artifact_blob_name(job_id: &str) -> String {
    format!(
        "{}{}.{}",
        PERSISTENCE.artifacts.prefix, job_id, PERSISTENCE.artifacts.extension
    )
}
