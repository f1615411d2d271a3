use serde::Deserialize;

use crate::gc;
use crate::metadata;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub metadata: MetadataBackend,
    #[serde(default)]
    pub gc: GcConfig,
}

#[derive(Clone, Deserialize)]
#[serde(tag = "type")]
pub enum MetadataBackend {
    Postgres(metadata::PostgresConfig),
}

/// Collection settings. The batch size is carried here and handed to the
/// collector at construction time so tests and deployments can vary it per
/// instance.
#[derive(Clone, Deserialize)]
pub struct GcConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            batch_size: gc::DEFAULT_BATCH_SIZE,
        }
    }
}

fn default_batch_size() -> usize {
    gc::DEFAULT_BATCH_SIZE
}
