mod config;
pub use config::Config;
pub use config::GcConfig;
pub use config::MetadataBackend;

mod errors;
pub use errors::{Error, Result};

pub mod container;
pub mod gc;
pub mod metadata;
