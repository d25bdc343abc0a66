// Service exports
pub mod advisor;
pub mod cache;
pub mod directory;
pub mod memory;
pub mod postgres;

pub use advisor::{extract_json_from_text, HttpAdvisor};
pub use cache::{CacheError, CacheKey, CacheManager, CacheStats};
pub use directory::{DirectoryClient, DirectoryCollections};
pub use memory::{InMemoryStore, ScriptedAdvisor};
pub use postgres::{PostgresClient, PostgresError};
