pub mod actor;
pub mod stats;
pub mod tag_store;

pub use actor::CacheActor;
pub use stats::CacheStats;
pub use tag_store::TagStore;
