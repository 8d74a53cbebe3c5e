pub mod db;
pub mod error;
pub mod feeds;
pub mod offsets;
pub mod posts;
pub mod raw_posts;
pub mod sources;
pub mod types;

pub use db::init_pool;
pub use error::StoreError;
pub use feeds::FeedStore;
pub use offsets::OffsetStore;
pub use posts::PostStore;
pub use raw_posts::RawPostStore;
pub use sources::SourceStore;
pub use types::*;
