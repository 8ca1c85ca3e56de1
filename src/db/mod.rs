pub mod memory;
pub mod redis;
pub mod store;
pub mod writer;

pub use memory::MemoryStore;
pub use redis::create_redis_client;
pub use redis::RedisStore;
pub use store::RemoteStore;
pub use store::Subscription;
pub use writer::{PersistenceWriter, PersistenceWriterHandle, PendingWrite};
