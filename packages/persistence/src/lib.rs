//! ALUSKORT Persistence: bindings to the platform's external stores.
//!
//! The platform relies on contracts, not implementations: a partitioned
//! message bus with per-key ordering, a relational store with transactions,
//! a TTL cache, a filtered k-NN vector store, and an object store. Each seam
//! is a trait with a production binding and an in-memory implementation used
//! by tests and single-node runs.
//!
//! Cache reads and writes are fail-open by contract: a dead cache degrades
//! to a miss, never to a pipeline stall.

pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod object_store;
pub mod relational;
pub mod retry;
pub mod vector;

pub use bus::{publish_audit, topics, BusMessage, InMemoryBus, MessageBus};
pub use cache::{keys, CacheStore, MemoryCache, RedisCache};
pub use config::PlatformConfig;
pub use error::StoreError;
pub use graph::{Consequence, ConsequenceGraph, GraphClient, StaticConsequenceTable};
pub use object_store::{MemoryObjectStore, ObjectStore, StoredObject};
pub use relational::DbClient;
pub use retry::retry_transient;
pub use vector::{
    DualReadVectorClient, EmbeddingVersion, MemoryVectorStore, VectorFilter, VectorHit,
    VectorPoint, VectorStore,
};
