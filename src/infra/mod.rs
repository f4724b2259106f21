//! Infrastructure layer: chain RPC, relational store, cache store.

pub mod cache;
pub mod database;
pub mod rpc;

pub use cache::RedisStore;
pub use database::{PgStore, PostgresConfig};
pub use rpc::{FunctionRegistry, HttpChainClient, HttpClientConfig};
