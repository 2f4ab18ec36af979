//! Process-local entity cache implementations.
//!
//! [`MokaStoreCache`] backs the caching decorator in `easel-store`. It is
//! an explicit, constructor-injected instance with its lifecycle owned by
//! the service wiring — never ambient global state.

pub mod moka;

pub use moka::MokaStoreCache;
