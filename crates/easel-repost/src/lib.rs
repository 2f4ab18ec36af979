//! Repost detector backends.
//!
//! Two interchangeable implementations of [`easel_core::RepostDetector`]:
//! [`MemoryDetector`] for single-instance deployments and
//! [`RedisDetector`] for multi-instance deployments sharing one dedup
//! namespace. Selection happens at startup from configuration.

pub mod memory;
pub mod redis;

pub use memory::MemoryDetector;
pub use redis::RedisDetector;
