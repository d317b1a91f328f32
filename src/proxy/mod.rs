//! Proxy Health Manager: rotation policy over a proxy pool with failure
//! counting, quarantine, and latency tracking.

mod health;
mod strategy;

pub use health::ProxyHealth;
pub use strategy::{from_name, ProxyStrategy, Random, RoundRobin};
