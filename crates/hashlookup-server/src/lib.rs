//! Hash Lookup Server Library
//!
//! Decentralized name registry: nodes find each other over a libp2p overlay,
//! serve registry requests from a local etcd replica, and admit new replicas
//! into the etcd cluster.

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod network;
pub mod observability;
pub mod service;
pub mod store;
pub mod version;
