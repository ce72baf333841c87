//! node-agent library
//!
//! This crate provides the core of the per-node control agent:
//! - Action dispatch by method name with a synchronous/asynchronous split
//! - In-memory tracking of asynchronous action runs as tasks
//! - Periodic heartbeats carrying formatted host vitals
//! - A length-prefixed JSON message bus over stdio

pub mod action;
pub mod agent;
pub mod apply_spec;
pub mod config;
pub mod error;
pub mod mbus;
pub mod platform;
pub mod task;
pub mod vitals;
