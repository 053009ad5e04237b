//! s3backup Core - Domain types and ports
//!
//! This crate contains the hexagonal core of the backup engine:
//! - **Domain types** - `FileDescriptor`, `ObjectKey`, `PartPlan`, `RunCounters`,
//!   retention policies and grouping
//! - **Port definitions** - The `IObjectStore` capability consumed by the engine
//! - **Configuration** - Typed YAML configuration with validation
//!
//! # Architecture
//!
//! The domain module is pure: key derivation, part planning and retention
//! grouping have no I/O. Ports define the trait interface that adapters
//! implement. The engine crate (`s3backup-sync`) drives both.

pub mod config;
pub mod domain;
pub mod ports;
