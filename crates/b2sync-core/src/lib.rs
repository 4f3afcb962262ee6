//! b2sync Core - Domain types, configuration and ports
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `FileVersion`, `ScanPath`, sync mode enums, file-name rules
//! - **Port definitions** - Traits for adapters: `IBucket`, `IBucketProvider`,
//!   `IEncryptionSettingsProvider`, `IProgressListener`
//! - **Configuration** - YAML configuration with validation and a builder
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains plain value types with no I/O.
//! Ports define trait interfaces that the storage client implements.
//! The sync engine crate drives those ports.

pub mod config;
pub mod domain;
pub mod ports;
