//! Core types and utilities for the OPC UA bridge runtime
//!
//! This crate provides fundamental types, error handling, the value model
//! and configuration structures used throughout the bridge implementation.

pub mod config;
pub mod error;
pub mod node_id;
pub mod reason;
pub mod status;
pub mod variant;

pub use config::{InitialPolicy, ItemConfig, SessionConfig, TimestampSource};
pub use error::{OpcError, OpcResult};
pub use node_id::{Identifier, NodeId};
pub use reason::{ConnectionStatus, Priority, ProcessReason};
pub use status::StatusCode;
pub use variant::{DataValue, StructureDefinition, StructureMember, Variant, VariantKind};
