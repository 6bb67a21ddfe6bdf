//! `udp-file-transfer` — reliable single-file upload over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   header / chunks / end    ┌───────────────┐
//!  │  Client  │───────────────────────────▶│ Dispatch Loop │
//!  │          │◀───────────────────────────│               │
//!  └──────────┘        ACK (1 byte)        └───────┬───────┘
//!                                                  │ insert / lookup / remove
//!                                          ┌───────▼───────┐
//!                                          │   Registry    │
//!                                          └───────┬───────┘
//!                                                  │ mpsc queue per session
//!                                          ┌───────▼───────┐
//!                                          │Session worker │──▶ artifact on disk
//!                                          └───────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`protocol`] — wire format (frame classification, ACK byte)
//! - [`socket`]   — async UDP socket abstraction
//! - [`client`]   — stop-and-wait upload loop (send → await ACK → retry)
//! - [`server`]   — dispatch loop: sole socket reader, routes inbound frames
//! - [`registry`] — concurrency-safe client-identity → session map
//! - [`session`]  — per-client ordered write-to-disk worker
//! - [`storage`]  — artifact naming (collision disambiguation)
//! - [`sim`]      — fault-injecting UDP proxy for deterministic tests

pub mod client;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod sim;
pub mod socket;
pub mod storage;

pub use client::{Client, RetryConfig, TransferError};
pub use server::{Server, ServerConfig, ServerError};
