//! # Arena Server Library
//!
//! Authoritative side of the arena: it owns the only mutable board, applies
//! player actions once per tick, and streams the resulting cell writes to
//! every joined client.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Match layout, players, flags, and the rules evaluated each tick. All
//! board mutation goes through the tracked write path so that each tick
//! produces an ordered delta.
//!
//! ### Client Manager Module (`client_manager`)
//! Connection registry with id assignment, a capacity limit, and
//! per-connection action mailboxes drained in arrival order.
//!
//! ### Network Module (`network`)
//! TCP accept, reader, and writer tasks plus the match loop that interleaves
//! client messages with fixed-period ticks.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
