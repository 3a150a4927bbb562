//! # Arena Client Library
//!
//! Read-only follower of the authoritative server. The client keeps a
//! replica of the board, converges it with the snapshot and delta stream,
//! and turns key presses into action codes. It never simulates the match.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The [`game::Reconciler`] holding the replica, scores, and match clock,
//! plus the local [`game::DashCooldown`] timer.
//!
//! ### Input Module (`input`)
//! Key to action mapping and the task reading key presses from the terminal.
//!
//! ### Network Module (`network`)
//! TCP reader and writer tasks and the single event loop that applies
//! server packets, forwards actions, and requests resyncs.
//!
//! ### Rendering Module (`rendering`)
//! Text renderer drawing a [`rendering::FrameView`]; it only reads state.
//!
//! ### Terminal Module (`terminal`)
//! Raw mode and alternate screen held for the length of a session.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:8080", true).await?;
//!     client.run().await
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
pub mod terminal;
