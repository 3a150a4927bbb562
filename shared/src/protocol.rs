//! Messages exchanged between server and clients, and the length-prefixed
//! frame codec that carries them over a stream socket.

use crate::board::{CellDelta, Grid};
use crate::cell::Team;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted payload. A full reference board is roughly 1 KiB.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Most cells a board may have for its snapshot to fit in one frame. Each
/// cell encodes as one byte; the rest of a snapshot stays under the headroom.
pub const MAX_BOARD_CELLS: usize = MAX_FRAME_LEN - 256;

/// Discrete player intent, sent as a single code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    MoveUp = 1,
    MoveDown = 2,
    MoveLeft = 3,
    MoveRight = 4,
    Dash = 5,
    Secondary = 6,
}

impl Action {
    pub fn from_code(code: u8) -> Option<Action> {
        match code {
            1 => Some(Action::MoveUp),
            2 => Some(Action::MoveDown),
            3 => Some(Action::MoveLeft),
            4 => Some(Action::MoveRight),
            5 => Some(Action::Dash),
            6 => Some(Action::Secondary),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Board offset `(dx, dy)` for movement actions.
    pub fn direction(self) -> Option<(i32, i32)> {
        match self {
            Action::MoveUp => Some((0, -1)),
            Action::MoveDown => Some((0, 1)),
            Action::MoveLeft => Some((-1, 0)),
            Action::MoveRight => Some((1, 0)),
            Action::Dash | Action::Secondary => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Action {
        code: u8,
    },
    ResyncRequest,
    Disconnect,

    Connected {
        client_id: u32,
        team: Team,
    },
    /// Full board bootstrap; always precedes the deltas a client applies.
    Snapshot {
        tick_id: u64,
        tick_period_ms: u64,
        board: Grid,
        points: [i32; 2],
        health: [i32; 2],
    },
    /// Ordered cell writes of one tick.
    Delta {
        tick_id: u64,
        points: [i32; 2],
        health: [i32; 2],
        deltas: Vec<CellDelta>,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed packet: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}

/// Writes one packet as a big-endian `u32` length followed by its bincode body.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let payload = bincode::serialize(packet)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one packet. A stream closed between frames yields `Ok(None)`.
pub async fn read_packet<R>(reader: &mut R) -> Result<Option<Packet>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(bincode::deserialize(&payload)?))
}
