//! Types shared by the arena server and its clients: the board model, the
//! flag and wall entities, and the wire protocol.

pub mod board;
pub mod cell;
pub mod flag;
pub mod protocol;
pub mod wall;

pub use board::{apply_deltas, Board, BoardError, CellDelta, DeltaTracker, Grid};
pub use cell::{Cell, Team, UnknownCellCode};
pub use flag::{Flag, FlagState, UnplacedFlag};
pub use protocol::{
    read_packet, write_packet, Action, FrameError, Packet, MAX_BOARD_CELLS, MAX_FRAME_LEN,
};
pub use wall::WallPosition;

pub const PROTOCOL_VERSION: u32 = 1;
pub const BOARD_HEIGHT: usize = 21;
pub const BOARD_WIDTH: usize = 51;
pub const DEFAULT_TICK_PERIOD_MS: u64 = 50;
/// Dash cooldown in server ticks; 5 seconds at the default period.
pub const DASH_COOLDOWN_TICKS: u64 = 100;

/// Wall-clock duration of `ticks` server ticks.
pub fn ticks_to_duration(ticks: u64, tick_period_ms: u64) -> std::time::Duration {
    std::time::Duration::from_millis(ticks.saturating_mul(tick_period_ms))
}
