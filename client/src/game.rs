//! Client-side replica of the authoritative board.
//!
//! The [`Reconciler`] only ever converges toward server state: a snapshot
//! replaces the replica outright, and a delta is applied only when it is
//! newer than everything seen so far and every write lands on the board.
//! Anything else is reported as a [`SyncError`] and leaves the replica as it
//! was, so the caller can decide to resynchronize.

use shared::{
    apply_deltas, ticks_to_duration, BoardError, CellDelta, Grid, DASH_COOLDOWN_TICKS,
    DEFAULT_TICK_PERIOD_MS,
};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("delta received before any snapshot")]
    DeltaBeforeSnapshot,
    #[error("stale delta for tick {received}, already at tick {last}")]
    StaleTick { received: u64, last: u64 },
    #[error("delta writes outside the board at ({x}, {y})")]
    DeltaOutOfBounds { x: i32, y: i32 },
    #[error(transparent)]
    Board(BoardError),
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    replica: Option<Grid>,
    points: [i32; 2],
    health: [i32; 2],
    last_tick: u64,
    tick_period: Duration,
    clock: Duration,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            replica: None,
            points: [0, 0],
            health: [0, 0],
            last_tick: 0,
            tick_period: Duration::from_millis(DEFAULT_TICK_PERIOD_MS),
            clock: Duration::ZERO,
        }
    }

    /// Replaces the replica. Applying the same snapshot twice yields the same state.
    pub fn apply_snapshot(
        &mut self,
        tick_id: u64,
        tick_period_ms: u64,
        board: Grid,
        points: [i32; 2],
        health: [i32; 2],
    ) {
        self.replica = Some(board);
        self.points = points;
        self.health = health;
        self.last_tick = tick_id;
        self.tick_period = Duration::from_millis(tick_period_ms);
        self.clock = ticks_to_duration(tick_id, tick_period_ms);
    }

    /// Applies one tick of writes in order. Nothing changes on error.
    pub fn apply_delta(
        &mut self,
        tick_id: u64,
        points: [i32; 2],
        health: [i32; 2],
        deltas: &[CellDelta],
    ) -> Result<(), SyncError> {
        let replica = self.replica.as_mut().ok_or(SyncError::DeltaBeforeSnapshot)?;
        if tick_id <= self.last_tick {
            return Err(SyncError::StaleTick {
                received: tick_id,
                last: self.last_tick,
            });
        }

        apply_deltas(replica, deltas).map_err(|e| match e {
            BoardError::OutOfBounds { x, y } => SyncError::DeltaOutOfBounds { x, y },
            other => SyncError::Board(other),
        })?;

        self.last_tick = tick_id;
        self.points = points;
        self.health = health;
        self.clock = ticks_to_duration(tick_id, self.tick_period.as_millis() as u64);
        Ok(())
    }

    /// Drops the replica; deltas are rejected until the next snapshot.
    pub fn invalidate(&mut self) {
        self.replica = None;
    }

    pub fn has_snapshot(&self) -> bool {
        self.replica.is_some()
    }

    pub fn replica(&self) -> Option<&Grid> {
        self.replica.as_ref()
    }

    pub fn points(&self) -> [i32; 2] {
        self.points
    }

    pub fn health(&self) -> [i32; 2] {
        self.health
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    /// Match time as `MM:SS`.
    pub fn format_clock(&self) -> String {
        let secs = self.clock.as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

/// Local dash timer. The server enforces the real cooldown; this only
/// gates the key and drives the HUD bar.
#[derive(Debug, Clone)]
pub struct DashCooldown {
    duration: Duration,
    started: Option<Instant>,
    percent: f32,
}

impl DashCooldown {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: None,
            percent: 0.0,
        }
    }

    /// Cooldown matching the server's tick-based one at the given period.
    pub fn for_tick_period(tick_period: Duration) -> Self {
        Self::new(ticks_to_duration(
            DASH_COOLDOWN_TICKS,
            tick_period.as_millis() as u64,
        ))
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn is_ready(&self) -> bool {
        self.started.is_none()
    }

    /// Starts the timer if it is idle.
    pub fn try_start(&mut self, now: Instant) -> bool {
        if self.started.is_some() {
            return false;
        }
        self.started = Some(now);
        self.percent = 0.0;
        true
    }

    /// Advances the timer; returns progress in `[0, 1)`.
    pub fn update(&mut self, now: Instant) -> f32 {
        let Some(started) = self.started else {
            return self.percent;
        };
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            now.saturating_duration_since(started).as_secs_f32() / self.duration.as_secs_f32()
        };

        if progress >= 1.0 {
            self.started = None;
            self.percent = 0.0;
        } else {
            self.percent = progress;
        }
        self.percent
    }

    pub fn percent(&self) -> f32 {
        self.percent
    }
}
