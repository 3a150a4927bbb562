//! Authoritative match state and the rules evaluated each tick.
//!
//! What a cell shows is derived from the static terrain captured at setup,
//! with flags and then players layered on top. Whenever an entity leaves or
//! enters a cell, that cell is refreshed from those layers through
//! [`Board::write`], so every change lands in the tick's delta.

use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::{
    Action, Board, BoardError, Cell, CellDelta, Flag, FlagState, Grid, Packet, Team,
    UnplacedFlag, WallPosition, DASH_COOLDOWN_TICKS, MAX_BOARD_CELLS,
};
use std::collections::BTreeMap;

pub const PLAYER_MAX_HP: i32 = 100;
pub const FREEZE_DAMAGE: i32 = 25;
pub const FREEZE_TICKS: u64 = 20;
pub const DASH_DISTANCE: usize = 3;

const NEIGHBOURS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Static description of a match map. Positions are `(x, y)`.
#[derive(Debug, Clone)]
pub struct MatchLayout {
    pub height: usize,
    pub width: usize,
    pub walls: Vec<WallPosition>,
    pub bushes: Vec<(i32, i32)>,
    pub towers: Vec<(i32, i32)>,
    /// Flag base per team, indexed by [`Team::index`].
    pub flag_bases: [(i32, i32); 2],
    /// Cells where a team's carrier scores.
    pub destinations: [Vec<(i32, i32)>; 2],
    pub spawns: [Vec<(i32, i32)>; 2],
}

impl MatchLayout {
    /// Mirrored two-sided arena scaled to the given size; 21x51 is the
    /// reference map. The board must be large enough for both halves and
    /// small enough that a snapshot of it fits in one frame.
    pub fn standard(height: usize, width: usize) -> Result<Self, BoardError> {
        if height < 9 || width < 15 {
            return Err(BoardError::TooSmall { height, width });
        }
        match height.checked_mul(width) {
            Some(cells) if cells <= MAX_BOARD_CELLS => {}
            _ => return Err(BoardError::TooLarge { height, width }),
        }
        let (h, w) = (height as i32, width as i32);
        let (mid_x, mid_y) = (w / 2, h / 2);

        let walls = vec![
            WallPosition::new((0, 0), (0, w - 1))?,
            WallPosition::new((h - 1, 0), (h - 1, w - 1))?,
            WallPosition::new((0, 0), (h - 1, 0))?,
            WallPosition::new((0, w - 1), (h - 1, w - 1))?,
            // Centre divider with a gap around the middle row.
            WallPosition::new((h / 4, mid_x), (mid_y - 2, mid_x))?,
            WallPosition::new((mid_y + 2, mid_x), (3 * h / 4, mid_x))?,
        ];

        let mut bushes = Vec::new();
        for x in (w / 4 - 2)..=(w / 4 + 2) {
            for y in [3, h - 4] {
                bushes.push((x, y));
                bushes.push((w - 1 - x, y));
            }
        }

        let destinations = [
            (mid_y - 1..=mid_y + 1).map(|y| (1, y)).collect(),
            (mid_y - 1..=mid_y + 1).map(|y| (w - 2, y)).collect(),
        ];
        let spawns = [
            vec![(2, 2), (2, h - 3), (4, 2), (4, h - 3)],
            vec![(w - 3, 2), (w - 3, h - 3), (w - 5, 2), (w - 5, h - 3)],
        ];

        Ok(Self {
            height,
            width,
            walls,
            bushes,
            towers: vec![(mid_x, 1), (mid_x, h - 2)],
            flag_bases: [(3, mid_y), (w - 4, mid_y)],
            destinations,
            spawns,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: u32,
    pub team: Team,
    pub x: i32,
    pub y: i32,
    pub hp: i32,
    /// Last movement direction; dashes follow it.
    pub facing: (i32, i32),
    /// Team whose flag this player carries.
    pub carrying: Option<Team>,
    pub dash_ready_at: u64,
    pub frozen_until: u64,
}

/// Result of one simulation step, ready to broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub tick_id: u64,
    pub points: [i32; 2],
    pub health: [i32; 2],
    pub deltas: Vec<CellDelta>,
}

impl TickOutput {
    pub fn into_packet(self) -> Packet {
        Packet::Delta {
            tick_id: self.tick_id,
            points: self.points,
            health: self.health,
            deltas: self.deltas,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Moved,
    Blocked,
}

pub struct GameState {
    pub tick: u64,
    board: Board,
    terrain: Grid,
    layout: MatchLayout,
    flags: [Flag; 2],
    players: BTreeMap<u32, Player>,
    points: [i32; 2],
    effects: Vec<(i32, i32)>,
    rng: StdRng,
}

impl GameState {
    pub fn new(layout: MatchLayout) -> Result<Self, BoardError> {
        Self::with_rng(layout, StdRng::from_entropy())
    }

    /// Deterministic spawn selection, for tests and replays.
    pub fn with_seed(layout: MatchLayout, seed: u64) -> Result<Self, BoardError> {
        Self::with_rng(layout, StdRng::seed_from_u64(seed))
    }

    fn with_rng(layout: MatchLayout, rng: StdRng) -> Result<Self, BoardError> {
        let mut board = Board::with_walls(layout.height, layout.width, &layout.walls)?;
        for &(x, y) in &layout.bushes {
            board.stamp(x, y, Cell::Bush)?;
        }
        for &(x, y) in &layout.towers {
            board.stamp(x, y, Cell::Tower)?;
        }
        for &(x, y) in layout.destinations.iter().flatten() {
            board.stamp(x, y, Cell::BaseDestination)?;
        }
        let terrain = board.snapshot();

        let mut place_flag = |team: Team| -> Result<Flag, BoardError> {
            let (x, y) = layout.flag_bases[team.index()];
            board.stamp(x, y, Cell::Flag1)?;
            Ok(UnplacedFlag::new(Cell::Flag1, x, y).set_base())
        };
        let flags = [place_flag(Team::Blue)?, place_flag(Team::Red)?];

        info!(
            "Match board {}x{} ready, flags at {:?} and {:?}",
            layout.height,
            layout.width,
            flags[0].get_base(),
            flags[1].get_base()
        );

        Ok(Self {
            tick: 0,
            board,
            terrain,
            layout,
            flags,
            players: BTreeMap::new(),
            points: [0, 0],
            effects: Vec::new(),
            rng,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn flag(&self, team: Team) -> &Flag {
        &self.flags[team.index()]
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn points(&self) -> [i32; 2] {
        self.points
    }

    /// Summed hit points per team.
    pub fn health(&self) -> [i32; 2] {
        let mut health = [0, 0];
        for player in self.players.values() {
            health[player.team.index()] += player.hp;
        }
        health
    }

    /// Full-board bootstrap for a joining or resyncing client.
    pub fn snapshot_packet(&self, tick_period_ms: u64) -> Packet {
        Packet::Snapshot {
            tick_id: self.tick,
            tick_period_ms,
            board: self.board.snapshot(),
            points: self.points,
            health: self.health(),
        }
    }

    /// Adds a player to the smaller team at a free spawn point.
    pub fn add_player(&mut self, id: u32) -> Result<Option<Team>, BoardError> {
        let blue = self.players.values().filter(|p| p.team == Team::Blue).count();
        let team = if blue * 2 <= self.players.len() {
            Team::Blue
        } else {
            Team::Red
        };

        let Some((x, y)) = self.pick_spawn(team) else {
            return Ok(None);
        };
        let facing = match team {
            Team::Blue => (1, 0),
            Team::Red => (-1, 0),
        };
        self.players.insert(
            id,
            Player {
                id,
                team,
                x,
                y,
                hp: PLAYER_MAX_HP,
                facing,
                carrying: None,
                dash_ready_at: 0,
                frozen_until: 0,
            },
        );
        self.refresh(x, y)?;
        info!("Added player {} to {:?} at ({}, {})", id, team, x, y);
        Ok(Some(team))
    }

    pub fn remove_player(&mut self, id: u32) -> Result<(), BoardError> {
        if let Some(player) = self.players.remove(&id) {
            if let Some(flag_team) = player.carrying {
                self.flags[flag_team.index()].drop_at_current();
            }
            self.refresh(player.x, player.y)?;
            info!("Removed player {}", id);
        }
        Ok(())
    }

    /// Runs one tick: effects from the previous tick expire, queued actions
    /// apply in order, match rules run, and the recorded writes are drained.
    pub fn tick(&mut self, actions: Vec<(u32, Action)>) -> TickOutput {
        if let Err(e) = self.expire_effects() {
            error!("Tick {}: expiring effects failed: {}", self.tick, e);
        }

        for (id, action) in actions {
            if let Err(e) = self.apply_action(id, action) {
                error!(
                    "Tick {}: action {:?} from player {} failed: {}",
                    self.tick, action, id, e
                );
            }
        }

        self.evaluate_rules();

        let deltas = self.board.drain_deltas();
        self.tick += 1;

        TickOutput {
            tick_id: self.tick,
            points: self.points,
            health: self.health(),
            deltas,
        }
    }

    pub fn apply_action(&mut self, id: u32, action: Action) -> Result<(), BoardError> {
        let Some(player) = self.players.get(&id) else {
            return Ok(());
        };
        if self.tick < player.frozen_until && action != Action::Secondary {
            debug!("Player {} is frozen, ignoring {:?}", id, action);
            return Ok(());
        }

        match action {
            Action::MoveUp | Action::MoveDown | Action::MoveLeft | Action::MoveRight => {
                if let Some((dx, dy)) = action.direction() {
                    self.step_player(id, dx, dy)?;
                }
                Ok(())
            }
            Action::Dash => self.dash(id),
            Action::Secondary => self.freeze(id),
        }
    }

    /// Eliminations first, then captures that reached a destination. A
    /// failing entity is logged and skipped; the rest are still evaluated.
    fn evaluate_rules(&mut self) {
        let eliminated: Vec<u32> = self
            .players
            .values()
            .filter(|p| p.hp <= 0)
            .map(|p| p.id)
            .collect();
        for id in eliminated {
            if let Err(e) = self.eliminate(id) {
                error!("Tick {}: eliminating player {} failed: {}", self.tick, id, e);
            }
        }

        let scorers: Vec<(u32, Team, Team)> = self
            .players
            .values()
            .filter_map(|p| {
                let flag_team = p.carrying?;
                self.layout.destinations[p.team.index()]
                    .contains(&(p.x, p.y))
                    .then_some((p.id, p.team, flag_team))
            })
            .collect();
        for (id, team, flag_team) in scorers {
            if let Err(e) = self.relocate_flag(flag_team, None) {
                error!(
                    "Tick {}: returning the {:?} flag scored by player {} failed: {}",
                    self.tick, flag_team, id, e
                );
                continue;
            }
            self.points[team.index()] += 1;
            if let Some(player) = self.players.get_mut(&id) {
                player.carrying = None;
            }
            info!(
                "Player {} captured the {:?} flag, score {:?}",
                id, flag_team, self.points
            );
        }
    }

    fn step_player(&mut self, id: u32, dx: i32, dy: i32) -> Result<Step, BoardError> {
        let Some(player) = self.players.get(&id).cloned() else {
            return Ok(Step::Blocked);
        };
        let (ox, oy) = (player.x, player.y);
        let (nx, ny) = (ox + dx, oy + dy);
        let Ok(target) = self.board.read(nx, ny) else {
            return Ok(Step::Blocked);
        };

        let mut picked_up = None;
        if let Some(owner) = self.flag_at(nx, ny) {
            let state = self.flags[owner.index()].state();
            if owner == player.team {
                if state != FlagState::Dropped {
                    return Ok(Step::Blocked);
                }
                self.relocate_flag(owner, None)?;
                info!("Player {} returned the {:?} flag", id, owner);
                if self.flag_at(nx, ny).is_some() {
                    return Ok(Step::Blocked);
                }
            } else {
                if player.carrying.is_some() || state == FlagState::Carried {
                    return Ok(Step::Blocked);
                }
                picked_up = Some(owner);
            }
        } else if !target.is_passable() {
            return Ok(Step::Blocked);
        }

        let mut moved = player.clone();
        moved.x = nx;
        moved.y = ny;
        moved.facing = (dx, dy);
        if let Some(owner) = picked_up {
            self.flags[owner.index()].capture();
            moved.carrying = Some(owner);
            info!("Player {} picked up the {:?} flag", id, owner);
        }
        self.players.insert(id, moved);

        // A carried flag trails one cell behind its carrier.
        if let (None, Some(flag_team)) = (picked_up, player.carrying) {
            self.relocate_flag(flag_team, Some((ox, oy)))?;
        }
        self.refresh(ox, oy)?;
        self.refresh(nx, ny)?;
        Ok(Step::Moved)
    }

    fn dash(&mut self, id: u32) -> Result<(), BoardError> {
        let tick = self.tick;
        let Some(player) = self.players.get_mut(&id) else {
            return Ok(());
        };
        if tick < player.dash_ready_at {
            debug!(
                "Player {} dash rejected, ready at tick {}",
                id, player.dash_ready_at
            );
            return Ok(());
        }
        player.dash_ready_at = tick + DASH_COOLDOWN_TICKS;
        let (dx, dy) = player.facing;

        let mut passed = Vec::with_capacity(DASH_DISTANCE);
        for _ in 0..DASH_DISTANCE {
            let Some(player) = self.players.get(&id) else {
                break;
            };
            let from = (player.x, player.y);
            if self.step_player(id, dx, dy)? == Step::Blocked {
                break;
            }
            passed.push(from);
        }

        for (step, &(x, y)) in passed.iter().rev().enumerate() {
            if self.shows_bare_terrain(x, y)? {
                self.board.write(x, y, Cell::dash_trail(step))?;
                self.effects.push((x, y));
            }
        }
        Ok(())
    }

    fn freeze(&mut self, id: u32) -> Result<(), BoardError> {
        let Some(caster) = self.players.get(&id).cloned() else {
            return Ok(());
        };
        let tick = self.tick;

        for (dx, dy) in NEIGHBOURS {
            let (x, y) = (caster.x + dx, caster.y + dy);
            let enemy = self
                .players
                .values_mut()
                .find(|p| p.x == x && p.y == y && p.team != caster.team);
            if let Some(enemy) = enemy {
                enemy.hp -= FREEZE_DAMAGE;
                enemy.frozen_until = tick + FREEZE_TICKS;
                debug!("Player {} froze player {} ({} hp)", id, enemy.id, enemy.hp);
            } else if self.board.contains(x, y) && self.shows_bare_terrain(x, y)? {
                self.board.write(x, y, Cell::FreezeEffect)?;
                self.effects.push((x, y));
            }
        }
        Ok(())
    }

    fn eliminate(&mut self, id: u32) -> Result<(), BoardError> {
        let Some(mut player) = self.players.get(&id).cloned() else {
            return Ok(());
        };
        if let Some(flag_team) = player.carrying.take() {
            self.flags[flag_team.index()].drop_at_current();
            info!("Player {} dropped the {:?} flag", id, flag_team);
        }

        let (ox, oy) = (player.x, player.y);
        if let Some((x, y)) = self.pick_spawn(player.team) {
            player.x = x;
            player.y = y;
        }
        player.hp = PLAYER_MAX_HP;
        player.frozen_until = 0;
        let (nx, ny) = (player.x, player.y);
        self.players.insert(id, player);

        info!("Player {} eliminated, respawning at ({}, {})", id, nx, ny);
        self.refresh(ox, oy)?;
        self.refresh(nx, ny)
    }

    fn expire_effects(&mut self) -> Result<(), BoardError> {
        for (x, y) in std::mem::take(&mut self.effects) {
            self.refresh(x, y)?;
        }
        Ok(())
    }

    /// Moves a flag to `to`, or back to its base when `to` is `None`, and
    /// repairs both cells it touched.
    ///
    /// A flag lying dropped on the base a flag is reset to goes back to its
    /// own base as well. A carried flag may trail across a base for a tick;
    /// it leaves with its carrier.
    fn relocate_flag(&mut self, team: Team, to: Option<(i32, i32)>) -> Result<(), BoardError> {
        let flag = &mut self.flags[team.index()];
        let (py, px) = flag.position();
        match to {
            Some((x, y)) => flag.move_to(x, y, &mut self.board)?,
            None => flag.reset_pos(&mut self.board)?,
        }
        let (ny, nx) = flag.position();
        if (px, py) != (nx, ny) {
            self.refresh(px, py)?;
        }
        self.refresh(nx, ny)?;

        let other = &self.flags[team.opponent().index()];
        if to.is_none() && other.state() == FlagState::Dropped && other.position() == (ny, nx) {
            info!("{:?} flag was lying on the {:?} base, returning it", team.opponent(), team);
            return self.relocate_flag(team.opponent(), None);
        }
        Ok(())
    }

    fn flag_at(&self, x: i32, y: i32) -> Option<Team> {
        Team::BOTH
            .into_iter()
            .find(|team| self.flags[team.index()].position() == (y, x))
    }

    /// What the board should show at `(x, y)`: a player, else a flag, else terrain.
    fn visible(&self, x: i32, y: i32) -> Result<Cell, BoardError> {
        if let Some(player) = self.players.values().find(|p| p.x == x && p.y == y) {
            return Ok(player.team.marker());
        }
        if let Some(team) = self.flag_at(x, y) {
            return Ok(self.flags[team.index()].team_id);
        }
        self.terrain.get(x, y)
    }

    fn refresh(&mut self, x: i32, y: i32) -> Result<(), BoardError> {
        let value = self.visible(x, y)?;
        if self.board.read(x, y)? != value {
            self.board.write(x, y, value)?;
        }
        Ok(())
    }

    /// True when nothing but passable terrain is shown at `(x, y)`.
    fn shows_bare_terrain(&self, x: i32, y: i32) -> Result<bool, BoardError> {
        let terrain = self.terrain.get(x, y)?;
        Ok(terrain.is_passable() && self.board.read(x, y)? == terrain)
    }

    fn pick_spawn(&mut self, team: Team) -> Option<(i32, i32)> {
        let free: Vec<(i32, i32)> = self.layout.spawns[team.index()]
            .iter()
            .copied()
            .filter(|&(x, y)| matches!(self.shows_bare_terrain(x, y), Ok(true)))
            .collect();
        free.choose(&mut self.rng).copied()
    }
}
