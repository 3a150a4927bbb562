use crossterm::{
    cursor::MoveTo,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use shared::{Cell, Grid};
use std::io::{self, Write};

const COOLDOWN_BAR_WIDTH: usize = 20;

/// Everything a frame shows. The renderer never mutates game state.
#[derive(Debug, Clone)]
pub struct FrameView<'a> {
    pub replica: &'a Grid,
    pub points: [i32; 2],
    pub health: [i32; 2],
    pub clock: String,
    pub cooldown_percent: f32,
}

pub fn glyph(cell: Cell) -> char {
    match cell {
        Cell::Wall => '#',
        Cell::Empty => ' ',
        Cell::Bush => '"',
        Cell::BaseDestination => '_',
        Cell::Team1 => 'B',
        Cell::Team4 => 'R',
        Cell::Flag1 => 'F',
        Cell::Tower => 'T',
        Cell::DashTrailA => '=',
        Cell::DashTrailB => '-',
        Cell::DashTrailC => '~',
        Cell::DashTrailD => '.',
        Cell::FreezeEffect => '*',
    }
}

pub fn cooldown_bar(percent: f32) -> String {
    let filled = ((percent.clamp(0.0, 1.0) * COOLDOWN_BAR_WIDTH as f32) as usize)
        .min(COOLDOWN_BAR_WIDTH);
    let state = if percent > 0.0 { "cooling" } else { "ready" };
    format!(
        "Dash [{}{}] {}",
        "#".repeat(filled),
        ".".repeat(COOLDOWN_BAR_WIDTH - filled),
        state
    )
}

/// Full frame as text: HUD line, board rows, health line, cooldown bar.
pub fn render_text(view: &FrameView) -> String {
    let mut out = String::with_capacity((view.replica.width() + 1) * (view.replica.height() + 3));
    out.push_str(&format!(
        "{} | {}  {}\n",
        view.points[0], view.points[1], view.clock
    ));
    for row in view.replica.rows() {
        out.extend(row.iter().map(|cell| glyph(*cell)));
        out.push('\n');
    }
    out.push_str(&format!(
        "Health  blue {} | red {}\n",
        view.health[0], view.health[1]
    ));
    out.push_str(&cooldown_bar(view.cooldown_percent));
    out.push('\n');
    out
}

pub struct Renderer {
    enabled: bool,
}

impl Renderer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Clears the terminal and draws the frame.
    pub fn draw(&mut self, view: &FrameView) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        write_frame(&mut stdout, view)?;
        stdout.flush()
    }
}

/// Queues a frame line by line. Raw mode does not return the carriage on
/// newline, so every row is positioned explicitly.
pub fn write_frame<W: Write>(out: &mut W, view: &FrameView) -> io::Result<()> {
    queue!(out, Clear(ClearType::All))?;
    for (row, line) in render_text(view).lines().enumerate() {
        let row = u16::try_from(row).unwrap_or(u16::MAX);
        queue!(out, MoveTo(0, row), Print(line))?;
    }
    Ok(())
}
