//! Split-flap glyph animation.
//!
//! Each character cell steps forward through a fixed drum of glyphs until it
//! shows its target. Cells never step backwards: going from `B` to `A` runs
//! the whole drum round. A target that is not on the drum (accented letters,
//! punctuation) is shown at once.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

/// The glyph drum, in flip order.
pub const ALPHABET: &str = " ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789:";

/// Number of glyphs on the drum.
pub const ALPHABET_LEN: usize = ALPHABET.len();

fn glyph_index(c: char) -> Option<usize> {
    ALPHABET.chars().position(|g| g == c)
}

fn glyph_at(index: usize) -> char {
    ALPHABET.as_bytes()[index % ALPHABET_LEN] as char
}

fn upper(c: char) -> char {
    c.to_uppercase().next().unwrap_or(c)
}

/// Whether a cell still has flips to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlapState {
    /// Showing its target.
    Idle,
    /// Stepping towards its target.
    Flipping,
}

/// One character cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlapCell {
    display: char,
    target: char,
}

impl Default for FlapCell {
    fn default() -> Self {
        Self {
            display: ' ',
            target: ' ',
        }
    }
}

impl FlapCell {
    /// A blank cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cell already showing `c`.
    #[must_use]
    pub fn showing(c: char) -> Self {
        let c = upper(c);
        Self {
            display: c,
            target: c,
        }
    }

    /// The glyph currently shown.
    #[must_use]
    pub fn display(&self) -> char {
        self.display
    }

    /// The glyph being chased.
    #[must_use]
    pub fn target(&self) -> char {
        self.target
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> FlapState {
        if self.display == self.target {
            FlapState::Idle
        } else {
            FlapState::Flipping
        }
    }

    /// Chase a new target. A flipping cell keeps its position and continues
    /// towards the new glyph.
    pub fn set_target(&mut self, c: char) -> FlapState {
        self.target = upper(c);
        if glyph_index(self.target).is_none() {
            self.display = self.target;
        }
        self.state()
    }

    /// Advance one glyph if flipping.
    pub fn tick(&mut self) -> FlapState {
        if self.state() == FlapState::Idle {
            return FlapState::Idle;
        }
        let next = glyph_index(self.display).map_or(0, |i| i + 1);
        self.display = glyph_at(next);
        self.state()
    }

    /// Ticks left before the cell is idle.
    #[must_use]
    pub fn ticks_remaining(&self) -> usize {
        if self.state() == FlapState::Idle {
            return 0;
        }
        let Some(target) = glyph_index(self.target) else {
            return 0;
        };
        match glyph_index(self.display) {
            Some(current) => (target + ALPHABET_LEN - current) % ALPHABET_LEN,
            None => target + 1,
        }
    }
}

/// A row of cells showing one string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlapDisplay {
    cells: Vec<FlapCell>,
}

impl FlapDisplay {
    /// An empty display.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A display already showing `text`, with nothing to animate.
    #[must_use]
    pub fn showing(text: &str) -> Self {
        Self {
            cells: text.chars().map(FlapCell::showing).collect(),
        }
    }

    /// Retarget every cell. New cells start blank; surplus cells are removed.
    pub fn set_text(&mut self, text: &str) {
        let chars: Vec<char> = text.chars().collect();
        self.cells.resize(chars.len(), FlapCell::new());
        for (cell, c) in self.cells.iter_mut().zip(chars) {
            cell.set_target(c);
        }
    }

    /// Advance every flipping cell. Returns true while any cell still flips.
    pub fn tick(&mut self) -> bool {
        let mut flipping = false;
        for cell in &mut self.cells {
            flipping |= cell.tick() == FlapState::Flipping;
        }
        flipping
    }

    /// True when every cell shows its target.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.cells.iter().all(|c| c.state() == FlapState::Idle)
    }

    /// Ticks until the whole row is idle.
    #[must_use]
    pub fn ticks_to_settle(&self) -> usize {
        self.cells
            .iter()
            .map(FlapCell::ticks_remaining)
            .max()
            .unwrap_or(0)
    }

    /// The text currently shown.
    #[must_use]
    pub fn render(&self) -> String {
        self.cells.iter().map(FlapCell::display).collect()
    }

    /// The cells of this row.
    #[must_use]
    pub fn cells(&self) -> &[FlapCell] {
        &self.cells
    }
}

/// What an animated row shows right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlapFrame {
    /// Rendered text.
    pub text: String,
    /// Whether every cell has reached its target.
    pub idle: bool,
    /// Which `set_text` call this frame belongs to.
    pub generation: u64,
}

/// Drives a [`FlapDisplay`] on a timer.
///
/// The row ticks only while some cell is flipping and always chases the most
/// recent text. Dropping the animator cancels the pending tick.
#[derive(Debug)]
pub struct FlapAnimator {
    target: watch::Sender<(u64, String)>,
    frames: watch::Receiver<FlapFrame>,
    task: JoinHandle<()>,
}

impl FlapAnimator {
    /// Start animating from a blank row towards `text`.
    #[must_use]
    pub fn spawn(text: &str, tick: Duration) -> Self {
        let (target, target_rx) = watch::channel((0, text.to_string()));
        let (frame_tx, frames) = watch::channel(FlapFrame {
            text: String::new(),
            idle: text.is_empty(),
            generation: 0,
        });
        let task = tokio::spawn(run(target_rx, frame_tx, tick));
        Self {
            target,
            frames,
            task,
        }
    }

    /// Chase new text.
    pub fn set_text(&self, text: &str) {
        self.target.send_modify(|(generation, current)| {
            *generation += 1;
            *current = text.to_string();
        });
    }

    /// The latest frame.
    #[must_use]
    pub fn frame(&self) -> FlapFrame {
        self.frames.borrow().clone()
    }

    /// A receiver notified on every frame.
    #[must_use]
    pub fn frames(&self) -> watch::Receiver<FlapFrame> {
        self.frames.clone()
    }

    /// Wait until the row shows the most recent text.
    pub async fn settled(&mut self) -> Option<String> {
        let generation = self.target.borrow().0;
        self.frames
            .wait_for(|f| f.idle && f.generation == generation)
            .await
            .ok()
            .map(|f| f.text.clone())
    }
}

impl Drop for FlapAnimator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut target: watch::Receiver<(u64, String)>,
    frames: watch::Sender<FlapFrame>,
    tick: Duration,
) {
    let (mut generation, text) = target.borrow_and_update().clone();
    let mut display = FlapDisplay::new();
    display.set_text(&text);

    loop {
        let idle = display.is_idle();
        frames.send_replace(FlapFrame {
            text: display.render(),
            idle,
            generation,
        });

        if idle {
            if target.changed().await.is_err() {
                return;
            }
        } else {
            tokio::select! {
                changed = target.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                () = tokio::time::sleep(tick) => {
                    display.tick();
                    continue;
                }
            }
        }

        let (next_generation, text) = target.borrow_and_update().clone();
        trace!("Flap row retargeted to {:?}", text);
        generation = next_generation;
        display.set_text(&text);
    }
}
