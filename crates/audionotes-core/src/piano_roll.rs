use audionotes_domain_song::{Note, NoteOrigin};
use audionotes_ports::playback::LoopRange;
use audionotes_ports::types::SongTime;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_PITCH: u8 = 21;
pub const MAX_PITCH: u8 = 108;
pub const DISPLAYED_PITCHES: f32 = 88.0;

const NOTE_HEIGHT_RATIO: f32 = 0.85;
const NOTE_RADIUS: f32 = 3.0;
const MIN_NOTE_WIDTH: f32 = 2.0;
const LOOP_HANDLE_WIDTH: f32 = 4.0;
const PLAYHEAD_WIDTH: f32 = 2.5;
const GRID_LINE_WIDTH: f32 = 1.0;
const GRID_STEP_S: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hsla {
    pub h: f32,
    pub s: f32,
    pub l: f32,
    pub a: f32,
}

impl Hsla {
    pub const fn new(h: f32, s: f32, l: f32, a: f32) -> Self {
        Self { h, s, l, a }
    }

    pub const fn opaque(h: f32, s: f32, l: f32) -> Self {
        Self::new(h, s, l, 1.0)
    }
}

impl fmt::Display for Hsla {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hsla({}, {}%, {}%, {})", self.h, self.s, self.l, self.a)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollTheme {
    pub background: Hsla,
    pub captured_note: Hsla,
    pub generated_note: Hsla,
    pub playhead: Hsla,
    pub loop_band: Hsla,
    pub loop_handle: Hsla,
    pub grid: Hsla,
    pub grid_highlight: Hsla,
    pub note_border: Hsla,
    pub black_key: Hsla,
    pub white_key: Hsla,
}

impl Default for RollTheme {
    fn default() -> Self {
        Self {
            background: Hsla::opaque(222.0, 40.0, 12.0),
            captured_note: Hsla::opaque(255.0, 75.0, 65.0),
            generated_note: Hsla::opaque(30.0, 80.0, 60.0),
            playhead: Hsla::opaque(0.0, 70.0, 50.0),
            loop_band: Hsla::new(255.0, 75.0, 65.0, 0.15),
            loop_handle: Hsla::new(255.0, 75.0, 65.0, 0.7),
            grid: Hsla::opaque(222.0, 30.0, 30.0),
            grid_highlight: Hsla::opaque(222.0, 30.0, 40.0),
            note_border: Hsla::new(0.0, 0.0, 10.0, 0.5),
            black_key: Hsla::opaque(222.0, 30.0, 18.0),
            white_key: Hsla::opaque(222.0, 40.0, 12.0),
        }
    }
}

/// Note fill: louder notes are lighter and more opaque; generated notes sit
/// a little darker than captured ones.
pub fn note_color(base: Hsla, velocity: u8, origin: NoteOrigin) -> Hsla {
    let factor = (velocity as f32 / 127.0).clamp(0.3, 1.0);
    let (l, a) = match origin {
        NoteOrigin::Captured => ((base.l + factor * 10.0).clamp(45.0, 80.0), 0.9 + factor * 0.1),
        NoteOrigin::Generated => (
            (base.l - 5.0 + factor * 15.0).clamp(40.0, 75.0),
            0.85 + factor * 0.1,
        ),
    };
    Hsla { l, a, ..base }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DrawOp {
    FillRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Hsla,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
        color: Hsla,
    },
    NoteRect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        radius: f32,
        fill: Hsla,
        stroke: Hsla,
        origin: NoteOrigin,
    },
}

/// What one frame of the roll shows.
#[derive(Clone, Copy, Debug)]
pub struct RollFrame<'a> {
    pub notes: &'a [Note],
    pub playhead: SongTime,
    pub loop_range: LoopRange,
    pub total_duration: SongTime,
}

#[derive(Clone, Copy, Debug)]
pub struct PianoRollView {
    width: f32,
    height: f32,
    theme: RollTheme,
}

impl PianoRollView {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
            theme: RollTheme::default(),
        }
    }

    pub fn with_theme(mut self, theme: RollTheme) -> Self {
        self.theme = theme;
        self
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn theme(&self) -> &RollTheme {
        &self.theme
    }

    pub fn row_height(&self) -> f32 {
        self.height / DISPLAYED_PITCHES
    }

    /// Bottom edge of the row for `pitch`; pitches outside the keyboard are
    /// pinned to its ends.
    pub fn pitch_to_y(&self, pitch: u8) -> f32 {
        let clamped = pitch.clamp(MIN_PITCH, MAX_PITCH);
        self.height - ((clamped - MIN_PITCH) as f32 / DISPLAYED_PITCHES) * self.height
    }

    pub fn time_to_x(&self, time: SongTime, total: SongTime) -> f32 {
        if total <= 0.0 {
            return 0.0;
        }
        ((time / total) * self.width as f64) as f32
    }

    pub fn x_to_time(&self, x: f32, total: SongTime) -> SongTime {
        if self.width <= 0.0 {
            return 0.0;
        }
        (x as f64 / self.width as f64) * total
    }

    pub fn render(&self, frame: &RollFrame<'_>) -> Vec<DrawOp> {
        let mut ops = Vec::with_capacity(frame.notes.len() + 128);
        if self.width <= 0.0 || self.height <= 0.0 {
            return ops;
        }
        let theme = &self.theme;
        let total = frame.total_duration;
        let row_h = self.row_height();

        ops.push(DrawOp::FillRect {
            x: 0.0,
            y: 0.0,
            w: self.width,
            h: self.height,
            color: theme.background,
        });

        for pitch in MIN_PITCH..=MAX_PITCH {
            let y = self.pitch_to_y(pitch) - row_h;
            let color = if is_black_key(pitch) {
                theme.black_key
            } else {
                theme.white_key
            };
            ops.push(DrawOp::FillRect {
                x: 0.0,
                y,
                w: self.width,
                h: row_h,
                color,
            });
            if pitch % 12 == 0 {
                ops.push(DrawOp::Line {
                    x1: 0.0,
                    y1: y + row_h,
                    x2: self.width,
                    y2: y + row_h,
                    width: GRID_LINE_WIDTH,
                    color: theme.grid_highlight,
                });
            }
        }

        if total > 0.0 {
            let mut second = 0.0;
            while second <= total {
                let x = self.time_to_x(second, total);
                ops.push(DrawOp::Line {
                    x1: x,
                    y1: 0.0,
                    x2: x,
                    y2: self.height,
                    width: GRID_LINE_WIDTH,
                    color: theme.grid,
                });
                second += GRID_STEP_S;
            }
        }

        let note_h = row_h * NOTE_HEIGHT_RATIO;
        let inset = row_h * (1.0 - NOTE_HEIGHT_RATIO) / 2.0;
        for note in frame.notes {
            let base = match note.origin {
                NoteOrigin::Captured => theme.captured_note,
                NoteOrigin::Generated => theme.generated_note,
            };
            ops.push(DrawOp::NoteRect {
                x: self.time_to_x(note.start, total),
                y: self.pitch_to_y(note.pitch) - note_h - inset,
                w: self.time_to_x(note.duration, total).max(MIN_NOTE_WIDTH),
                h: note_h,
                radius: NOTE_RADIUS,
                fill: note_color(base, note.velocity, note.origin),
                stroke: theme.note_border,
                origin: note.origin,
            });
        }

        let range = frame.loop_range;
        if range.is_active() {
            let x1 = self.time_to_x(range.start, total);
            let x2 = self.time_to_x(range.end, total);
            ops.push(DrawOp::FillRect {
                x: x1,
                y: 0.0,
                w: x2 - x1,
                h: self.height,
                color: theme.loop_band,
            });
            for x in [x1, x2 - LOOP_HANDLE_WIDTH] {
                ops.push(DrawOp::FillRect {
                    x,
                    y: 0.0,
                    w: LOOP_HANDLE_WIDTH,
                    h: self.height,
                    color: theme.loop_handle,
                });
            }
        }

        let px = self.time_to_x(frame.playhead, total);
        ops.push(DrawOp::Line {
            x1: px,
            y1: 0.0,
            x2: px,
            y2: self.height,
            width: PLAYHEAD_WIDTH,
            color: theme.playhead,
        });

        ops
    }
}

fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RollCommand {
    SetLoop { start: SongTime, end: SongTime },
    Scrub { time: SongTime },
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum RollInteraction {
    #[default]
    Idle,
    DraggingLoop {
        anchor: SongTime,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PointerModifiers {
    pub shift: bool,
}

/// Pointer handling for the roll. Owns no song state; it only turns
/// gestures into commands for the session.
#[derive(Clone, Debug, Default)]
pub struct PianoRollInput {
    state: RollInteraction,
}

impl PianoRollInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RollInteraction {
        self.state
    }

    pub fn pointer_down(
        &mut self,
        view: &PianoRollView,
        x: f32,
        total: SongTime,
        modifiers: PointerModifiers,
    ) -> RollCommand {
        let time = view.x_to_time(x, total);
        if modifiers.shift {
            self.state = RollInteraction::Idle;
            return RollCommand::Scrub { time };
        }
        self.state = RollInteraction::DraggingLoop { anchor: time };
        RollCommand::SetLoop {
            start: time,
            end: time,
        }
    }

    pub fn pointer_move(
        &mut self,
        view: &PianoRollView,
        x: f32,
        total: SongTime,
    ) -> Option<RollCommand> {
        let RollInteraction::DraggingLoop { anchor } = self.state else {
            return None;
        };
        let time = view.x_to_time(x, total);
        Some(RollCommand::SetLoop {
            start: anchor.min(time),
            end: anchor.max(time),
        })
    }

    pub fn pointer_up(&mut self) {
        self.state = RollInteraction::Idle;
    }

    pub fn pointer_leave(&mut self) {
        self.state = RollInteraction::Idle;
    }
}
