use std::time::Duration;

use crate::config::FieldToggles;
use crate::notifier::Frame;
use crate::telemetry::{Driver, Snapshot, format_irating, format_lap_time};

pub const ICON_IRATING: &str = "i43085";
pub const ICON_LICENSE: &str = "i43595";
pub const ICON_BEST_LAP: &str = "i43591";
pub const ICON_POSITION_GAINED: &str = "a43652";
pub const ICON_POSITION_LOST: &str = "a43653";
pub const ICON_LAPS: &str = "i43654";

/// The start-hidden bit stays set for as long as the field sits on the grid,
/// so it gets a once-per-connection guard instead of the normal flag path.
pub const FLAG_START_HIDDEN: u32 = 0x1000_0000;

/// One race-control flag: its bit in the sim's session-flag bitfield and the
/// frame it renders to.
#[derive(Debug, PartialEq, Eq)]
pub struct FlagSpec {
    pub bit: u32,
    pub name: &'static str,
    pub icon: &'static str,
    pub label: &'static str,
}

const fn flag(bit: u32, name: &'static str, icon: &'static str, label: &'static str) -> FlagSpec {
    FlagSpec {
        bit,
        name,
        icon,
        label,
    }
}

/// Scan order doubles as display order: whatever fires first in this table
/// becomes the first frame on the device.
pub static FLAG_TABLE: [FlagSpec; 21] = [
    flag(FLAG_START_HIDDEN, "start_hidden", "a43445", "Start"),
    flag(0x0000_0001, "checkered", "a43490", "Finish"),
    flag(0x0000_0002, "white", "a43444", "White"),
    flag(0x0000_0004, "green", "a43445", "Green"),
    flag(0x0000_0008, "yellow", "a43439", "Yellow"),
    flag(0x0000_0100, "yellow_waving", "a43439", "Yellow"),
    flag(0x0000_0010, "red", "a43491", "Red"),
    flag(0x0000_0020, "blue", "a43495", "Blue"),
    flag(0x0000_0040, "debris", "a43497", "Debris"),
    flag(0x0000_0080, "crossed", "a43497", "Crossed"),
    flag(0x0000_0200, "one_lap_to_green", "i43445", "1 to Green"),
    flag(0x0000_0400, "green_held", "i43445", "Green"),
    flag(0x0000_0800, "ten_to_go", "a43458", "10 to go"),
    flag(0x0000_1000, "five_to_go", "a43458", "5 to go"),
    flag(0x0000_2000, "random_waving", "a43458", "Waving"),
    flag(0x0000_4000, "caution", "i43439", "Caution"),
    flag(0x0000_8000, "caution_waving", "a43439", "Caution"),
    flag(0x0001_0000, "black", "a43499", "Black"),
    flag(0x0002_0000, "disqualify", "a43492", "DQ"),
    flag(0x0008_0000, "furled", "a43496", "Furled"),
    flag(0x0010_0000, "repair", "a43500", "Repair"),
];

/// An internally classified, renderable change.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayEvent {
    Flag(&'static FlagSpec),
    RatingChanged { irating: String, license: String },
    PositionChanged { gained: bool, position: String },
    LapsChanged { laps: String },
    BestLapChanged { time: String },
    Generic { icon: String, text: String },
}

impl DisplayEvent {
    /// Resolve to wire frames. Every kind maps to exactly one frame except
    /// the rating pair, which renders iRating and license as two.
    pub fn frames(&self) -> Vec<Frame> {
        match self {
            DisplayEvent::Flag(spec) => vec![Frame::new(spec.icon, spec.label)],
            DisplayEvent::RatingChanged { irating, license } => vec![
                Frame::new(ICON_IRATING, irating.clone()),
                Frame::new(ICON_LICENSE, license.clone()),
            ],
            DisplayEvent::PositionChanged { gained, position } => {
                let icon = if *gained {
                    ICON_POSITION_GAINED
                } else {
                    ICON_POSITION_LOST
                };
                vec![Frame::new(icon, position.clone())]
            }
            DisplayEvent::LapsChanged { laps } => vec![Frame::new(ICON_LAPS, laps.clone())],
            DisplayEvent::BestLapChanged { time } => {
                vec![Frame::new(ICON_BEST_LAP, time.clone())]
            }
            DisplayEvent::Generic { icon, text } => vec![Frame::new(icon.clone(), text.clone())],
        }
    }
}

/// The last values actually rendered, used purely for diffing.
#[derive(Clone, Debug, Default)]
pub struct SentState {
    pub position: Option<i32>,
    pub laps_completed: Option<i32>,
    pub best_lap_time: Option<Duration>,
    pub start_hidden_shown: bool,
}

impl SentState {
    pub fn reset(&mut self) {
        *self = SentState::default();
    }

    /// Record what was just rendered so the next diff starts from it.
    /// Fields the sim dropped this tick keep their previous value, only a
    /// connection reset clears them.
    pub fn absorb(&mut self, snapshot: &Snapshot) {
        if snapshot.position.is_some() {
            self.position = snapshot.position;
        }
        if snapshot.laps_completed.is_some() {
            self.laps_completed = snapshot.laps_completed;
        }
        if snapshot.best_lap_time.is_some() {
            self.best_lap_time = snapshot.best_lap_time;
        }
    }
}

/// Diff the current snapshot against the last rendered state.
///
/// Returns the ordered event list (flags first) and whether any flag other
/// than start-hidden fired. When one did, the positional checks are skipped
/// entirely, race control outranks lap chatter for the cycle.
pub fn classify(
    current: &Snapshot,
    sent: &SentState,
    toggles: &FieldToggles,
) -> (Vec<DisplayEvent>, bool) {
    let mut events = Vec::new();
    let mut flag_active = false;

    if toggles.flags {
        for spec in FLAG_TABLE.iter() {
            if current.flags & spec.bit == 0 {
                continue;
            }
            if spec.bit == FLAG_START_HIDDEN {
                if sent.start_hidden_shown {
                    continue;
                }
            } else {
                flag_active = true;
            }
            events.push(DisplayEvent::Flag(spec));
        }
    }

    if flag_active {
        return (events, true);
    }

    // Independent checks: several may fire in the same cycle and share one
    // notification.
    if toggles.best_lap
        && let Some(best) = current.best_lap_time
        && sent.best_lap_time != Some(best)
    {
        events.push(DisplayEvent::BestLapChanged {
            time: format_lap_time(best),
        });
    }

    // A position event needs a previous rank to derive the direction; the
    // first ranked snapshot after a connect is just absorbed as baseline.
    if toggles.position
        && let (Some(position), Some(prev)) = (current.position, sent.position)
        && position != prev
    {
        events.push(DisplayEvent::PositionChanged {
            gained: position < prev,
            position: current
                .position_text()
                .unwrap_or_else(|| position.to_string()),
        });
    }

    if toggles.laps
        && let Some(laps) = current.laps_completed
        && sent.laps_completed != Some(laps)
    {
        events.push(DisplayEvent::LapsChanged {
            laps: current
                .laps_text()
                .unwrap_or_else(|| laps.to_string()),
        });
    }

    (events, false)
}

/// The rating pair is not part of the per-tick diff: it is the fallback
/// display for cycles where nothing else qualifies.
pub fn rating_event(driver: &Driver) -> DisplayEvent {
    DisplayEvent::RatingChanged {
        irating: format_irating(driver.i_rating),
        license: driver.lic_string(),
    }
}
