//! Variables served by the bridge.

use crate::device::DevState;
use crate::pv::PvDefinition;

/// Published detector state (readback).
pub const STATE: &str = "STATE";
/// Device status string (readback).
pub const STATESTR: &str = "STATESTR";
/// Save target (readback).
pub const FILENAME: &str = "FILENAME";
/// Save target (setpoint).
pub const FILENAME_SP: &str = "FILENAME:SP";
/// X binning (readback).
pub const BINX: &str = "BINX";
/// X binning (setpoint).
pub const BINX_SP: &str = "BINX:SP";
/// Y binning (readback).
pub const BINY: &str = "BINY";
/// Y binning (setpoint).
pub const BINY_SP: &str = "BINY:SP";
/// Time channels (readback).
pub const TIMECHANS: &str = "TIMECHANS";
/// Time channels (setpoint).
pub const TIMECHANS_SP: &str = "TIMECHANS:SP";
/// Preselection (readback).
pub const PRESELECTION: &str = "PRESELECTION";
/// Preselection (setpoint).
pub const PRESELECTION_SP: &str = "PRESELECTION:SP";
/// Save trigger. Completes asynchronously.
pub const SAVEDATA_SP: &str = "SAVEDATA:SP";
/// Clear trigger.
pub const CLEAR_SP: &str = "CLEAR:SP";
/// Start trigger.
pub const START_SP: &str = "START:SP";
/// Stop trigger.
pub const STOP_SP: &str = "STOP:SP";

/// Capacity of the filename character buffers.
pub const FILENAME_LEN: usize = 512;

/// Labels of [`STATE`], in index order.
pub const STATE_LABELS: [&str; 3] = ["Idle", "Counting", "Fault"];

/// Three-valued detector state published on [`STATE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorState {
    /// Ready, not counting.
    Idle = 0,
    /// Acquiring.
    Counting = 1,
    /// Faulted, or any state the bridge does not recognise.
    Fault = 2,
}

impl DetectorState {
    /// Enum index on the wire.
    pub fn index(self) -> u16 {
        self as u16
    }

    /// Enum label on the wire.
    pub fn label(self) -> &'static str {
        STATE_LABELS[self as usize]
    }
}

impl From<DevState> for DetectorState {
    fn from(state: DevState) -> Self {
        match state {
            DevState::On => DetectorState::Idle,
            DevState::Moving => DetectorState::Counting,
            _ => DetectorState::Fault,
        }
    }
}

/// Definitions of every served variable, keyed by short name.
pub fn cascade_database() -> Vec<(&'static str, PvDefinition)> {
    vec![
        (STATE, PvDefinition::enumerated(&STATE_LABELS)),
        (STATESTR, PvDefinition::string()),
        (FILENAME, PvDefinition::char_array(FILENAME_LEN)),
        (FILENAME_SP, PvDefinition::char_array(FILENAME_LEN).writable()),
        (BINX, PvDefinition::int()),
        (BINX_SP, PvDefinition::int().writable()),
        (BINY, PvDefinition::int()),
        (BINY_SP, PvDefinition::int().writable()),
        (TIMECHANS, PvDefinition::int()),
        (TIMECHANS_SP, PvDefinition::int().writable()),
        (PRESELECTION, PvDefinition::float().with_prec(1)),
        (PRESELECTION_SP, PvDefinition::float().with_prec(1).writable()),
        (SAVEDATA_SP, PvDefinition::int().writable().asynchronous()),
        (CLEAR_SP, PvDefinition::int().writable()),
        (START_SP, PvDefinition::int().writable()),
        (STOP_SP, PvDefinition::int().writable()),
    ]
}
