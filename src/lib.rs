//! volknob - a small always-on-top volume mixer for Windows that can be driven
//! by a serial volume knob.
//!
//! The window itself lives in the binary; everything here works without it.

pub mod assets;
pub mod audio;
pub mod config;
pub mod controller;
pub mod drag;
pub mod protocol;
pub mod roster;
pub mod serial;

pub use audio::{AudioError, VolumeBackend};
pub use controller::{Controller, View};
pub use protocol::{Command, ParseError};
pub use roster::{Roster, RosterEntry, Target};
pub use serial::{LinkState, SerialEvent, SerialListener};
