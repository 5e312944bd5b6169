//! Master and per-application volume control.
//!
//! Nothing is cached: every call re-queries the operating system, which is fine
//! at the rate a person turns a knob.

#[cfg(windows)]
pub mod wasapi;

use crate::roster::Target;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("COM initialization failed: {0}")]
    ComInit(String),

    #[error("No default output device: {0}")]
    NoDefaultDevice(String),

    #[error("Volume control not available: {0}")]
    VolumeNotAvailable(String),

    #[error("Failed to enumerate audio sessions: {0}")]
    Enumeration(String),

    #[error("Windows API error: {0}")]
    Os(String),
}

/// Volume access for one output device.
pub trait VolumeBackend {
    /// Master volume of the default output, in percent.
    fn master_volume(&self) -> Result<u8, AudioError>;

    fn set_master_volume(&self, percent: u8) -> Result<(), AudioError>;

    /// Volume of the first session whose process name contains `name`.
    /// `Ok(None)` means no such session is running.
    fn app_volume(&self, name: &str) -> Result<Option<u8>, AudioError>;

    /// Sets every matching session. No match is not an error.
    fn set_app_volume(&self, name: &str, percent: u8) -> Result<(), AudioError>;

    fn volume(&self, target: &Target) -> Result<Option<u8>, AudioError> {
        match target {
            Target::Master => self.master_volume().map(Some),
            Target::App(name) => self.app_volume(name),
        }
    }

    fn set_volume(&self, target: &Target, percent: u8) -> Result<(), AudioError> {
        match target {
            Target::Master => self.set_master_volume(percent),
            Target::App(name) => self.set_app_volume(name, percent),
        }
    }
}

pub fn percent_from_scalar(level: f32) -> u8 {
    (level.clamp(0.0, 1.0) * 100.0).round() as u8
}

pub fn scalar_from_percent(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0
}

/// Case-insensitive substring match used for session lookup.
pub fn process_matches(process_name: &str, pattern: &str) -> bool {
    process_name.to_lowercase().contains(&pattern.to_lowercase())
}
