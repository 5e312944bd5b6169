//! The fixed list of volume targets shown in the window.

/// What a roster entry controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Master volume of the default playback device.
    Master,
    /// Every audio session whose process name contains this text (case-insensitive).
    App(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub label: String,
    pub target: Target,
    /// Icon file name, resolved by `assets::find_asset`.
    pub icon: Option<String>,
}

impl RosterEntry {
    pub fn master(label: &str, icon: Option<&str>) -> Self {
        Self { label: label.to_string(), target: Target::Master, icon: icon.map(str::to_string) }
    }

    /// An application entry; the label doubles as the process-name pattern.
    pub fn app(label: &str, icon: Option<&str>) -> Self {
        Self {
            label: label.to_string(),
            target: Target::App(label.to_string()),
            icon: icon.map(str::to_string),
        }
    }
}

/// Ordered, immutable list of targets. Index 0 is always the master volume.
#[derive(Debug, Clone)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn get(&self, index: usize) -> Option<&RosterEntry> {
        self.entries.get(index)
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.iter()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            entries: vec![
                RosterEntry::master("System", Some("system.png")),
                RosterEntry::app("Spotify", Some("spotify.png")),
                RosterEntry::app("VLC", Some("vlc.png")),
            ],
        }
    }
}
