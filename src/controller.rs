//! What the window does, minus the widgets.
//!
//! The fltk shell forwards button presses, slider moves and serial events to
//! [`Controller`], which talks to the volume backend and the serial listener
//! and pushes results back through [`View`].

use crate::audio::VolumeBackend;
use crate::protocol::Command;
use crate::roster::Roster;
use crate::serial::{EventSink, LinkState, PortOpener, SerialEvent, SerialListener};

/// The parts of the window the controller updates.
pub trait View {
    fn append_log(&mut self, line: &str);
    /// Active target label and selector highlight.
    fn show_target(&mut self, index: usize, label: &str);
    /// Slider position and readout.
    fn show_volume(&mut self, percent: u8);
    /// Readout only, while the user drags the slider.
    fn show_readout(&mut self, percent: u8);
    fn show_link(&mut self, state: LinkState);
}

pub struct Controller<B: VolumeBackend, O: PortOpener> {
    backend: B,
    roster: Roster,
    listener: SerialListener<O>,
    selected: usize,
}

impl<B: VolumeBackend, O: PortOpener> Controller<B, O> {
    pub fn new(backend: B, roster: Roster, listener: SerialListener<O>) -> Self {
        Self { backend, roster, listener, selected: 0 }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn link_state(&self) -> LinkState {
        self.listener.state()
    }

    fn log(&self, view: &mut impl View, line: String) {
        tracing::info!(target: "volknob::log", "{line}");
        view.append_log(&line);
    }

    /// Makes `index` the active target and shows its current volume.
    pub fn select(&mut self, index: usize, view: &mut impl View) {
        let Some(entry) = self.roster.get(index) else {
            self.log(view, format!("No target at index {index}"));
            return;
        };
        let label = entry.label.clone();
        self.selected = index;
        view.show_target(index, &label);
        self.log(view, format!("Switched to: {label}"));
        self.refresh(view);
    }

    /// Re-reads the active target's volume. The slider stays put if the target
    /// cannot be read.
    pub fn refresh(&mut self, view: &mut impl View) {
        let Some(entry) = self.roster.get(self.selected) else { return };
        match self.backend.volume(&entry.target) {
            Ok(Some(percent)) => view.show_volume(percent),
            Ok(None) => {
                let line = format!("Could not fetch volume for {}", entry.label);
                self.log(view, line);
            }
            Err(e) => {
                let line = format!("Could not fetch volume for {}: {e}", entry.label);
                self.log(view, line);
            }
        }
    }

    /// Live slider update for the active target.
    pub fn slider_moved(&mut self, value: f64, view: &mut impl View) {
        let percent = value.round().clamp(0.0, 100.0) as u8;
        view.show_readout(percent);
        let Some(entry) = self.roster.get(self.selected) else { return };
        if let Err(e) = self.backend.set_volume(&entry.target, percent) {
            let line = format!("Could not set volume for {}: {e}", entry.label);
            self.log(view, line);
        }
    }

    /// Sets `index` to `percent`. The slider follows only if `index` is active.
    pub fn apply_volume(&mut self, index: usize, percent: u8, view: &mut impl View) {
        let Some(entry) = self.roster.get(index) else {
            self.log(view, format!("No target at index {index}"));
            return;
        };
        let percent = percent.min(100);
        match self.backend.set_volume(&entry.target, percent) {
            Ok(()) => {
                if index == self.selected {
                    view.show_volume(percent);
                }
            }
            Err(e) => {
                let line = format!("Could not set volume for {}: {e}", entry.label);
                self.log(view, line);
            }
        }
    }

    pub fn connect<S: EventSink>(&mut self, port: &str, sink: S, view: &mut impl View) {
        let port = port.trim();
        self.log(view, format!("Connecting to {port}..."));
        match self.listener.connect(port, sink) {
            Ok(()) => view.show_link(LinkState::Connecting),
            Err(e) => self.log(view, format!("Cannot connect: {e}")),
        }
    }

    /// Stops the reader. The `Closed` event that follows reports the result.
    pub fn disconnect(&mut self, view: &mut impl View) {
        let port = self.listener.port().map(str::to_string);
        match port {
            Some(port) if self.listener.disconnect() => {
                self.log(view, format!("Disconnecting from {port}..."));
            }
            _ => self.log(view, "Not connected".to_string()),
        }
        view.show_link(LinkState::Disconnected);
    }

    pub fn handle_serial(&mut self, event: SerialEvent, view: &mut impl View) {
        match event {
            SerialEvent::Connected { port } => {
                self.log(view, format!("Connected to {port} at {} baud", self.listener.baud()));
                view.show_link(LinkState::Reading);
            }
            SerialEvent::ConnectFailed { port, reason } => {
                self.log(view, format!("Serial error: could not open {port}: {reason}"));
                view.show_link(self.listener.state());
            }
            SerialEvent::Line(line) => self.log(view, format!("> {line}")),
            SerialEvent::Command(Command::Select { index }) => self.select(index, view),
            SerialEvent::Command(Command::SetVolume { index, percent }) => {
                self.apply_volume(index, percent, view)
            }
            SerialEvent::Command(Command::Other(_)) => {}
            SerialEvent::Rejected { line, error } => {
                self.log(view, format!("Parse error in {line:?}: {error}"))
            }
            SerialEvent::Closed { port, error } => {
                match error {
                    Some(e) => self.log(view, format!("Serial error: {e}")),
                    None => self.log(view, format!("Disconnected from {port}")),
                }
                view.show_link(self.listener.state());
            }
        }
    }
}
