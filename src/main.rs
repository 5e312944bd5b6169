#![windows_subsystem = "windows"] // comment out for debug terminal

#[cfg(windows)]
mod ui;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use volknob::config::{settings_path, Settings};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "volknob=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load_or_default(&settings_path());
    run(settings)
}

#[cfg(windows)]
fn run(settings: Settings) -> Result<()> {
    use anyhow::Context;
    use volknob::audio::wasapi::WasapiBackend;
    use volknob::serial::{SerialListener, SystemPorts};
    use volknob::{Controller, Roster};

    let backend = WasapiBackend::new().context("failed to initialise the audio backend")?;
    let roster = Roster::default();
    let listener = SerialListener::new(
        SystemPorts,
        roster.len(),
        settings.serial.baud,
        settings.serial.read_timeout(),
    );
    let controller = Controller::new(backend, roster, listener);
    tracing::info!(baud = settings.serial.baud, "starting volknob");
    ui::run(controller, &settings.serial.port)
}

#[cfg(not(windows))]
fn run(_settings: Settings) -> Result<()> {
    anyhow::bail!("volknob controls the Windows audio mixer and only runs on Windows")
}
