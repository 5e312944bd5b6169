//! fltk window: title bar, selectors, slider, log and the port controls.

use anyhow::Result;
use std::time::Duration;

use fltk::{
    app,
    button::Button,
    enums::{Align, Color, ColorDepth, Event, Font, FrameType},
    frame::Frame,
    group::Flex,
    image::RgbImage,
    input::Input,
    prelude::*,
    text::{TextBuffer, TextDisplay},
    valuator::HorNiceSlider,
    window::Window,
};

use tray_icon::{
    menu::{Menu, MenuEvent, MenuItem},
    Icon, TrayIconBuilder,
};

use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::{SetWindowPos, HWND_TOPMOST, SWP_NOMOVE, SWP_NOSIZE};

use volknob::assets::{self, BUTTON_ICON_SIZE};
use volknob::audio::VolumeBackend;
use volknob::controller::{Controller, View};
use volknob::drag::DragTracker;
use volknob::serial::{self, EventSink, LinkState, SerialEvent, SystemPorts};

const BG_COLOR: Color = Color::from_rgb(0x2C, 0x2F, 0x33);
const BAR_COLOR: Color = Color::from_rgb(0x23, 0x27, 0x2A);
const ACCENT: Color = Color::from_rgb(0x72, 0x89, 0xDA);
const TROUGH: Color = Color::from_rgb(0x40, 0x44, 0x4B);
const TEXT_COLOR: Color = Color::White;

const WIN_W: i32 = 420;
const WIN_H: i32 = 440;

/// Everything that reaches the UI thread goes through one fltk channel.
#[derive(Debug, Clone)]
enum Message {
    Select(usize),
    SliderMoved,
    ToggleLink,
    Serial(SerialEvent),
    Quit,
}

/// Hands reader events to the fltk loop.
#[derive(Clone, Copy)]
struct UiSink(app::Sender<Message>);

impl EventSink for UiSink {
    fn emit(&self, event: SerialEvent) {
        self.0.send(Message::Serial(event));
    }
}

struct FltkView {
    selectors: Vec<Button>,
    target_label: Frame,
    slider: HorNiceSlider,
    readout: Frame,
    log: TextBuffer,
    log_view: TextDisplay,
    port_input: Input,
    link_button: Button,
}

impl View for FltkView {
    fn append_log(&mut self, line: &str) {
        self.log.append(line);
        self.log.append("\n");
        self.log_view.set_insert_position(self.log.length());
        self.log_view.show_insert_position();
    }

    fn show_target(&mut self, index: usize, label: &str) {
        self.target_label.set_label(label);
        for (i, btn) in self.selectors.iter_mut().enumerate() {
            btn.set_color(if i == index { ACCENT } else { BG_COLOR });
            btn.redraw();
        }
        self.target_label.redraw();
    }

    fn show_volume(&mut self, percent: u8) {
        self.slider.set_value(f64::from(percent));
        self.show_readout(percent);
    }

    fn show_readout(&mut self, percent: u8) {
        self.readout.set_label(&format!("{percent}%"));
        self.readout.redraw();
    }

    fn show_link(&mut self, state: LinkState) {
        let label = match state {
            LinkState::Disconnected => "Connect",
            LinkState::Connecting => "Connecting...",
            LinkState::Reading => "Disconnect",
        };
        self.link_button.set_label(label);
        if state == LinkState::Disconnected {
            self.port_input.activate();
        } else {
            self.port_input.deactivate();
        }
    }
}

fn style_widget<W: WidgetExt>(w: &mut W) {
    w.set_color(BG_COLOR);
    w.set_label_color(TEXT_COLOR);
    w.set_frame(FrameType::FlatBox);
}

fn selector_image(name: &str) -> Option<RgbImage> {
    match assets::load_named(name, Some(BUTTON_ICON_SIZE)) {
        Ok(icon) => rgb_image(&icon),
        Err(e) => {
            tracing::warn!(icon = name, error = %e, "using text label");
            None
        }
    }
}

fn rgb_image(icon: &assets::Icon) -> Option<RgbImage> {
    let (w, h) = (icon.width as i32, icon.height as i32);
    RgbImage::new(&icon.rgba, w, h, ColorDepth::Rgba8).ok()
}

fn load_tray_icon() -> Result<Icon> {
    let icon = assets::load_named("volknob.ico", None).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "no tray icon file");
        assets::solid_icon(32, [0x72, 0x89, 0xDA, 0xFF])
    });
    Ok(Icon::from_rgba(icon.rgba, icon.width, icon.height)?)
}

fn keep_on_top(win: &Window) {
    let hwnd = HWND(win.raw_handle() as _);
    let flags = SWP_NOMOVE | SWP_NOSIZE;
    if let Err(e) = unsafe { SetWindowPos(hwnd, Some(HWND_TOPMOST), 0, 0, 0, 0, flags) } {
        tracing::warn!(error = %e, "could not keep window on top");
    }
}

fn build_title_bar(win: &Window, sender: app::Sender<Message>) -> Flex {
    let mut bar = Flex::default().row();
    bar.set_color(BAR_COLOR);
    bar.set_frame(FrameType::FlatBox);
    bar.set_margins(10, 0, 4, 0);

    let mut title = Frame::default()
        .with_label("Volume Controller")
        .with_align(Align::Left | Align::Inside);
    title.set_label_color(TEXT_COLOR);
    let mut btn_close = Button::default().with_label("X");
    style_widget(&mut btn_close);
    btn_close.set_color(BAR_COLOR);
    btn_close.clear_visible_focus();
    btn_close.emit(sender, Message::Quit);
    bar.end();
    bar.fixed(&btn_close, 30);

    let mut win = win.clone();
    let mut drag = DragTracker::default();
    title.handle(move |_, ev| match ev {
        Event::Push => {
            drag.press((win.x(), win.y()), (app::event_x_root(), app::event_y_root()));
            true
        }
        Event::Drag => {
            if let Some((x, y)) = drag.motion((app::event_x_root(), app::event_y_root())) {
                win.set_pos(x, y);
            }
            true
        }
        Event::Released if drag.is_dragging() => {
            drag.release();
            true
        }
        _ => false,
    });
    bar
}

pub fn run<B: VolumeBackend>(
    mut ctl: Controller<B, SystemPorts>,
    initial_port: &str,
) -> Result<()> {
    let app = app::App::default();
    let (bg_r, bg_g, bg_b) = BG_COLOR.to_rgb();
    app::set_background_color(bg_r, bg_g, bg_b);
    let (fg_r, fg_g, fg_b) = TEXT_COLOR.to_rgb();
    app::set_foreground_color(fg_r, fg_g, fg_b);
    app::set_font_size(14);
    let (sender, receiver) = app::channel::<Message>();

    let open_item = MenuItem::new("Show", true, None);
    let quit_item = MenuItem::new("Quit", true, None);
    let open_id = open_item.id().clone();
    let quit_id = quit_item.id().clone();
    let tray_menu = Menu::new();
    tray_menu.append(&open_item)?;
    tray_menu.append(&quit_item)?;
    let _tray_icon = TrayIconBuilder::new()
        .with_menu(Box::new(tray_menu))
        .with_tooltip("volknob")
        .with_icon(load_tray_icon()?)
        .build()?;

    let mut win = Window::default().with_size(WIN_W, WIN_H).center_screen().with_label("volknob");
    win.set_border(false);
    win.set_color(BG_COLOR);
    win.emit(sender, Message::Quit);

    let mut col = Flex::default().column().with_size(WIN_W, WIN_H);
    col.set_pad(8);

    let title_bar = build_title_bar(&win, sender);

    let mut row_selectors = Flex::default().row();
    row_selectors.set_pad(30);
    Frame::default();
    let mut selectors = Vec::new();
    for (index, entry) in ctl.roster().iter().enumerate() {
        let mut btn = Button::default();
        style_widget(&mut btn);
        btn.set_down_frame(FrameType::FlatBox);
        btn.clear_visible_focus();
        match entry.icon.as_deref().and_then(selector_image) {
            Some(img) => btn.set_image(Some(img)),
            None => {
                btn.set_label(&entry.label);
                btn.set_label_font(Font::HelveticaBold);
            }
        }
        btn.emit(sender, Message::Select(index));
        row_selectors.fixed(&btn, BUTTON_ICON_SIZE as i32 + 6);
        selectors.push(btn);
    }
    Frame::default();
    row_selectors.end();

    let mut target_label = Frame::default();
    target_label.set_label_size(16);
    target_label.set_label_font(Font::HelveticaBold);
    target_label.set_label_color(TEXT_COLOR);

    let mut row_slider = Flex::default().row();
    row_slider.set_margins(20, 0, 20, 0);
    let mut slider = HorNiceSlider::default();
    slider.set_range(0.0, 100.0);
    slider.set_step(1.0, 1);
    slider.set_color(TROUGH);
    slider.set_selection_color(ACCENT);
    slider.set_frame(FrameType::FlatBox);
    slider.emit(sender, Message::SliderMoved);
    row_slider.end();

    let mut readout = Frame::default().with_label("--%");
    readout.set_label_size(20);
    readout.set_label_color(TEXT_COLOR);

    let mut row_log = Flex::default().row();
    row_log.set_margins(20, 0, 20, 0);
    let log = TextBuffer::default();
    let mut log_view = TextDisplay::default();
    log_view.set_buffer(log.clone());
    log_view.set_color(BAR_COLOR);
    log_view.set_frame(FrameType::FlatBox);
    log_view.set_text_color(TEXT_COLOR);
    log_view.set_text_font(Font::Courier);
    log_view.set_text_size(12);
    row_log.end();

    let mut row_port = Flex::default().row();
    row_port.set_margins(60, 0, 60, 0);
    row_port.set_pad(10);
    let lbl_port = Frame::default().with_label("COM Port:");
    let mut port_input = Input::default();
    port_input.set_value(initial_port);
    let mut link_button = Button::default().with_label("Connect");
    style_widget(&mut link_button);
    link_button.set_color(ACCENT);
    link_button.clear_visible_focus();
    link_button.emit(sender, Message::ToggleLink);
    row_port.end();
    row_port.fixed(&lbl_port, 80);
    row_port.fixed(&link_button, 110);

    col.end();
    col.fixed(&title_bar, 30);
    col.fixed(&row_selectors, BUTTON_ICON_SIZE as i32 + 6);
    col.fixed(&target_label, 30);
    col.fixed(&row_slider, 24);
    col.fixed(&readout, 40);
    col.fixed(&row_port, 28);
    win.end();
    win.show();
    keep_on_top(&win);

    if let Ok(icon) = assets::load_named("volknob.ico", None) {
        if let Some(img) = rgb_image(&icon) {
            win.set_icon(Some(img));
        }
    }

    let mut view = FltkView {
        selectors,
        target_label,
        slider,
        readout,
        log,
        log_view,
        port_input,
        link_button,
    };
    let ports = serial::available_ports();
    if !ports.is_empty() {
        view.append_log(&format!("Available ports: {}", ports.join(", ")));
    }
    ctl.select(0, &mut view);

    let mut running = true;
    while running {
        app::check();
        while let Some(msg) = receiver.recv() {
            match msg {
                Message::Select(index) => ctl.select(index, &mut view),
                Message::SliderMoved => {
                    let value = view.slider.value();
                    ctl.slider_moved(value, &mut view);
                }
                Message::ToggleLink => {
                    if ctl.link_state() == LinkState::Disconnected {
                        let port = view.port_input.value();
                        ctl.connect(&port, UiSink(sender), &mut view);
                    } else {
                        ctl.disconnect(&mut view);
                    }
                }
                Message::Serial(event) => ctl.handle_serial(event, &mut view),
                Message::Quit => running = false,
            }
        }
        if let Ok(event) = MenuEvent::receiver().try_recv() {
            if event.id == open_id {
                win.show();
                keep_on_top(&win);
            } else if event.id == quit_id {
                running = false;
            }
        }
        std::thread::sleep(Duration::from_millis(16));
    }

    // stops the reader and closes the port before the window goes away
    drop(ctl);
    win.hide();
    app.quit();
    Ok(())
}
