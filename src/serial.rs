//! Background reader for the knob's serial link.
//!
//! One thread owns the port. It opens it, reads newline-terminated lines and
//! forwards what it sees through an [`EventSink`], in the order received. The
//! thread stops on the first I/O or decode error, on EOF, or when
//! [`SerialListener::disconnect`] raises the cancel flag. There is no automatic
//! reconnect.

use crate::protocol::{self, Command, ParseError};
use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Reading,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LinkState::Connecting,
            2 => LinkState::Reading,
            _ => LinkState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LinkState::Disconnected => 0,
            LinkState::Connecting => 1,
            LinkState::Reading => 2,
        }
    }
}

/// Everything the reader thread reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    Connected { port: String },
    ConnectFailed { port: String, reason: String },
    /// A non-blank line, trimmed.
    Line(String),
    Command(Command),
    Rejected { line: String, error: ParseError },
    /// The reader has stopped. `error` is `None` after a requested disconnect.
    Closed { port: String, error: Option<String> },
}

/// Delivers reader events to whoever owns the UI state.
pub trait EventSink: Send + 'static {
    fn emit(&self, event: SerialEvent);
}

impl EventSink for mpsc::Sender<SerialEvent> {
    fn emit(&self, event: SerialEvent) {
        // receiver gone means the window is closing
        let _ = self.send(event);
    }
}

/// Opens a port by name.
pub trait PortOpener: Send + Sync + 'static {
    type Port: Read + Send + 'static;

    fn open(&self, port: &str, baud: u32, timeout: Duration) -> io::Result<Self::Port>;
}

/// Real serial ports through `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortOpener for SystemPorts {
    type Port = Box<dyn serialport::SerialPort>;

    fn open(&self, port: &str, baud: u32, timeout: Duration) -> io::Result<Self::Port> {
        Ok(serialport::new(port, baud).timeout(timeout).open()?)
    }
}

/// Names of the serial ports currently present, for the connect hint.
pub fn available_ports() -> Vec<String> {
    serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.port_name)
        .collect()
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("already connected to {0}")]
    AlreadyConnected(String),

    #[error("no port name given")]
    EmptyPortName,

    #[error("failed to start serial reader: {0}")]
    Spawn(#[source] io::Error),
}

struct Worker {
    port: String,
    state: Arc<AtomicU8>,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Raises the cancel flag. A reading thread notices it within one read
    /// timeout and is joined; a thread still inside `open()` is left to a
    /// reaper, since opening has no deadline.
    fn stop(self) {
        self.cancel.store(true, Ordering::SeqCst);
        if self.state() != LinkState::Connecting {
            join_reader(&self.port, self.handle);
            return;
        }

        tracing::debug!(port = %self.port, "serial port still opening, not waiting for it");
        let Worker { port, handle, .. } = self;
        let reaper = thread::Builder::new()
            .name("serial-reaper".into())
            .spawn(move || join_reader(&port, handle));
        if let Err(e) = reaper {
            // the reader is detached and still exits once open() returns
            tracing::warn!(error = %e, "failed to start serial reaper");
        }
    }
}

fn join_reader(port: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!(port, "serial reader panicked");
    }
}

pub struct SerialListener<O: PortOpener = SystemPorts> {
    opener: Arc<O>,
    roster_len: usize,
    baud: u32,
    timeout: Duration,
    worker: Option<Worker>,
}

impl<O: PortOpener> SerialListener<O> {
    pub fn new(opener: O, roster_len: usize, baud: u32, timeout: Duration) -> Self {
        Self { opener: Arc::new(opener), roster_len, baud, timeout, worker: None }
    }

    pub fn state(&self) -> LinkState {
        self.worker.as_ref().map_or(LinkState::Disconnected, Worker::state)
    }

    /// Port of the current reader, until `disconnect`.
    pub fn port(&self) -> Option<&str> {
        self.worker.as_ref().map(|w| w.port.as_str())
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Starts a reader on `port`. The port is opened on the reader thread;
    /// success or failure arrives as `Connected` / `ConnectFailed`.
    pub fn connect<S: EventSink>(&mut self, port: &str, sink: S) -> Result<(), ListenerError> {
        let port = port.trim();
        if port.is_empty() {
            return Err(ListenerError::EmptyPortName);
        }
        if let Some(worker) = &self.worker {
            if worker.state() != LinkState::Disconnected {
                return Err(ListenerError::AlreadyConnected(worker.port.clone()));
            }
        }
        // previous reader already finished on its own
        if let Some(old) = self.worker.take() {
            old.stop();
        }

        let state = Arc::new(AtomicU8::new(LinkState::Connecting.as_u8()));
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = {
            let opener = Arc::clone(&self.opener);
            let state = Arc::clone(&state);
            let cancel = Arc::clone(&cancel);
            let port = port.to_string();
            let (baud, timeout, roster_len) = (self.baud, self.timeout, self.roster_len);
            thread::Builder::new()
                .name("serial-reader".into())
                .spawn(move || {
                    run_reader(&*opener, &port, baud, timeout, roster_len, &state, &cancel, &sink)
                })
                .map_err(ListenerError::Spawn)?
        };

        tracing::info!(port, baud = self.baud, "serial reader started");
        self.worker = Some(Worker { port: port.to_string(), state, cancel, handle });
        Ok(())
    }

    /// Stops the reader and closes the port. Returns false if nothing was running.
    ///
    /// Never waits on a port that is still opening. The listener is
    /// `Disconnected` on return either way, and the old reader still sends its
    /// `Closed` once it is done.
    pub fn disconnect(&mut self) -> bool {
        match self.worker.take() {
            Some(worker) => {
                let was_running = worker.state() != LinkState::Disconnected;
                worker.stop();
                was_running
            }
            None => false,
        }
    }
}

impl<O: PortOpener> Drop for SerialListener<O> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_reader<O: PortOpener, S: EventSink>(
    opener: &O,
    port: &str,
    baud: u32,
    timeout: Duration,
    roster_len: usize,
    state: &AtomicU8,
    cancel: &AtomicBool,
    sink: &S,
) {
    let opened = opener.open(port, baud, timeout);
    if cancel.load(Ordering::SeqCst) {
        // disconnected while opening: close whatever we got without reading
        drop(opened);
        tracing::info!(port, "serial connect cancelled");
        state.store(LinkState::Disconnected.as_u8(), Ordering::SeqCst);
        sink.emit(SerialEvent::Closed { port: port.to_string(), error: None });
        return;
    }
    let handle = match opened {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(port, error = %e, "failed to open serial port");
            state.store(LinkState::Disconnected.as_u8(), Ordering::SeqCst);
            sink.emit(SerialEvent::ConnectFailed {
                port: port.to_string(),
                reason: e.to_string(),
            });
            return;
        }
    };

    state.store(LinkState::Reading.as_u8(), Ordering::SeqCst);
    sink.emit(SerialEvent::Connected { port: port.to_string() });

    // the port is dropped (closed) when read_lines returns
    let error = read_lines(BufReader::new(handle), roster_len, cancel, sink);
    match &error {
        Some(e) => tracing::warn!(port, error = %e, "serial reader stopped"),
        None => tracing::info!(port, "serial reader cancelled"),
    }

    state.store(LinkState::Disconnected.as_u8(), Ordering::SeqCst);
    sink.emit(SerialEvent::Closed { port: port.to_string(), error });
}

/// Reads lines until cancelled (`None`) or until the link fails (`Some(reason)`).
pub fn read_lines<R: BufRead, S: EventSink>(
    mut reader: R,
    roster_len: usize,
    cancel: &AtomicBool,
    sink: &S,
) -> Option<String> {
    let mut buf = Vec::new();
    loop {
        if cancel.load(Ordering::SeqCst) {
            return None;
        }
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return Some("port closed".to_string()),
            Ok(_) => {
                let line = match String::from_utf8(std::mem::take(&mut buf)) {
                    Ok(line) => line,
                    Err(e) => return Some(format!("could not decode line: {e}")),
                };
                dispatch_line(&line, roster_len, sink);
            }
            // partial bytes stay in `buf` until the newline arrives
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => continue,
            Err(e) => return Some(e.to_string()),
        }
    }
}

fn dispatch_line<S: EventSink>(line: &str, roster_len: usize, sink: &S) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    tracing::debug!(line, "received");
    sink.emit(SerialEvent::Line(line.to_string()));

    match protocol::parse_line(line, roster_len) {
        Ok(Some(Command::Other(_))) | Ok(None) => {}
        Ok(Some(command)) => sink.emit(SerialEvent::Command(command)),
        Err(error) => {
            tracing::warn!(line, %error, "rejected serial command");
            sink.emit(SerialEvent::Rejected { line: line.to_string(), error });
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    fn listener(opens: Vec<io::Result<ScriptedPort>>) -> SerialListener<FakePorts> {
        SerialListener::new(FakePorts::new(opens), 3, 9600, Duration::from_millis(10))
    }

    /// Collects events up to and including the first `Closed` / `ConnectFailed`.
    fn until_closed(rx: &mpsc::Receiver<SerialEvent>) -> Vec<SerialEvent> {
        let mut events = Vec::new();
        loop {
            let event = rx.recv_timeout(WAIT).expect("reader went quiet");
            let done =
                matches!(event, SerialEvent::Closed { .. } | SerialEvent::ConnectFailed { .. });
            events.push(event);
            if done {
                return events;
            }
        }
    }

    fn broken_pipe() -> io::Error {
        io::Error::new(ErrorKind::BrokenPipe, "device unplugged")
    }

    #[test]
    fn test_events_arrive_in_order() {
        let mut port =
            ScriptedPort::lines(&["APP:2", "", "VOLUME:abc:10", "APP:99", "hello", "VOLUME:1:37"]);
        port.reads.push_back(Err(broken_pipe()));
        let mut listener = listener(vec![Ok(port)]);
        let (tx, rx) = mpsc::channel();
        listener.connect("COM7", tx).unwrap();

        let events = until_closed(&rx);
        assert_eq!(
            events,
            vec![
                SerialEvent::Connected { port: "COM7".into() },
                SerialEvent::Line("APP:2".into()),
                SerialEvent::Command(Command::Select { index: 2 }),
                SerialEvent::Line("VOLUME:abc:10".into()),
                SerialEvent::Rejected {
                    line: "VOLUME:abc:10".into(),
                    error: ParseError::NotInteger { field: "index", text: "abc".into() },
                },
                SerialEvent::Line("APP:99".into()),
                SerialEvent::Rejected {
                    line: "APP:99".into(),
                    error: ParseError::IndexOutOfRange { index: 99, len: 3 },
                },
                SerialEvent::Line("hello".into()),
                SerialEvent::Line("VOLUME:1:37".into()),
                SerialEvent::Command(Command::SetVolume { index: 1, percent: 37 }),
                SerialEvent::Closed { port: "COM7".into(), error: Some("device unplugged".into()) },
            ]
        );
        assert_eq!(listener.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_reconnect_after_io_error() {
        let first = ScriptedPort::new(vec![Ok(b"APP:1\n".to_vec()), Err(broken_pipe())]);
        let second = ScriptedPort::lines(&["APP:0"]);
        let mut listener = listener(vec![Ok(first), Ok(second)]);

        let (tx, rx) = mpsc::channel();
        listener.connect("COM7", tx.clone()).unwrap();
        let events = until_closed(&rx);
        let errors = events
            .iter()
            .filter(|e| matches!(e, SerialEvent::Closed { error: Some(_), .. }))
            .count();
        assert_eq!(errors, 1);
        assert_eq!(listener.state(), LinkState::Disconnected);

        listener.connect("COM7", tx).unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), SerialEvent::Connected { port: "COM7".into() });
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), SerialEvent::Line("APP:0".into()));
        let select = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(select, SerialEvent::Command(Command::Select { index: 0 }));
        assert!(listener.disconnect());
    }

    #[test]
    fn test_second_connect_is_rejected() {
        let mut listener = listener(vec![Ok(ScriptedPort::lines(&[]))]);
        let (tx, rx) = mpsc::channel();
        listener.connect("COM7", tx.clone()).unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), SerialEvent::Connected { port: "COM7".into() });

        let err = listener.connect("COM8", tx).unwrap_err();
        assert!(matches!(err, ListenerError::AlreadyConnected(ref p) if p == "COM7"));
        assert_eq!(listener.state(), LinkState::Reading);

        assert!(listener.disconnect());
        assert_eq!(listener.state(), LinkState::Disconnected);
        let closed = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(closed, SerialEvent::Closed { port: "COM7".into(), error: None });
        assert!(!listener.disconnect());
    }

    #[test]
    fn test_open_failure_reports_and_stays_disconnected() {
        let busy = io::Error::new(ErrorKind::PermissionDenied, "port busy");
        let mut listener = listener(vec![Err(busy)]);
        let (tx, rx) = mpsc::channel();
        listener.connect("COM3", tx).unwrap();
        let events = until_closed(&rx);
        assert_eq!(
            events,
            vec![SerialEvent::ConnectFailed { port: "COM3".into(), reason: "port busy".into() }]
        );
        assert_eq!(listener.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_blank_port_name_is_rejected() {
        let mut listener = listener(vec![]);
        let (tx, _rx) = mpsc::channel();
        assert!(matches!(listener.connect("  ", tx), Err(ListenerError::EmptyPortName)));
        assert_eq!(listener.state(), LinkState::Disconnected);
    }

    /// An opener that takes as long as a sluggish Bluetooth COM port.
    struct SlowPorts {
        delay: Duration,
    }

    impl PortOpener for SlowPorts {
        type Port = ScriptedPort;

        fn open(&self, _port: &str, _baud: u32, _timeout: Duration) -> io::Result<ScriptedPort> {
            thread::sleep(self.delay);
            Ok(ScriptedPort::lines(&["APP:1"]))
        }
    }

    #[test]
    fn test_disconnect_does_not_wait_for_slow_open() {
        let slow = SlowPorts { delay: Duration::from_millis(1500) };
        let mut listener = SerialListener::new(slow, 3, 9600, Duration::from_millis(10));
        let (tx, rx) = mpsc::channel();
        listener.connect("COM7", tx).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(listener.state(), LinkState::Connecting);

        let started = Instant::now();
        assert!(listener.disconnect());
        assert!(started.elapsed() < Duration::from_millis(500), "took {:?}", started.elapsed());
        assert_eq!(listener.state(), LinkState::Disconnected);

        // the late port is closed unread: no Connected, no lines
        let closed = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(closed, SerialEvent::Closed { port: "COM7".into(), error: None });
        assert!(rx.recv_timeout(WAIT).is_err());
    }

    #[test]
    fn test_drop_while_opening_returns_promptly() {
        let slow = SlowPorts { delay: Duration::from_millis(1500) };
        let mut listener = SerialListener::new(slow, 3, 9600, Duration::from_millis(10));
        let (tx, _rx) = mpsc::channel();
        listener.connect("COM7", tx).unwrap();

        let started = Instant::now();
        drop(listener);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_partial_line_survives_timeout() {
        let port = ScriptedPort::new(vec![
            Ok(b"VOLU".to_vec()),
            Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
            Ok(b"ME:2:5\n".to_vec()),
            Err(broken_pipe()),
        ]);
        let (tx, rx) = mpsc::channel();
        let cancel = AtomicBool::new(false);
        let error = read_lines(BufReader::new(port), 3, &cancel, &tx);
        assert_eq!(error.as_deref(), Some("device unplugged"));
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                SerialEvent::Line("VOLUME:2:5".into()),
                SerialEvent::Command(Command::SetVolume { index: 2, percent: 5 }),
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_stops_reader() {
        let port = ScriptedPort::new(vec![Ok(vec![0xff, 0xfe, b'\n']), Ok(b"APP:1\n".to_vec())]);
        let (tx, rx) = mpsc::channel();
        let cancel = AtomicBool::new(false);
        let error = read_lines(BufReader::new(port), 3, &cancel, &tx);
        assert!(error.unwrap().starts_with("could not decode line"));
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_eof_ends_with_unterminated_line() {
        let (tx, rx) = mpsc::channel();
        let cancel = AtomicBool::new(false);
        let error = read_lines(io::Cursor::new(b"APP:1".to_vec()), 3, &cancel, &tx);
        assert_eq!(error.as_deref(), Some("port closed"));
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.last(), Some(&SerialEvent::Command(Command::Select { index: 1 })));
    }
}
