//! Datagram client for the privileged virtual HID daemon
//!
//! Sends are fire-and-forget. A reader thread drains response datagrams and
//! only updates cached driver flags; a version mismatch is additionally
//! reported to the backend selector so the next dispatch uses software.

use super::protocol::{
    decode_response, encode_request, KeyboardParameters, RequestType, Response, ResponseType,
};
use super::report::{KeyboardReport, KEYBOARD_REPORT_LEN, KEY_SLOTS};
use crate::error::{DaemonError, DispatchError};
use crate::keyboard::{KeyCode, ModifierFlags};
use crate::output::{hid, BackendKind, BackendSelector, KeyBackend};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Reader sleep when no response is queued
const READ_IDLE: Duration = Duration::from_millis(10);

static CLIENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Where the daemon lives and what the virtual keyboard looks like
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonSettings {
    pub server_dir: PathBuf,
    pub client_dir: PathBuf,
    pub server_suffix: String,
    pub keyboard: KeyboardParameters,
    /// How long a health check waits for `keyboard_ready`
    pub ready_timeout: Duration,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            server_dir: PathBuf::from("/var/run/touchpad-keyboard/vhid/server"),
            client_dir: PathBuf::from("/var/run/touchpad-keyboard/vhid/client"),
            server_suffix: ".sock".to_string(),
            keyboard: KeyboardParameters::default(),
            ready_timeout: Duration::from_secs(1),
        }
    }
}

/// Newest server socket: the lexicographically last name with `suffix`
pub fn find_server_socket(dir: &Path, suffix: &str) -> Result<PathBuf, DaemonError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            return Err(DaemonError::PermissionDenied(format!(
                "{}: {}",
                dir.display(),
                err
            )))
        }
        Err(_) => return Err(DaemonError::MissingServerDirectory(dir.to_path_buf())),
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(suffix))
        })
        .max_by_key(|entry| entry.file_name())
        .map(|entry| entry.path())
        .ok_or_else(|| DaemonError::NoServerSocket(dir.to_path_buf()))
}

/// Unique per process and per call
fn client_socket_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = CLIENT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{:x}{:x}{:x}.sock", std::process::id(), nanos, seq)
}

fn socket_error(path: &Path, source: io::Error) -> DaemonError {
    if source.kind() == io::ErrorKind::PermissionDenied {
        DaemonError::PermissionDenied(format!("{}: {}", path.display(), source))
    } else {
        DaemonError::Bind {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Cached driver flags from response datagrams
#[derive(Debug, Default)]
struct DriverState {
    driver_activated: AtomicBool,
    driver_connected: AtomicBool,
    driver_version_mismatched: AtomicBool,
    keyboard_ready: AtomicBool,
    pointing_ready: AtomicBool,
}

/// Snapshot of the daemon's last reported state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DriverStatus {
    pub driver_activated: bool,
    pub driver_connected: bool,
    pub driver_version_mismatched: bool,
    pub keyboard_ready: bool,
    pub pointing_ready: bool,
}

impl DriverState {
    fn apply(&self, response: Response, selector: Option<&BackendSelector>) {
        let flag = match response.kind {
            ResponseType::None => return,
            ResponseType::DriverActivated => &self.driver_activated,
            ResponseType::DriverConnected => &self.driver_connected,
            ResponseType::DriverVersionMismatched => &self.driver_version_mismatched,
            ResponseType::KeyboardReady => &self.keyboard_ready,
            ResponseType::PointingReady => &self.pointing_ready,
        };
        let previous = flag.swap(response.value, Ordering::AcqRel);
        if previous != response.value {
            log::debug!("daemon {:?} = {}", response.kind, response.value);
        }

        if response.kind == ResponseType::DriverVersionMismatched && response.value {
            if let Some(selector) = selector {
                selector.report_failure(
                    BackendKind::Privileged,
                    &DispatchError::ProtocolVersionMismatch,
                );
            }
        }
    }

    fn snapshot(&self) -> DriverStatus {
        DriverStatus {
            driver_activated: self.driver_activated.load(Ordering::Acquire),
            driver_connected: self.driver_connected.load(Ordering::Acquire),
            driver_version_mismatched: self.driver_version_mismatched.load(Ordering::Acquire),
            keyboard_ready: self.keyboard_ready.load(Ordering::Acquire),
            pointing_ready: self.pointing_ready.load(Ordering::Acquire),
        }
    }
}

/// Report buffer and datagram scratch, reused for every key transition
struct ReportState {
    report: KeyboardReport,
    /// Bits of modifier keys currently held
    held: u8,
    /// Flag bits carried by the key in each slot
    slot_flags: [u8; KEY_SLOTS],
    wire: [u8; KEYBOARD_REPORT_LEN],
    datagram: Vec<u8>,
}

impl ReportState {
    fn new() -> Self {
        Self {
            report: KeyboardReport::new(),
            held: 0,
            slot_flags: [0; KEY_SLOTS],
            wire: [0; KEYBOARD_REPORT_LEN],
            datagram: Vec::with_capacity(64 + KEYBOARD_REPORT_LEN),
        }
    }

    /// Apply one key transition. Returns false if the report had no room.
    fn update(&mut self, usage: u16, flags: ModifierFlags, down: bool) -> bool {
        if let Some(bit) = hid::modifier_bit(usage) {
            if down {
                self.held |= bit;
            } else {
                self.held &= !bit;
            }
        } else if down {
            match self.report.insert_key(usage) {
                Some(index) => self.slot_flags[index] = hid::flags_to_bitmask(flags),
                None => return false,
            }
        } else {
            self.report.remove_key(usage);
        }

        let mut transient = 0;
        for (key, flags) in self.report.keys.iter().zip(self.slot_flags.iter_mut()) {
            if *key == 0 {
                *flags = 0;
            } else {
                transient |= *flags;
            }
        }
        self.report.modifiers = self.held | transient;
        true
    }

    fn clear(&mut self) {
        self.report.clear();
        self.held = 0;
        self.slot_flags = [0; KEY_SLOTS];
    }

    fn encode_report(&mut self) -> &[u8] {
        self.report.write_to(&mut self.wire);
        encode_request(
            &mut self.datagram,
            RequestType::PostKeyboardReport,
            &self.wire,
        );
        &self.datagram
    }
}

/// Connection to the virtual HID daemon
pub struct DaemonProtocolClient {
    socket: UnixDatagram,
    client_path: PathBuf,
    server_path: PathBuf,
    keyboard: KeyboardParameters,
    initialized: AtomicBool,
    driver: Arc<DriverState>,
    report: Mutex<ReportState>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl DaemonProtocolClient {
    /// Locate the server, bind a fresh client socket and start reading responses
    pub fn connect(
        settings: &DaemonSettings,
        selector: Option<Arc<BackendSelector>>,
    ) -> Result<Self, DaemonError> {
        let server_path = find_server_socket(&settings.server_dir, &settings.server_suffix)?;

        fs::create_dir_all(&settings.client_dir)
            .map_err(|source| socket_error(&settings.client_dir, source))?;
        let client_path = settings.client_dir.join(client_socket_name());
        let socket =
            UnixDatagram::bind(&client_path).map_err(|source| socket_error(&client_path, source))?;

        // Both halves are nonblocking; a full daemon queue fails the send
        let reader_socket = socket
            .set_nonblocking(true)
            .and_then(|()| socket.try_clone())
            .map_err(|source| socket_error(&client_path, source))?;

        let driver = Arc::new(DriverState::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let reader = {
            let driver = Arc::clone(&driver);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("vhid-responses".into())
                .spawn(move || read_responses(reader_socket, driver, selector, shutdown))
                .map_err(|source| socket_error(&client_path, source))?
        };

        log::info!(
            "daemon client {} -> {}",
            client_path.display(),
            server_path.display()
        );

        Ok(Self {
            socket,
            client_path,
            server_path,
            keyboard: settings.keyboard,
            initialized: AtomicBool::new(false),
            driver,
            report: Mutex::new(ReportState::new()),
            shutdown,
            reader: Some(reader),
        })
    }

    pub fn server_path(&self) -> &Path {
        &self.server_path
    }

    pub fn client_path(&self) -> &Path {
        &self.client_path
    }

    fn send(&self, datagram: &[u8]) -> Result<(), DispatchError> {
        self.socket
            .send_to(datagram, &self.server_path)
            .map(|_| ())
            .map_err(DispatchError::from_send)
    }

    fn send_request(&self, kind: RequestType, payload: &[u8]) -> Result<(), DispatchError> {
        let mut state = self.report.lock();
        encode_request(&mut state.datagram, kind, payload);
        self.send(&state.datagram)
    }

    /// Ask the daemon to create the virtual keyboard
    pub fn initialize(&self) -> Result<(), DispatchError> {
        self.send_request(RequestType::KeyboardInitialize, &self.keyboard.encode())?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), DispatchError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            self.initialize()
        }
    }

    /// Release every key on the virtual keyboard
    pub fn reset(&self) -> Result<(), DispatchError> {
        let mut state = self.report.lock();
        state.clear();
        encode_request(&mut state.datagram, RequestType::KeyboardReset, &[]);
        self.send(&state.datagram)
    }

    pub fn driver_status(&self) -> DriverStatus {
        self.driver.snapshot()
    }

    /// Poll the cached flags until the keyboard is ready.
    ///
    /// Only used by health checks, never on the dispatch path.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.driver.snapshot();
            if status.driver_version_mismatched {
                return false;
            }
            if status.keyboard_ready {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Modifier byte and pressed usages of the current report
    pub fn report_snapshot(&self) -> KeyboardReport {
        self.report.lock().report.clone()
    }
}

impl KeyBackend for DaemonProtocolClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Privileged
    }

    fn post_key(
        &self,
        code: KeyCode,
        flags: ModifierFlags,
        down: bool,
    ) -> Result<(), DispatchError> {
        if self.driver.driver_version_mismatched.load(Ordering::Acquire) {
            return Err(DispatchError::ProtocolVersionMismatch);
        }
        let usage = hid::usage_for(code).ok_or(DispatchError::UnsupportedKeyCode(code))?;
        self.ensure_initialized()?;

        let mut state = self.report.lock();
        if !state.update(usage, flags, down) {
            log::warn!("keyboard report is full, usage {:#04x} dropped", usage);
            return Ok(());
        }
        let datagram = state.encode_report();
        self.send(datagram)
    }

    fn release_all(&self) -> Result<(), DispatchError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.reset()
    }
}

impl Drop for DaemonProtocolClient {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if self.initialized.load(Ordering::Acquire) {
            let mut state = self.report.lock();
            if state.report.pressed() > 0 || state.report.modifiers != 0 {
                state.clear();
                let datagram = state.encode_report();
                let _ = self.socket.send_to(datagram, &self.server_path);
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        let _ = fs::remove_file(&self.client_path);
    }
}

fn read_responses(
    socket: UnixDatagram,
    driver: Arc<DriverState>,
    selector: Option<Arc<BackendSelector>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 64];
    while !shutdown.load(Ordering::Acquire) {
        match socket.recv(&mut buf) {
            Ok(len) => match decode_response(&buf[..len]) {
                Some(response) => driver.apply(response, selector.as_deref()),
                None => log::debug!("ignoring {}-byte datagram from daemon", len),
            },
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => thread::sleep(READ_IDLE),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                log::warn!("daemon response socket failed: {}", err);
                break;
            }
        }
    }
}
