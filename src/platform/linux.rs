//! evdev multitouch frame source for Linux
//!
//! One reader thread per trackpad decodes the MT type-B stream and calls
//! [`FrameSource::on_callback`] once per `SYN_REPORT`.

use super::mt::{self, AxisRange, AxisRanges, MtDecoder};
use crate::error::PlatformError;
use crate::touch::FrameSource;
use evdev::{AbsoluteAxisType, Device};
use nix::libc;
use std::fs::{self, File};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

nix::ioctl_read!(eviocgabs_slot, b'E', 0x40 + mt::ABS_MT_SLOT, libc::input_absinfo);
nix::ioctl_read!(eviocgabs_x, b'E', 0x40 + mt::ABS_MT_POSITION_X, libc::input_absinfo);
nix::ioctl_read!(eviocgabs_y, b'E', 0x40 + mt::ABS_MT_POSITION_Y, libc::input_absinfo);
nix::ioctl_read!(eviocgabs_pressure, b'E', 0x40 + mt::ABS_MT_PRESSURE, libc::input_absinfo);

/// Sleep between reads of an idle device
const IDLE_POLL: Duration = Duration::from_millis(2);

/// A multitouch device found under /dev/input
#[derive(Debug, Clone, PartialEq)]
pub struct TouchDeviceInfo {
    pub path: PathBuf,
    pub name: String,
    /// Stable id built from bus, vendor, product and version
    pub id: u64,
    pub ranges: AxisRanges,
    pub slots: usize,
}

/// Build a device id from its input id fields
pub fn stable_device_id(bus: u16, vendor: u16, product: u16, version: u16) -> u64 {
    (bus as u64) << 48 | (vendor as u64) << 32 | (product as u64) << 16 | version as u64
}

type AbsReader = unsafe fn(libc::c_int, *mut libc::input_absinfo) -> nix::Result<libc::c_int>;

fn read_axis(device: &Device, read: AbsReader) -> Option<AxisRange> {
    let mut info = libc::input_absinfo {
        value: 0,
        minimum: 0,
        maximum: 0,
        fuzz: 0,
        flat: 0,
        resolution: 0,
    };
    // SAFETY: the fd is open for the lifetime of `device` and `info` is a
    // valid input_absinfo the kernel writes into.
    match unsafe { read(device.as_raw_fd(), &mut info) } {
        Ok(_) => Some(AxisRange::new(info.minimum, info.maximum)),
        Err(err) => {
            log::debug!("EVIOCGABS failed: {}", err);
            None
        }
    }
}

fn is_multitouch(device: &Device) -> bool {
    device.supported_absolute_axes().is_some_and(|axes| {
        axes.contains(AbsoluteAxisType::ABS_MT_POSITION_X)
            && axes.contains(AbsoluteAxisType::ABS_MT_POSITION_Y)
    })
}

fn describe(path: PathBuf, device: &Device) -> Option<TouchDeviceInfo> {
    let x = read_axis(device, eviocgabs_x)?;
    let y = read_axis(device, eviocgabs_y)?;
    let slots = read_axis(device, eviocgabs_slot)
        .map_or(1, |range| (range.max - range.min + 1).max(1) as usize);
    let input = device.input_id();
    Some(TouchDeviceInfo {
        path,
        name: device.name().unwrap_or("unknown").to_string(),
        id: stable_device_id(input.bus_type().0, input.vendor(), input.product(), input.version()),
        ranges: AxisRanges {
            x,
            y,
            pressure: read_axis(device, eviocgabs_pressure),
        },
        slots,
    })
}

fn open_touch_devices() -> Result<Vec<(TouchDeviceInfo, Device)>, PlatformError> {
    let found: Vec<_> = evdev::enumerate()
        .filter(|(_, device)| is_multitouch(device))
        .filter_map(|(path, device)| describe(path, &device).map(|info| (info, device)))
        .collect();

    if found.is_empty() {
        return Err(no_devices_error());
    }
    Ok(found)
}

/// Distinguish "nothing there" from "nothing we may open"
fn no_devices_error() -> PlatformError {
    let Ok(entries) = fs::read_dir("/dev/input") else {
        return PlatformError::NoDevices;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_event = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("event"));
        if !is_event {
            continue;
        }
        if let Err(err) = File::open(&path) {
            if err.kind() == io::ErrorKind::PermissionDenied {
                return PlatformError::PermissionDenied(path.display().to_string());
            }
        }
    }
    PlatformError::NoDevices
}

/// Multitouch devices currently accessible
pub fn list_touch_devices() -> Result<Vec<TouchDeviceInfo>, PlatformError> {
    Ok(open_touch_devices()?
        .into_iter()
        .map(|(info, _)| info)
        .collect())
}

/// Human-readable device availability for the status panel
pub fn touch_status() -> String {
    match list_touch_devices() {
        Ok(devices) => format!("{} multitouch device(s) found", devices.len()),
        Err(err) => err.to_string(),
    }
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let fd = device.as_raw_fd();
    // SAFETY: plain fcntl flag update on an fd owned by `device`.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_secs_f64())
}

fn read_device(
    mut device: Device,
    info: &TouchDeviceInfo,
    source: &FrameSource,
    stop: &AtomicBool,
) {
    let mut decoder = MtDecoder::new(info.ranges, info.slots);
    while !stop.load(Ordering::Acquire) {
        match device.fetch_events() {
            Ok(events) => {
                for event in events {
                    if decoder.feed(event.event_type().0, event.code(), event.value()) {
                        let _ = source.on_callback(
                            &info.id,
                            decoder.touches(),
                            seconds(event.timestamp()),
                            decoder.reports(),
                        );
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => thread::sleep(IDLE_POLL),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                log::warn!("{}: read failed, closing device: {}", info.path.display(), err);
                break;
            }
        }
    }
}

/// Reader threads feeding a frame source from every trackpad
pub struct EvdevTouchSource {
    devices: Vec<TouchDeviceInfo>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl EvdevTouchSource {
    pub fn start(source: Arc<FrameSource>) -> Result<Self, PlatformError> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut devices = Vec::new();
        let mut handles = Vec::new();

        for (info, device) in open_touch_devices()? {
            set_nonblocking(&device)?;
            log::info!(
                "reading {} ({}) as device {:#x}, {} slots",
                info.name,
                info.path.display(),
                info.id,
                info.slots
            );
            let thread_info = info.clone();
            let source = Arc::clone(&source);
            let stop = Arc::clone(&stop);
            let handle = thread::Builder::new()
                .name(format!("evdev-{:x}", info.id))
                .spawn(move || read_device(device, &thread_info, &source, &stop))?;
            devices.push(info);
            handles.push(handle);
        }

        Ok(Self {
            devices,
            stop,
            handles,
        })
    }

    pub fn devices(&self) -> &[TouchDeviceInfo] {
        &self.devices
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for EvdevTouchSource {
    fn drop(&mut self) {
        self.stop();
    }
}
