//! Fixed-protocol decoder for the vendor HID report
//!
//! Report layout (little-endian, at least [`MIN_REPORT_LEN`] bytes):
//!
//! ```text
//! byte  4      buttons, low bank   (bit i -> HID_BUTTONS_LOW[i])
//! byte  5      buttons, high bank  (bit i -> HID_BUTTONS_HIGH[i])
//! bytes 6..10  lt, rt              u16, 0..=1023
//! bytes 10..18 lx, ly, rx, ry      i16
//! ```

use crate::controller::error::DeviceError;
use crate::controller::snapshot::Snapshot;
use crate::controller::DeviceAdapter;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MIN_REPORT_LEN: usize = 18;

pub const HID_BUTTONS_LOW: [&str; 8] = ["A1", "A2", "MENU", "WIN", "A", "B", "X", "Y"];
pub const HID_BUTTONS_HIGH: [&str; 8] = ["UP", "DOWN", "LEFT", "RIGHT", "LB", "RB", "LS", "RS"];

const BUTTONS_LOW_OFFSET: usize = 4;
const BUTTONS_HIGH_OFFSET: usize = 5;
const TRIGGER_OFFSET: usize = 6;
const STICK_OFFSET: usize = 10;

const TRIGGER_MAX: f64 = 1023.0;

/// Normalizes a signed 16-bit stick reading to [-1.0, 1.0].
///
/// The negative branch divides by 32768 and the positive branch by 32767, so
/// both `i16::MIN` and `i16::MAX` land exactly on the range ends.
pub fn normalize_stick(raw: i16) -> f64 {
    let value = f64::from(raw);
    if raw < 0 {
        (value / 32768.0).max(-1.0)
    } else {
        (value / 32767.0).min(1.0)
    }
}

/// Normalizes a 10-bit trigger reading to [0.0, 1.0].
pub fn normalize_trigger(raw: u16) -> f64 {
    (f64::from(raw) / TRIGGER_MAX).clamp(0.0, 1.0)
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

fn decode_bank(snapshot: &mut Snapshot, bitmask: u8, names: &[&str; 8]) {
    for (bit, name) in names.iter().enumerate() {
        snapshot.set_button(*name, bitmask & (1 << bit) != 0);
    }
}

/// Decodes one raw report into a snapshot.
pub fn decode_report(data: &[u8]) -> Result<Snapshot, DeviceError> {
    if data.len() < MIN_REPORT_LEN {
        return Err(DeviceError::MalformedReport {
            len: data.len(),
            min: MIN_REPORT_LEN,
        });
    }

    let mut snapshot = Snapshot::default();
    decode_bank(&mut snapshot, data[BUTTONS_LOW_OFFSET], &HID_BUTTONS_LOW);
    decode_bank(&mut snapshot, data[BUTTONS_HIGH_OFFSET], &HID_BUTTONS_HIGH);

    snapshot.lt = normalize_trigger(read_u16(data, TRIGGER_OFFSET));
    snapshot.rt = normalize_trigger(read_u16(data, TRIGGER_OFFSET + 2));

    snapshot.lx = normalize_stick(read_i16(data, STICK_OFFSET));
    snapshot.ly = normalize_stick(read_i16(data, STICK_OFFSET + 2));
    snapshot.rx = normalize_stick(read_i16(data, STICK_OFFSET + 4));
    snapshot.ry = normalize_stick(read_i16(data, STICK_OFFSET + 6));

    Ok(snapshot)
}

/// Raw transport yielding fixed-layout reports
pub trait ReportSource {
    /// Waits at most `timeout` for the next report. `Ok(None)` means nothing arrived.
    fn read_report(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, DeviceError>;

    fn describe(&self) -> String;

    /// Releases the transport handle
    fn close(&mut self);
}

/// Device adapter over a [`ReportSource`] speaking the fixed protocol
pub struct HidAdapter<R: ReportSource> {
    source: Option<R>,
    read_timeout: Duration,
    malformed_reports: u64,
}

impl<R: ReportSource> HidAdapter<R> {
    pub fn new(source: R, read_timeout: Duration) -> Self {
        info!("HID adapter attached to {}", source.describe());
        Self {
            source: Some(source),
            read_timeout,
            malformed_reports: 0,
        }
    }

    pub fn malformed_reports(&self) -> u64 {
        self.malformed_reports
    }

    fn drop_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            info!("Closing HID source {}", source.describe());
            source.close();
        }
    }
}

impl<R: ReportSource> DeviceAdapter for HidAdapter<R> {
    fn poll(&mut self) -> Option<Snapshot> {
        let source = self.source.as_mut()?;

        let report = match source.read_report(self.read_timeout) {
            Ok(Some(report)) => report,
            Ok(None) => return None,
            Err(DeviceError::Disconnected(reason)) => {
                warn!("HID device disconnected: {}", reason);
                self.drop_source();
                return None;
            }
            Err(e) => {
                warn!("HID read failed: {}", e);
                return None;
            }
        };

        match decode_report(&report) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                self.malformed_reports += 1;
                debug!("Dropping report: {}", e);
                None
            }
        }
    }

    fn is_active(&self) -> bool {
        self.source.is_some()
    }

    fn close(&mut self) {
        self.drop_source();
    }

    fn describe(&self) -> String {
        match &self.source {
            Some(source) => format!("HID {}", source.describe()),
            None => "HID (closed)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    fn report(low: u8, high: u8, triggers: [u16; 2], sticks: [i16; 4]) -> Vec<u8> {
        let mut data = vec![0u8; MIN_REPORT_LEN];
        data[BUTTONS_LOW_OFFSET] = low;
        data[BUTTONS_HIGH_OFFSET] = high;
        for (i, value) in triggers.iter().enumerate() {
            data[TRIGGER_OFFSET + i * 2..TRIGGER_OFFSET + i * 2 + 2]
                .copy_from_slice(&value.to_le_bytes());
        }
        for (i, value) in sticks.iter().enumerate() {
            data[STICK_OFFSET + i * 2..STICK_OFFSET + i * 2 + 2]
                .copy_from_slice(&value.to_le_bytes());
        }
        data
    }

    #[test]
    fn stick_normalization_hits_both_ends_exactly() {
        assert_eq!(normalize_stick(0), 0.0);
        assert_eq!(normalize_stick(i16::MIN), -1.0);
        assert_eq!(normalize_stick(i16::MAX), 1.0);
        assert_eq!(normalize_stick(-16384), -0.5);
        // asymmetric divisors
        assert!(normalize_stick(-1).abs() < normalize_stick(1));
    }

    #[test]
    fn stick_normalization_is_monotonic() {
        let mut last = normalize_stick(i16::MIN);
        for raw in (i16::MIN as i32 + 1..=i16::MAX as i32).step_by(97) {
            let value = normalize_stick(raw as i16);
            assert!(value >= last, "{} -> {} after {}", raw, value, last);
            assert!((-1.0..=1.0).contains(&value));
            last = value;
        }
    }

    #[test]
    fn trigger_normalization() {
        assert_eq!(normalize_trigger(0), 0.0);
        assert_eq!(normalize_trigger(1023), 1.0);
        assert_eq!(normalize_trigger(4000), 1.0);
        let mut last = 0.0;
        for raw in 0..=1023u16 {
            let value = normalize_trigger(raw);
            assert_eq!(value, f64::from(raw) / 1023.0);
            assert!(value >= last);
            last = value;
        }
    }

    #[test]
    fn decodes_buttons_triggers_and_sticks() {
        // A (bit 4) + Y (bit 7); UP (bit 0) + RB (bit 5)
        let data = report(0b1001_0000, 0b0010_0001, [1023, 0], [i16::MAX, i16::MIN, 0, -16384]);
        let snapshot = decode_report(&data).unwrap();

        assert_eq!(snapshot.pressed_buttons(), vec!["A", "RB", "UP", "Y"]);
        assert_eq!(snapshot.buttons.len(), 16);
        assert_eq!(snapshot.lt, 1.0);
        assert_eq!(snapshot.rt, 0.0);
        assert_eq!(snapshot.lx, 1.0);
        assert_eq!(snapshot.ly, -1.0);
        assert_eq!(snapshot.rx, 0.0);
        assert_eq!(snapshot.ry, -0.5);
    }

    #[test]
    fn short_report_is_malformed() {
        let err = decode_report(&[0u8; 17]).unwrap_err();
        assert!(matches!(err, DeviceError::MalformedReport { len: 17, min: 18 }));
    }

    struct QueueSource {
        reports: VecDeque<Result<Option<Vec<u8>>, DeviceError>>,
        closes: Rc<Cell<u32>>,
    }

    impl ReportSource for QueueSource {
        fn read_report(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, DeviceError> {
            self.reports.pop_front().unwrap_or(Ok(None))
        }

        fn describe(&self) -> String {
            "queue".to_string()
        }

        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    #[test]
    fn adapter_treats_bad_reports_as_no_change() {
        let source = QueueSource {
            reports: VecDeque::from(vec![
                Ok(Some(vec![0u8; 4])),
                Ok(None),
                Ok(Some(report(0b0001_0000, 0, [0, 0], [0; 4]))),
                Err(DeviceError::Disconnected("unplugged".to_string())),
            ]),
            closes: Rc::new(Cell::new(0)),
        };
        let closes = Rc::clone(&source.closes);
        let mut adapter = HidAdapter::new(source, Duration::from_millis(1));

        assert!(adapter.poll().is_none());
        assert_eq!(adapter.malformed_reports(), 1);
        assert!(adapter.poll().is_none());
        assert!(adapter.poll().unwrap().is_pressed("A"));
        assert!(adapter.is_active());

        assert!(adapter.poll().is_none());
        assert!(!adapter.is_active());
        assert_eq!(closes.get(), 1);
        assert!(adapter.poll().is_none());
    }

    #[test]
    fn close_releases_source_once() {
        let closes = Rc::new(Cell::new(0));
        let source = QueueSource {
            reports: VecDeque::from(vec![Ok(Some(report(0, 0, [0, 0], [0; 4])))]),
            closes: Rc::clone(&closes),
        };
        let mut adapter = HidAdapter::new(source, Duration::from_millis(1));

        adapter.close();
        adapter.close();
        assert_eq!(closes.get(), 1);
        assert!(!adapter.is_active());
        // the queued report is never read after close
        assert!(adapter.poll().is_none());
        assert_eq!(adapter.describe(), "HID (closed)");
    }
}
