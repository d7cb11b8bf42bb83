//! hidapi transport for the fixed-protocol controller

use crate::controller::error::DeviceError;
use crate::controller::hid::ReportSource;
use hidapi::{HidApi, HidDevice};
use std::ffi::CString;
use std::time::Duration;
use tracing::{debug, info, warn};

const REPORT_BUFFER: usize = 64;
// queued reports read per poll before giving up on reaching the newest
const MAX_DRAIN: usize = 32;

fn timeout_millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

fn device_path(path: &str) -> Result<CString, DeviceError> {
    CString::new(path)
        .map_err(|_| DeviceError::Unavailable(format!("invalid device path '{}'", path)))
}

/// One open HID device. Dropping or closing it releases the handle.
pub struct HidapiSource {
    description: String,
    device: Option<HidDevice>,
    buffer: [u8; REPORT_BUFFER],
}

impl HidapiSource {
    fn from_device(device: HidDevice, description: String) -> Self {
        let product = device.get_product_string().ok().flatten();
        info!(
            "Opened HID device {} ({})",
            description,
            product.as_deref().unwrap_or("unknown product")
        );
        Self {
            description,
            device: Some(device),
            buffer: [0u8; REPORT_BUFFER],
        }
    }

    /// Opens the first device matching vendor/product.
    pub fn open(vendor_id: u16, product_id: u16) -> Result<Self, DeviceError> {
        let api = HidApi::new().map_err(|e| DeviceError::Backend(e.to_string()))?;
        let description = format!("{:04X}:{:04X}", vendor_id, product_id);
        let device = api.open(vendor_id, product_id).map_err(|e| {
            warn!("Could not open {}: {}. Check device permissions.", description, e);
            DeviceError::Unavailable(format!("{}: {}", description, e))
        })?;
        Ok(Self::from_device(device, description))
    }

    /// Opens a device by its platform path, e.g. `/dev/hidraw3` on Linux.
    pub fn open_path(path: &str) -> Result<Self, DeviceError> {
        let c_path = device_path(path)?;
        let api = HidApi::new().map_err(|e| DeviceError::Backend(e.to_string()))?;
        let device = api
            .open_path(&c_path)
            .map_err(|e| DeviceError::Unavailable(format!("{}: {}", path, e)))?;
        Ok(Self::from_device(device, path.to_string()))
    }
}

impl ReportSource for HidapiSource {
    /// Waits up to `timeout` for a report, then returns the newest queued one.
    fn read_report(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, DeviceError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| DeviceError::Unavailable(format!("{} is closed", self.description)))?;

        let mut len = device
            .read_timeout(&mut self.buffer, timeout_millis(timeout))
            .map_err(|e| DeviceError::Disconnected(e.to_string()))?;
        if len == 0 {
            return Ok(None);
        }

        let mut latest = self.buffer[..len].to_vec();
        for _ in 0..MAX_DRAIN {
            len = device
                .read_timeout(&mut self.buffer, 0)
                .map_err(|e| DeviceError::Disconnected(e.to_string()))?;
            if len == 0 {
                break;
            }
            latest.clear();
            latest.extend_from_slice(&self.buffer[..len]);
        }
        Ok(Some(latest))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            debug!("Released HID device {}", self.description);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_source() -> HidapiSource {
        HidapiSource {
            description: "045E:0B12".to_string(),
            device: None,
            buffer: [0u8; REPORT_BUFFER],
        }
    }

    #[test]
    fn timeouts_convert_to_millis() {
        assert_eq!(timeout_millis(Duration::from_millis(1)), 1);
        assert_eq!(timeout_millis(Duration::from_micros(500)), 0);
        assert_eq!(timeout_millis(Duration::from_secs(u64::MAX)), i32::MAX);
    }

    #[test]
    fn device_path_rejects_interior_nul() {
        assert!(device_path("/dev/hidraw3").is_ok());
        assert!(matches!(
            device_path("/dev/hid\0raw"),
            Err(DeviceError::Unavailable(_))
        ));
    }

    #[test]
    fn closed_source_has_no_handle() {
        let mut source = closed_source();
        source.close();
        assert!(source.device.is_none());
        assert!(matches!(
            source.read_report(Duration::from_millis(1)),
            Err(DeviceError::Unavailable(_))
        ));
        assert_eq!(source.describe(), "045E:0B12");
    }
}
