//! HID transport

use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use i1d3_core::constants::{PRODUCT_ID, VENDOR_ID};
use i1d3_core::FRAME_SIZE;
use tracing::{debug, trace};

use crate::{error::*, PortKind, Transport};

/// HID report id prepended to every output report
const REPORT_ID: u8 = 0;

/// HID transport for i1d3 instruments
pub struct HidTransport {
    device: HidDevice,
    product: String,
    serial: Option<String>,
}

impl HidTransport {
    /// Open the first attached instrument
    pub fn open() -> Result<Self> {
        let api = HidApi::new().map_err(|e| Error::Device(e.to_string()))?;
        Self::open_with(&api)
    }

    /// Open the first attached instrument through an existing API handle
    pub fn open_with(api: &HidApi) -> Result<Self> {
        let info = api
            .device_list()
            .find(|d| d.vendor_id() == VENDOR_ID && d.product_id() == PRODUCT_ID)
            .ok_or(Error::NotFound {
                vendor_id: VENDOR_ID,
                product_id: PRODUCT_ID,
            })?;

        let device = info
            .open_device(api)
            .map_err(|e| Error::Device(format!("open failed: {}", e)))?;

        let product = info.product_string().unwrap_or("i1d3").to_string();
        let serial = info.serial_number().map(str::to_string);

        debug!("Opened {} (serial: {:?})", product, serial);

        Ok(Self {
            device,
            product,
            serial,
        })
    }

    /// USB serial number, if the device reports one
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }
}

impl Transport for HidTransport {
    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        let mut report = Vec::with_capacity(data.len() + 1);
        report.push(REPORT_ID);
        report.extend_from_slice(data);

        trace!("Writing {} bytes: {:02X?}", data.len(), &data[..data.len().min(16)]);

        let written = self
            .device
            .write(&report)
            .map_err(|e| Error::Device(e.to_string()))?;

        // hidapi counts the report id on some platforms
        Ok(if written > data.len() { written - 1 } else { written })
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

        let n = self
            .device
            .read_timeout(buf, millis)
            .map_err(|e| Error::Device(e.to_string()))?;

        if n == 0 {
            return Err(Error::Timeout(timeout));
        }

        trace!("Read {} bytes: {:02X?}", n, &buf[..n.min(16)]);
        Ok(n)
    }

    fn port_kind(&self) -> PortKind {
        PortKind::Hid
    }

    fn description(&self) -> String {
        format!("{} over HID ({}-byte reports)", self.product, FRAME_SIZE)
    }
}
