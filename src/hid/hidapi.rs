/* Copyright (C) 2021-2022 by the hidpp-core authors
 *
 * This file is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This file is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this file.  If not, see <http://www.gnu.org/licenses/>.
 */

//! hidapi-backed [`RawDevice`] transport.

// ----- Modules -----

use super::RawDevice;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ----- Consts -----

/// Poll slice for interruptible reads. hidapi has no interruption
/// primitive, so reads run in short timed slices and check the
/// interrupt flag in between.
const READ_SLICE_MS: i32 = 30;

// ----- Structs -----

/// A HID node opened through hidapi.
///
/// hidapi device handles are not thread safe; the handle lives in a
/// mutex that is released between read slices so writes from other
/// threads can interleave with a blocked read.
pub struct HidapiDevice {
    device: Mutex<::hidapi::HidDevice>,
    interrupted: AtomicBool,
    vendor_id: u16,
    product_id: u16,
    name: String,
    report_descriptor: Vec<u8>,
}

impl HidapiDevice {
    /// Wrap an open hidapi device.
    ///
    /// hidapi does not expose the raw report descriptor, so the caller
    /// provides one, typically synthesized from usage page metadata
    /// (see [`synthesize_hidpp_descriptor`]).
    pub fn new(
        device: ::hidapi::HidDevice,
        vendor_id: u16,
        product_id: u16,
        name: String,
        report_descriptor: Vec<u8>,
    ) -> HidapiDevice {
        // Blocking mode with explicit timeouts to keep reads interruptible
        device.set_blocking_mode(true).ok();
        HidapiDevice {
            device: Mutex::new(device),
            interrupted: AtomicBool::new(false),
            vendor_id,
            product_id,
            name,
            report_descriptor,
        }
    }
}

/// Descriptor synthesized for platforms where the raw descriptor is
/// unavailable. Both canonical HID++ collections are reported as
/// present.
pub fn synthesize_hidpp_descriptor() -> Vec<u8> {
    let mut desc = Vec::with_capacity(54);
    desc.extend_from_slice(&[
        0x06, 0x00, 0xFF, // Usage Page (FF00 - Vendor)
        0x09, 0x01, // Usage (0001 - Vendor)
        0xA1, 0x01, // Collection (Application)
        0x85, 0x10, //   Report ID (16)
        0x75, 0x08, //   Report Size (8)
        0x95, 0x06, //   Report Count (6)
        0x15, 0x00, //   Logical Minimum (0)
        0x26, 0xFF, 0x00, //   Logical Maximum (255)
        0x09, 0x01, //   Usage (0001 - Vendor)
        0x81, 0x00, //   Input (Data, Array, Absolute)
        0x09, 0x01, //   Usage (0001 - Vendor)
        0x91, 0x00, //   Output (Data, Array, Absolute)
        0xC0, // End Collection
    ]);
    desc.extend_from_slice(&[
        0x06, 0x00, 0xFF, // Usage Page (FF00 - Vendor)
        0x09, 0x02, // Usage (0002 - Vendor)
        0xA1, 0x01, // Collection (Application)
        0x85, 0x11, //   Report ID (17)
        0x75, 0x08, //   Report Size (8)
        0x95, 0x13, //   Report Count (19)
        0x15, 0x00, //   Logical Minimum (0)
        0x26, 0xFF, 0x00, //   Logical Maximum (255)
        0x09, 0x02, //   Usage (0002 - Vendor)
        0x81, 0x00, //   Input (Data, Array, Absolute)
        0x09, 0x02, //   Usage (0002 - Vendor)
        0x91, 0x00, //   Output (Data, Array, Absolute)
        0xC0, // End Collection
    ]);
    desc
}

impl RawDevice for HidapiDevice {
    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn report_descriptor(&self) -> &[u8] {
        &self.report_descriptor
    }

    fn write_report(&self, report: &[u8]) -> io::Result<usize> {
        let buf;
        let prepend = if cfg!(target_os = "linux") || cfg!(target_os = "macos") {
            // A leading zero byte is not transmitted
            report.first() == Some(&0x00)
        } else {
            // Windows always strips the first byte
            cfg!(target_os = "windows")
        };
        let out: &[u8] = if prepend {
            buf = {
                let mut b = Vec::with_capacity(report.len() + 1);
                b.push(0x00);
                b.extend_from_slice(report);
                b
            };
            &buf
        } else {
            report
        };

        let device = self.device.lock().unwrap();
        match device.write(out) {
            Ok(len) => {
                trace!("Sent {} bytes", len);
                trace!("{:x?}", &out[0..len]);
                Ok(len)
            }
            Err(e) => {
                warn!("Write - {:?}", e);
                Err(io::Error::new(io::ErrorKind::Other, format!("{:?}", e)))
            }
        }
    }

    fn read_report(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.interrupted.swap(false, Ordering::SeqCst) {
                return Ok(0);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(0);
                }
            }
            let len = {
                let device = self.device.lock().unwrap();
                match device.read_timeout(buf, READ_SLICE_MS) {
                    Ok(len) => len,
                    Err(e) => {
                        warn!("Read - {:?}", e);
                        return Err(io::Error::new(
                            io::ErrorKind::Other,
                            format!("{:?}", e),
                        ));
                    }
                }
            };
            if len > 0 {
                trace!("Received {} bytes", len);
                trace!("{:x?}", &buf[0..len]);
                return Ok(len);
            }
        }
    }

    fn interrupt_read(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}
