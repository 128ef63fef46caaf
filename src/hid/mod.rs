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

// ----- Modules -----

pub mod descriptor;

#[cfg(feature = "hidapi-devices")]
pub mod hidapi;

use std::io;
use std::time::Duration;

// ----- Traits -----

/// Raw HID transport the dispatchers are built on.
///
/// Implementations must allow `write_report` and `interrupt_read` to
/// be called while another thread is blocked in `read_report`; the
/// threaded dispatcher relies on this to install response matchers
/// and to shut down.
pub trait RawDevice: Send + Sync {
    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn name(&self) -> &str;

    /// Raw HID report descriptor bytes. On platforms without a real
    /// descriptor the transport synthesizes one from capability
    /// metadata.
    fn report_descriptor(&self) -> &[u8];

    /// Send one report, report ID in the first byte.
    fn write_report(&self, report: &[u8]) -> io::Result<usize>;

    /// Read one report into `buf`, blocking up to `timeout`
    /// (`None` blocks indefinitely).
    ///
    /// Returns the number of bytes read, or 0 when the read was
    /// interrupted or timed out. Transport failures are I/O errors.
    fn read_report(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize>;

    /// Unblock the current (or next) `read_report` call.
    fn interrupt_read(&self);
}
