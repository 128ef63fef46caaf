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

//! Protocol-version probing shared by both protocol layers.

// ----- Modules -----

use crate::dispatcher::{Dispatcher, DispatcherError};
use crate::hidpp10;
use crate::hidpp20::DEFAULT_SOFTWARE_ID;
use crate::report::{DeviceIndex, Report, ReportType};
use std::time::Duration;

// ----- Consts -----

const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Root feature ping function.
const ROOT_INDEX: u8 = 0;
const ROOT_PING: u8 = 1;

// ----- Structs -----

/// One HID++ device on a dispatcher, before its protocol version is
/// known.
pub struct Device<'d> {
    dispatcher: &'d dyn Dispatcher,
    index: DeviceIndex,
}

impl<'d> Device<'d> {
    pub fn new(dispatcher: &'d dyn Dispatcher, index: DeviceIndex) -> Device<'d> {
        Device { dispatcher, index }
    }

    pub fn device_index(&self) -> DeviceIndex {
        self.index
    }

    pub fn dispatcher(&self) -> &'d dyn Dispatcher {
        self.dispatcher
    }

    /// Probe the protocol version with a root ping.
    ///
    /// HID++1.0 firmware does not know the ping sub ID and answers
    /// with an InvalidSubId error report, identifying protocol 1.0;
    /// HID++2.0 firmware echoes its version in the first two
    /// parameter bytes.
    pub fn protocol_version(&self) -> Result<(u8, u8), DispatcherError> {
        let request = Report::new20(
            ReportType::Short,
            self.index,
            ROOT_INDEX,
            ROOT_PING,
            DEFAULT_SOFTWARE_ID,
        );
        match self
            .dispatcher
            .send_command(request)?
            .get_timeout(PING_TIMEOUT)
        {
            Ok(response) => {
                let params = response.parameters();
                Ok((params[0], params[1]))
            }
            Err(DispatcherError::Hidpp10(hidpp10::Error::InvalidSubId)) => Ok((1, 0)),
            Err(e) => Err(e),
        }
    }
}

// ----- Tests -----
