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

//! Host-side implementation of the Logitech HID++ protocol.
//!
//! HID++ multiplexes a receiver and up to six paired devices over one
//! raw HID node. This crate provides the report codec, the
//! request/response/event dispatchers, the paged memory cache used for
//! onboard profiles and macros, and the binary profile formats of the
//! supported device families.
//!
//! The OS transport is abstracted behind [`hid::RawDevice`]; an
//! hidapi-backed implementation is available with the
//! `hidapi-devices` feature.

// ----- Crates -----

#[macro_use]
extern crate log;

// ----- Modules -----

pub mod address;
pub mod crc;
pub mod device;
pub mod dispatcher;
pub mod hid;
pub mod hidpp10;
pub mod hidpp20;
pub mod logging;
pub mod macros;
pub mod memory;
pub mod profile;
pub mod report;
pub mod settings;

pub use address::Address;
pub use dispatcher::Dispatcher;
pub use report::{DeviceIndex, Report, ReportType};
