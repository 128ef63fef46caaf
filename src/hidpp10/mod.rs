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

//! HID++1.0: register access, paged memory and the persistent profile
//! formats of the register-based mice.

// ----- Modules -----

pub mod device;
pub mod directory;
pub mod macro_format;
pub mod memory;
pub mod profile;
pub mod profile_g500;
pub mod profile_g700;
pub mod profile_g9;
pub mod sensor;

pub use device::Device;
pub use directory::DirectoryFormat10;
pub use macro_format::MacroFormat10;
pub use memory::MemoryBackend10;
pub use profile_g500::ProfileFormatG500;
pub use profile_g700::ProfileFormatG700;
pub use profile_g9::ProfileFormatG9;
pub use sensor::{ListSensor, RangeSensor, Sensor};

use crate::profile::ProfileFormat;
use core::fmt;
use num_enum::{IntoPrimitive, TryFromPrimitive};

// ----- Functions -----

/// Pick the profile format for a known register-based mouse.
///
/// The sensor and sector layout are fixed per product; unknown
/// product IDs return `None`.
pub fn profile_format(product_id: u16) -> Option<Box<dyn ProfileFormat>> {
    match product_id {
        // G9
        0xC048 => Some(Box::new(ProfileFormatG9::new(ListSensor::s6006()))),
        // G9x
        0xC066 => Some(Box::new(ProfileFormatG9::new(RangeSensor::s9500()))),
        // G500
        0xC068 => Some(Box::new(ProfileFormatG500::new(RangeSensor::s9500()))),
        // G500s
        0xC24E => Some(Box::new(ProfileFormatG500::new(RangeSensor::s9808()))),
        // G700
        0xC06B => Some(Box::new(ProfileFormatG700::new(ListSensor::s6090()))),
        // G700s
        0xC07C => Some(Box::new(ProfileFormatG700::new(ListSensor::s6090()))),
        _ => None,
    }
}

// ----- Enumerations -----

/// Report sub IDs used by the register and memory protocol.
#[repr(u8)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, IntoPrimitive, TryFromPrimitive)]
pub enum SubId {
    SendDataAcknowledgement = 0x50,
    SetRegisterShort = 0x80,
    GetRegisterShort = 0x81,
    SetRegisterLong = 0x82,
    GetRegisterLong = 0x83,
    ErrorMessage = 0x8F,
    SendDataBegin = 0x90,
    SendDataContinue = 0x91,
    SendDataBeginAck = 0x92,
    SendDataContinueAck = 0x93,
}

/// Register addresses used by the core.
#[repr(u8)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, IntoPrimitive, TryFromPrimitive)]
pub enum RegisterAddress {
    MemoryOperation = 0xA0,
    ResetSeqNum = 0xA1,
    MemoryRead = 0xA2,
}

/// Parameter 0 of the MemoryOperation register.
#[repr(u8)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, IntoPrimitive, TryFromPrimitive)]
pub enum MemoryOperation {
    Fill = 2,
    Copy = 3,
}

// ----- Consts -----

/// Flash page size in bytes.
pub const PAGE_SIZE: usize = 512;
/// Temporary (RAM) page size in bytes.
pub const RAM_SIZE: usize = 400;

// ----- Errors -----

/// HID++1.0 protocol error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    InvalidSubId,
    InvalidAddress,
    InvalidValue,
    ConnectFail,
    TooManyDevices,
    AlreadyExists,
    Busy,
    UnknownDevice,
    ResourceError,
    RequestUnavailable,
    InvalidParamValue,
    WrongPinCode,
    Other(u8),
}

impl Error {
    pub fn from_code(code: u8) -> Error {
        match code {
            0x01 => Error::InvalidSubId,
            0x02 => Error::InvalidAddress,
            0x03 => Error::InvalidValue,
            0x04 => Error::ConnectFail,
            0x05 => Error::TooManyDevices,
            0x06 => Error::AlreadyExists,
            0x07 => Error::Busy,
            0x08 => Error::UnknownDevice,
            0x09 => Error::ResourceError,
            0x0A => Error::RequestUnavailable,
            0x0B => Error::InvalidParamValue,
            0x0C => Error::WrongPinCode,
            code => Error::Other(code),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Error::InvalidSubId => 0x01,
            Error::InvalidAddress => 0x02,
            Error::InvalidValue => 0x03,
            Error::ConnectFail => 0x04,
            Error::TooManyDevices => 0x05,
            Error::AlreadyExists => 0x06,
            Error::Busy => 0x07,
            Error::UnknownDevice => 0x08,
            Error::ResourceError => 0x09,
            Error::RequestUnavailable => 0x0A,
            Error::InvalidParamValue => 0x0B,
            Error::WrongPinCode => 0x0C,
            Error::Other(code) => code,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Error::InvalidSubId => "Invalid sub ID",
            Error::InvalidAddress => "Invalid address",
            Error::InvalidValue => "Invalid value",
            Error::ConnectFail => "Connection failed",
            Error::TooManyDevices => "Too many devices",
            Error::AlreadyExists => "Already exists",
            Error::Busy => "Busy",
            Error::UnknownDevice => "Unknown device",
            Error::ResourceError => "Resource error",
            Error::RequestUnavailable => "Request unavailable",
            Error::InvalidParamValue => "Invalid parameter value",
            Error::WrongPinCode => "Wrong PIN code",
            Error::Other(code) => {
                return write!(f, "Unknown HID++1.0 error code 0x{:02x}", code)
            }
        };
        write!(f, "{}", message)
    }
}

impl std::error::Error for Error {}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_roundtrip() {
        for code in 0x01..=0x0C {
            assert_eq!(Error::from_code(code).code(), code);
        }
        assert_eq!(Error::from_code(0x42), Error::Other(0x42));
        assert_eq!(Error::Other(0x42).code(), 0x42);
    }

    #[test]
    fn profile_format_registry() {
        assert_eq!(profile_format(0xC068).unwrap().size(), 78); // G500
        assert_eq!(profile_format(0xC048).unwrap().size(), 56); // G9
        assert_eq!(profile_format(0xC06B).unwrap().size(), 74); // G700
        assert!(profile_format(0x0000).is_none());
    }
}
