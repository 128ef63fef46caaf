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

//! Onboard profiles feature (0x8100): profile memory access and mode
//! switching.

// ----- Modules -----

use super::device::{Device, FeatureError, IRoot};
use crate::dispatcher::DispatcherError;
use crate::report::Report;
use core::convert::TryFrom;
use num_enum::{IntoPrimitive, TryFromPrimitive};

// ----- Consts -----

/// Read and write granularity of the profile memory.
pub const LINE_SIZE: usize = 16;

// Functions
const GET_DESCRIPTION: u8 = 0;
const SET_MODE: u8 = 1;
const GET_MODE: u8 = 2;
const SET_CURRENT_PROFILE: u8 = 3;
const GET_CURRENT_PROFILE: u8 = 4;
const MEMORY_READ: u8 = 5;
const MEMORY_ADDR_WRITE: u8 = 6;
const MEMORY_WRITE: u8 = 7;
const MEMORY_WRITE_END: u8 = 8;
const GET_CURRENT_DPI_INDEX: u8 = 11;
const SET_CURRENT_DPI_INDEX: u8 = 12;

// Events
pub const CURRENT_PROFILE_CHANGED: u8 = 0;
pub const CURRENT_DPI_INDEX_CHANGED: u8 = 1;

// ----- Enumerations -----

#[repr(u8)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, IntoPrimitive, TryFromPrimitive)]
pub enum Mode {
    NoChange = 0,
    Onboard = 1,
    Host = 2,
}

#[repr(u8)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, IntoPrimitive, TryFromPrimitive)]
pub enum MemoryType {
    Writeable = 0,
    Rom = 1,
}

// ----- Structs -----

/// Device-declared memory and format description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Description {
    pub memory_model: u8,
    pub profile_format: u8,
    pub macro_format: u8,
    pub profile_count: u8,
    pub profile_count_oob: u8,
    pub button_count: u8,
    pub sector_count: u8,
    pub sector_size: u16,
    pub mechanical_layout: u8,
    pub various_info: u8,
}

pub struct OnboardProfiles<'d> {
    dev: Device<'d>,
    feature_index: u8,
}

impl<'d> OnboardProfiles<'d> {
    pub const ID: u16 = 0x8100;

    /// Resolve the feature on the device.
    pub fn new(dev: Device<'d>) -> Result<OnboardProfiles<'d>, FeatureError> {
        let feature_index = IRoot::new(&dev).get_feature(OnboardProfiles::ID)?;
        Ok(OnboardProfiles { dev, feature_index })
    }

    pub fn feature_index(&self) -> u8 {
        self.feature_index
    }

    fn call(&self, function: u8, params: &[u8]) -> Result<Vec<u8>, DispatcherError> {
        self.dev.call_function(self.feature_index, function, params)
    }

    pub fn get_description(&self) -> Result<Description, DispatcherError> {
        let results = self.call(GET_DESCRIPTION, &[])?;
        Ok(Description {
            memory_model: results[0],
            profile_format: results[1],
            macro_format: results[2],
            profile_count: results[3],
            profile_count_oob: results[4],
            button_count: results[5],
            sector_count: results[6],
            sector_size: u16::from_be_bytes([results[7], results[8]]),
            mechanical_layout: results[9],
            various_info: results[10],
        })
    }

    pub fn get_mode(&self) -> Result<Mode, DispatcherError> {
        let results = self.call(GET_MODE, &[])?;
        Ok(Mode::try_from(results[0]).unwrap_or(Mode::NoChange))
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), DispatcherError> {
        self.call(SET_MODE, &[mode.into()])?;
        Ok(())
    }

    pub fn get_current_profile(&self) -> Result<(MemoryType, u8), DispatcherError> {
        let results = self.call(GET_CURRENT_PROFILE, &[])?;
        Ok((
            MemoryType::try_from(results[0]).unwrap_or(MemoryType::Writeable),
            results[1],
        ))
    }

    pub fn set_current_profile(
        &self,
        mem_type: MemoryType,
        index: u8,
    ) -> Result<(), DispatcherError> {
        self.call(SET_CURRENT_PROFILE, &[mem_type.into(), index])?;
        Ok(())
    }

    /// Read one 16-byte line of profile memory.
    pub fn memory_read(
        &self,
        mem_type: u8,
        page: u8,
        offset: u16,
    ) -> Result<[u8; LINE_SIZE], DispatcherError> {
        let mut params = [0u8; 4];
        params[0] = mem_type;
        params[1] = page;
        params[2..4].copy_from_slice(&offset.to_be_bytes());
        let results = self.call(MEMORY_READ, &params)?;
        let mut line = [0u8; LINE_SIZE];
        let len = results.len().min(LINE_SIZE);
        line[..len].copy_from_slice(&results[..len]);
        Ok(line)
    }

    /// Open a write of `length` bytes at (page, offset) in writable
    /// memory.
    pub fn memory_addr_write(
        &self,
        page: u8,
        offset: u16,
        length: u16,
    ) -> Result<(), DispatcherError> {
        let mut params = [0u8; 6];
        params[0] = MemoryType::Writeable.into();
        params[1] = page;
        params[2..4].copy_from_slice(&offset.to_be_bytes());
        params[4..6].copy_from_slice(&length.to_be_bytes());
        self.call(MEMORY_ADDR_WRITE, &params)?;
        Ok(())
    }

    /// Write one line of at most 16 bytes.
    pub fn memory_write(&self, data: &[u8]) -> Result<(), DispatcherError> {
        assert!(data.len() <= LINE_SIZE, "line too long");
        self.call(MEMORY_WRITE, data)?;
        Ok(())
    }

    pub fn memory_write_end(&self) -> Result<(), DispatcherError> {
        self.call(MEMORY_WRITE_END, &[])?;
        Ok(())
    }

    pub fn get_current_dpi_index(&self) -> Result<u8, DispatcherError> {
        let results = self.call(GET_CURRENT_DPI_INDEX, &[])?;
        Ok(results[0])
    }

    pub fn set_current_dpi_index(&self, index: u8) -> Result<(), DispatcherError> {
        self.call(SET_CURRENT_DPI_INDEX, &[index])?;
        Ok(())
    }

    /// Decode a CurrentProfileChanged event.
    pub fn current_profile_changed(event: &Report) -> Option<(MemoryType, u8)> {
        if event.function() != CURRENT_PROFILE_CHANGED {
            return None;
        }
        let params = event.parameters();
        Some((
            MemoryType::try_from(params[0]).unwrap_or(MemoryType::Writeable),
            params[1],
        ))
    }

    /// Decode a CurrentDPIIndexChanged event.
    pub fn current_dpi_index_changed(event: &Report) -> Option<u8> {
        if event.function() != CURRENT_DPI_INDEX_CHANGED {
            return None;
        }
        Some(event.parameters()[0])
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::simple::SimpleDispatcher;
    use crate::dispatcher::test_util::MockDevice;
    use crate::logging::setup_logging_lite;
    use crate::report::DeviceIndex;
    use core::convert::TryFrom;

    fn respond_long(header: [u8; 4], params: &[u8]) -> Vec<u8> {
        let mut response = header.to_vec();
        response.extend_from_slice(params);
        response.resize(20, 0);
        response
    }

    #[test]
    fn description_is_decoded() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|report| {
            match report[3] >> 4 {
                // GetFeature
                0x00 if report[2] == 0x00 => {
                    vec![respond_long([0x11, 0x01, 0x00, report[3]], &[0x0D, 0x00])]
                }
                // GetDescription
                0x00 => vec![respond_long(
                    [0x11, 0x01, 0x0D, report[3]],
                    &[1, 2, 1, 3, 1, 11, 16, 0x01, 0x00, 2, 4],
                )],
                _ => panic!("unexpected call: {:02x?}", report),
            }
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let device = Device::new(&dispatcher, DeviceIndex::WirelessDevice1);
        let iop = OnboardProfiles::new(device).unwrap();
        assert_eq!(iop.feature_index(), 0x0D);
        let desc = iop.get_description().unwrap();
        assert_eq!(desc.profile_count, 3);
        assert_eq!(desc.sector_count, 16);
        assert_eq!(desc.sector_size, 256);
        assert_eq!(desc.button_count, 11);
    }

    #[test]
    fn event_decoders() {
        // Event: feature index 0x0D, function 0, sw_id 0
        let event =
            Report::from_raw(vec![0x10, 0x01, 0x0D, 0x00, 0x01, 0x02, 0x00]).unwrap();
        assert_eq!(
            OnboardProfiles::current_profile_changed(&event),
            Some((MemoryType::Rom, 0x02))
        );
        assert_eq!(OnboardProfiles::current_dpi_index_changed(&event), None);

        let event =
            Report::from_raw(vec![0x10, 0x01, 0x0D, 0x10, 0x03, 0x00, 0x00]).unwrap();
        assert_eq!(OnboardProfiles::current_dpi_index_changed(&event), Some(3));
    }

    #[test]
    fn memory_type_codes() {
        assert_eq!(MemoryType::try_from(0), Ok(MemoryType::Writeable));
        assert_eq!(MemoryType::try_from(1), Ok(MemoryType::Rom));
    }
}
