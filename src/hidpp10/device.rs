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

use super::SubId;
use crate::dispatcher::{Dispatcher, DispatcherError};
use crate::memory::MemoryError;
use crate::report::{
    DeviceIndex, Report, LONG_PARAM_LENGTH, SHORT_PARAM_LENGTH,
};
use std::time::Duration;

// ----- Consts -----

/// Upper bound on any single register or acknowledgement exchange.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

// ----- Structs -----

/// HID++1.0 register access for one device behind a dispatcher.
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

    fn access_register(
        &self,
        sub_id: SubId,
        address: u8,
        params: &[u8],
        results: &mut [u8],
    ) -> Result<(), DispatcherError> {
        let request = Report::with_params10(self.index, sub_id.into(), address, params)
            .expect("register parameters have a valid length");
        let response = self
            .dispatcher
            .send_command(request)?
            .get_timeout(EXCHANGE_TIMEOUT)?;
        let received = response.parameters();
        // The register size fixes the answer's report type; a
        // mismatched length means the exchange went wrong and the
        // bytes must not be trusted.
        if received.len() != results.len() {
            error!(
                "Register 0x{:02x} answered with {} parameter bytes, expected {}",
                address,
                received.len(),
                results.len()
            );
            return Err(DispatcherError::InvalidResultLength);
        }
        results.copy_from_slice(received);
        Ok(())
    }

    /// Write a short register, returning the 3 result bytes.
    pub fn set_register_short(
        &self,
        address: u8,
        params: [u8; SHORT_PARAM_LENGTH],
    ) -> Result<[u8; SHORT_PARAM_LENGTH], DispatcherError> {
        debug!("Setting short register 0x{:02x}", address);
        let mut results = [0u8; SHORT_PARAM_LENGTH];
        self.access_register(SubId::SetRegisterShort, address, &params, &mut results)?;
        Ok(results)
    }

    /// Read a short register; `params` selects sub-fields on some
    /// registers.
    pub fn get_register_short(
        &self,
        address: u8,
        params: [u8; SHORT_PARAM_LENGTH],
    ) -> Result<[u8; SHORT_PARAM_LENGTH], DispatcherError> {
        debug!("Getting short register 0x{:02x}", address);
        let mut results = [0u8; SHORT_PARAM_LENGTH];
        self.access_register(SubId::GetRegisterShort, address, &params, &mut results)?;
        Ok(results)
    }

    /// Write a long register, returning the 3 result bytes.
    pub fn set_register_long(
        &self,
        address: u8,
        params: &[u8; LONG_PARAM_LENGTH],
    ) -> Result<[u8; SHORT_PARAM_LENGTH], DispatcherError> {
        debug!("Setting long register 0x{:02x}", address);
        let mut results = [0u8; SHORT_PARAM_LENGTH];
        self.access_register(SubId::SetRegisterLong, address, params, &mut results)?;
        Ok(results)
    }

    /// Read a long register, returning the 16 result bytes.
    pub fn get_register_long(
        &self,
        address: u8,
        params: [u8; SHORT_PARAM_LENGTH],
    ) -> Result<[u8; LONG_PARAM_LENGTH], DispatcherError> {
        debug!("Getting long register 0x{:02x}", address);
        let mut results = [0u8; LONG_PARAM_LENGTH];
        self.access_register(SubId::GetRegisterLong, address, &params, &mut results)?;
        Ok(results)
    }

    /// Send one 16-byte flash data packet carrying `seq_num` in the
    /// address byte, then block for the firmware acknowledgement
    /// (sub ID 0x50, address equal to the sequence number). Any
    /// other acknowledged value is the firmware's write error code.
    pub fn send_data_packet(
        &self,
        sub_id: SubId,
        seq_num: u8,
        params: &[u8; LONG_PARAM_LENGTH],
        wait_for_ack: bool,
    ) -> Result<(), MemoryError> {
        debug!("Sending data packet {}", seq_num);
        let packet = Report::with_params10(self.index, sub_id.into(), seq_num, params)
            .expect("data packet parameters have a valid length");

        if !wait_for_ack {
            self.dispatcher.send_command_without_response(&packet)?;
            return Ok(());
        }

        // Subscribe before writing so the acknowledgement cannot be
        // routed before the listener exists.
        let ack = self
            .dispatcher
            .get_notification(self.index, SubId::SendDataAcknowledgement.into())?;
        self.dispatcher.send_command_without_response(&packet)?;
        let ack = ack.get_timeout(EXCHANGE_TIMEOUT).map_err(MemoryError::from)?;
        if ack.address() == seq_num {
            debug!("Data packet {} acknowledged", seq_num);
            Ok(())
        } else {
            debug!("Data packet {}: error 0x{:02x}", seq_num, ack.address());
            Err(MemoryError::Write(ack.address()))
        }
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::simple::SimpleDispatcher;
    use crate::dispatcher::test_util::MockDevice;
    use crate::logging::setup_logging_lite;

    #[test]
    fn short_register_roundtrip() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|report| {
            assert_eq!(report, &[0x10, 0xFF, 0x81, 0x0F, 0x00, 0x00, 0x00]);
            vec![vec![0x10, 0xFF, 0x81, 0x0F, 0x02, 0x00, 0x00]]
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let device = Device::new(&dispatcher, DeviceIndex::DefaultDevice);
        let results = device.get_register_short(0x0F, [0, 0, 0]).unwrap();
        assert_eq!(results, [0x02, 0x00, 0x00]);
    }

    #[test]
    fn long_register_read() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|report| {
            // Short request, long response
            assert_eq!(report[0], 0x10);
            assert_eq!(report[2], 0x83);
            assert_eq!(report[3], 0xA2);
            let mut response = vec![0x11, 0xFF, 0x83, 0xA2];
            response.extend((0u8..16).collect::<Vec<u8>>());
            vec![response]
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let device = Device::new(&dispatcher, DeviceIndex::DefaultDevice);
        let results = device
            .get_register_long(0xA2, [0x02, 0x00, 0x00])
            .unwrap();
        assert_eq!(results[..4], [0, 1, 2, 3]);
    }

    #[test]
    fn mismatched_result_length_is_rejected() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|_| {
            // Long report answering a short-register request
            let mut response = vec![0x11, 0xFF, 0x81, 0x0F];
            response.resize(20, 0);
            vec![response]
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let device = Device::new(&dispatcher, DeviceIndex::DefaultDevice);
        let err = device.get_register_short(0x0F, [0, 0, 0]).unwrap_err();
        match err {
            DispatcherError::InvalidResultLength => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn register_error_report() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|_| {
            vec![vec![0x10, 0xFF, 0x8F, 0x81, 0xFE, 0x01, 0x00]]
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let device = Device::new(&dispatcher, DeviceIndex::DefaultDevice);
        let err = device.get_register_short(0xFE, [0, 0, 0]).unwrap_err();
        match err {
            DispatcherError::Hidpp10(e) => assert_eq!(e, super::super::Error::InvalidSubId),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn data_packet_acknowledged() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|report| {
            assert_eq!(report[2], 0x90);
            let seq = report[3];
            vec![vec![0x10, 0xFF, 0x50, seq, 0x00, 0x00, 0x00]]
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let device = Device::new(&dispatcher, DeviceIndex::DefaultDevice);
        device
            .send_data_packet(SubId::SendDataBegin, 0, &[0u8; 16], true)
            .unwrap();
    }

    #[test]
    fn data_packet_write_error() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|_| {
            // Acknowledgement carrying an error code instead of the
            // sequence number
            vec![vec![0x10, 0xFF, 0x50, 0x07, 0x00, 0x00, 0x00]]
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let device = Device::new(&dispatcher, DeviceIndex::DefaultDevice);
        let err = device
            .send_data_packet(SubId::SendDataContinue, 3, &[0u8; 16], true)
            .unwrap_err();
        match err {
            MemoryError::Write(0x07) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
