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

//! Device-side page I/O for HID++1.0 flash memory.

// ----- Modules -----

use super::{Device, MemoryOperation, RegisterAddress, SubId, PAGE_SIZE};
use crate::address::Address;
use crate::memory::{MemoryBackend, MemoryError};
use crate::report::LONG_PARAM_LENGTH;

// ----- Consts -----

/// First data packet bytes taken by the destination header.
const FIRST_PACKET_HEADER_LENGTH: usize = 9;

// ----- Structs -----

/// [`MemoryBackend`] over the A0/A1/A2 register protocol.
///
/// Pages are 512 bytes, addressed in 16-bit words. Reads go through
/// the MemoryRead register in 16-byte chunks; writes fill the page,
/// reset the sequence number and stream 0x90/0x91 data packets, each
/// acknowledged synchronously by the firmware.
pub struct MemoryBackend10<'d> {
    dev: Device<'d>,
}

impl<'d> MemoryBackend10<'d> {
    pub fn new(dev: Device<'d>) -> MemoryBackend10<'d> {
        MemoryBackend10 { dev }
    }

    fn reset_sequence_number(&self) -> Result<(), MemoryError> {
        self.dev
            .set_register_short(RegisterAddress::ResetSeqNum.into(), [1, 0, 0])?;
        Ok(())
    }

    fn fill_page(&self, page: u8) -> Result<(), MemoryError> {
        let mut params = [0u8; LONG_PARAM_LENGTH];
        params[0] = MemoryOperation::Fill.into();
        params[6] = page;
        self.dev
            .set_register_long(RegisterAddress::MemoryOperation.into(), &params)?;
        Ok(())
    }

    fn write_mem(&self, page: u8, offset: u8, data: &[u8]) -> Result<(), MemoryError> {
        self.reset_sequence_number()?;

        let mut sent = 0;
        let mut seq_num = 0u8;
        let mut first = true;
        while sent < data.len() {
            let mut params = [0u8; LONG_PARAM_LENGTH];
            let sub_id;
            if first {
                sub_id = SubId::SendDataBegin;
                // First packet header: destination and total length
                params[0] = 0x01;
                params[1] = page;
                params[2] = offset;
                params[5..7].copy_from_slice(&(data.len() as u16).to_be_bytes());
                let len = (data.len() - sent).min(LONG_PARAM_LENGTH - FIRST_PACKET_HEADER_LENGTH);
                params[FIRST_PACKET_HEADER_LENGTH..FIRST_PACKET_HEADER_LENGTH + len]
                    .copy_from_slice(&data[..len]);
                sent += len;
                first = false;
            } else {
                sub_id = SubId::SendDataContinue;
                let len = (data.len() - sent).min(LONG_PARAM_LENGTH);
                params[..len].copy_from_slice(&data[sent..sent + len]);
                sent += len;
            }
            self.dev.send_data_packet(sub_id, seq_num, &params, true)?;
            seq_num = seq_num.wrapping_add(1);
        }
        Ok(())
    }
}

impl MemoryBackend for MemoryBackend10<'_> {
    fn sector_size(&self) -> usize {
        PAGE_SIZE
    }

    fn unit(&self) -> usize {
        2
    }

    fn read_page(&mut self, address: Address, data: &mut Vec<u8>) -> Result<(), MemoryError> {
        data.clear();
        data.resize(PAGE_SIZE, 0);
        let mut read = 0;
        let mut offset = 0u8; // word offset inside the page
        while read < PAGE_SIZE {
            let chunk = self.dev.get_register_long(
                RegisterAddress::MemoryRead.into(),
                [address.page, offset, 0],
            )?;
            let len = chunk.len().min(PAGE_SIZE - read);
            data[read..read + len].copy_from_slice(&chunk[..len]);
            read += len;
            offset = offset.wrapping_add((len / 2) as u8);
        }
        Ok(())
    }

    fn write_page(&mut self, address: Address, data: &[u8]) -> Result<(), MemoryError> {
        assert!(data.len() <= PAGE_SIZE, "page too big");
        self.fill_page(address.page)?;
        self.write_mem(address.page, 0, data)
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc;
    use crate::dispatcher::simple::SimpleDispatcher;
    use crate::dispatcher::test_util::MockDevice;
    use crate::logging::setup_logging_lite;
    use crate::memory::PagedMemory;
    use crate::report::DeviceIndex;
    use std::sync::{Arc, Mutex};

    /// Small firmware simulation answering the memory registers.
    struct FakeFlash {
        pages: std::collections::BTreeMap<u8, Vec<u8>>,
        writing: Vec<u8>,
        write_page: u8,
        expected_len: usize,
    }

    impl FakeFlash {
        fn new() -> FakeFlash {
            FakeFlash {
                pages: std::collections::BTreeMap::new(),
                writing: Vec::new(),
                write_page: 0,
                expected_len: 0,
            }
        }

        fn respond(&mut self, report: &[u8]) -> Vec<Vec<u8>> {
            match report[2] {
                0x83 if report[3] == 0xA2 => {
                    // MemoryRead: params are page, word offset
                    let page = report[4];
                    let offset = usize::from(report[5]) * 2;
                    let data = self
                        .pages
                        .entry(page)
                        .or_insert_with(|| vec![0xFF; 512]);
                    let mut response = vec![0x11, 0xFF, 0x83, 0xA2];
                    response.extend_from_slice(&data[offset..offset + 16]);
                    vec![response]
                }
                0x80 if report[3] == 0xA1 => {
                    // ResetSeqNum
                    vec![vec![0x10, 0xFF, 0x80, 0xA1, 0x00, 0x00, 0x00]]
                }
                0x82 if report[3] == 0xA0 => {
                    // MemoryOperation (fill)
                    vec![vec![0x10, 0xFF, 0x82, 0xA0, 0x00, 0x00, 0x00]]
                }
                0x90 => {
                    // First data packet: header + payload
                    self.write_page = report[5];
                    self.expected_len =
                        usize::from(u16::from_be_bytes([report[9], report[10]]));
                    self.writing = report[13..20].to_vec();
                    self.maybe_commit();
                    vec![vec![0x10, 0xFF, 0x50, report[3], 0x00, 0x00, 0x00]]
                }
                0x91 => {
                    self.writing.extend_from_slice(&report[4..20]);
                    self.maybe_commit();
                    vec![vec![0x10, 0xFF, 0x50, report[3], 0x00, 0x00, 0x00]]
                }
                _ => panic!("unexpected report: {:02x?}", report),
            }
        }

        fn maybe_commit(&mut self) {
            if self.writing.len() >= self.expected_len {
                let mut page = self.writing.clone();
                page.truncate(self.expected_len);
                page.resize(512, 0xFF);
                self.pages.insert(self.write_page, page);
            }
        }
    }

    fn flash_dispatcher() -> (Arc<Mutex<FakeFlash>>, SimpleDispatcher<MockDevice>) {
        let flash = Arc::new(Mutex::new(FakeFlash::new()));
        let responder_flash = flash.clone();
        let dev = MockDevice::with_responder(Box::new(move |report| {
            responder_flash.lock().unwrap().respond(report)
        }));
        (flash, SimpleDispatcher::new(dev).unwrap())
    }

    #[test]
    fn page_read_assembles_chunks() {
        setup_logging_lite().ok();
        let (flash, dispatcher) = flash_dispatcher();
        {
            let mut flash = flash.lock().unwrap();
            let mut page = vec![0u8; 512];
            for (i, byte) in page.iter_mut().enumerate() {
                *byte = i as u8;
            }
            flash.pages.insert(2, page);
        }
        let device = Device::new(&dispatcher, DeviceIndex::DefaultDevice);
        let mut backend = MemoryBackend10::new(device);
        let mut data = Vec::new();
        backend.read_page(Address::new(0, 2, 0), &mut data).unwrap();
        assert_eq!(data.len(), 512);
        assert_eq!(data[0], 0);
        assert_eq!(data[511], 0xFF);
        assert_eq!(data[256], 0);
    }

    #[test]
    fn full_page_write_with_crc_and_sequence_acks() {
        setup_logging_lite().ok();
        let (flash, dispatcher) = flash_dispatcher();
        let device = Device::new(&dispatcher, DeviceIndex::DefaultDevice);
        let backend = MemoryBackend10::new(device);
        let mut mem = PagedMemory::new(backend, true);

        let addr = Address::new(0, 3, 0);
        {
            let page = mem.writable_page(addr).unwrap();
            for (i, byte) in page[..510].iter_mut().enumerate() {
                *byte = (i * 3) as u8;
            }
        }
        mem.sync().unwrap();

        let flash = flash.lock().unwrap();
        let written = &flash.pages[&3];
        assert_eq!(written.len(), 512);
        // Payload round-tripped
        for i in 0..510 {
            assert_eq!(written[i], (i * 3) as u8, "payload byte {}", i);
        }
        // CRC-CCITT trailer, big-endian
        let crc = crc::ccitt_default(&written[..510]);
        assert_eq!(&written[510..512], &crc.to_be_bytes());
    }
}
