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

//! Read-modify-write cache over the device's paged memory.
//!
//! Pages are filled from the device on first access and written back
//! by [`PagedMemory::sync`], optionally with a CRC-CCITT trailer in
//! the last two bytes as the firmware expects.

// ----- Modules -----

use crate::address::Address;
use crate::crc;
use crate::dispatcher::DispatcherError;
use core::fmt;
use std::collections::BTreeMap;

// ----- Structs -----

/// Paged memory access failure.
#[derive(Debug)]
pub enum MemoryError {
    /// Protocol or transport failure while talking to the device.
    Dispatcher(DispatcherError),
    /// The device rejected a write data packet with this error code.
    Write(u8),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::Dispatcher(e) => write!(f, "{}", e),
            MemoryError::Write(code) => {
                write!(f, "error code 0x{:02x} while writing data", code)
            }
        }
    }
}

impl std::error::Error for MemoryError {}

impl From<DispatcherError> for MemoryError {
    fn from(e: DispatcherError) -> MemoryError {
        MemoryError::Dispatcher(e)
    }
}

// ----- Traits -----

/// Device-side page I/O, one implementation per protocol version.
pub trait MemoryBackend {
    /// Page size in bytes.
    fn sector_size(&self) -> usize;

    /// Addressable unit in bytes: 2 for HID++1.0 (16-bit words),
    /// 1 for HID++2.0.
    fn unit(&self) -> usize;

    /// Fill `data` with the page at `address` (offset ignored).
    fn read_page(&mut self, address: Address, data: &mut Vec<u8>) -> Result<(), MemoryError>;

    /// Write a full page at `address` (offset ignored).
    fn write_page(&mut self, address: Address, data: &[u8]) -> Result<(), MemoryError>;
}

// ----- Paged memory -----

struct Page {
    data: Vec<u8>,
    modified: bool,
}

/// Page cache keyed by (mem_type, page).
///
/// Pages are never evicted before [`PagedMemory::sync`]; borrowed
/// page slices stay valid within one frame of work but must not be
/// held across a sync.
pub struct PagedMemory<B: MemoryBackend> {
    backend: B,
    write_crc: bool,
    pages: BTreeMap<(u8, u8), Page>,
}

impl<B: MemoryBackend> PagedMemory<B> {
    pub fn new(backend: B, write_crc: bool) -> PagedMemory<B> {
        PagedMemory {
            backend,
            write_crc,
            pages: BTreeMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn sector_size(&self) -> usize {
        self.backend.sector_size()
    }

    /// Byte index inside the page for `address`.
    pub fn index_of(&self, address: Address) -> usize {
        usize::from(address.offset) * self.backend.unit()
    }

    /// Address of the byte index inside the page holding `address`,
    /// `None` when the index is not on an addressable unit (odd byte
    /// positions have no address on word-addressed devices).
    pub fn offset_of(&self, page: Address, index: usize) -> Option<Address> {
        let unit = self.backend.unit();
        if index % unit != 0 {
            return None;
        }
        Some(Address {
            mem_type: page.mem_type,
            page: page.page,
            offset: (index / unit) as u16,
        })
    }

    fn page(&mut self, address: Address) -> Result<&mut Page, MemoryError> {
        let key = address.page_key();
        if !self.pages.contains_key(&key) {
            let mut data = Vec::new();
            self.backend.read_page(address.page_start(), &mut data)?;
            self.pages.insert(
                key,
                Page {
                    data,
                    modified: false,
                },
            );
        }
        Ok(self.pages.get_mut(&key).unwrap())
    }

    /// Full page bytes at `address` (offset ignored), read from the
    /// device on first access.
    pub fn read_only_page(&mut self, address: Address) -> Result<&[u8], MemoryError> {
        Ok(&self.page(address)?.data)
    }

    /// Full page bytes at `address`, marked dirty.
    pub fn writable_page(&mut self, address: Address) -> Result<&mut [u8], MemoryError> {
        let page = self.page(address)?;
        page.modified = true;
        Ok(&mut page.data)
    }

    /// Write every dirty page back to the device, stamping the CRC
    /// trailer first when enabled. A write failure aborts the sync;
    /// the failed page stays dirty so the sync can be retried.
    pub fn sync(&mut self) -> Result<(), MemoryError> {
        let write_crc = self.write_crc;
        for (key, page) in self.pages.iter_mut() {
            if !page.modified {
                continue;
            }
            if write_crc {
                let len = page.data.len();
                let crc = crc::ccitt_default(&page.data[..len - 2]);
                page.data[len - 2..].copy_from_slice(&crc.to_be_bytes());
            }
            let address = Address::new(key.0, key.1, 0);
            self.backend.write_page(address, &page.data)?;
            page.modified = false;
        }
        Ok(())
    }
}

// ----- Test helpers -----

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// In-memory backend; unknown pages read as 0xFF like erased
    /// flash.
    pub struct MockBackend {
        pub sector_size: usize,
        pub unit: usize,
        pub pages: BTreeMap<(u8, u8), Vec<u8>>,
        pub writes: Vec<Address>,
    }

    impl MockBackend {
        pub fn hidpp10() -> MockBackend {
            MockBackend {
                sector_size: 512,
                unit: 2,
                pages: BTreeMap::new(),
                writes: Vec::new(),
            }
        }

        pub fn hidpp20(sector_size: usize) -> MockBackend {
            MockBackend {
                sector_size,
                unit: 1,
                pages: BTreeMap::new(),
                writes: Vec::new(),
            }
        }
    }

    impl MemoryBackend for MockBackend {
        fn sector_size(&self) -> usize {
            self.sector_size
        }

        fn unit(&self) -> usize {
            self.unit
        }

        fn read_page(
            &mut self,
            address: Address,
            data: &mut Vec<u8>,
        ) -> Result<(), MemoryError> {
            data.clear();
            match self.pages.get(&address.page_key()) {
                Some(page) => data.extend_from_slice(page),
                None => data.resize(self.sector_size, 0xFF),
            }
            Ok(())
        }

        fn write_page(&mut self, address: Address, data: &[u8]) -> Result<(), MemoryError> {
            self.writes.push(address);
            self.pages.insert(address.page_key(), data.to_vec());
            Ok(())
        }
    }
}

// ----- Tests -----
