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

//! HID++2.0 profile directory: 4-byte entries (mem_type, page,
//! enabled, reserved) in sector 0, terminated by mem_type 0xFF.

// ----- Modules -----

use crate::address::Address;
use crate::profile::{ProfileDirectory, ProfileDirectoryEntry, ProfileDirectoryFormat};
use crate::settings::{Setting, SettingDesc, SettingLookup, SettingSchema};
use lazy_static::lazy_static;

// ----- Consts -----

const ENTRY_SIZE: usize = 4;
const SENTINEL: u8 = 0xFF;

lazy_static! {
    static ref SETTINGS: SettingSchema = vec![(
        "enabled".to_string(),
        SettingDesc::Boolean { default: true },
    )]
    .into_iter()
    .collect();
}

// ----- Structs -----

/// Directory format of onboard-profile devices.
#[derive(Default)]
pub struct DirectoryFormat20;

impl ProfileDirectoryFormat for DirectoryFormat20 {
    fn settings(&self) -> &SettingSchema {
        &SETTINGS
    }

    fn first_address(&self) -> Address {
        Address::new(0, 0, 0)
    }

    fn read(&self, data: &[u8]) -> ProfileDirectory {
        let mut directory = ProfileDirectory::default();
        let mut pos = 0;
        while pos + ENTRY_SIZE <= data.len() {
            let mem_type = data[pos];
            if mem_type == SENTINEL {
                break;
            }
            let page = data[pos + 1];
            let mut entry = ProfileDirectoryEntry {
                profile_address: Address::new(mem_type, page, 0),
                ..Default::default()
            };
            entry.settings.insert(
                "enabled".to_string(),
                Setting::Boolean(data[pos + 2] != 0),
            );
            // Byte 3 role is unknown
            directory.entries.push(entry);
            pos += ENTRY_SIZE;
        }
        directory
    }

    fn write(&self, directory: &ProfileDirectory, data: &mut [u8]) {
        let mut pos = 0;
        for entry in &directory.entries {
            let settings = SettingLookup::new(&entry.settings, &SETTINGS);
            data[pos] = entry.profile_address.mem_type;
            data[pos + 1] = entry.profile_address.page;
            data[pos + 2] = settings.get::<bool>("enabled") as u8;
            data[pos + 3] = 0;
            pos += ENTRY_SIZE;
        }
        data[pos] = SENTINEL;
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::setup_logging_lite;

    #[test]
    fn roundtrip_with_sentinel() {
        setup_logging_lite().ok();
        let format = DirectoryFormat20;
        let mut directory = ProfileDirectory::default();
        for page in 1..4u8 {
            let mut entry = ProfileDirectoryEntry {
                profile_address: Address::new(0, page, 0),
                ..Default::default()
            };
            entry
                .settings
                .insert("enabled".to_string(), Setting::Boolean(page != 2));
            directory.entries.push(entry);
        }
        let mut data = vec![0u8; 32];
        format.write(&directory, &mut data);
        assert_eq!(&data[0..4], &[0, 1, 1, 0]);
        assert_eq!(&data[4..8], &[0, 2, 0, 0]);
        assert_eq!(&data[8..12], &[0, 3, 1, 0]);
        assert_eq!(data[12], 0xFF);

        let read_back = format.read(&data);
        assert_eq!(read_back, directory);
    }

    #[test]
    fn directory_location() {
        assert_eq!(DirectoryFormat20.first_address(), Address::new(0, 0, 0));
    }
}
