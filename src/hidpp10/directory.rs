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

//! HID++1.0 profile directory: 3-byte entries (page, offset, LED
//! bitmask) in page 1, terminated by page 0xFF.

// ----- Modules -----

use crate::address::Address;
use crate::profile::{ProfileDirectory, ProfileDirectoryEntry, ProfileDirectoryFormat};
use crate::settings::{LedVector, Setting, SettingDesc, SettingLookup, SettingSchema};

// ----- Consts -----

const ENTRY_SIZE: usize = 3;
const SENTINEL: u8 = 0xFF;

// ----- Structs -----

/// Directory format of the register-based mice, with a per-entry LED
/// bitmask showing which profile is active.
pub struct DirectoryFormat10 {
    led_count: usize,
    settings: SettingSchema,
}

impl DirectoryFormat10 {
    pub fn new(led_count: usize) -> DirectoryFormat10 {
        let mut settings = SettingSchema::new();
        if led_count > 0 {
            settings.insert("leds".to_string(), SettingDesc::led_vector(led_count));
        }
        DirectoryFormat10 {
            led_count,
            settings,
        }
    }
}

impl Default for DirectoryFormat10 {
    fn default() -> DirectoryFormat10 {
        DirectoryFormat10::new(4)
    }
}

impl ProfileDirectoryFormat for DirectoryFormat10 {
    fn settings(&self) -> &SettingSchema {
        &self.settings
    }

    fn first_address(&self) -> Address {
        Address::new(0, 1, 0)
    }

    fn read(&self, data: &[u8]) -> ProfileDirectory {
        let mut directory = ProfileDirectory::default();
        let mut pos = 0;
        while pos + ENTRY_SIZE <= data.len() {
            let page = data[pos];
            if page == SENTINEL {
                break;
            }
            let offset = data[pos + 1];
            let mut entry = ProfileDirectoryEntry {
                profile_address: Address::new(0, page, u16::from(offset)),
                ..Default::default()
            };
            if self.led_count > 0 {
                let bits = data[pos + 2];
                let leds: LedVector =
                    (0..self.led_count).map(|i| bits & (1 << i) != 0).collect();
                entry
                    .settings
                    .insert("leds".to_string(), Setting::LedVector(leds));
            }
            directory.entries.push(entry);
            pos += ENTRY_SIZE;
        }
        directory
    }

    fn write(&self, directory: &ProfileDirectory, data: &mut [u8]) {
        let mut pos = 0;
        for entry in &directory.entries {
            data[pos] = entry.profile_address.page;
            data[pos + 1] = entry.profile_address.offset as u8;
            data[pos + 2] = 0;
            if self.led_count > 0 {
                let settings = SettingLookup::new(&entry.settings, &self.settings);
                let leds: LedVector = settings.get("leds");
                for (i, led) in leds.iter().take(self.led_count).enumerate() {
                    if *led {
                        data[pos + 2] |= 1 << i;
                    }
                }
            }
            pos += ENTRY_SIZE;
        }
        data[pos] = SENTINEL;
    }
}

// ----- Tests -----
