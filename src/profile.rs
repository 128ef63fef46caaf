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

//! Onboard profile data model and the format interfaces binding it to
//! device memory.

// ----- Modules -----

use crate::address::Address;
use crate::settings::{EnumDesc, SettingMap, SettingSchema};

// ----- Enumerations -----

/// Action bound to a physical button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    Disabled,
    /// Bitmask of HID mouse buttons.
    MouseButtons(u16),
    /// HID keyboard key with modifier mask.
    Key { modifiers: u8, key: u8 },
    /// HID consumer control code.
    ConsumerControl(u16),
    /// Firmware-special action, values per device family.
    Special(u16),
    /// Macro entry point in persistent memory.
    Macro(Address),
}

impl Default for Button {
    fn default() -> Button {
        Button::Disabled
    }
}

// ----- Structs -----

/// One persistent profile: general settings, per-mode settings and
/// the button list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Profile {
    pub settings: SettingMap,
    pub buttons: Vec<Button>,
    pub modes: Vec<SettingMap>,
}

/// Index of the stored profiles.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileDirectory {
    pub entries: Vec<ProfileDirectoryEntry>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileDirectoryEntry {
    pub profile_address: Address,
    pub settings: SettingMap,
}

// ----- Traits -----

/// Binds a fixed-size byte range of a sector to a [`Profile`].
///
/// Reading is a pure function of the byte range; unknown bits come
/// back as named integer settings so a read/write cycle is lossless.
/// Writing validates every setting against the schema and substitutes
/// defaults for missing or invalid values.
pub trait ProfileFormat {
    /// Profile record size in bytes.
    fn size(&self) -> usize;
    fn max_button_count(&self) -> usize;
    fn max_mode_count(&self) -> usize;

    fn general_settings(&self) -> &SettingSchema;
    fn mode_settings(&self) -> &SettingSchema;
    /// Values usable in [`Button::Special`] for this device family.
    fn special_actions(&self) -> &'static EnumDesc;

    fn read(&self, data: &[u8]) -> Profile;
    fn write(&self, profile: &Profile, data: &mut [u8]);
}

/// Reader/writer of the sentinel-terminated profile directory.
pub trait ProfileDirectoryFormat {
    /// Per-entry settings stored next to each profile address.
    fn settings(&self) -> &SettingSchema;
    /// Fixed location of the directory in device memory.
    fn first_address(&self) -> Address;

    fn read(&self, data: &[u8]) -> ProfileDirectory;
    fn write(&self, directory: &ProfileDirectory, data: &mut [u8]);
}
