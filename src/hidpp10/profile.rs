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

//! Profile pieces shared by the HID++1.0 formats: the 3-byte button
//! record and the special action tables.

// ----- Modules -----

use crate::address::Address;
use crate::profile::Button;
use crate::settings::EnumDesc;
use lazy_static::lazy_static;

// ----- Consts -----

pub const BUTTON_SIZE: usize = 3;

// Button record tags
const BUTTON_MOUSE: u8 = 0x81;
const BUTTON_KEY: u8 = 0x82;
const BUTTON_SPECIAL: u8 = 0x83;
const BUTTON_CONSUMER_CONTROL: u8 = 0x84;
const BUTTON_DISABLED: u8 = 0x8F;

// Special action codes
pub const WHEEL_LEFT: i32 = 0x01;
pub const WHEEL_RIGHT: i32 = 0x02;
pub const BATTERY_LEVEL: i32 = 0x03;
pub const RESOLUTION_NEXT: i32 = 0x04;
pub const RESOLUTION_CYCLE_NEXT: i32 = 0x05;
pub const RESOLUTION_PREV: i32 = 0x08;
pub const RESOLUTION_CYCLE_PREV: i32 = 0x09;
pub const PROFILE_NEXT: i32 = 0x10;
pub const PROFILE_CYCLE_NEXT: i32 = 0x11;
pub const PROFILE_PREV: i32 = 0x20;
pub const PROFILE_CYCLE_PREV: i32 = 0x21;
pub const PROFILE_SWITCH: i32 = 0x40;

lazy_static! {
    /// Actions of the G500 family.
    pub static ref BASIC_SPECIAL_ACTIONS: EnumDesc = EnumDesc::new(&[
        ("WheelLeft", WHEEL_LEFT),
        ("WheelRight", WHEEL_RIGHT),
        ("ResolutionNext", RESOLUTION_NEXT),
        ("ResolutionPrev", RESOLUTION_PREV),
        ("ProfileNext", PROFILE_NEXT),
        ("ProfilePrev", PROFILE_PREV),
        ("ProfileSwitch0", PROFILE_SWITCH),
        ("ProfileSwitch1", PROFILE_SWITCH + (1 << 8)),
        ("ProfileSwitch2", PROFILE_SWITCH + (2 << 8)),
        ("ProfileSwitch3", PROFILE_SWITCH + (3 << 8)),
        ("ProfileSwitch4", PROFILE_SWITCH + (4 << 8)),
    ]);

    /// Actions of the G700 family, with battery report and resolution
    /// cycling.
    pub static ref EXTENDED_SPECIAL_ACTIONS: EnumDesc = EnumDesc::new(&[
        ("WheelLeft", WHEEL_LEFT),
        ("WheelRight", WHEEL_RIGHT),
        ("BatteryLevel", BATTERY_LEVEL),
        ("ResolutionNext", RESOLUTION_NEXT),
        ("ResolutionCycleNext", RESOLUTION_CYCLE_NEXT),
        ("ResolutionPrev", RESOLUTION_PREV),
        ("ResolutionCyclePrev", RESOLUTION_CYCLE_PREV),
        ("ProfileNext", PROFILE_NEXT),
        ("ProfileCycleNext", PROFILE_CYCLE_NEXT),
        ("ProfilePrev", PROFILE_PREV),
        ("ProfileCyclePrev", PROFILE_CYCLE_PREV),
        ("ProfileSwitch0", PROFILE_SWITCH),
        ("ProfileSwitch1", PROFILE_SWITCH + (1 << 8)),
        ("ProfileSwitch2", PROFILE_SWITCH + (2 << 8)),
        ("ProfileSwitch3", PROFILE_SWITCH + (3 << 8)),
        ("ProfileSwitch4", PROFILE_SWITCH + (4 << 8)),
    ]);
}

// ----- Functions -----

/// Decode a 3-byte button record. Tags outside 0x81..0x8F are a macro
/// address (page, word offset).
pub fn parse_button(data: &[u8]) -> Button {
    match data[0] {
        BUTTON_MOUSE => Button::MouseButtons(u16::from_le_bytes([data[1], data[2]])),
        BUTTON_KEY => Button::Key {
            modifiers: data[1],
            key: data[2],
        },
        BUTTON_SPECIAL => Button::Special(u16::from_le_bytes([data[1], data[2]])),
        BUTTON_CONSUMER_CONTROL => {
            Button::ConsumerControl(u16::from_le_bytes([data[1], data[2]]))
        }
        BUTTON_DISABLED => Button::Disabled,
        page => Button::Macro(Address::new(0, page, u16::from(data[1]))),
    }
}

/// Encode a button into its 3-byte record.
pub fn write_button(data: &mut [u8], button: Button) {
    match button {
        Button::Disabled => {
            data[0] = BUTTON_DISABLED;
            data[1] = 0;
            data[2] = 0;
        }
        Button::MouseButtons(buttons) => {
            data[0] = BUTTON_MOUSE;
            data[1..3].copy_from_slice(&buttons.to_le_bytes());
        }
        Button::Key { modifiers, key } => {
            data[0] = BUTTON_KEY;
            data[1] = modifiers;
            data[2] = key;
        }
        Button::ConsumerControl(code) => {
            data[0] = BUTTON_CONSUMER_CONTROL;
            data[1..3].copy_from_slice(&code.to_le_bytes());
        }
        Button::Special(code) => {
            data[0] = BUTTON_SPECIAL;
            data[1..3].copy_from_slice(&code.to_le_bytes());
        }
        Button::Macro(address) => {
            data[0] = address.page;
            data[1] = address.offset as u8;
            data[2] = 0;
        }
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_record_roundtrip() {
        let buttons = [
            Button::Disabled,
            Button::MouseButtons(0x0005),
            Button::Key {
                modifiers: 0x02,
                key: 0x04,
            },
            Button::ConsumerControl(0x00E9),
            Button::Special(0x0140),
            Button::Macro(Address::new(0, 0x03, 0x20)),
        ];
        for button in &buttons {
            let mut data = [0u8; BUTTON_SIZE];
            write_button(&mut data, *button);
            assert_eq!(parse_button(&data), *button, "record {:02x?}", data);
        }
    }

    #[test]
    fn button_record_encodings() {
        let mut data = [0u8; BUTTON_SIZE];
        write_button(&mut data, Button::MouseButtons(0x0102));
        assert_eq!(data, [0x81, 0x02, 0x01]);
        write_button(&mut data, Button::Special(0x0440));
        assert_eq!(data, [0x83, 0x40, 0x04]);
        write_button(&mut data, Button::Macro(Address::new(0, 0x11, 0x42)));
        assert_eq!(data, [0x11, 0x42, 0x00]);
        write_button(&mut data, Button::Disabled);
        assert_eq!(data, [0x8F, 0x00, 0x00]);
    }

    #[test]
    fn special_action_tables() {
        assert_eq!(BASIC_SPECIAL_ACTIONS.from_name("WheelLeft"), Ok(0x01));
        assert_eq!(
            BASIC_SPECIAL_ACTIONS.from_name("ProfileSwitch2"),
            Ok(0x40 + (2 << 8))
        );
        assert!(BASIC_SPECIAL_ACTIONS.from_name("BatteryLevel").is_err());
        assert_eq!(EXTENDED_SPECIAL_ACTIONS.from_name("BatteryLevel"), Ok(0x03));
    }
}
