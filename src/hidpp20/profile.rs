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

//! HID++2.0 onboard profile format: one 256-byte sector per profile
//! with a UTF-16 name and two LED effect blocks.

// ----- Modules -----

use super::onboard_profiles::Description;
use crate::address::Address;
use crate::profile::{Button, Profile, ProfileFormat};
use crate::settings::{
    Color, ComposedSetting, EnumDesc, EnumValue, Setting, SettingDesc, SettingLookup,
    SettingSchema,
};
use lazy_static::lazy_static;

// ----- Consts -----

const PROFILE_SIZE: usize = 256;
const MAX_BUTTON_COUNT: usize = 16;
const MAX_MODE_COUNT: usize = 5;

const MODES_OFFSET: usize = 3;
const COLOR_OFFSET: usize = 13;
const POWER_MODE_OFFSET: usize = 16;
const ANGLE_SNAPPING_OFFSET: usize = 17;
const BUTTONS_OFFSET: usize = 32;
const BUTTON_SIZE: usize = 4;
const NAME_OFFSET: usize = 160;
const NAME_LENGTH: usize = 24; // UTF-16 code units
const LOGO_EFFECT_OFFSET: usize = 208;
const SIDE_EFFECT_OFFSET: usize = 219;
const EFFECT_SIZE: usize = 11;

// Button record tags
const BUTTON_HID: u8 = 0x80;
const BUTTON_SPECIAL: u8 = 0x90;
const BUTTON_MACRO: u8 = 0x00;
const BUTTON_DISABLED: u8 = 0xFF;

// HID button sub-types
const BUTTON_HID_MOUSE: u8 = 1;
const BUTTON_HID_KEY: u8 = 2;
const BUTTON_HID_CONSUMER_CONTROL: u8 = 3;

// LED effect types
const EFFECT_OFF: i32 = 0x00;
const EFFECT_CONSTANT: i32 = 0x01;
const EFFECT_CYCLE: i32 = 0x03;
const EFFECT_PULSE: i32 = 0x0A;

lazy_static! {
    pub static ref LED_EFFECTS: EnumDesc = EnumDesc::new(&[
        ("Off", EFFECT_OFF),
        ("Constant", EFFECT_CONSTANT),
        ("Cycle", EFFECT_CYCLE),
        ("Pulse", EFFECT_PULSE),
    ]);

    pub static ref POWER_MODES: EnumDesc = EnumDesc::new(&[("NotApplicable", 0xFF)]);

    static ref EFFECT_SETTINGS: SettingSchema = vec![
        (
            "type".to_string(),
            SettingDesc::Enum {
                desc: &LED_EFFECTS,
                default: EFFECT_CONSTANT,
            },
        ),
        (
            "color".to_string(),
            SettingDesc::Color {
                default: Color { r: 255, g: 255, b: 255 },
            },
        ),
        ("period".to_string(), SettingDesc::integer(0, 65535, 10000)),
        ("brightness".to_string(), SettingDesc::integer(0, 100, 100)),
    ]
    .into_iter()
    .collect();

    static ref GENERAL_SETTINGS: SettingSchema = vec![
        ("report_rate".to_string(), SettingDesc::integer(1, 8, 4)),
        (
            "default_dpi".to_string(),
            SettingDesc::integer(0, MAX_MODE_COUNT as i32 - 1, 0),
        ),
        (
            "switched_dpi".to_string(),
            SettingDesc::integer(0, MAX_MODE_COUNT as i32 - 1, 0),
        ),
        (
            "color".to_string(),
            SettingDesc::Color {
                default: Color { r: 255, g: 255, b: 255 },
            },
        ),
        (
            "power_mode".to_string(),
            SettingDesc::Enum {
                desc: &POWER_MODES,
                default: 0xFF,
            },
        ),
        (
            "angle_snapping".to_string(),
            SettingDesc::Boolean { default: false },
        ),
        ("unknown0".to_string(), SettingDesc::integer(0, 255, 255)),
        ("unknown1".to_string(), SettingDesc::integer(0, 255, 255)),
        (
            "name".to_string(),
            SettingDesc::String {
                default: String::new(),
            },
        ),
        (
            "logo_effect".to_string(),
            SettingDesc::Composed {
                sub_settings: EFFECT_SETTINGS.clone(),
            },
        ),
        (
            "side_effect".to_string(),
            SettingDesc::Composed {
                sub_settings: EFFECT_SETTINGS.clone(),
            },
        ),
    ]
    .into_iter()
    .collect();

    static ref MODE_SETTINGS: SettingSchema = vec![(
        "dpi".to_string(),
        SettingDesc::integer(0, 50000, 1200),
    )]
    .into_iter()
    .collect();

    pub static ref SPECIAL_ACTIONS: EnumDesc = EnumDesc::new(&[
        ("WheelLeft", 1),
        ("WheelRight", 2),
        ("ResolutionNext", 3),
        ("ResolutionPrev", 4),
        ("ResolutionDefault", 5),
        ("ResolutionCycle", 6),
        ("ResolutionSwitch", 7),
        ("ProfileCycle", 10),
        ("ModeSwitch", 11),
        ("BatteryLevel", 12),
    ]);
}

// ----- Functions -----

fn read_led_effect(data: &[u8]) -> ComposedSetting {
    let mut settings = ComposedSetting::new();
    let effect_type = data[0];
    match i32::from(effect_type) {
        EFFECT_OFF => {}
        EFFECT_CONSTANT => {
            settings.insert(
                "color".to_string(),
                Setting::Color(Color {
                    r: data[1],
                    g: data[2],
                    b: data[3],
                }),
            );
        }
        EFFECT_PULSE => {
            settings.insert(
                "color".to_string(),
                Setting::Color(Color {
                    r: data[2],
                    g: data[3],
                    b: data[4],
                }),
            );
            settings.insert(
                "period".to_string(),
                Setting::Integer(i32::from(u16::from_be_bytes([data[5], data[6]]))),
            );
            settings.insert(
                "brightness".to_string(),
                Setting::Integer(i32::from(data[8])),
            );
        }
        EFFECT_CYCLE => {
            settings.insert(
                "period".to_string(),
                Setting::Integer(i32::from(u16::from_be_bytes([data[7], data[8]]))),
            );
            settings.insert(
                "brightness".to_string(),
                Setting::Integer(i32::from(data[9])),
            );
        }
        _ => {
            error!("Invalid LED effect type 0x{:02x}", effect_type);
            return settings;
        }
    }
    settings.insert(
        "type".to_string(),
        Setting::Enum(EnumValue::new(&LED_EFFECTS, i32::from(effect_type))),
    );
    settings
}

fn write_led_effect(data: &mut [u8], effect: &ComposedSetting) {
    for byte in data[..EFFECT_SIZE].iter_mut() {
        *byte = 0;
    }
    let lookup = SettingLookup::new(effect, &EFFECT_SETTINGS);
    let effect_type: EnumValue = lookup.get("type");
    data[0] = effect_type.get() as u8;
    match effect_type.get() {
        EFFECT_CONSTANT => {
            let color: Color = lookup.get("color");
            data[1] = color.r;
            data[2] = color.g;
            data[3] = color.b;
        }
        EFFECT_PULSE => {
            let color: Color = lookup.get("color");
            data[2] = color.r;
            data[3] = color.g;
            data[4] = color.b;
            let period: i32 = lookup.get("period");
            data[5..7].copy_from_slice(&(period as u16).to_be_bytes());
            data[8] = lookup.get::<i32>("brightness") as u8;
        }
        EFFECT_CYCLE => {
            let period: i32 = lookup.get("period");
            data[7..9].copy_from_slice(&(period as u16).to_be_bytes());
            data[9] = lookup.get::<i32>("brightness") as u8;
        }
        _ => {}
    }
}

fn parse_button(data: &[u8]) -> Button {
    match data[0] {
        BUTTON_HID => match data[1] {
            BUTTON_HID_MOUSE => {
                Button::MouseButtons(u16::from_be_bytes([data[2], data[3]]))
            }
            BUTTON_HID_KEY => Button::Key {
                modifiers: data[2],
                key: data[3],
            },
            BUTTON_HID_CONSUMER_CONTROL => {
                Button::ConsumerControl(u16::from_be_bytes([data[2], data[3]]))
            }
            sub_type => {
                error!("Invalid HID button sub-type 0x{:02x}", sub_type);
                Button::Disabled
            }
        },
        BUTTON_SPECIAL => Button::Special(u16::from(data[1])),
        BUTTON_MACRO => {
            Button::Macro(Address::new(data[2], data[1], u16::from(data[3])))
        }
        BUTTON_DISABLED => Button::Disabled,
        tag => {
            error!("Invalid button type code 0x{:02x}", tag);
            Button::Disabled
        }
    }
}

fn write_button(data: &mut [u8], button: Button) {
    match button {
        Button::Disabled => {
            data[..BUTTON_SIZE].copy_from_slice(&[0xFF; BUTTON_SIZE]);
        }
        Button::MouseButtons(buttons) => {
            data[0] = BUTTON_HID;
            data[1] = BUTTON_HID_MOUSE;
            data[2..4].copy_from_slice(&buttons.to_be_bytes());
        }
        Button::Key { modifiers, key } => {
            data[0] = BUTTON_HID;
            data[1] = BUTTON_HID_KEY;
            data[2] = modifiers;
            data[3] = key;
        }
        Button::ConsumerControl(code) => {
            data[0] = BUTTON_HID;
            data[1] = BUTTON_HID_CONSUMER_CONTROL;
            data[2..4].copy_from_slice(&code.to_be_bytes());
        }
        Button::Special(code) => {
            data[0] = BUTTON_SPECIAL;
            data[1] = code as u8;
            data[2] = 0;
            data[3] = 0;
        }
        Button::Macro(address) => {
            data[0] = BUTTON_MACRO;
            data[1] = address.page;
            data[2] = address.mem_type;
            data[3] = address.offset as u8;
        }
    }
}

// ----- Structs -----

/// Profile format of onboard-profile devices (G402 family and later).
pub struct ProfileFormat20 {
    button_count: usize,
}

impl ProfileFormat20 {
    pub fn new(desc: &Description) -> ProfileFormat20 {
        ProfileFormat20 {
            button_count: usize::from(desc.button_count).min(MAX_BUTTON_COUNT),
        }
    }
}

impl Default for ProfileFormat20 {
    fn default() -> ProfileFormat20 {
        ProfileFormat20 {
            button_count: MAX_BUTTON_COUNT,
        }
    }
}

impl ProfileFormat for ProfileFormat20 {
    fn size(&self) -> usize {
        PROFILE_SIZE
    }

    fn max_button_count(&self) -> usize {
        self.button_count
    }

    fn max_mode_count(&self) -> usize {
        MAX_MODE_COUNT
    }

    fn general_settings(&self) -> &SettingSchema {
        &GENERAL_SETTINGS
    }

    fn mode_settings(&self) -> &SettingSchema {
        &MODE_SETTINGS
    }

    fn special_actions(&self) -> &'static EnumDesc {
        &SPECIAL_ACTIONS
    }

    fn read(&self, data: &[u8]) -> Profile {
        let mut profile = Profile::default();
        profile.settings.insert(
            "report_rate".to_string(),
            Setting::Integer(i32::from(data[0])),
        );
        profile.settings.insert(
            "default_dpi".to_string(),
            Setting::Integer(i32::from(data[1])),
        );
        profile.settings.insert(
            "switched_dpi".to_string(),
            Setting::Integer(i32::from(data[2])),
        );

        for i in 0..MAX_MODE_COUNT {
            let dpi = u16::from_le_bytes([
                data[MODES_OFFSET + 2 * i],
                data[MODES_OFFSET + 2 * i + 1],
            ]);
            if dpi == 0x0000 || dpi == 0xFFFF {
                break;
            }
            profile.modes.push(
                vec![("dpi".to_string(), Setting::Integer(i32::from(dpi)))]
                    .into_iter()
                    .collect(),
            );
        }

        profile.settings.insert(
            "color".to_string(),
            Setting::Color(Color {
                r: data[COLOR_OFFSET],
                g: data[COLOR_OFFSET + 1],
                b: data[COLOR_OFFSET + 2],
            }),
        );
        profile.settings.insert(
            "power_mode".to_string(),
            Setting::Enum(EnumValue::new(
                &POWER_MODES,
                i32::from(data[POWER_MODE_OFFSET]),
            )),
        );
        profile.settings.insert(
            "angle_snapping".to_string(),
            Setting::Boolean(data[ANGLE_SNAPPING_OFFSET] == 0x02),
        );
        profile.settings.insert(
            "unknown0".to_string(),
            Setting::Integer(i32::from(data[18])),
        );
        profile.settings.insert(
            "unknown1".to_string(),
            Setting::Integer(i32::from(data[19])),
        );

        for i in 0..self.button_count {
            profile
                .buttons
                .push(parse_button(&data[BUTTONS_OFFSET + BUTTON_SIZE * i..]));
        }

        let mut name_units = [0u16; NAME_LENGTH];
        for (i, unit) in name_units.iter_mut().enumerate() {
            *unit = u16::from_le_bytes([
                data[NAME_OFFSET + 2 * i],
                data[NAME_OFFSET + 2 * i + 1],
            ]);
        }
        let name_end = name_units
            .iter()
            .position(|unit| *unit == 0)
            .unwrap_or(NAME_LENGTH);
        profile.settings.insert(
            "name".to_string(),
            Setting::String(String::from_utf16_lossy(&name_units[..name_end])),
        );

        profile.settings.insert(
            "logo_effect".to_string(),
            Setting::Composed(read_led_effect(&data[LOGO_EFFECT_OFFSET..])),
        );
        profile.settings.insert(
            "side_effect".to_string(),
            Setting::Composed(read_led_effect(&data[SIDE_EFFECT_OFFSET..])),
        );
        profile
    }

    fn write(&self, profile: &Profile, data: &mut [u8]) {
        let general = SettingLookup::new(&profile.settings, &GENERAL_SETTINGS);

        data[0] = general.get::<i32>("report_rate") as u8;
        data[1] = general.get::<i32>("default_dpi") as u8;
        data[2] = general.get::<i32>("switched_dpi") as u8;

        for i in 0..MAX_MODE_COUNT {
            let dpi = if i >= profile.modes.len() {
                0
            } else {
                let settings = SettingLookup::new(&profile.modes[i], &MODE_SETTINGS);
                settings.get::<i32>("dpi") as u16
            };
            data[MODES_OFFSET + 2 * i..MODES_OFFSET + 2 * i + 2]
                .copy_from_slice(&dpi.to_le_bytes());
        }

        let color: Color = general.get("color");
        data[COLOR_OFFSET] = color.r;
        data[COLOR_OFFSET + 1] = color.g;
        data[COLOR_OFFSET + 2] = color.b;
        let power_mode: EnumValue = general.get("power_mode");
        data[POWER_MODE_OFFSET] = power_mode.get() as u8;
        let angle_snapping: bool = general.get("angle_snapping");
        data[ANGLE_SNAPPING_OFFSET] = if angle_snapping { 0x02 } else { 0x01 };
        data[18] = general.get::<i32>("unknown0") as u8;
        data[19] = general.get::<i32>("unknown1") as u8;

        for i in 0..self.button_count {
            let button = profile.buttons.get(i).copied().unwrap_or_default();
            write_button(&mut data[BUTTONS_OFFSET + BUTTON_SIZE * i..], button);
        }

        let name: String = general.get("name");
        let mut units = name.encode_utf16();
        for i in 0..NAME_LENGTH {
            let unit = units.next().unwrap_or(0);
            data[NAME_OFFSET + 2 * i..NAME_OFFSET + 2 * i + 2]
                .copy_from_slice(&unit.to_le_bytes());
        }

        let logo_effect: ComposedSetting = general.get("logo_effect");
        write_led_effect(&mut data[LOGO_EFFECT_OFFSET..], &logo_effect);
        let side_effect: ComposedSetting = general.get("side_effect");
        write_led_effect(&mut data[SIDE_EFFECT_OFFSET..], &side_effect);
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::setup_logging_lite;

    fn effect(entries: Vec<(&str, Setting)>) -> ComposedSetting {
        entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    fn sample_profile() -> Profile {
        let mut profile = Profile::default();
        profile
            .settings
            .insert("report_rate".to_string(), Setting::Integer(4));
        profile
            .settings
            .insert("default_dpi".to_string(), Setting::Integer(1));
        profile
            .settings
            .insert("switched_dpi".to_string(), Setting::Integer(2));
        profile.settings.insert(
            "color".to_string(),
            Setting::Color(Color { r: 1, g: 2, b: 3 }),
        );
        profile.settings.insert(
            "power_mode".to_string(),
            Setting::Enum(EnumValue::new(&POWER_MODES, 0xFF)),
        );
        profile
            .settings
            .insert("angle_snapping".to_string(), Setting::Boolean(true));
        profile
            .settings
            .insert("unknown0".to_string(), Setting::Integer(255));
        profile
            .settings
            .insert("unknown1".to_string(), Setting::Integer(255));
        profile.settings.insert(
            "name".to_string(),
            Setting::String("FPS profile".to_string()),
        );
        profile.settings.insert(
            "logo_effect".to_string(),
            Setting::Composed(effect(vec![
                (
                    "type",
                    Setting::Enum(EnumValue::new(&LED_EFFECTS, EFFECT_CONSTANT)),
                ),
                ("color", Setting::Color(Color { r: 0, g: 255, b: 0 })),
            ])),
        );
        profile.settings.insert(
            "side_effect".to_string(),
            Setting::Composed(effect(vec![
                (
                    "type",
                    Setting::Enum(EnumValue::new(&LED_EFFECTS, EFFECT_CYCLE)),
                ),
                ("period", Setting::Integer(5000)),
                ("brightness", Setting::Integer(80)),
            ])),
        );
        for dpi in &[400, 800, 1600] {
            profile.modes.push(
                vec![("dpi".to_string(), Setting::Integer(*dpi))]
                    .into_iter()
                    .collect(),
            );
        }
        profile.buttons = vec![
            Button::MouseButtons(0x0001),
            Button::Key {
                modifiers: 0x02,
                key: 0x04,
            },
            Button::ConsumerControl(0x00E9),
            Button::Special(11),
            Button::Macro(Address::new(0, 5, 0)),
            Button::Disabled,
        ];
        profile
    }

    #[test]
    fn roundtrip_preserves_settings() {
        setup_logging_lite().ok();
        let format = ProfileFormat20::default();
        let profile = sample_profile();
        let mut data = vec![0u8; format.size()];
        format.write(&profile, &mut data);
        let read_back = format.read(&data);
        assert_eq!(read_back.settings, profile.settings);
        assert_eq!(read_back.modes, profile.modes);
        assert_eq!(&read_back.buttons[..6], &profile.buttons[..]);
        assert!(read_back.buttons[6..]
            .iter()
            .all(|b| *b == Button::Disabled));
    }

    #[test]
    fn field_offsets() {
        setup_logging_lite().ok();
        let format = ProfileFormat20::default();
        let profile = sample_profile();
        let mut data = vec![0u8; format.size()];
        format.write(&profile, &mut data);

        assert_eq!(&data[0..3], &[4, 1, 2]);
        // DPI modes are little-endian
        assert_eq!(&data[3..9], &[0x90, 0x01, 0x20, 0x03, 0x40, 0x06]);
        // Unused modes zero-filled
        assert_eq!(&data[9..13], &[0, 0, 0, 0]);
        assert_eq!(&data[13..16], &[1, 2, 3]);
        assert_eq!(data[16], 0xFF);
        assert_eq!(data[17], 0x02);
        // Button records
        assert_eq!(&data[32..36], &[0x80, 0x01, 0x00, 0x01]);
        assert_eq!(&data[36..40], &[0x80, 0x02, 0x02, 0x04]);
        assert_eq!(&data[40..44], &[0x80, 0x03, 0x00, 0xE9]);
        assert_eq!(&data[44..48], &[0x90, 11, 0, 0]);
        assert_eq!(&data[48..52], &[0x00, 0x05, 0x00, 0x00]);
        assert_eq!(&data[52..56], &[0xFF, 0xFF, 0xFF, 0xFF]);
        // Name is UTF-16LE at 160
        assert_eq!(&data[160..166], &[b'F', 0, b'P', 0, b'S', 0]);
        // LED effect blocks
        assert_eq!(&data[208..212], &[0x01, 0, 255, 0]);
        assert_eq!(data[219], 0x03);
        assert_eq!(&data[226..229], &[0x13, 0x88, 80]);
    }

    #[test]
    fn mode_list_truncates_at_sentinel() {
        let format = ProfileFormat20::default();
        let mut data = vec![0u8; format.size()];
        format.write(&sample_profile(), &mut data);
        // Corrupt mode 1 with the erased-flash sentinel
        data[5] = 0xFF;
        data[6] = 0xFF;
        let profile = format.read(&data);
        assert_eq!(profile.modes.len(), 1);
    }

    #[test]
    fn long_names_are_truncated() {
        setup_logging_lite().ok();
        let format = ProfileFormat20::default();
        let mut profile = sample_profile();
        profile.settings.insert(
            "name".to_string(),
            Setting::String("A very long profile name that does not fit".to_string()),
        );
        let mut data = vec![0u8; format.size()];
        format.write(&profile, &mut data);
        let read_back = format.read(&data);
        let name = read_back.settings["name"].get::<String>().unwrap().clone();
        assert_eq!(name.encode_utf16().count(), NAME_LENGTH);
    }
}
