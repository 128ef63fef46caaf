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

//! G9/G9x profile format.
//!
//! Single DPI value per mode and a default-mode byte whose bit 7 has
//! an unknown meaning, kept as its own boolean setting. The special
//! action table of this family is not confirmed; the G500 values are
//! used until proven otherwise.

// ----- Modules -----

use super::profile::{parse_button, write_button, BASIC_SPECIAL_ACTIONS, BUTTON_SIZE};
use super::sensor::Sensor;
use crate::profile::{Profile, ProfileFormat};
use crate::settings::{
    Color, EnumDesc, LedVector, Setting, SettingDesc, SettingLookup, SettingSchema,
};
use lazy_static::lazy_static;

// ----- Consts -----

const PROFILE_SIZE: usize = 56;
const MAX_BUTTON_COUNT: usize = 10;
const MAX_MODE_COUNT: usize = 5;
const LED_COUNT: usize = 4;

const MODE_SIZE: usize = 3;
const MODES_OFFSET: usize = 2;
const DEFAULT_DPI_OFFSET: usize = 19;
const UNKNOWN1_OFFSET: usize = 20;
const UNKNOWN2_OFFSET: usize = 21;
const REPORT_RATE_OFFSET: usize = 22;
const BUTTONS_OFFSET: usize = 23;
const UNKNOWN3_OFFSET: usize = 53;
const UNKNOWN4_OFFSET: usize = 54;
const UNKNOWN5_OFFSET: usize = 55;

lazy_static! {
    static ref GENERAL_SETTINGS: SettingSchema = vec![
        (
            "color".to_string(),
            SettingDesc::Color {
                default: Color { r: 255, g: 0, b: 0 },
            },
        ),
        ("unknown0".to_string(), SettingDesc::integer(0x00, 0xFF, 0x10)),
        (
            "default_dpi".to_string(),
            SettingDesc::integer(0, MAX_MODE_COUNT as i32 - 1, 0),
        ),
        (
            "default_dpi_bit7".to_string(),
            SettingDesc::Boolean { default: false },
        ),
        ("unknown1".to_string(), SettingDesc::integer(0x00, 0xFF, 0x21)),
        ("unknown2".to_string(), SettingDesc::integer(0x00, 0xFF, 0xA2)),
        ("report_rate".to_string(), SettingDesc::integer(1, 8, 4)),
        ("unknown3".to_string(), SettingDesc::integer(0x00, 0xFF, 0x8F)),
        ("unknown4".to_string(), SettingDesc::integer(0x00, 0xFF, 0x00)),
        ("unknown5".to_string(), SettingDesc::integer(0x00, 0xFF, 0x00)),
    ]
    .into_iter()
    .collect();
}

// ----- Structs -----

pub struct ProfileFormatG9<S: Sensor> {
    sensor: S,
    mode_settings: SettingSchema,
}

impl<S: Sensor> ProfileFormatG9<S> {
    pub fn new(sensor: S) -> ProfileFormatG9<S> {
        let dpi_setting = SettingDesc::integer(
            sensor.minimum_resolution() as i32,
            sensor.maximum_resolution() as i32,
            800.min(sensor.maximum_resolution()) as i32,
        );
        let mode_settings: SettingSchema = vec![
            ("dpi".to_string(), dpi_setting),
            ("leds".to_string(), SettingDesc::led_vector(LED_COUNT)),
        ]
        .into_iter()
        .collect();
        ProfileFormatG9 {
            sensor,
            mode_settings,
        }
    }
}

fn parse_leds(led_flags: u16) -> LedVector {
    let mut leds = LedVector::new();
    for j in 0..LED_COUNT {
        let led = (led_flags >> (4 * j)) & 0x0F;
        if led == 0 {
            break;
        }
        leds.push(led == 0x02);
    }
    leds
}

fn led_flags(leds: &[bool]) -> u16 {
    let mut flags = 0u16;
    for (j, led) in leds.iter().take(LED_COUNT).enumerate() {
        flags |= (if *led { 0x02 } else { 0x01 }) << (4 * j);
    }
    flags
}

impl<S: Sensor> ProfileFormat for ProfileFormatG9<S> {
    fn size(&self) -> usize {
        PROFILE_SIZE
    }

    fn max_button_count(&self) -> usize {
        MAX_BUTTON_COUNT
    }

    fn max_mode_count(&self) -> usize {
        MAX_MODE_COUNT
    }

    fn general_settings(&self) -> &SettingSchema {
        &GENERAL_SETTINGS
    }

    fn mode_settings(&self) -> &SettingSchema {
        &self.mode_settings
    }

    fn special_actions(&self) -> &'static EnumDesc {
        &BASIC_SPECIAL_ACTIONS
    }

    fn read(&self, data: &[u8]) -> Profile {
        let mut profile = Profile::default();

        profile.settings.insert(
            "color".to_string(),
            Setting::Color(Color {
                r: data[0],
                g: data[1],
                b: data[2],
            }),
        );
        profile.settings.insert(
            "unknown0".to_string(),
            Setting::Integer(i32::from(data[1])),
        );

        for i in 0..MAX_MODE_COUNT {
            let mode = &data[MODES_OFFSET + MODE_SIZE * i..];
            let dpi = mode[0];
            if i > 0 && dpi == 0 {
                break;
            }
            let leds = parse_leds(u16::from_le_bytes([mode[1], mode[2]]));
            profile.modes.push(
                vec![
                    (
                        "dpi".to_string(),
                        Setting::Integer(self.sensor.to_dpi(dpi.into()) as i32),
                    ),
                    ("leds".to_string(), Setting::LedVector(leds)),
                ]
                .into_iter()
                .collect(),
            );
        }

        let default_dpi = data[DEFAULT_DPI_OFFSET];
        profile.settings.insert(
            "default_dpi".to_string(),
            Setting::Integer(i32::from(default_dpi & !0x80)),
        );
        profile.settings.insert(
            "default_dpi_bit7".to_string(),
            Setting::Boolean(default_dpi & 0x80 != 0),
        );

        profile.settings.insert(
            "unknown1".to_string(),
            Setting::Integer(i32::from(data[UNKNOWN1_OFFSET])),
        );
        profile.settings.insert(
            "unknown2".to_string(),
            Setting::Integer(i32::from(data[UNKNOWN2_OFFSET])),
        );
        profile.settings.insert(
            "report_rate".to_string(),
            Setting::Integer(i32::from(data[REPORT_RATE_OFFSET])),
        );

        for i in 0..MAX_BUTTON_COUNT {
            profile
                .buttons
                .push(parse_button(&data[BUTTONS_OFFSET + BUTTON_SIZE * i..]));
        }

        profile.settings.insert(
            "unknown3".to_string(),
            Setting::Integer(i32::from(data[UNKNOWN3_OFFSET])),
        );
        profile.settings.insert(
            "unknown4".to_string(),
            Setting::Integer(i32::from(data[UNKNOWN4_OFFSET])),
        );
        profile.settings.insert(
            "unknown5".to_string(),
            Setting::Integer(i32::from(data[UNKNOWN5_OFFSET])),
        );
        profile
    }

    fn write(&self, profile: &Profile, data: &mut [u8]) {
        let general = SettingLookup::new(&profile.settings, &GENERAL_SETTINGS);

        let color: Color = general.get("color");
        data[0] = color.r;
        data[1] = color.g;
        data[2] = color.b;
        // Byte 1 doubles as an unknown field in the captures this
        // layout comes from; the explicit setting wins
        data[1] = general.get::<i32>("unknown0") as u8;

        for i in 0..MAX_MODE_COUNT {
            let mode = &mut data[MODES_OFFSET + MODE_SIZE * i..MODES_OFFSET + MODE_SIZE * (i + 1)];
            if i >= profile.modes.len() {
                for byte in mode.iter_mut() {
                    *byte = 0;
                }
            } else {
                let settings = SettingLookup::new(&profile.modes[i], &self.mode_settings);
                let dpi: i32 = settings.get("dpi");
                mode[0] = self.sensor.from_dpi(dpi as u32) as u8;
                let leds: LedVector = settings.get("leds");
                mode[1..3].copy_from_slice(&led_flags(&leds).to_le_bytes());
            }
        }

        let mut default_dpi = general.get::<i32>("default_dpi") as usize;
        if default_dpi >= profile.modes.len() {
            default_dpi = profile.modes.len().saturating_sub(1);
        }
        if general.get::<bool>("default_dpi_bit7") {
            default_dpi |= 0x80;
        }
        data[DEFAULT_DPI_OFFSET] = default_dpi as u8;

        data[UNKNOWN1_OFFSET] = general.get::<i32>("unknown1") as u8;
        data[UNKNOWN2_OFFSET] = general.get::<i32>("unknown2") as u8;
        data[REPORT_RATE_OFFSET] = general.get::<i32>("report_rate") as u8;

        for i in 0..MAX_BUTTON_COUNT {
            let button = profile.buttons.get(i).copied().unwrap_or_default();
            write_button(&mut data[BUTTONS_OFFSET + BUTTON_SIZE * i..], button);
        }

        data[UNKNOWN3_OFFSET] = general.get::<i32>("unknown3") as u8;
        data[UNKNOWN4_OFFSET] = general.get::<i32>("unknown4") as u8;
        data[UNKNOWN5_OFFSET] = general.get::<i32>("unknown5") as u8;
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hidpp10::sensor::ListSensor;
    use crate::logging::setup_logging_lite;

    fn format() -> ProfileFormatG9<ListSensor> {
        ProfileFormatG9::new(ListSensor::s6006())
    }

    #[test]
    fn bytes_roundtrip_losslessly() {
        setup_logging_lite().ok();
        let format = format();
        // Hand-built sector bytes: one mode, two buttons, bit 7 set
        // on the default mode byte
        let mut data = vec![0u8; PROFILE_SIZE];
        data[0] = 0x40; // color r
        data[1] = 0x10; // unknown0 (overlaps color g)
        data[2] = 0x81; // mode 0 dpi code 800 (overlaps color b)
        data[3] = 0x12; // mode 0 led flags
        data[4] = 0x11;
        data[DEFAULT_DPI_OFFSET] = 0x80;
        data[UNKNOWN1_OFFSET] = 0x21;
        data[UNKNOWN2_OFFSET] = 0xA2;
        data[REPORT_RATE_OFFSET] = 4;
        data[BUTTONS_OFFSET] = 0x81; // mouse button 1
        data[BUTTONS_OFFSET + 1] = 0x01;
        for i in 1..MAX_BUTTON_COUNT {
            data[BUTTONS_OFFSET + BUTTON_SIZE * i] = 0x8F; // disabled
        }
        data[UNKNOWN3_OFFSET] = 0x8F;

        let profile = format.read(&data);
        assert_eq!(profile.modes.len(), 1);
        assert_eq!(
            profile.modes[0]["dpi"],
            Setting::Integer(800)
        );
        assert_eq!(
            profile.settings["default_dpi_bit7"],
            Setting::Boolean(true)
        );
        assert_eq!(profile.settings["default_dpi"], Setting::Integer(0));

        let mut rewritten = vec![0u8; PROFILE_SIZE];
        format.write(&profile, &mut rewritten);
        assert_eq!(rewritten, data);
    }

    #[test]
    fn default_dpi_bit7_is_preserved() {
        setup_logging_lite().ok();
        let format = format();
        let mut profile = Profile::default();
        profile
            .settings
            .insert("default_dpi".to_string(), Setting::Integer(0));
        profile
            .settings
            .insert("default_dpi_bit7".to_string(), Setting::Boolean(true));
        profile.modes.push(
            vec![
                ("dpi".to_string(), Setting::Integer(400)),
                (
                    "leds".to_string(),
                    Setting::LedVector(vec![true, false, false, false]),
                ),
            ]
            .into_iter()
            .collect(),
        );
        let mut data = vec![0u8; PROFILE_SIZE];
        format.write(&profile, &mut data);
        assert_eq!(data[DEFAULT_DPI_OFFSET], 0x80);
    }
}
