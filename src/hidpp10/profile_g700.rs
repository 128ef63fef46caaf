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

//! G700/G700s profile format.
//!
//! Wireless variant of the register-based profiles: byte-wide DPI
//! codes, a power mode field and a tail of bytes with unknown roles
//! kept as named integer settings for lossless rewrites.

// ----- Modules -----

use super::profile::{parse_button, write_button, BUTTON_SIZE, EXTENDED_SPECIAL_ACTIONS};
use super::sensor::Sensor;
use crate::profile::{Profile, ProfileFormat};
use crate::settings::{
    EnumDesc, LedVector, Setting, SettingDesc, SettingLookup, SettingSchema,
};
use lazy_static::lazy_static;

// ----- Consts -----

const PROFILE_SIZE: usize = 74;
const MAX_BUTTON_COUNT: usize = 13;
const MAX_MODE_COUNT: usize = 5;
const LED_COUNT: usize = 4;

const MODE_SIZE: usize = 4;
const MODES_OFFSET: usize = 0;
const DEFAULT_DPI_OFFSET: usize = 20;
const ANGLE_OFFSET: usize = 21;
const ANGLE_SNAPPING_OFFSET: usize = 22;
const UNKNOWN0_OFFSET: usize = 23;
const REPORT_RATE_OFFSET: usize = 24;
const POWER_MODE_OFFSET: usize = 29;
const BUTTONS_OFFSET: usize = 35;

/// (name, offset, default) of the bytes with unknown roles.
const UNKNOWN_FIELDS: [(&str, usize, i32); 10] = [
    ("unknown1", 25, 0x00),
    ("unknown2", 26, 0x2C),
    ("unknown3", 27, 0x00),
    ("unknown4", 28, 0x58),
    ("unknown5", 30, 0xFF),
    ("unknown6", 31, 0xBC),
    ("unknown7", 32, 0x00),
    ("unknown8", 33, 0x09),
    ("unknown9", 34, 0x31),
    ("unknown0", UNKNOWN0_OFFSET, 0x10),
];

lazy_static! {
    static ref GENERAL_SETTINGS: SettingSchema = {
        let mut schema: SettingSchema = vec![
            (
                "default_dpi".to_string(),
                SettingDesc::integer(0, MAX_MODE_COUNT as i32 - 1, 0),
            ),
            ("angle".to_string(), SettingDesc::integer(0x00, 0xFF, 0x80)),
            (
                "angle_snapping".to_string(),
                SettingDesc::Boolean { default: false },
            ),
            ("report_rate".to_string(), SettingDesc::integer(1, 8, 4)),
            ("power_mode".to_string(), SettingDesc::integer(50, 200, 100)),
        ]
        .into_iter()
        .collect();
        for (name, _, default) in &UNKNOWN_FIELDS {
            schema.insert(
                (*name).to_string(),
                SettingDesc::integer(0x00, 0xFF, *default),
            );
        }
        schema
    };
}

// ----- Structs -----

pub struct ProfileFormatG700<S: Sensor> {
    sensor: S,
    mode_settings: SettingSchema,
}

impl<S: Sensor> ProfileFormatG700<S> {
    pub fn new(sensor: S) -> ProfileFormatG700<S> {
        let dpi_setting = SettingDesc::integer(
            sensor.minimum_resolution() as i32,
            sensor.maximum_resolution() as i32,
            800.min(sensor.maximum_resolution()) as i32,
        );
        let mode_settings: SettingSchema = vec![
            ("dpi_x".to_string(), dpi_setting.clone()),
            ("dpi_y".to_string(), dpi_setting),
            ("leds".to_string(), SettingDesc::led_vector(LED_COUNT)),
        ]
        .into_iter()
        .collect();
        ProfileFormatG700 {
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

impl<S: Sensor> ProfileFormat for ProfileFormatG700<S> {
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
        &EXTENDED_SPECIAL_ACTIONS
    }

    fn read(&self, data: &[u8]) -> Profile {
        let mut profile = Profile::default();

        for i in 0..MAX_MODE_COUNT {
            let mode = &data[MODES_OFFSET + MODE_SIZE * i..];
            let dpi_x = mode[0];
            if i > 0 && dpi_x == 0 {
                break;
            }
            let dpi_y = mode[1];
            let leds = parse_leds(u16::from_le_bytes([mode[2], mode[3]]));
            profile.modes.push(
                vec![
                    (
                        "dpi_x".to_string(),
                        Setting::Integer(self.sensor.to_dpi(dpi_x.into()) as i32),
                    ),
                    (
                        "dpi_y".to_string(),
                        Setting::Integer(self.sensor.to_dpi(dpi_y.into()) as i32),
                    ),
                    ("leds".to_string(), Setting::LedVector(leds)),
                ]
                .into_iter()
                .collect(),
            );
        }

        profile.settings.insert(
            "default_dpi".to_string(),
            Setting::Integer(i32::from(data[DEFAULT_DPI_OFFSET])),
        );
        profile.settings.insert(
            "angle".to_string(),
            Setting::Integer(i32::from(data[ANGLE_OFFSET])),
        );
        profile.settings.insert(
            "angle_snapping".to_string(),
            Setting::Boolean(data[ANGLE_SNAPPING_OFFSET] == 0x02),
        );
        profile.settings.insert(
            "report_rate".to_string(),
            Setting::Integer(i32::from(data[REPORT_RATE_OFFSET])),
        );
        profile.settings.insert(
            "power_mode".to_string(),
            Setting::Integer(i32::from(data[POWER_MODE_OFFSET])),
        );
        for (name, offset, _) in &UNKNOWN_FIELDS {
            profile.settings.insert(
                (*name).to_string(),
                Setting::Integer(i32::from(data[*offset])),
            );
        }

        for i in 0..MAX_BUTTON_COUNT {
            profile
                .buttons
                .push(parse_button(&data[BUTTONS_OFFSET + BUTTON_SIZE * i..]));
        }
        profile
    }

    fn write(&self, profile: &Profile, data: &mut [u8]) {
        let general = SettingLookup::new(&profile.settings, &GENERAL_SETTINGS);

        for i in 0..MAX_MODE_COUNT {
            let mode = &mut data[MODES_OFFSET + MODE_SIZE * i..MODES_OFFSET + MODE_SIZE * (i + 1)];
            if i >= profile.modes.len() {
                for byte in mode.iter_mut() {
                    *byte = 0;
                }
            } else {
                let settings = SettingLookup::new(&profile.modes[i], &self.mode_settings);
                let dpi_x: i32 = settings.get("dpi_x");
                mode[0] = self.sensor.from_dpi(dpi_x as u32) as u8;
                let dpi_y: i32 = settings.get_or("dpi_y", dpi_x);
                mode[1] = self.sensor.from_dpi(dpi_y as u32) as u8;
                let leds: LedVector = settings.get("leds");
                mode[2..4].copy_from_slice(&led_flags(&leds).to_le_bytes());
            }
        }

        let mut default_dpi = general.get::<i32>("default_dpi") as usize;
        if default_dpi >= profile.modes.len() {
            default_dpi = profile.modes.len().saturating_sub(1);
        }
        data[DEFAULT_DPI_OFFSET] = default_dpi as u8;

        data[ANGLE_OFFSET] = general.get::<i32>("angle") as u8;
        let angle_snapping: bool = general.get("angle_snapping");
        data[ANGLE_SNAPPING_OFFSET] = if angle_snapping { 0x02 } else { 0x01 };
        data[REPORT_RATE_OFFSET] = general.get::<i32>("report_rate") as u8;
        data[POWER_MODE_OFFSET] = general.get::<i32>("power_mode") as u8;
        for (name, offset, _) in &UNKNOWN_FIELDS {
            data[*offset] = general.get::<i32>(name) as u8;
        }

        for i in 0..MAX_BUTTON_COUNT {
            let button = profile.buttons.get(i).copied().unwrap_or_default();
            write_button(&mut data[BUTTONS_OFFSET + BUTTON_SIZE * i..], button);
        }
    }
}

// ----- Tests -----
