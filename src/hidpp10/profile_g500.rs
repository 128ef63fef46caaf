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

//! G500/G500s profile format.

// ----- Modules -----

use super::profile::{parse_button, write_button, BASIC_SPECIAL_ACTIONS, BUTTON_SIZE};
use super::sensor::Sensor;
use crate::profile::{Button, Profile, ProfileFormat};
use crate::settings::{
    Color, EnumDesc, LedVector, Setting, SettingDesc, SettingLookup, SettingSchema,
};
use lazy_static::lazy_static;

// ----- Consts -----

const PROFILE_SIZE: usize = 78;
const MAX_BUTTON_COUNT: usize = 13;
const MAX_MODE_COUNT: usize = 5;
const LED_COUNT: usize = 4;

const MODE_SIZE: usize = 6;
const MODES_OFFSET: usize = 4;
const BUTTONS_OFFSET: usize = 39;

lazy_static! {
    static ref GENERAL_SETTINGS: SettingSchema = vec![
        (
            "color".to_string(),
            SettingDesc::Color {
                default: Color { r: 255, g: 0, b: 0 },
            },
        ),
        ("angle".to_string(), SettingDesc::integer(0x00, 0xFF, 0x80)),
        (
            "angle_snapping".to_string(),
            SettingDesc::Boolean { default: false },
        ),
        (
            "default_dpi".to_string(),
            SettingDesc::integer(0, MAX_MODE_COUNT as i32 - 1, 0),
        ),
        (
            "lift_threshold".to_string(),
            SettingDesc::integer(-15, 15, 0),
        ),
        ("unknown".to_string(), SettingDesc::integer(0x00, 0xFF, 0x10)),
        ("report_rate".to_string(), SettingDesc::integer(1, 8, 4)),
    ]
    .into_iter()
    .collect();
}

// ----- Structs -----

pub struct ProfileFormatG500<S: Sensor> {
    sensor: S,
    mode_settings: SettingSchema,
}

impl<S: Sensor> ProfileFormatG500<S> {
    pub fn new(sensor: S) -> ProfileFormatG500<S> {
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
        ProfileFormatG500 {
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

impl<S: Sensor> ProfileFormat for ProfileFormatG500<S> {
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
        profile
            .settings
            .insert("angle".to_string(), Setting::Integer(i32::from(data[3])));

        for i in 0..MAX_MODE_COUNT {
            let mode = &data[MODES_OFFSET + MODE_SIZE * i..];
            let dpi_x = u16::from_be_bytes([mode[0], mode[1]]);
            if i > 0 && dpi_x == 0 {
                break;
            }
            let dpi_y = u16::from_be_bytes([mode[2], mode[3]]);
            let leds = parse_leds(u16::from_le_bytes([mode[4], mode[5]]));
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
            "angle_snapping".to_string(),
            Setting::Boolean(data[34] == 0x02),
        );
        profile.settings.insert(
            "default_dpi".to_string(),
            Setting::Integer(i32::from(data[35])),
        );
        profile.settings.insert(
            "lift_threshold".to_string(),
            Setting::Integer(i32::from(data[36]) - 16),
        );
        profile.settings.insert(
            "unknown".to_string(),
            Setting::Integer(i32::from(data[37])),
        );
        profile.settings.insert(
            "report_rate".to_string(),
            Setting::Integer(i32::from(data[38])),
        );

        for i in 0..MAX_BUTTON_COUNT {
            profile
                .buttons
                .push(parse_button(&data[BUTTONS_OFFSET + BUTTON_SIZE * i..]));
        }
        profile
    }

    fn write(&self, profile: &Profile, data: &mut [u8]) {
        let general = SettingLookup::new(&profile.settings, &GENERAL_SETTINGS);

        let color: Color = general.get("color");
        data[0] = color.r;
        data[1] = color.g;
        data[2] = color.b;
        data[3] = general.get::<i32>("angle") as u8;

        for i in 0..MAX_MODE_COUNT {
            let mode = &mut data[MODES_OFFSET + MODE_SIZE * i..MODES_OFFSET + MODE_SIZE * (i + 1)];
            if i >= profile.modes.len() {
                for byte in mode.iter_mut() {
                    *byte = 0;
                }
            } else {
                let settings = SettingLookup::new(&profile.modes[i], &self.mode_settings);
                let dpi_x: i32 = settings.get("dpi_x");
                mode[0..2].copy_from_slice(
                    &(self.sensor.from_dpi(dpi_x as u32) as u16).to_be_bytes(),
                );
                let dpi_y: i32 = settings.get_or("dpi_y", dpi_x);
                mode[2..4].copy_from_slice(
                    &(self.sensor.from_dpi(dpi_y as u32) as u16).to_be_bytes(),
                );
                let leds: LedVector = settings.get("leds");
                mode[4..6].copy_from_slice(&led_flags(&leds).to_le_bytes());
            }
        }

        let angle_snapping: bool = general.get("angle_snapping");
        data[34] = if angle_snapping { 0x02 } else { 0x01 };

        let mut default_dpi = general.get::<i32>("default_dpi") as usize;
        if default_dpi >= profile.modes.len() {
            default_dpi = profile.modes.len().saturating_sub(1);
        }
        data[35] = default_dpi as u8;

        data[36] = (16 + general.get::<i32>("lift_threshold")) as u8;
        data[37] = general.get::<i32>("unknown") as u8;
        data[38] = general.get::<i32>("report_rate") as u8;

        for i in 0..MAX_BUTTON_COUNT {
            let button = profile.buttons.get(i).copied().unwrap_or_default();
            write_button(
                &mut data[BUTTONS_OFFSET + BUTTON_SIZE * i..],
                button,
            );
        }
    }
}

// ----- Tests -----
