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

//! Typed profile values and their schemas.
//!
//! Profiles carry settings as name/value maps. [`Setting`] is the
//! value container, [`SettingDesc`] its schema used for validation
//! and default fill-in, and [`SettingLookup`] the write-side helper
//! substituting defaults for missing or invalid values.

// ----- Modules -----

use core::fmt;
use std::collections::BTreeMap;

// ----- Types -----

pub type LedVector = Vec<bool>;
pub type ComposedSetting = BTreeMap<String, Setting>;
pub type SettingMap = BTreeMap<String, Setting>;
pub type SettingSchema = BTreeMap<String, SettingDesc>;

// ----- Structs -----

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Named integer values of an enumerated setting.
#[derive(Debug)]
pub struct EnumDesc {
    values: Vec<(&'static str, i32)>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SettingError {
    /// `get` with a type not matching the stored value.
    TypeMismatch,
    /// Integer outside the schema range.
    OutOfRange,
    /// Value (or name) not part of the enum.
    InvalidEnumValue,
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::TypeMismatch => write!(f, "invalid setting type"),
            SettingError::OutOfRange => write!(f, "integer setting is out of range"),
            SettingError::InvalidEnumValue => write!(f, "invalid enum value"),
        }
    }
}

impl std::error::Error for SettingError {}

impl EnumDesc {
    pub fn new(values: &[(&'static str, i32)]) -> EnumDesc {
        EnumDesc {
            values: values.to_vec(),
        }
    }

    pub fn entries(&self) -> &[(&'static str, i32)] {
        &self.values
    }

    pub fn from_name(&self, name: &str) -> Result<i32, SettingError> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .ok_or(SettingError::InvalidEnumValue)
    }

    pub fn to_name(&self, value: i32) -> Result<&'static str, SettingError> {
        self.values
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| *n)
            .ok_or(SettingError::InvalidEnumValue)
    }

    pub fn check(&self, value: i32) -> bool {
        self.values.iter().any(|(_, v)| *v == value)
    }
}

/// Value of an enumerated setting, bound to its descriptor.
#[derive(Clone, Copy, Debug)]
pub struct EnumValue {
    desc: &'static EnumDesc,
    value: i32,
}

impl EnumValue {
    pub fn new(desc: &'static EnumDesc, value: i32) -> EnumValue {
        EnumValue { desc, value }
    }

    pub fn get(&self) -> i32 {
        self.value
    }

    pub fn set(&mut self, value: i32) {
        self.value = value;
    }

    pub fn desc(&self) -> &'static EnumDesc {
        self.desc
    }

    pub fn name(&self) -> Result<&'static str, SettingError> {
        self.desc.to_name(self.value)
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &EnumValue) -> bool {
        std::ptr::eq(self.desc, other.desc) && self.value == other.value
    }
}

impl Eq for EnumValue {}

// ----- Enumerations -----

/// Setting value kinds, used for schema checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingKind {
    String,
    Boolean,
    Integer,
    LedVector,
    Color,
    Composed,
    Enum,
}

/// Tagged setting value.
#[derive(Clone, Debug, PartialEq)]
pub enum Setting {
    String(String),
    Boolean(bool),
    Integer(i32),
    LedVector(LedVector),
    Color(Color),
    Composed(ComposedSetting),
    Enum(EnumValue),
}

impl Setting {
    pub fn kind(&self) -> SettingKind {
        match self {
            Setting::String(_) => SettingKind::String,
            Setting::Boolean(_) => SettingKind::Boolean,
            Setting::Integer(_) => SettingKind::Integer,
            Setting::LedVector(_) => SettingKind::LedVector,
            Setting::Color(_) => SettingKind::Color,
            Setting::Composed(_) => SettingKind::Composed,
            Setting::Enum(_) => SettingKind::Enum,
        }
    }

    /// Typed access, failing on kind mismatch.
    pub fn get<T: SettingValue>(&self) -> Result<&T, SettingError> {
        T::from_setting(self).ok_or(SettingError::TypeMismatch)
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::String(s) => write!(f, "{}", s),
            Setting::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Setting::Integer(i) => write!(f, "{}", i),
            Setting::LedVector(leds) => {
                for led in leds {
                    write!(f, "{}", if *led { '1' } else { '0' })?;
                }
                Ok(())
            }
            Setting::Color(c) => write!(f, "{:02x}{:02x}{:02x}", c.r, c.g, c.b),
            Setting::Enum(e) => match e.name() {
                Ok(name) => write!(f, "{}", name),
                Err(_) => write!(f, "{}", e.get()),
            },
            Setting::Composed(map) => {
                let mut first = true;
                for (name, value) in map {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

/// Conversion between [`Setting`] and the concrete value types.
pub trait SettingValue: Sized {
    fn from_setting(setting: &Setting) -> Option<&Self>;
    fn into_setting(self) -> Setting;
}

macro_rules! setting_value {
    ($type:ty, $variant:ident) => {
        impl SettingValue for $type {
            fn from_setting(setting: &Setting) -> Option<&$type> {
                match setting {
                    Setting::$variant(value) => Some(value),
                    _ => None,
                }
            }
            fn into_setting(self) -> Setting {
                Setting::$variant(self)
            }
        }
    };
}

setting_value!(String, String);
setting_value!(bool, Boolean);
setting_value!(i32, Integer);
setting_value!(LedVector, LedVector);
setting_value!(Color, Color);
setting_value!(ComposedSetting, Composed);
setting_value!(EnumValue, Enum);

/// Schema of one setting: kind, constraints, default.
#[derive(Clone, Debug)]
pub enum SettingDesc {
    String {
        default: String,
    },
    Boolean {
        default: bool,
    },
    Integer {
        min: i32,
        max: i32,
        default: i32,
    },
    LedVector {
        led_count: usize,
        default: LedVector,
    },
    Color {
        default: Color,
    },
    Composed {
        sub_settings: SettingSchema,
    },
    Enum {
        desc: &'static EnumDesc,
        default: i32,
    },
}

impl SettingDesc {
    pub fn integer(min: i32, max: i32, default: i32) -> SettingDesc {
        SettingDesc::Integer { min, max, default }
    }

    pub fn led_vector(led_count: usize) -> SettingDesc {
        SettingDesc::LedVector {
            led_count,
            default: vec![false; led_count],
        }
    }

    pub fn kind(&self) -> SettingKind {
        match self {
            SettingDesc::String { .. } => SettingKind::String,
            SettingDesc::Boolean { .. } => SettingKind::Boolean,
            SettingDesc::Integer { .. } => SettingKind::Integer,
            SettingDesc::LedVector { .. } => SettingKind::LedVector,
            SettingDesc::Color { .. } => SettingKind::Color,
            SettingDesc::Composed { .. } => SettingKind::Composed,
            SettingDesc::Enum { .. } => SettingKind::Enum,
        }
    }

    /// Like [`SettingDesc::check`] but reporting what failed.
    pub fn validate(&self, setting: &Setting) -> Result<(), SettingError> {
        if self.kind() != setting.kind() {
            return Err(SettingError::TypeMismatch);
        }
        match (self, setting) {
            (SettingDesc::Integer { min, max, .. }, Setting::Integer(value)) => {
                if value < min || value > max {
                    return Err(SettingError::OutOfRange);
                }
            }
            (SettingDesc::LedVector { led_count, .. }, Setting::LedVector(leds)) => {
                if leds.len() != *led_count {
                    return Err(SettingError::OutOfRange);
                }
            }
            (SettingDesc::Enum { desc, .. }, Setting::Enum(value)) => {
                if !std::ptr::eq(*desc, value.desc()) || !desc.check(value.get()) {
                    return Err(SettingError::InvalidEnumValue);
                }
            }
            (SettingDesc::Composed { sub_settings }, Setting::Composed(map)) => {
                for (name, value) in map {
                    match sub_settings.get(name) {
                        None => return Err(SettingError::TypeMismatch),
                        Some(desc) => desc.validate(value)?,
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Check the value against the schema, recursively for composed
    /// settings.
    pub fn check(&self, setting: &Setting) -> bool {
        match self.validate(setting) {
            Ok(()) => true,
            Err(e) => {
                debug!("Setting value rejected: {}", e);
                false
            }
        }
    }

    /// Default used when a value is missing or invalid. Composed
    /// defaults are the defaults of every sub-setting.
    pub fn default_value(&self) -> Setting {
        match self {
            SettingDesc::String { default } => Setting::String(default.clone()),
            SettingDesc::Boolean { default } => Setting::Boolean(*default),
            SettingDesc::Integer { default, .. } => Setting::Integer(*default),
            SettingDesc::LedVector { default, .. } => Setting::LedVector(default.clone()),
            SettingDesc::Color { default } => Setting::Color(*default),
            SettingDesc::Composed { sub_settings } => Setting::Composed(
                sub_settings
                    .iter()
                    .map(|(name, desc)| (name.clone(), desc.default_value()))
                    .collect(),
            ),
            SettingDesc::Enum { desc, default } => {
                Setting::Enum(EnumValue::new(desc, *default))
            }
        }
    }

    pub fn integer_range(&self) -> Option<(i32, i32)> {
        match self {
            SettingDesc::Integer { min, max, .. } => Some((*min, *max)),
            _ => None,
        }
    }

    pub fn led_count(&self) -> Option<usize> {
        match self {
            SettingDesc::LedVector { led_count, .. } => Some(*led_count),
            _ => None,
        }
    }

    pub fn enum_desc(&self) -> Option<&'static EnumDesc> {
        match self {
            SettingDesc::Enum { desc, .. } => Some(*desc),
            _ => None,
        }
    }

    pub fn sub_settings(&self) -> Option<&SettingSchema> {
        match self {
            SettingDesc::Composed { sub_settings } => Some(sub_settings),
            _ => None,
        }
    }
}

/// Write-side accessor over a value map and its schema.
///
/// Every lookup returns the stored value when present and valid, and
/// the schema default otherwise; invalid values are reported once in
/// the log, never mutated.
pub struct SettingLookup<'a> {
    values: &'a SettingMap,
    descs: &'a SettingSchema,
}

impl<'a> SettingLookup<'a> {
    pub fn new(values: &'a SettingMap, descs: &'a SettingSchema) -> SettingLookup<'a> {
        SettingLookup { values, descs }
    }

    pub fn get<T: SettingValue + Clone>(&self, name: &str) -> T {
        let desc = self
            .descs
            .get(name)
            .unwrap_or_else(|| panic!("setting \"{}\" is not in the schema", name));
        match self.values.get(name) {
            None => desc
                .default_value()
                .get::<T>()
                .expect("schema default has the wrong type")
                .clone(),
            Some(value) => {
                if !desc.check(value) {
                    error!(
                        "Invalid value in setting \"{}\", using default value instead",
                        name
                    );
                    return desc
                        .default_value()
                        .get::<T>()
                        .expect("schema default has the wrong type")
                        .clone();
                }
                value
                    .get::<T>()
                    .expect("checked value has the wrong type")
                    .clone()
            }
        }
    }

    /// Like `get` but with a caller-provided fallback.
    pub fn get_or<T: SettingValue + Clone>(&self, name: &str, default: T) -> T {
        let desc = self
            .descs
            .get(name)
            .unwrap_or_else(|| panic!("setting \"{}\" is not in the schema", name));
        match self.values.get(name) {
            None => default,
            Some(value) => {
                if !desc.check(value) {
                    error!(
                        "Invalid value in setting \"{}\", using default value instead",
                        name
                    );
                    return default;
                }
                value
                    .get::<T>()
                    .expect("checked value has the wrong type")
                    .clone()
            }
        }
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::setup_logging_lite;
    use lazy_static::lazy_static;

    lazy_static! {
        static ref TEST_ENUM: EnumDesc =
            EnumDesc::new(&[("Off", 0), ("Constant", 1), ("Cycle", 3)]);
    }

    #[test]
    fn integer_range_check() {
        setup_logging_lite().ok();
        let desc = SettingDesc::integer(1, 8, 4);
        assert!(desc.check(&Setting::Integer(1)));
        assert!(desc.check(&Setting::Integer(8)));
        assert!(!desc.check(&Setting::Integer(0)));
        assert!(!desc.check(&Setting::Integer(9)));
        assert!(!desc.check(&Setting::Boolean(true)));
        assert_eq!(desc.default_value(), Setting::Integer(4));
    }

    #[test]
    fn led_vector_length_check() {
        let desc = SettingDesc::led_vector(4);
        assert!(desc.check(&Setting::LedVector(vec![true, false, true, false])));
        assert!(!desc.check(&Setting::LedVector(vec![true])));
        assert_eq!(
            desc.default_value(),
            Setting::LedVector(vec![false, false, false, false])
        );
    }

    #[test]
    fn enum_check_and_names() {
        let desc = SettingDesc::Enum {
            desc: &TEST_ENUM,
            default: 1,
        };
        assert!(desc.check(&Setting::Enum(EnumValue::new(&TEST_ENUM, 3))));
        assert!(!desc.check(&Setting::Enum(EnumValue::new(&TEST_ENUM, 2))));
        assert_eq!(TEST_ENUM.from_name("Cycle"), Ok(3));
        assert_eq!(TEST_ENUM.to_name(0), Ok("Off"));
        assert_eq!(
            TEST_ENUM.from_name("Pulse"),
            Err(SettingError::InvalidEnumValue)
        );
    }

    #[test]
    fn composed_check_recurses() {
        let desc = SettingDesc::Composed {
            sub_settings: vec![
                (
                    "color".to_string(),
                    SettingDesc::Color {
                        default: Color { r: 255, g: 0, b: 0 },
                    },
                ),
                ("period".to_string(), SettingDesc::integer(0, 65535, 10000)),
            ]
            .into_iter()
            .collect(),
        };
        let mut value = ComposedSetting::new();
        value.insert("period".to_string(), Setting::Integer(2000));
        assert!(desc.check(&Setting::Composed(value.clone())));
        value.insert("period".to_string(), Setting::Integer(-1));
        assert!(!desc.check(&Setting::Composed(value.clone())));
        value.insert("period".to_string(), Setting::Integer(0));
        value.insert("bogus".to_string(), Setting::Boolean(true));
        assert!(!desc.check(&Setting::Composed(value)));
    }

    #[test]
    fn typed_get() {
        let setting = Setting::Integer(42);
        assert_eq!(setting.get::<i32>(), Ok(&42));
        assert_eq!(setting.get::<bool>(), Err(SettingError::TypeMismatch));
    }

    #[test]
    fn validate_reports_the_failure() {
        let desc = SettingDesc::integer(1, 8, 4);
        assert_eq!(desc.validate(&Setting::Integer(4)), Ok(()));
        assert_eq!(
            desc.validate(&Setting::Integer(9)),
            Err(SettingError::OutOfRange)
        );
        assert_eq!(
            desc.validate(&Setting::Boolean(true)),
            Err(SettingError::TypeMismatch)
        );
        let desc = SettingDesc::Enum {
            desc: &TEST_ENUM,
            default: 0,
        };
        assert_eq!(
            desc.validate(&Setting::Enum(EnumValue::new(&TEST_ENUM, 2))),
            Err(SettingError::InvalidEnumValue)
        );
    }

    #[test]
    fn lookup_substitutes_defaults() {
        setup_logging_lite().ok();
        let mut schema = SettingSchema::new();
        schema.insert("report_rate".to_string(), SettingDesc::integer(1, 8, 4));
        schema.insert("angle_snapping".to_string(), SettingDesc::Boolean { default: false });

        let mut values = SettingMap::new();
        values.insert("report_rate".to_string(), Setting::Integer(100)); // invalid

        let lookup = SettingLookup::new(&values, &schema);
        // Invalid value replaced by the schema default
        assert_eq!(lookup.get::<i32>("report_rate"), 4);
        // Missing value replaced by the schema default
        assert_eq!(lookup.get::<bool>("angle_snapping"), false);
        // Missing value with a caller fallback
        assert_eq!(lookup.get_or::<bool>("angle_snapping", true), true);
    }

    #[test]
    fn display_formats() {
        assert_eq!(
            Setting::Color(Color { r: 0xAB, g: 0x00, b: 0x12 }).to_string(),
            "ab0012"
        );
        assert_eq!(
            Setting::LedVector(vec![true, false, true]).to_string(),
            "101"
        );
        assert_eq!(
            Setting::Enum(EnumValue::new(&TEST_ENUM, 3)).to_string(),
            "Cycle"
        );
    }
}
