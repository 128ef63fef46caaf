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

//! HID report descriptor decoding.
//!
//! Only the parts needed to recognize HID++ collections are decoded:
//! top-level collections, their report IDs and the field flags, sizes
//! and usages. Nested collection structure is flattened into the
//! enclosing top-level collection.

// ----- Modules -----

use core::convert::TryFrom;
use core::fmt;
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use std::collections::BTreeMap;

// ----- Enumerations -----

/// Main item tag of a report, also the key discriminating input,
/// output and feature reports with the same ID.
#[repr(u8)]
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, IntoPrimitive, TryFromPrimitive)]
pub enum ReportKind {
    Input = 8,
    Output = 9,
    Feature = 11,
}

#[repr(u8)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, IntoPrimitive, FromPrimitive)]
pub enum CollectionType {
    Physical = 0,
    Application = 1,
    Logical = 2,
    Report = 3,
    NamedArray = 4,
    UsageSwitch = 5,
    UsageModifier = 6,
    #[num_enum(default)]
    Vendor = 0xFF,
}

// Short item prefixes
const ITEM_TYPE_MAIN: u8 = 0;
const ITEM_TYPE_GLOBAL: u8 = 1;
const ITEM_TYPE_LOCAL: u8 = 2;

// Main item tags
const MAIN_COLLECTION: u8 = 10;
const MAIN_END_COLLECTION: u8 = 12;

// Global item tags
const GLOBAL_USAGE_PAGE: u8 = 0;
const GLOBAL_REPORT_SIZE: u8 = 7;
const GLOBAL_REPORT_ID: u8 = 8;
const GLOBAL_REPORT_COUNT: u8 = 9;
const GLOBAL_PUSH: u8 = 10;
const GLOBAL_POP: u8 = 11;

// Local item tags
const LOCAL_USAGE: u8 = 0;
const LOCAL_USAGE_MINIMUM: u8 = 1;
const LOCAL_USAGE_MAXIMUM: u8 = 2;
const LOCAL_DELIMITER: u8 = 10;

// ----- Structs -----

/// Usage page and usage ID pair.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct Usage {
    pub usage_page: u16,
    pub usage: u16,
}

impl Usage {
    pub const fn new(usage_page: u16, usage: u16) -> Usage {
        Usage { usage_page, usage }
    }
}

impl From<u32> for Usage {
    fn from(extended: u32) -> Usage {
        Usage {
            usage_page: (extended >> 16) as u16,
            usage: extended as u16,
        }
    }
}

impl From<Usage> for u32 {
    fn from(usage: Usage) -> u32 {
        u32::from(usage.usage_page) << 16 | u32::from(usage.usage)
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.usage_page, self.usage)
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct ReportId {
    pub kind: ReportKind,
    pub id: u8,
}

/// Main item flags of a report field.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct FieldFlags(pub u32);

impl FieldFlags {
    const DATA_CONSTANT: u32 = 1 << 0;
    const ARRAY_VARIABLE: u32 = 1 << 1;
    const ABSOLUTE_RELATIVE: u32 = 1 << 2;

    pub fn data(self) -> bool {
        self.0 & Self::DATA_CONSTANT == 0
    }
    pub fn constant(self) -> bool {
        self.0 & Self::DATA_CONSTANT != 0
    }
    pub fn array(self) -> bool {
        self.0 & Self::ARRAY_VARIABLE == 0
    }
    pub fn variable(self) -> bool {
        self.0 & Self::ARRAY_VARIABLE != 0
    }
    pub fn absolute(self) -> bool {
        self.0 & Self::ABSOLUTE_RELATIVE == 0
    }
    pub fn relative(self) -> bool {
        self.0 & Self::ABSOLUTE_RELATIVE != 0
    }
}

/// Usages of a field, either an explicit list or an inclusive range.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Usages {
    List(Vec<Usage>),
    Range(Usage, Usage),
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ReportField {
    pub flags: FieldFlags,
    pub count: u32,
    pub size: u32,
    pub usages: Usages,
}

#[derive(Clone, Debug)]
pub struct ReportCollection {
    pub collection_type: CollectionType,
    pub usage: Usage,
    pub reports: BTreeMap<ReportId, Vec<ReportField>>,
}

/// Decoded report descriptor, top-level collections only.
#[derive(Clone, Debug, Default)]
pub struct ReportDescriptor {
    pub collections: Vec<ReportCollection>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DescriptorError {
    UnexpectedEnd,
    InvalidItemSize,
    InvalidCollectionUsage,
    UnexpectedEndCollection,
    DelimiterMismatch,
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::UnexpectedEnd => write!(f, "unexpected end of descriptor data"),
            DescriptorError::InvalidItemSize => write!(f, "invalid item size"),
            DescriptorError::InvalidCollectionUsage => write!(f, "invalid collection usage"),
            DescriptorError::UnexpectedEndCollection => {
                write!(f, "unexpected End Collection item")
            }
            DescriptorError::DelimiterMismatch => write!(f, "delimiter mismatch"),
        }
    }
}

impl std::error::Error for DescriptorError {}

// ----- Item stream -----

struct Item<'a> {
    item_type: u8,
    tag: u8,
    data: &'a [u8],
}

impl<'a> Item<'a> {
    fn value(&self) -> u32 {
        let mut value = 0u32;
        for (i, byte) in self.data.iter().enumerate() {
            value |= u32::from(*byte) << (8 * i);
        }
        value
    }

    fn usage(&self, default_page: u16) -> Result<Usage, DescriptorError> {
        match self.data.len() {
            1 | 2 => Ok(Usage::new(default_page, self.value() as u16)),
            4 => Ok(Usage::from(self.value())),
            _ => Err(DescriptorError::InvalidItemSize),
        }
    }
}

fn read_item<'a>(data: &'a [u8]) -> Result<(Item<'a>, &'a [u8]), DescriptorError> {
    if data.is_empty() {
        return Err(DescriptorError::UnexpectedEnd);
    }
    if data[0] == 0xFE {
        // Long item
        if data.len() < 3 {
            return Err(DescriptorError::UnexpectedEnd);
        }
        let size = data[1] as usize;
        if data.len() < 3 + size {
            return Err(DescriptorError::UnexpectedEnd);
        }
        Ok((
            Item {
                item_type: 3,
                tag: data[2],
                data: &data[3..3 + size],
            },
            &data[3 + size..],
        ))
    } else {
        let mut size = (data[0] & 0x03) as usize;
        if size == 3 {
            size = 4;
        }
        if data.len() < 1 + size {
            return Err(DescriptorError::UnexpectedEnd);
        }
        Ok((
            Item {
                item_type: (data[0] & 0x0C) >> 2,
                tag: (data[0] & 0xF0) >> 4,
                data: &data[1..1 + size],
            },
            &data[1 + size..],
        ))
    }
}

// ----- Parsing -----

#[derive(Clone, Copy, Default)]
struct GlobalState {
    usage_page: u16,
    report_size: u32,
    report_id: u8,
    report_count: u32,
}

#[derive(Default)]
struct LocalState {
    usages: Vec<Usage>,
    usage_min: Usage,
    usage_max: Usage,
}

#[derive(PartialEq)]
enum DelimiterState {
    Closed,
    OpenedFirst,
    OpenedOthers,
}

impl ReportDescriptor {
    /// Decode a raw descriptor byte stream.
    pub fn parse(mut data: &[u8]) -> Result<ReportDescriptor, DescriptorError> {
        let mut global_stack = vec![GlobalState::default()];
        let mut local = LocalState::default();
        let mut delimiter_state = DelimiterState::Closed;
        let mut descriptor = ReportDescriptor::default();
        let mut collection_depth = 0usize;

        while !data.is_empty() {
            let (item, rest) = read_item(data)?;
            data = rest;
            let global = global_stack.last_mut().expect("global stack underflow");
            match item.item_type {
                ITEM_TYPE_MAIN => {
                    match item.tag {
                        tag if ReportKind::try_from(tag).is_ok() => {
                            // Input/Output/Feature field
                            if let Some(collection) = descriptor.collections.last_mut() {
                                let id = ReportId {
                                    kind: ReportKind::try_from(tag).unwrap(),
                                    id: global.report_id,
                                };
                                let flags = FieldFlags(item.value());
                                let has_usages = !local.usages.is_empty()
                                    || local.usage_min != Usage::default()
                                    || local.usage_max != Usage::default();
                                // Padding fields (constant, no usage) are skipped
                                if has_usages || flags.data() {
                                    let usages = if !local.usages.is_empty() {
                                        Usages::List(std::mem::take(&mut local.usages))
                                    } else {
                                        Usages::Range(local.usage_min, local.usage_max)
                                    };
                                    collection.reports.entry(id).or_default().push(
                                        ReportField {
                                            flags,
                                            count: global.report_count,
                                            size: global.report_size,
                                            usages,
                                        },
                                    );
                                }
                            }
                        }
                        MAIN_COLLECTION => {
                            if collection_depth == 0 {
                                if local.usages.len() != 1 {
                                    return Err(DescriptorError::InvalidCollectionUsage);
                                }
                                descriptor.collections.push(ReportCollection {
                                    collection_type: CollectionType::from(
                                        item.value() as u8
                                    ),
                                    usage: local.usages[0],
                                    reports: BTreeMap::new(),
                                });
                            }
                            collection_depth += 1;
                        }
                        MAIN_END_COLLECTION => {
                            if collection_depth == 0 {
                                return Err(DescriptorError::UnexpectedEndCollection);
                            }
                            collection_depth -= 1;
                        }
                        _ => {}
                    }
                    local = LocalState::default();
                }
                ITEM_TYPE_GLOBAL => match item.tag {
                    GLOBAL_USAGE_PAGE => global.usage_page = item.value() as u16,
                    GLOBAL_REPORT_SIZE => global.report_size = item.value(),
                    GLOBAL_REPORT_ID => global.report_id = item.value() as u8,
                    GLOBAL_REPORT_COUNT => global.report_count = item.value(),
                    GLOBAL_PUSH => {
                        let top = *global;
                        global_stack.push(top);
                    }
                    GLOBAL_POP => {
                        if global_stack.len() > 1 {
                            global_stack.pop();
                        }
                    }
                    _ => {}
                },
                ITEM_TYPE_LOCAL => match item.tag {
                    LOCAL_USAGE => {
                        // Delimited alternate usages collapse to the first
                        if delimiter_state != DelimiterState::OpenedOthers {
                            local.usages.push(item.usage(global.usage_page)?);
                        }
                        if delimiter_state == DelimiterState::OpenedFirst {
                            delimiter_state = DelimiterState::OpenedOthers;
                        }
                    }
                    LOCAL_USAGE_MINIMUM => {
                        local.usage_min = item.usage(global.usage_page)?;
                    }
                    LOCAL_USAGE_MAXIMUM => {
                        local.usage_max = item.usage(global.usage_page)?;
                    }
                    LOCAL_DELIMITER => match item.value() {
                        1 => {
                            if delimiter_state != DelimiterState::Closed {
                                return Err(DescriptorError::DelimiterMismatch);
                            }
                            delimiter_state = DelimiterState::OpenedFirst;
                        }
                        0 => {
                            if delimiter_state == DelimiterState::Closed {
                                return Err(DescriptorError::DelimiterMismatch);
                            }
                            delimiter_state = DelimiterState::Closed;
                        }
                        _ => {}
                    },
                    _ => {}
                },
                _ => {}
            }
        }
        if collection_depth != 0 {
            warn!("Some collections are not closed");
        }
        Ok(descriptor)
    }
}

// ----- Test data -----

/// Canonical HID++ descriptor fragments, shared with the dispatcher
/// tests.
#[cfg(test)]
pub mod test_data {
    /// The canonical HID++ short report collection fragment.
    pub const SHORT_REPORT_DESC: [u8; 27] = [
        0x06, 0x00, 0xFF, // Usage Page (FF00 - Vendor)
        0x09, 0x01, // Usage (0001 - Vendor)
        0xA1, 0x01, // Collection (Application)
        0x85, 0x10, //   Report ID (16)
        0x75, 0x08, //   Report Size (8)
        0x95, 0x06, //   Report Count (6)
        0x15, 0x00, //   Logical Minimum (0)
        0x26, 0xFF, 0x00, //   Logical Maximum (255)
        0x09, 0x01, //   Usage (0001 - Vendor)
        0x81, 0x00, //   Input (Data, Array, Absolute)
        0x09, 0x01, //   Usage (0001 - Vendor)
        0x91, 0x00, //   Output (Data, Array, Absolute)
        0xC0, // End Collection
    ];

    /// The canonical HID++ long report collection fragment.
    pub const LONG_REPORT_DESC: [u8; 27] = [
        0x06, 0x00, 0xFF, // Usage Page (FF00 - Vendor)
        0x09, 0x02, // Usage (0002 - Vendor)
        0xA1, 0x01, // Collection (Application)
        0x85, 0x11, //   Report ID (17)
        0x75, 0x08, //   Report Size (8)
        0x95, 0x13, //   Report Count (19)
        0x15, 0x00, //   Logical Minimum (0)
        0x26, 0xFF, 0x00, //   Logical Maximum (255)
        0x09, 0x02, //   Usage (0002 - Vendor)
        0x81, 0x00, //   Input (Data, Array, Absolute)
        0x09, 0x02, //   Usage (0002 - Vendor)
        0x91, 0x00, //   Output (Data, Array, Absolute)
        0xC0, // End Collection
    ];

    pub fn hidpp_descriptor() -> Vec<u8> {
        let mut desc = SHORT_REPORT_DESC.to_vec();
        desc.extend_from_slice(&LONG_REPORT_DESC);
        desc
    }
}

// ----- Tests -----
