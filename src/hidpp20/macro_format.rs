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

//! HID++2.0 macro encoding.
//!
//! Same length classes as the older format but a different op-code
//! assignment: modifiers and key presses are combined in one
//! instruction, jumps carry a full 4-byte address, and the short
//! delay range does not exist.

// ----- Modules -----

use crate::address::Address;
use crate::macros::format::{MacroError, MacroFormat, ParsedItem};
use crate::macros::Item;

// ----- Consts -----

const OP_NOOP: u8 = 0x00;
const OP_WAIT_RELEASE: u8 = 0x01;
const OP_REPEAT_UNTIL_RELEASE: u8 = 0x02;
const OP_REPEAT_FOREVER: u8 = 0x03;
const OP_MOUSE_WHEEL: u8 = 0x20;
const OP_MOUSE_HWHEEL: u8 = 0x21;
const OP_DELAY: u8 = 0x40;
const OP_MOUSE_BUTTON_PRESS: u8 = 0x41;
const OP_MOUSE_BUTTON_RELEASE: u8 = 0x42;
const OP_MODIFIERS_KEY_PRESS: u8 = 0x43;
const OP_MODIFIERS_KEY_RELEASE: u8 = 0x44;
const OP_CONSUMER_CONTROL_PRESS: u8 = 0x45;
const OP_CONSUMER_CONTROL_RELEASE: u8 = 0x46;
const OP_JUMP: u8 = 0x60;
const OP_MOUSE_POINTER: u8 = 0x61;
const OP_END: u8 = 0xFF;

const UNRESOLVED: usize = usize::MAX;

// ----- Functions -----

fn op_length(op_code: u8) -> usize {
    match op_code & 0xE0 {
        0x00 => 1,
        0x20 => 2,
        0x40 => 3,
        0x60 => 5,
        _ => 1,
    }
}

/// Half presses map onto the combined modifiers+key instruction.
fn combine(item: &Item) -> Option<Item> {
    match *item {
        Item::ModifiersPress { modifiers } => Some(Item::ModifiersKeyPress {
            modifiers,
            key: 0,
        }),
        Item::ModifiersRelease { modifiers } => Some(Item::ModifiersKeyRelease {
            modifiers,
            key: 0,
        }),
        Item::KeyPress { key } => Some(Item::ModifiersKeyPress { modifiers: 0, key }),
        Item::KeyRelease { key } => Some(Item::ModifiersKeyRelease { modifiers: 0, key }),
        _ => None,
    }
}

fn op_code_of(item: &Item) -> Result<u8, MacroError> {
    Ok(match item {
        Item::NoOp => OP_NOOP,
        Item::WaitRelease => OP_WAIT_RELEASE,
        Item::RepeatUntilRelease => OP_REPEAT_UNTIL_RELEASE,
        Item::RepeatForever => OP_REPEAT_FOREVER,
        Item::MouseWheel { .. } => OP_MOUSE_WHEEL,
        Item::MouseHWheel { .. } => OP_MOUSE_HWHEEL,
        Item::Delay { .. } => OP_DELAY,
        Item::MouseButtonPress { .. } => OP_MOUSE_BUTTON_PRESS,
        Item::MouseButtonRelease { .. } => OP_MOUSE_BUTTON_RELEASE,
        Item::ModifiersKeyPress { .. } => OP_MODIFIERS_KEY_PRESS,
        Item::ModifiersKeyRelease { .. } => OP_MODIFIERS_KEY_RELEASE,
        Item::ConsumerControlPress { .. } => OP_CONSUMER_CONTROL_PRESS,
        Item::ConsumerControlRelease { .. } => OP_CONSUMER_CONTROL_RELEASE,
        Item::Jump { .. } => OP_JUMP,
        Item::MousePointer { .. } => OP_MOUSE_POINTER,
        Item::End => OP_END,
        _ => return Err(MacroError::UnsupportedInstruction(item.instruction())),
    })
}

// ----- Structs -----

/// HID++2.0 [`MacroFormat`].
pub struct MacroFormat20;

impl MacroFormat for MacroFormat20 {
    fn item_length(&self, item: &Item) -> Result<usize, MacroError> {
        let item = combine(item).unwrap_or(*item);
        Ok(op_length(op_code_of(&item)?))
    }

    fn jump_length(&self) -> usize {
        op_length(OP_JUMP)
    }

    fn address_length(&self) -> usize {
        4
    }

    fn write_address(&self, slot: &mut [u8], address: Address) {
        slot[0] = address.mem_type;
        slot[1] = address.page;
        slot[2..4].copy_from_slice(&address.offset.to_be_bytes());
    }

    fn write_item(
        &self,
        buf: &mut [u8],
        item: &Item,
    ) -> Result<(usize, Option<usize>), MacroError> {
        let item = combine(item).unwrap_or(*item);
        let op_code = op_code_of(&item)?;
        let length = op_length(op_code);
        buf[0] = op_code;
        match item {
            Item::MouseWheel { delta } | Item::MouseHWheel { delta } => {
                buf[1] = delta as u8;
            }
            Item::Delay { milliseconds } => {
                buf[1..3].copy_from_slice(&milliseconds.to_be_bytes());
            }
            Item::MouseButtonPress { buttons } | Item::MouseButtonRelease { buttons } => {
                buf[1..3].copy_from_slice(&buttons.to_be_bytes());
            }
            Item::ModifiersKeyPress { modifiers, key }
            | Item::ModifiersKeyRelease { modifiers, key } => {
                buf[1] = modifiers;
                buf[2] = key;
            }
            Item::ConsumerControlPress { code } | Item::ConsumerControlRelease { code } => {
                buf[1..3].copy_from_slice(&code.to_be_bytes());
            }
            Item::Jump { .. } => {
                return Ok((length, Some(1)));
            }
            Item::MousePointer { x, y } => {
                buf[1..3].copy_from_slice(&x.to_be_bytes());
                buf[3..5].copy_from_slice(&y.to_be_bytes());
            }
            _ => {}
        }
        Ok((length, None))
    }

    fn parse_item(&self, buf: &[u8]) -> Result<ParsedItem, MacroError> {
        if buf.is_empty() {
            return Err(MacroError::Syntax(0));
        }
        let op_code = buf[0];
        let length = op_length(op_code);
        if buf.len() < length {
            return Err(MacroError::Syntax(op_code));
        }
        let mut jump_address = None;
        let item = match op_code {
            OP_NOOP => Item::NoOp,
            OP_WAIT_RELEASE => Item::WaitRelease,
            OP_REPEAT_UNTIL_RELEASE => Item::RepeatUntilRelease,
            OP_REPEAT_FOREVER => Item::RepeatForever,
            OP_MOUSE_WHEEL => Item::MouseWheel {
                delta: buf[1] as i8,
            },
            OP_MOUSE_HWHEEL => Item::MouseHWheel {
                delta: buf[1] as i8,
            },
            OP_DELAY => Item::Delay {
                milliseconds: u16::from_be_bytes([buf[1], buf[2]]),
            },
            OP_MOUSE_BUTTON_PRESS => Item::MouseButtonPress {
                buttons: u16::from_be_bytes([buf[1], buf[2]]),
            },
            OP_MOUSE_BUTTON_RELEASE => Item::MouseButtonRelease {
                buttons: u16::from_be_bytes([buf[1], buf[2]]),
            },
            OP_MODIFIERS_KEY_PRESS => Item::ModifiersKeyPress {
                modifiers: buf[1],
                key: buf[2],
            },
            OP_MODIFIERS_KEY_RELEASE => Item::ModifiersKeyRelease {
                modifiers: buf[1],
                key: buf[2],
            },
            OP_CONSUMER_CONTROL_PRESS => Item::ConsumerControlPress {
                code: u16::from_be_bytes([buf[1], buf[2]]),
            },
            OP_CONSUMER_CONTROL_RELEASE => Item::ConsumerControlRelease {
                code: u16::from_be_bytes([buf[1], buf[2]]),
            },
            OP_JUMP => {
                jump_address = Some(Address::new(
                    buf[1],
                    buf[2],
                    u16::from_be_bytes([buf[3], buf[4]]),
                ));
                Item::Jump { target: UNRESOLVED }
            }
            OP_MOUSE_POINTER => Item::MousePointer {
                x: i16::from_be_bytes([buf[1], buf[2]]),
                y: i16::from_be_bytes([buf[3], buf[4]]),
            },
            OP_END => Item::End,
            op_code => return Err(MacroError::Syntax(op_code)),
        };
        Ok(ParsedItem {
            item,
            length,
            jump_address,
        })
    }
}

// ----- Tests -----
