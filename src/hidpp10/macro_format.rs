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

//! HID++1.0 macro encoding.
//!
//! Op codes encode their length in the top three bits (0x00 range is
//! 1 byte, 0x20 is 2, 0x40 is 3, 0x60 is 5); 0x80..0xFE are one-byte
//! short delays with a piecewise-linear duration table and 0xFF ends
//! the macro. Addresses are 2 bytes: page and word offset.

// ----- Modules -----

use crate::address::Address;
use crate::macros::format::{MacroError, MacroFormat, ParsedItem};
use crate::macros::Item;

// ----- Consts -----

const OP_NOOP: u8 = 0x00;
const OP_WAIT_RELEASE: u8 = 0x01;
const OP_REPEAT_UNTIL_RELEASE: u8 = 0x02;
const OP_REPEAT_FOREVER: u8 = 0x03;
const OP_KEY_PRESS: u8 = 0x20;
const OP_KEY_RELEASE: u8 = 0x21;
const OP_MODIFIERS_PRESS: u8 = 0x22;
const OP_MODIFIERS_RELEASE: u8 = 0x23;
const OP_MOUSE_WHEEL: u8 = 0x24;
const OP_MOUSE_BUTTON_PRESS: u8 = 0x40;
const OP_MOUSE_BUTTON_RELEASE: u8 = 0x41;
const OP_CONSUMER_CONTROL: u8 = 0x42;
const OP_DELAY: u8 = 0x43;
const OP_JUMP: u8 = 0x44;
const OP_JUMP_IF_PRESSED: u8 = 0x45;
const OP_MOUSE_POINTER: u8 = 0x60;
const OP_JUMP_IF_RELEASED: u8 = 0x61;
const OP_END: u8 = 0xFF;

/// Placeholder for jump targets wired up after the whole macro is
/// parsed.
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

/// Nearest representable short delay code for `delay` milliseconds.
fn short_delay_code(delay: u16) -> u8 {
    if delay < 8 {
        0x80 // Minimum short delay of 8ms
    } else if delay < 132 {
        0x80 + ((delay - 8 + 2) / 4) as u8
    } else if delay < 388 {
        0x9F + ((delay - 132 + 4) / 8) as u8
    } else if delay < 900 {
        0xBF + ((delay - 388 + 8) / 16) as u8
    } else if delay < 1892 {
        0xDF + ((delay - 900 + 16) / 32) as u8
    } else {
        0xFE // Maximum short delay of 1.892s
    }
}

/// Duration in milliseconds of a short delay op code, 0 for other
/// codes.
fn short_delay_duration(op_code: u8) -> u16 {
    if op_code < 0x80 {
        0
    } else if op_code <= 0x9F {
        8 + u16::from(op_code - 0x80) * 4
    } else if op_code <= 0xBF {
        132 + u16::from(op_code - 0x9F) * 8
    } else if op_code <= 0xDF {
        388 + u16::from(op_code - 0xBF) * 16
    } else if op_code <= 0xFE {
        900 + u16::from(op_code - 0xDF) * 32
    } else {
        0
    }
}

fn check_length(buf: &[u8], op_code: u8) -> Result<usize, MacroError> {
    let length = op_length(op_code);
    if buf.len() < length {
        return Err(MacroError::Syntax(op_code));
    }
    Ok(length)
}

// ----- Structs -----

/// HID++1.0 [`MacroFormat`].
pub struct MacroFormat10;

impl MacroFormat10 {
    /// Combined modifiers+key items have no op code here; they are
    /// emulated with a Modifiers and a Key instruction.
    fn split_modifiers_key(
        &self,
        buf: &mut [u8],
        modifiers: u8,
        key: u8,
        press: bool,
    ) -> Result<(usize, Option<usize>), MacroError> {
        let mut written = 0;
        if modifiers != 0 {
            let item = if press {
                Item::ModifiersPress { modifiers }
            } else {
                Item::ModifiersRelease { modifiers }
            };
            let (len, _) = self.write_item(&mut buf[written..], &item)?;
            written += len;
        }
        if key != 0 || modifiers == 0 {
            let item = if press {
                Item::KeyPress { key }
            } else {
                Item::KeyRelease { key }
            };
            let (len, _) = self.write_item(&mut buf[written..], &item)?;
            written += len;
        }
        Ok((written, None))
    }
}

impl MacroFormat for MacroFormat10 {
    fn item_length(&self, item: &Item) -> Result<usize, MacroError> {
        let op_code = match *item {
            Item::ModifiersKeyPress { modifiers, key }
            | Item::ModifiersKeyRelease { modifiers, key } => {
                // One instruction is enough when either half is empty
                return Ok(if modifiers == 0 || key == 0 { 2 } else { 4 });
            }
            Item::ShortDelay { .. } => return Ok(1),
            Item::NoOp => OP_NOOP,
            Item::WaitRelease => OP_WAIT_RELEASE,
            Item::RepeatUntilRelease => OP_REPEAT_UNTIL_RELEASE,
            Item::RepeatForever => OP_REPEAT_FOREVER,
            Item::KeyPress { .. } => OP_KEY_PRESS,
            Item::KeyRelease { .. } => OP_KEY_RELEASE,
            Item::ModifiersPress { .. } => OP_MODIFIERS_PRESS,
            Item::ModifiersRelease { .. } => OP_MODIFIERS_RELEASE,
            Item::MouseWheel { .. } => OP_MOUSE_WHEEL,
            Item::MouseButtonPress { .. } => OP_MOUSE_BUTTON_PRESS,
            Item::MouseButtonRelease { .. } => OP_MOUSE_BUTTON_RELEASE,
            Item::ConsumerControl { .. } => OP_CONSUMER_CONTROL,
            Item::Delay { .. } => OP_DELAY,
            Item::Jump { .. } => OP_JUMP,
            Item::JumpIfPressed { .. } => OP_JUMP_IF_PRESSED,
            Item::MousePointer { .. } => OP_MOUSE_POINTER,
            Item::JumpIfReleased { .. } => OP_JUMP_IF_RELEASED,
            Item::End => OP_END,
            _ => return Err(MacroError::UnsupportedInstruction(item.instruction())),
        };
        Ok(op_length(op_code))
    }

    fn jump_length(&self) -> usize {
        op_length(OP_JUMP)
    }

    fn address_length(&self) -> usize {
        2
    }

    fn write_address(&self, slot: &mut [u8], address: Address) {
        slot[0] = address.page;
        slot[1] = address.offset as u8;
    }

    fn write_item(
        &self,
        buf: &mut [u8],
        item: &Item,
    ) -> Result<(usize, Option<usize>), MacroError> {
        match *item {
            Item::ModifiersKeyPress { modifiers, key } => {
                return self.split_modifiers_key(buf, modifiers, key, true)
            }
            Item::ModifiersKeyRelease { modifiers, key } => {
                return self.split_modifiers_key(buf, modifiers, key, false)
            }
            Item::ShortDelay { milliseconds } => {
                buf[0] = short_delay_code(milliseconds);
                return Ok((1, None));
            }
            _ => {}
        }

        let length = self.item_length(item)?;
        match *item {
            Item::NoOp => buf[0] = OP_NOOP,
            Item::WaitRelease => buf[0] = OP_WAIT_RELEASE,
            Item::RepeatUntilRelease => buf[0] = OP_REPEAT_UNTIL_RELEASE,
            Item::RepeatForever => buf[0] = OP_REPEAT_FOREVER,
            Item::End => buf[0] = OP_END,
            Item::KeyPress { key } => {
                buf[0] = OP_KEY_PRESS;
                buf[1] = key;
            }
            Item::KeyRelease { key } => {
                buf[0] = OP_KEY_RELEASE;
                buf[1] = key;
            }
            Item::ModifiersPress { modifiers } => {
                buf[0] = OP_MODIFIERS_PRESS;
                buf[1] = modifiers;
            }
            Item::ModifiersRelease { modifiers } => {
                buf[0] = OP_MODIFIERS_RELEASE;
                buf[1] = modifiers;
            }
            Item::MouseWheel { delta } => {
                buf[0] = OP_MOUSE_WHEEL;
                buf[1] = delta as u8;
            }
            Item::MouseButtonPress { buttons } => {
                buf[0] = OP_MOUSE_BUTTON_PRESS;
                buf[1..3].copy_from_slice(&buttons.to_le_bytes());
            }
            Item::MouseButtonRelease { buttons } => {
                buf[0] = OP_MOUSE_BUTTON_RELEASE;
                buf[1..3].copy_from_slice(&buttons.to_le_bytes());
            }
            Item::ConsumerControl { code } => {
                buf[0] = OP_CONSUMER_CONTROL;
                buf[1..3].copy_from_slice(&code.to_be_bytes());
            }
            Item::Delay { milliseconds } => {
                buf[0] = OP_DELAY;
                buf[1..3].copy_from_slice(&milliseconds.to_be_bytes());
            }
            Item::Jump { .. } => {
                buf[0] = OP_JUMP;
                return Ok((length, Some(1)));
            }
            Item::JumpIfPressed { .. } => {
                buf[0] = OP_JUMP_IF_PRESSED;
                return Ok((length, Some(1)));
            }
            Item::MousePointer { x, y } => {
                buf[0] = OP_MOUSE_POINTER;
                buf[1..3].copy_from_slice(&x.to_be_bytes());
                buf[3..5].copy_from_slice(&y.to_be_bytes());
            }
            Item::JumpIfReleased { delay, .. } => {
                buf[0] = OP_JUMP_IF_RELEASED;
                buf[1..3].copy_from_slice(&delay.to_be_bytes());
                return Ok((length, Some(3)));
            }
            _ => return Err(MacroError::UnsupportedInstruction(item.instruction())),
        }
        Ok((length, None))
    }

    fn parse_item(&self, buf: &[u8]) -> Result<ParsedItem, MacroError> {
        if buf.is_empty() {
            return Err(MacroError::Syntax(0));
        }
        let op_code = buf[0];
        let length = check_length(buf, op_code)?;
        let mut jump_address = None;
        let item = match op_code {
            OP_NOOP => Item::NoOp,
            OP_WAIT_RELEASE => Item::WaitRelease,
            OP_REPEAT_UNTIL_RELEASE => Item::RepeatUntilRelease,
            OP_REPEAT_FOREVER => Item::RepeatForever,
            OP_KEY_PRESS => Item::KeyPress { key: buf[1] },
            OP_KEY_RELEASE => Item::KeyRelease { key: buf[1] },
            OP_MODIFIERS_PRESS => Item::ModifiersPress { modifiers: buf[1] },
            OP_MODIFIERS_RELEASE => Item::ModifiersRelease { modifiers: buf[1] },
            OP_MOUSE_WHEEL => Item::MouseWheel {
                delta: buf[1] as i8,
            },
            OP_MOUSE_BUTTON_PRESS => Item::MouseButtonPress {
                buttons: u16::from_le_bytes([buf[1], buf[2]]),
            },
            OP_MOUSE_BUTTON_RELEASE => Item::MouseButtonRelease {
                buttons: u16::from_le_bytes([buf[1], buf[2]]),
            },
            OP_CONSUMER_CONTROL => Item::ConsumerControl {
                code: u16::from_be_bytes([buf[1], buf[2]]),
            },
            OP_DELAY => Item::Delay {
                milliseconds: u16::from_be_bytes([buf[1], buf[2]]),
            },
            OP_JUMP => {
                jump_address = Some(Address::new(0, buf[1], u16::from(buf[2])));
                Item::Jump { target: UNRESOLVED }
            }
            OP_JUMP_IF_PRESSED => {
                jump_address = Some(Address::new(0, buf[1], u16::from(buf[2])));
                Item::JumpIfPressed { target: UNRESOLVED }
            }
            OP_MOUSE_POINTER => Item::MousePointer {
                x: i16::from_be_bytes([buf[1], buf[2]]),
                y: i16::from_be_bytes([buf[3], buf[4]]),
            },
            OP_JUMP_IF_RELEASED => {
                jump_address = Some(Address::new(0, buf[3], u16::from(buf[4])));
                Item::JumpIfReleased {
                    delay: u16::from_be_bytes([buf[1], buf[2]]),
                    target: UNRESOLVED,
                }
            }
            OP_END => Item::End,
            op_code if (0x80..=0xFE).contains(&op_code) => Item::ShortDelay {
                milliseconds: short_delay_duration(op_code),
            },
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::setup_logging_lite;
    use crate::macros::Instruction;

    #[test]
    fn op_lengths_by_class() {
        let format = MacroFormat10;
        assert_eq!(format.item_length(&Item::NoOp).unwrap(), 1);
        assert_eq!(format.item_length(&Item::KeyPress { key: 4 }).unwrap(), 2);
        assert_eq!(
            format
                .item_length(&Item::Delay { milliseconds: 100 })
                .unwrap(),
            3
        );
        assert_eq!(
            format
                .item_length(&Item::MousePointer { x: 1, y: -1 })
                .unwrap(),
            5
        );
        assert_eq!(format.item_length(&Item::End).unwrap(), 1);
        assert_eq!(format.jump_length(), 3);
    }

    #[test]
    fn short_delay_table_edges() {
        // Bin boundaries of the piecewise-linear duration table
        assert_eq!(short_delay_code(0), 0x80);
        assert_eq!(short_delay_code(8), 0x80);
        assert_eq!(short_delay_duration(0x80), 8);
        assert_eq!(short_delay_duration(0x9F), 132);
        assert_eq!(short_delay_duration(0xBF), 388);
        assert_eq!(short_delay_duration(0xDF), 900);
        assert_eq!(short_delay_duration(0xFE), 1892);
        assert_eq!(short_delay_code(1892), 0xFE);
        assert_eq!(short_delay_code(60000), 0xFE);
        // Encoding picks the nearest representable code
        assert_eq!(short_delay_duration(short_delay_code(100)), 100);
        assert_eq!(short_delay_duration(short_delay_code(500)), 500);
    }

    #[test]
    fn short_delay_decode_is_encode_inverse() {
        setup_logging_lite().ok();
        let format = MacroFormat10;
        for op_code in 0x80..=0xFEu8 {
            let parsed = format.parse_item(&[op_code]).unwrap();
            let duration = match parsed.item {
                Item::ShortDelay { milliseconds } => milliseconds,
                other => panic!("unexpected item: {:?}", other),
            };
            assert_eq!(short_delay_code(duration), op_code);
        }
    }

    #[test]
    fn modifiers_key_press_expands_to_two_instructions() {
        let format = MacroFormat10;
        let item = Item::ModifiersKeyPress {
            modifiers: 0x02,
            key: 0x04,
        };
        assert_eq!(format.item_length(&item).unwrap(), 4);
        let mut buf = [0u8; 8];
        let (written, slot) = format.write_item(&mut buf, &item).unwrap();
        assert_eq!(written, 4);
        assert_eq!(slot, None);
        assert_eq!(&buf[..4], &[0x22, 0x02, 0x20, 0x04]);

        // Key-only presses collapse to a single instruction
        let item = Item::ModifiersKeyRelease {
            modifiers: 0,
            key: 0x04,
        };
        assert_eq!(format.item_length(&item).unwrap(), 2);
        let (written, _) = format.write_item(&mut buf, &item).unwrap();
        assert_eq!(written, 2);
        assert_eq!(&buf[..2], &[0x21, 0x04]);
    }

    #[test]
    fn jump_slots_and_addresses() {
        let format = MacroFormat10;
        let mut buf = [0u8; 8];
        let (written, slot) = format
            .write_item(&mut buf, &Item::JumpIfReleased { delay: 50, target: 0 })
            .unwrap();
        assert_eq!(written, 5);
        assert_eq!(slot, Some(3));
        format.write_address(&mut buf[3..], Address::new(0, 0x04, 0x12));
        assert_eq!(&buf[..5], &[0x61, 0x00, 0x32, 0x04, 0x12]);

        let parsed = format.parse_item(&buf[..5]).unwrap();
        assert_eq!(parsed.length, 5);
        assert_eq!(parsed.jump_address, Some(Address::new(0, 0x04, 0x12)));
        match parsed.item {
            Item::JumpIfReleased { delay: 50, .. } => {}
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[test]
    fn operand_encodings() {
        let format = MacroFormat10;
        let mut buf = [0u8; 8];

        // Mouse buttons are little-endian
        format
            .write_item(&mut buf, &Item::MouseButtonPress { buttons: 0x0102 })
            .unwrap();
        assert_eq!(&buf[..3], &[0x40, 0x02, 0x01]);

        // Consumer control is big-endian
        format
            .write_item(&mut buf, &Item::ConsumerControl { code: 0x00E9 })
            .unwrap();
        assert_eq!(&buf[..3], &[0x42, 0x00, 0xE9]);

        // Mouse pointer deltas are big-endian and signed
        format
            .write_item(&mut buf, &Item::MousePointer { x: -1, y: 2 })
            .unwrap();
        assert_eq!(&buf[..5], &[0x60, 0xFF, 0xFF, 0x00, 0x02]);
    }

    #[test]
    fn unsupported_instructions() {
        let format = MacroFormat10;
        let err = format
            .item_length(&Item::MouseHWheel { delta: 1 })
            .unwrap_err();
        match err {
            MacroError::UnsupportedInstruction(Instruction::MouseHWheel) => {}
            other => panic!("unexpected error: {:?}", other),
        }
        let err = format
            .write_item(&mut [0u8; 8], &Item::ConsumerControlPress { code: 1 })
            .unwrap_err();
        match err {
            MacroError::UnsupportedInstruction(Instruction::ConsumerControlPress) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn invalid_op_code() {
        let format = MacroFormat10;
        let err = format.parse_item(&[0x26, 0x00]).unwrap_err();
        match err {
            MacroError::Syntax(0x26) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
