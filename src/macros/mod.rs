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

//! On-device macros: instruction set, page-spanning layout and
//! structure recognition.
//!
//! A [`Macro`] is an ordered list of [`Item`]s; jump items reference
//! other items by index, so inserting items never invalidates
//! existing jumps. Encoding is delegated to a [`MacroFormat`]
//! implementation; the layout engine here handles page boundaries
//! (trampoline jumps), alignment padding and jump resolution.

// ----- Modules -----

pub mod format;

pub use format::{MacroError, MacroFormat, ParsedItem};

use crate::address::Address;
use crate::memory::{MemoryBackend, PagedMemory};
use core::fmt;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ops::Range;

// ----- Consts -----

/// Bytes reserved at the end of every page for the CRC trailer.
const CRC_LENGTH: usize = 2;

// ----- Enumerations -----

/// Instruction tags, used in error reports and opcode tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Instruction {
    NoOp,
    WaitRelease,
    RepeatUntilRelease,
    RepeatForever,
    KeyPress,
    KeyRelease,
    ModifiersPress,
    ModifiersRelease,
    ModifiersKeyPress,
    ModifiersKeyRelease,
    MouseWheel,
    MouseHWheel,
    MouseButtonPress,
    MouseButtonRelease,
    ConsumerControl,
    ConsumerControlPress,
    ConsumerControlRelease,
    Delay,
    ShortDelay,
    Jump,
    JumpIfPressed,
    JumpIfReleased,
    MousePointer,
    End,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Instruction::NoOp => "NoOp",
            Instruction::WaitRelease => "WaitRelease",
            Instruction::RepeatUntilRelease => "RepeatUntilRelease",
            Instruction::RepeatForever => "Repeat",
            Instruction::KeyPress => "KeyPress",
            Instruction::KeyRelease => "KeyRelease",
            Instruction::ModifiersPress => "ModifiersPress",
            Instruction::ModifiersRelease => "ModifiersRelease",
            Instruction::ModifiersKeyPress => "ModifiersKeyPress",
            Instruction::ModifiersKeyRelease => "ModifiersKeyRelease",
            Instruction::MouseWheel => "MouseWheel",
            Instruction::MouseHWheel => "MouseHWheel",
            Instruction::MouseButtonPress => "MouseButtonPress",
            Instruction::MouseButtonRelease => "MouseButtonRelease",
            Instruction::ConsumerControl => "ConsumerControl",
            Instruction::ConsumerControlPress => "ConsumerControlPress",
            Instruction::ConsumerControlRelease => "ConsumerControlRelease",
            Instruction::Delay => "Delay",
            Instruction::ShortDelay => "ShortDelay",
            Instruction::Jump => "Jump",
            Instruction::JumpIfPressed => "JumpIfPressed",
            Instruction::JumpIfReleased => "JumpIfReleased",
            Instruction::MousePointer => "MousePointer",
            Instruction::End => "End",
        };
        write!(f, "{}", name)
    }
}

/// One macro instruction. Jump variants carry the index of their
/// destination item inside the owning [`Macro`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Item {
    NoOp,
    WaitRelease,
    RepeatUntilRelease,
    RepeatForever,
    KeyPress { key: u8 },
    KeyRelease { key: u8 },
    ModifiersPress { modifiers: u8 },
    ModifiersRelease { modifiers: u8 },
    ModifiersKeyPress { modifiers: u8, key: u8 },
    ModifiersKeyRelease { modifiers: u8, key: u8 },
    MouseWheel { delta: i8 },
    MouseHWheel { delta: i8 },
    MouseButtonPress { buttons: u16 },
    MouseButtonRelease { buttons: u16 },
    ConsumerControl { code: u16 },
    ConsumerControlPress { code: u16 },
    ConsumerControlRelease { code: u16 },
    Delay { milliseconds: u16 },
    ShortDelay { milliseconds: u16 },
    Jump { target: usize },
    JumpIfPressed { target: usize },
    JumpIfReleased { delay: u16, target: usize },
    MousePointer { x: i16, y: i16 },
    End,
}

impl Item {
    pub fn instruction(&self) -> Instruction {
        match self {
            Item::NoOp => Instruction::NoOp,
            Item::WaitRelease => Instruction::WaitRelease,
            Item::RepeatUntilRelease => Instruction::RepeatUntilRelease,
            Item::RepeatForever => Instruction::RepeatForever,
            Item::KeyPress { .. } => Instruction::KeyPress,
            Item::KeyRelease { .. } => Instruction::KeyRelease,
            Item::ModifiersPress { .. } => Instruction::ModifiersPress,
            Item::ModifiersRelease { .. } => Instruction::ModifiersRelease,
            Item::ModifiersKeyPress { .. } => Instruction::ModifiersKeyPress,
            Item::ModifiersKeyRelease { .. } => Instruction::ModifiersKeyRelease,
            Item::MouseWheel { .. } => Instruction::MouseWheel,
            Item::MouseHWheel { .. } => Instruction::MouseHWheel,
            Item::MouseButtonPress { .. } => Instruction::MouseButtonPress,
            Item::MouseButtonRelease { .. } => Instruction::MouseButtonRelease,
            Item::ConsumerControl { .. } => Instruction::ConsumerControl,
            Item::ConsumerControlPress { .. } => Instruction::ConsumerControlPress,
            Item::ConsumerControlRelease { .. } => Instruction::ConsumerControlRelease,
            Item::Delay { .. } => Instruction::Delay,
            Item::ShortDelay { .. } => Instruction::ShortDelay,
            Item::Jump { .. } => Instruction::Jump,
            Item::JumpIfPressed { .. } => Instruction::JumpIfPressed,
            Item::JumpIfReleased { .. } => Instruction::JumpIfReleased,
            Item::MousePointer { .. } => Instruction::MousePointer,
            Item::End => Instruction::End,
        }
    }

    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Item::Jump { .. } | Item::JumpIfPressed { .. } | Item::JumpIfReleased { .. }
        )
    }

    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Item::Jump { target }
            | Item::JumpIfPressed { target }
            | Item::JumpIfReleased { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn set_jump_target(&mut self, new_target: usize) {
        match self {
            Item::Jump { target }
            | Item::JumpIfPressed { target }
            | Item::JumpIfReleased { target, .. } => *target = new_target,
            _ => {}
        }
    }

    /// Whether execution falls through to the next item.
    pub fn has_successor(&self) -> bool {
        !matches!(self, Item::Jump { .. } | Item::End)
    }

    /// Simple items have no control flow.
    pub fn is_simple(&self) -> bool {
        !matches!(
            self,
            Item::WaitRelease
                | Item::RepeatUntilRelease
                | Item::RepeatForever
                | Item::Jump { .. }
                | Item::JumpIfPressed { .. }
                | Item::JumpIfReleased { .. }
                | Item::End
        )
    }
}

// ----- Structs -----

/// Decomposition of a loop-shaped macro into its three simple parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroLoop {
    pub pre: Range<usize>,
    pub body: Range<usize>,
    pub post: Range<usize>,
    pub delay: u16,
}

/// Ordered list of macro items.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Macro {
    items: Vec<Item>,
}

impl Macro {
    pub fn new() -> Macro {
        Macro::default()
    }

    pub fn from_items(items: Vec<Item>) -> Macro {
        Macro { items }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [Item] {
        &mut self.items
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse the macro stored at `address`.
    ///
    /// Depth-first traversal following fall-through and jump edges;
    /// conditional jump destinations are queued for a later walk,
    /// unconditional jumps end the current one. Already-visited
    /// addresses are not re-parsed. Malformed bytes end the current
    /// walk with an error log; dangling jumps are rewired to a
    /// synthesized End item.
    pub fn read<B: MemoryBackend>(
        macro_format: &dyn MacroFormat,
        mem: &mut PagedMemory<B>,
        address: Address,
    ) -> Result<Macro, MacroError> {
        debug!("Reading macro at address {}", address);
        let mut items: Vec<Item> = Vec::new();
        let mut parsed_items: BTreeMap<Address, usize> = BTreeMap::new();
        let mut incomplete_refs: Vec<(usize, Address)> = Vec::new();
        let mut jump_dests: Vec<Address> = Vec::new();

        let mut page = address.page_start();
        let mut index = mem.index_of(address);
        let mut last_error = None;

        'walk: loop {
            let aligned = mem.offset_of(page, index);
            let parsed = {
                let data = mem.read_only_page(page)?;
                if index >= data.len() {
                    error!("Macro runs past the end of page {:02x}", page.page);
                    None
                } else {
                    match macro_format.parse_item(&data[index..]) {
                        Ok(parsed) => Some(parsed),
                        Err(MacroError::Syntax(op_code)) => {
                            error!("Invalid op-code: {:02x}", op_code);
                            last_error = Some(MacroError::Syntax(op_code));
                            None
                        }
                        Err(e) => return Err(e),
                    }
                }
            };

            let walk_ends = match parsed {
                None => true,
                Some(parsed) => {
                    let idx = items.len();
                    items.push(parsed.item);
                    if let Some(addr) = aligned {
                        parsed_items.entry(addr).or_insert(idx);
                    }
                    if parsed.item.is_jump() {
                        let dest = parsed
                            .jump_address
                            .expect("parsed jump carries its destination");
                        jump_dests.push(dest);
                        incomplete_refs.push((idx, dest));
                    }
                    index += parsed.length;
                    !parsed.item.has_successor()
                }
            };

            if walk_ends {
                // Find the first address not parsed yet
                loop {
                    match jump_dests.pop() {
                        None => break 'walk,
                        Some(dest) => {
                            if !parsed_items.contains_key(&dest) {
                                page = dest.page_start();
                                index = mem.index_of(dest);
                                continue 'walk;
                            }
                        }
                    }
                }
            }
        }

        if items.is_empty() {
            return Err(last_error.unwrap_or(MacroError::Syntax(0)));
        }

        // Wire up jump item references
        let mut synthesized_end = None;
        for (idx, dest) in incomplete_refs {
            match parsed_items.get(&dest) {
                Some(target) => items[idx].set_jump_target(*target),
                None => {
                    error!("Macro jump to unparsed address {}", dest);
                    let end = *synthesized_end.get_or_insert_with(|| {
                        items.push(Item::End);
                        items.len() - 1
                    });
                    items[idx].set_jump_target(end);
                }
            }
        }

        Ok(Macro { items })
    }

    /// Lay the macro out in device memory starting at `start`.
    ///
    /// Items are placed sequentially. When an item would not leave
    /// room for a trampoline jump and the CRC trailer before the end
    /// of the page, a look-ahead decides whether the remainder fits;
    /// if not, an unconditional jump to the start of the next page is
    /// emitted and layout continues there. Jump destinations that are
    /// not on an addressable unit are aligned with NoOp padding.
    ///
    /// `start` is updated when a leading trampoline moved the first
    /// instruction to the next page. Returns the first address past
    /// the macro.
    pub fn write<B: MemoryBackend>(
        &self,
        macro_format: &dyn MacroFormat,
        mem: &mut PagedMemory<B>,
        start: &mut Address,
    ) -> Result<Address, MacroError> {
        // Items that are jump targets, and their resolved addresses
        let target_set: BTreeSet<usize> = self
            .items
            .iter()
            .filter_map(|item| item.jump_target())
            .collect();
        let mut target_addrs: BTreeMap<usize, Address> = BTreeMap::new();
        // Jumps and their address slot positions
        let mut jump_slots: Vec<(usize, Address, usize)> = Vec::new();

        let mut current_page = start.page_start();
        let mut index = mem.index_of(*start);
        let page_size = mem.sector_size();
        let jump_len = macro_format.jump_length();
        let mut check_end_of_page_jump = true;
        let mut first_instruction = true;

        for (i, item) in self.items.iter().enumerate() {
            let is_jump_dest = target_set.contains(&i);
            let item_len = macro_format.item_length(item)?;

            if check_end_of_page_jump {
                // Position after the padding this item would need
                let mut instr_index = index;
                if is_jump_dest {
                    while mem.offset_of(current_page, instr_index).is_none() {
                        instr_index += 1;
                    }
                }
                if instr_index + item_len + jump_len + CRC_LENGTH > page_size {
                    // Not enough room left for a later jump; check if
                    // the whole remainder fits before the end of page.
                    debug!(
                        "Check end of page jump at {} bytes from the end",
                        page_size - instr_index
                    );
                    let mut pos = instr_index + item_len;
                    let mut need_jump = false;
                    for (j, later) in self.items.iter().enumerate().skip(i + 1) {
                        if target_set.contains(&j) {
                            while mem.offset_of(current_page, pos).is_none() {
                                pos += 1;
                            }
                        }
                        pos += macro_format.item_length(later)?;
                        if pos + CRC_LENGTH > page_size {
                            need_jump = true;
                            break;
                        }
                    }
                    if need_jump {
                        // Jump to the beginning of the next page
                        let next_page = Address::new(
                            current_page.mem_type,
                            current_page.page + 1,
                            0,
                        );
                        if first_instruction {
                            debug!(
                                "Macro start was moved because of lacking space at the given address"
                            );
                            *start = next_page;
                        } else {
                            debug!("Adding jump to page {:02x}", next_page.page);
                            let slot = {
                                let data = mem.writable_page(current_page)?;
                                let (_, slot) = macro_format
                                    .write_item(&mut data[index..], &Item::Jump { target: 0 })?;
                                index + slot.expect("jump item has an address slot")
                            };
                            let data = mem.writable_page(current_page)?;
                            macro_format.write_address(&mut data[slot..], next_page);
                        }
                        current_page = next_page;
                        index = 0;
                    } else {
                        // The remainder fits, no need to check again
                        debug!("Macro end fits in the current page");
                        check_end_of_page_jump = false;
                    }
                }
            }

            // Alignment padding before jump destinations
            while is_jump_dest && mem.offset_of(current_page, index).is_none() {
                debug!("Macro padding at page {:02x}, index {:03x}", current_page.page, index);
                let data = mem.writable_page(current_page)?;
                let (written, _) = macro_format.write_item(&mut data[index..], &Item::NoOp)?;
                index += written;
            }

            let item_addr = mem.offset_of(current_page, index);

            // Write the item itself
            trace!(
                "Write macro item {} at page {:02x}, index {:03x}",
                item.instruction(),
                current_page.page,
                index
            );
            let (written, slot) = {
                let data = mem.writable_page(current_page)?;
                macro_format.write_item(&mut data[index..], item)?
            };

            // Remember jump address slots for later resolution
            if item.is_jump() {
                jump_slots.push((
                    i,
                    current_page,
                    index + slot.expect("jump item has an address slot"),
                ));
            }

            // Remember item addresses for later jump resolution
            if is_jump_dest {
                target_addrs.insert(i, item_addr.expect("jump destination is aligned"));
            }

            index += written;
            first_instruction = false;
        }

        // Patch jump addresses
        for (jump_idx, page, slot) in jump_slots {
            let dest = self.items[jump_idx]
                .jump_target()
                .expect("jump has a target");
            let addr = target_addrs[&dest];
            trace!("Macro item {} jumps to {}", jump_idx, addr);
            let data = mem.writable_page(page)?;
            macro_format.write_address(&mut data[slot..], addr);
        }

        // Return the next valid address
        loop {
            if let Some(addr) = mem.offset_of(current_page, index) {
                return Ok(addr);
            }
            index += 1;
        }
    }

    /// Erase NoOps and unconditional jumps to the next item, rewiring
    /// back-references to the successor.
    pub fn simplify(&mut self) {
        let keep: Vec<bool> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Item::NoOp => false,
                Item::Jump { target } => *target != i + 1,
                _ => true,
            })
            .collect();

        // New index of each kept item; references to removed items
        // resolve to the first kept successor.
        let mut pos = 0;
        let mut mapping = vec![0usize; self.items.len() + 1];
        for i in 0..self.items.len() {
            if keep[i] {
                mapping[i] = pos;
                pos += 1;
            }
        }
        mapping[self.items.len()] = pos;
        let resolve = |mut i: usize| -> usize {
            while i < keep.len() && !keep[i] {
                i += 1;
            }
            mapping[i]
        };

        let mut new_items = Vec::with_capacity(pos);
        for (i, item) in self.items.iter().enumerate() {
            if !keep[i] {
                debug!("Remove useless macro item {}: {}", i, item.instruction());
                continue;
            }
            let mut item = *item;
            if let Some(target) = item.jump_target() {
                item.set_jump_target(resolve(target));
            }
            new_items.push(item);
        }
        self.items = new_items;
    }

    /// True when the macro is a plain simple-item sequence ending
    /// with End.
    pub fn is_simple(&self) -> bool {
        for (i, item) in self.items.iter().enumerate() {
            if !item.is_simple() {
                if let Item::End = item {
                    return i + 1 == self.items.len();
                }
                return false;
            }
        }
        false
    }

    /// Recognize the canonical loop templates: pre + loop-until-
    /// release + post, expressed with RepeatUntilRelease,
    /// WaitRelease, a back-edge JumpIfPressed, or a
    /// JumpIfReleased/JumpIfPressed pair with delay.
    pub fn is_loop(&self) -> Option<MacroLoop> {
        enum State {
            Init,
            OptionalLoop,
            AfterLoop,
        }
        let mut state = State::Init;
        let pre_begin = 0usize;
        let mut pre_end = 0usize;
        let mut body = 0..0;
        let mut post_begin = 0usize;
        let mut delay = 0u16;

        for (i, item) in self.items.iter().enumerate() {
            if item.is_simple() {
                continue;
            }
            match *item {
                Item::RepeatUntilRelease => {
                    if !matches!(state, State::Init) {
                        return None;
                    }
                    pre_end = pre_begin;
                    body = pre_begin..i;
                    post_begin = i + 1;
                    delay = 0;
                    state = State::AfterLoop;
                }
                Item::JumpIfPressed { target } => match state {
                    State::Init => {
                        // The destination must be before this item
                        if target >= i {
                            return None;
                        }
                        pre_end = target;
                        body = target..i;
                        post_begin = i + 1;
                        delay = 0;
                        state = State::AfterLoop;
                    }
                    State::OptionalLoop => {
                        body.end = i;
                        post_begin = i + 1;
                        // pre_end is the JumpIfReleased item
                        match self.items[pre_end] {
                            Item::JumpIfReleased {
                                target: released_target,
                                ..
                            } => {
                                if released_target != post_begin || target != body.start {
                                    return None;
                                }
                            }
                            _ => return None,
                        }
                        state = State::AfterLoop;
                    }
                    State::AfterLoop => return None,
                },
                Item::JumpIfReleased {
                    delay: loop_delay, ..
                } => {
                    if !matches!(state, State::Init) {
                        return None;
                    }
                    pre_end = i;
                    body = i + 1..i + 1;
                    delay = loop_delay;
                    state = State::OptionalLoop;
                }
                Item::WaitRelease => {
                    if !matches!(state, State::Init) {
                        return None;
                    }
                    pre_end = i;
                    body = i..i;
                    post_begin = i + 1;
                    delay = 0;
                    state = State::AfterLoop;
                }
                Item::End => {
                    return match state {
                        State::AfterLoop => Some(MacroLoop {
                            pre: pre_begin..pre_end,
                            body,
                            post: post_begin..i,
                            delay,
                        }),
                        _ => None,
                    };
                }
                _ => return None,
            }
        }
        None
    }

    fn check_simple(items: &[Item]) -> Result<(), MacroError> {
        for item in items {
            if !item.is_simple() {
                return Err(MacroError::NotSimple(item.instruction()));
            }
        }
        Ok(())
    }

    /// Simple-item macro: the items followed by End.
    pub fn build_simple(items: &[Item]) -> Result<Macro, MacroError> {
        Macro::check_simple(items)?;
        let mut result = items.to_vec();
        result.push(Item::End);
        Ok(Macro { items: result })
    }

    /// Loop macro from its three simple parts, choosing the smallest
    /// template that expresses them.
    pub fn build_loop(
        pre: &[Item],
        body: &[Item],
        post: &[Item],
        loop_delay: u16,
    ) -> Result<Macro, MacroError> {
        Macro::check_simple(pre)?;
        Macro::check_simple(body)?;
        Macro::check_simple(post)?;

        let mut items = Vec::new();
        if body.is_empty() {
            // Inner loop is empty, use the wait instruction
            items.extend_from_slice(pre);
            items.push(Item::WaitRelease);
            items.extend_from_slice(post);
            items.push(Item::End);
        } else if loop_delay > 0 {
            // Use JumpIfReleased to delay the loop
            items.extend_from_slice(pre);
            let released_jump = items.len();
            items.push(Item::JumpIfReleased {
                delay: loop_delay,
                target: 0,
            });
            let body_start = items.len();
            items.extend_from_slice(body);
            items.push(Item::JumpIfPressed { target: body_start });
            let post_start = items.len();
            items.extend_from_slice(post);
            items.push(Item::End);
            items[released_jump].set_jump_target(post_start);
        } else if pre.is_empty() {
            // No pre-loop instruction, use the repeat instruction
            items.extend_from_slice(body);
            items.push(Item::RepeatUntilRelease);
            items.extend_from_slice(post);
            items.push(Item::End);
        } else {
            // Pre-loop is non-empty and the loop plays at least once,
            // a single JumpIfPressed at the end of the body is enough
            items.extend_from_slice(pre);
            let body_start = items.len();
            items.extend_from_slice(body);
            items.push(Item::JumpIfPressed { target: body_start });
            items.extend_from_slice(post);
            items.push(Item::End);
        }
        Ok(Macro { items })
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hidpp10::MacroFormat10;
    use crate::logging::setup_logging_lite;
    use crate::memory::test_util::MockBackend;

    fn memory10() -> PagedMemory<MockBackend> {
        PagedMemory::new(MockBackend::hidpp10(), true)
    }

    #[test]
    fn simple_macro_roundtrip_in_one_page() {
        setup_logging_lite().ok();
        // KeyPress('A'=4), Delay(100), JumpIfPressed -> first item
        let format = MacroFormat10;
        let mut mem = memory10();
        let source = Macro::from_items(vec![
            Item::KeyPress { key: 0x04 },
            Item::Delay { milliseconds: 100 },
            Item::JumpIfPressed { target: 0 },
            Item::End,
        ]);
        let mut start = Address::new(0, 3, 0);
        let next = source.write(&format, &mut mem, &mut start).unwrap();
        // No trampoline, start unchanged
        assert_eq!(start, Address::new(0, 3, 0));
        // 2 + 3 + 3 + 1 bytes, next word address is offset 5
        assert_eq!(next, Address::new(0, 3, 5));

        let page = mem.read_only_page(start).unwrap();
        assert_eq!(
            &page[0..8],
            &[0x20, 0x04, 0x43, 0x00, 0x64, 0x45, 0x03, 0x00]
        );

        let parsed = Macro::read(&format, &mut mem, start).unwrap();
        assert_eq!(parsed.items(), source.items());
    }

    #[test]
    fn long_macro_spans_pages_with_trampoline() {
        setup_logging_lite().ok();
        let format = MacroFormat10;
        let mut mem = memory10();
        // 200 x (KeyPress + KeyRelease) = 800 bytes, does not fit in
        // one 512-byte page
        let mut items = Vec::new();
        for _ in 0..200 {
            items.push(Item::KeyPress { key: 0x04 });
            items.push(Item::KeyRelease { key: 0x04 });
        }
        items.push(Item::End);
        let source = Macro::from_items(items);

        let mut start = Address::new(0, 3, 0);
        let next = source.write(&format, &mut mem, &mut start).unwrap();
        assert_eq!(start, Address::new(0, 3, 0));
        assert_eq!(next.page, 4);

        // A trampoline jump to page 4 offset 0 sits before the CRC
        // area of page 3
        let page3 = mem.read_only_page(Address::new(0, 3, 0)).unwrap().to_vec();
        let jump_pos = (0..510 - 2)
            .find(|&i| page3[i] == 0x44 && page3[i + 1] == 0x04 && page3[i + 2] == 0x00)
            .expect("no trampoline jump found in page 3");
        // Trampoline leaves room for the CRC trailer
        assert!(jump_pos + 3 <= 510);

        // Parsing follows the trampoline; after simplification the
        // trampoline jump disappears and the items match
        let mut parsed = Macro::read(&format, &mut mem, start).unwrap();
        parsed.simplify();
        assert_eq!(parsed.items(), source.items());
    }

    #[test]
    fn back_jump_destination_is_aligned_with_noop() {
        setup_logging_lite().ok();
        let format = MacroFormat10;
        let mut mem = memory10();
        // KeyPress (2 bytes), then a 3-byte Delay making the next
        // item start at an odd index, then a jump back to the Delay
        let source = Macro::from_items(vec![
            Item::KeyPress { key: 0x04 },
            Item::Delay { milliseconds: 50 },
            Item::JumpIfPressed { target: 1 },
            Item::End,
        ]);
        let mut start = Address::new(0, 3, 0);
        source.write(&format, &mut mem, &mut start).unwrap();

        let page = mem.read_only_page(start).unwrap();
        // Delay lands at index 2 (aligned), jump at index 5
        assert_eq!(page[0], 0x20);
        assert_eq!(page[2], 0x43);
        assert_eq!(page[5], 0x45);
        // Jump destination is word offset 1 = byte index 2
        assert_eq!(&page[6..8], &[0x03, 0x01]);

        let parsed = Macro::read(&format, &mut mem, start).unwrap();
        assert_eq!(parsed.items(), source.items());
    }

    #[test]
    fn odd_jump_destination_gets_padding() {
        setup_logging_lite().ok();
        let format = MacroFormat10;
        let mut mem = memory10();
        // ModifiersPress (2 bytes) + KeyPress (2 bytes): the
        // release sequence target lands at byte 4 -> aligned; make
        // it odd with a ShortDelay (1 byte) in between.
        let source = Macro::from_items(vec![
            Item::KeyPress { key: 0x04 },
            Item::ShortDelay { milliseconds: 8 },
            Item::KeyRelease { key: 0x04 },
            Item::JumpIfPressed { target: 2 },
            Item::End,
        ]);
        let mut start = Address::new(0, 3, 0);
        source.write(&format, &mut mem, &mut start).unwrap();

        let page = mem.read_only_page(start).unwrap();
        // 0x20 0x04 | 0x80 | NoOp pad | 0x21 0x04 at index 4
        assert_eq!(&page[0..6], &[0x20, 0x04, 0x80, 0x00, 0x21, 0x04]);

        let mut parsed = Macro::read(&format, &mut mem, start).unwrap();
        parsed.simplify();
        // The padding NoOp is gone and the jump targets KeyRelease
        assert_eq!(parsed.items(), source.items());
    }

    #[test]
    fn simplify_removes_noops_and_next_jumps() {
        let mut m = Macro::from_items(vec![
            Item::NoOp,
            Item::KeyPress { key: 1 },
            Item::Jump { target: 3 },
            Item::KeyRelease { key: 1 },
            Item::JumpIfPressed { target: 0 },
            Item::End,
        ]);
        m.simplify();
        assert_eq!(
            m.items(),
            &[
                Item::KeyPress { key: 1 },
                Item::KeyRelease { key: 1 },
                // Back reference through the removed NoOp lands on
                // KeyPress
                Item::JumpIfPressed { target: 0 },
                Item::End,
            ]
        );
    }

    #[test]
    fn is_simple_requires_trailing_end() {
        let m = Macro::from_items(vec![
            Item::KeyPress { key: 1 },
            Item::KeyRelease { key: 1 },
            Item::End,
        ]);
        assert!(m.is_simple());

        let m = Macro::from_items(vec![Item::KeyPress { key: 1 }]);
        assert!(!m.is_simple());

        let m = Macro::from_items(vec![
            Item::KeyPress { key: 1 },
            Item::RepeatUntilRelease,
            Item::End,
        ]);
        assert!(!m.is_simple());
    }

    #[test]
    fn loop_recognizers_roundtrip() {
        let pre = [Item::KeyPress { key: 4 }];
        let body = [Item::MouseWheel { delta: 1 }];
        let post = [Item::KeyRelease { key: 4 }];

        // Repeat template (no pre)
        let m = Macro::build_loop(&[], &body, &post, 0).unwrap();
        let parts = m.is_loop().expect("repeat loop not recognized");
        assert_eq!(parts.pre.len(), 0);
        assert_eq!(&m.items()[parts.body.clone()], &body);
        assert_eq!(&m.items()[parts.post.clone()], &post);
        assert_eq!(parts.delay, 0);

        // Wait template (empty body)
        let m = Macro::build_loop(&pre, &[], &post, 0).unwrap();
        let parts = m.is_loop().expect("wait loop not recognized");
        assert_eq!(&m.items()[parts.pre.clone()], &pre);
        assert_eq!(parts.body.len(), 0);
        assert_eq!(&m.items()[parts.post.clone()], &post);

        // Delayed template
        let m = Macro::build_loop(&pre, &body, &post, 50).unwrap();
        let parts = m.is_loop().expect("delayed loop not recognized");
        assert_eq!(&m.items()[parts.pre.clone()], &pre);
        assert_eq!(&m.items()[parts.body.clone()], &body);
        assert_eq!(&m.items()[parts.post.clone()], &post);
        assert_eq!(parts.delay, 50);

        // Back-edge template (pre present, no delay)
        let m = Macro::build_loop(&pre, &body, &post, 0).unwrap();
        let parts = m.is_loop().expect("back-edge loop not recognized");
        assert_eq!(&m.items()[parts.pre.clone()], &pre);
        assert_eq!(&m.items()[parts.body.clone()], &body);
        assert_eq!(&m.items()[parts.post.clone()], &post);
    }

    #[test]
    fn build_loop_rejects_control_flow_items() {
        let err = Macro::build_loop(&[Item::End], &[], &[], 0).unwrap_err();
        match err {
            MacroError::NotSimple(Instruction::End) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
