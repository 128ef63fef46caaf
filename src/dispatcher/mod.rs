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

//! Request/response/event multiplexing above a raw HID node.
//!
//! Two interchangeable dispatchers implement [`Dispatcher`]:
//! [`simple::SimpleDispatcher`] pumps reports on the calling thread,
//! [`threaded::ThreadedDispatcher`] runs a dedicated reader thread and
//! resolves call futures from it.

// ----- Modules -----

pub mod simple;
pub mod threaded;

use crate::hid::descriptor::{
    ReportDescriptor, ReportField, ReportId, ReportKind, Usage, Usages,
};
use crate::report::{DeviceIndex, Report, ReportType};
use crate::{hidpp10, hidpp20};
use core::fmt;
use std::sync::Arc;
use std::time::Duration;

// ----- Types -----

/// Persistent event listener. Returning `false` unregisters the
/// handler.
pub type EventHandler = Box<dyn FnMut(&Report) -> bool + Send>;

/// Token returned by handler registration, used for unregistering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

// ----- Enumerations -----

/// Errors surfaced by dispatchers and async report handles.
#[derive(Clone, Debug)]
pub enum DispatcherError {
    /// Transport failure; fatal to the dispatcher.
    Io(Arc<std::io::Error>),
    /// The node does not expose the canonical HID++ collections.
    NoHidppReport,
    /// No matching report arrived in time.
    Timeout,
    /// The dispatcher was stopped while the call was pending.
    NotRunning,
    /// A response matched but its parameter length does not fit the
    /// exchange it answers.
    InvalidResultLength,
    /// The device answered with a HID++1.0 error report.
    Hidpp10(hidpp10::Error),
    /// The device answered with a HID++2.0 error report.
    Hidpp20(hidpp20::Error),
}

impl fmt::Display for DispatcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherError::Io(e) => write!(f, "transport error: {}", e),
            DispatcherError::NoHidppReport => write!(f, "no HID++ report"),
            DispatcherError::Timeout => write!(f, "read timed out"),
            DispatcherError::NotRunning => write!(f, "dispatcher is not running"),
            DispatcherError::InvalidResultLength => write!(f, "invalid result length"),
            DispatcherError::Hidpp10(e) => write!(f, "{}", e),
            DispatcherError::Hidpp20(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DispatcherError {}

impl From<std::io::Error> for DispatcherError {
    fn from(e: std::io::Error) -> DispatcherError {
        DispatcherError::Io(Arc::new(e))
    }
}

impl From<hidpp10::Error> for DispatcherError {
    fn from(e: hidpp10::Error) -> DispatcherError {
        DispatcherError::Hidpp10(e)
    }
}

impl From<hidpp20::Error> for DispatcherError {
    fn from(e: hidpp20::Error) -> DispatcherError {
        DispatcherError::Hidpp20(e)
    }
}

// ----- Structs -----

/// Report types usable on the node, from the descriptor probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportInfo {
    pub has_short: bool,
    pub has_long: bool,
    pub has_very_long: bool,
}

impl ReportInfo {
    pub fn has_report(self, rtype: ReportType) -> bool {
        match rtype {
            ReportType::Short => self.has_short,
            ReportType::Long => self.has_long,
            ReportType::VeryLong => self.has_very_long,
        }
    }

    /// Smallest usable report type able to carry
    /// `minimum_parameter_length` bytes.
    pub fn find_report(self, minimum_parameter_length: usize) -> Option<ReportType> {
        for rtype in &[ReportType::Short, ReportType::Long, ReportType::VeryLong] {
            if !self.has_report(*rtype) {
                continue;
            }
            match rtype.parameter_length() {
                Some(len) if minimum_parameter_length <= len => return Some(*rtype),
                // Very long length is device-declared, assume it fits
                None => return Some(*rtype),
                _ => {}
            }
        }
        None
    }
}

// ----- Traits -----

/// Future-like handle on a report the dispatcher has not received yet.
///
/// Getting the report consumes the handle. Dropping an unresolved
/// handle removes its matcher from the dispatcher; reports that would
/// have matched then fall through to the event path.
pub trait AsyncReport {
    /// Block until the matching report arrives.
    fn get(self: Box<Self>) -> Result<Report, DispatcherError>;

    /// Block up to `timeout`, then fail with
    /// [`DispatcherError::Timeout`] after removing the matcher.
    fn get_timeout(self: Box<Self>, timeout: Duration) -> Result<Report, DispatcherError>;
}

/// Shared interface of the two dispatcher variants.
pub trait Dispatcher {
    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn name(&self) -> String;

    /// Report types supported by this node.
    fn report_info(&self) -> ReportInfo;

    /// Send a report without expecting any answer.
    fn send_command_without_response(&self, report: &Report) -> Result<(), DispatcherError>;

    /// Send a report and return a handle on the matching answer
    /// (same device index and sub ID/address, or a protocol error
    /// report for that request).
    fn send_command(
        &self,
        report: Report,
    ) -> Result<Box<dyn AsyncReport + '_>, DispatcherError>;

    /// One-shot listener for the next event matching `index` and
    /// `sub_id`.
    fn get_notification(
        &self,
        index: DeviceIndex,
        sub_id: u8,
    ) -> Result<Box<dyn AsyncReport + '_>, DispatcherError>;

    /// Add a persistent listener for events matching `index` and
    /// `sub_id`. The handler unregisters itself by returning `false`.
    fn register_event_handler(
        &self,
        index: DeviceIndex,
        sub_id: u8,
        handler: EventHandler,
    ) -> ListenerId;

    fn unregister_event_handler(&self, id: ListenerId);
}

// ----- Descriptor probe -----

const SHORT_REPORT_USAGE: Usage = Usage::new(0xFF00, 0x0001);
const LONG_REPORT_USAGE: Usage = Usage::new(0xFF00, 0x0002);
const VERY_LONG_REPORT_USAGE: Usage = Usage::new(0xFF00, 0x0004);
const SHORT_REPORT_COUNT: u32 = 6;
const LONG_REPORT_COUNT: u32 = 19;

fn field_matches(fields: &[ReportField], usage: Usage, count: Option<u32>) -> bool {
    if fields.len() != 1 {
        return false;
    }
    let field = &fields[0];
    if !field.flags.data() || !field.flags.array() || field.size != 8 {
        return false;
    }
    if let Some(count) = count {
        if field.count != count {
            return false;
        }
    }
    match &field.usages {
        Usages::List(usages) => usages.len() == 1 && usages[0] == usage,
        Usages::Range(..) => false,
    }
}

fn has_report(
    desc: &ReportDescriptor,
    usage: Usage,
    kind: ReportKind,
    id: u8,
    count: Option<u32>,
) -> bool {
    desc.collections
        .iter()
        .filter(|c| c.usage == usage)
        .any(|c| match c.reports.get(&ReportId { kind, id }) {
            Some(fields) => field_matches(fields, usage, count),
            None => false,
        })
}

/// Check the descriptor for the canonical HID++ collections.
///
/// The node is accepted when both the short (FF00:0001, 8x6, ID 0x10)
/// and the long (FF00:0002, 8x19, ID 0x11) input/output reports are
/// present. Very long report support (FF00:0004, ID 0x12) is recorded
/// but not required.
pub fn check_report_descriptor(
    desc: &ReportDescriptor,
) -> Result<ReportInfo, DispatcherError> {
    let short_id: u8 = ReportType::Short.into();
    let long_id: u8 = ReportType::Long.into();
    let very_long_id: u8 = ReportType::VeryLong.into();
    let info = ReportInfo {
        has_short: has_report(
            desc,
            SHORT_REPORT_USAGE,
            ReportKind::Input,
            short_id,
            Some(SHORT_REPORT_COUNT),
        ) && has_report(
            desc,
            SHORT_REPORT_USAGE,
            ReportKind::Output,
            short_id,
            Some(SHORT_REPORT_COUNT),
        ),
        has_long: has_report(
            desc,
            LONG_REPORT_USAGE,
            ReportKind::Input,
            long_id,
            Some(LONG_REPORT_COUNT),
        ) && has_report(
            desc,
            LONG_REPORT_USAGE,
            ReportKind::Output,
            long_id,
            Some(LONG_REPORT_COUNT),
        ),
        has_very_long: has_report(
            desc,
            VERY_LONG_REPORT_USAGE,
            ReportKind::Input,
            very_long_id,
            None,
        ) && has_report(
            desc,
            VERY_LONG_REPORT_USAGE,
            ReportKind::Output,
            very_long_id,
            None,
        ),
    };
    if !info.has_short || !info.has_long {
        return Err(DispatcherError::NoHidppReport);
    }
    Ok(info)
}

// ----- Listener map -----

struct Listener {
    id: u64,
    index: u8,
    sub_id: u8,
    handler: EventHandler,
}

/// Insertion-ordered multimap of event handlers.
#[derive(Default)]
pub(crate) struct ListenerMap {
    next_id: u64,
    listeners: Vec<Listener>,
}

impl ListenerMap {
    pub fn register(&mut self, index: u8, sub_id: u8, handler: EventHandler) -> ListenerId {
        self.next_id += 1;
        let id = self.next_id;
        self.listeners.push(Listener {
            id,
            index,
            sub_id,
            handler,
        });
        ListenerId(id)
    }

    pub fn unregister(&mut self, id: ListenerId) {
        self.listeners.retain(|l| l.id != id.0);
    }

    /// Deliver `report` to every matching handler in registration
    /// order, removing handlers that return `false`.
    pub fn process_event(&mut self, report: &Report) {
        let index = report.device_index();
        let sub_id = report.sub_id();
        let mut i = 0;
        while i < self.listeners.len() {
            let listener = &mut self.listeners[i];
            if listener.index == index && listener.sub_id == sub_id {
                if (listener.handler)(report) {
                    i += 1;
                } else {
                    self.listeners.remove(i);
                }
            } else {
                i += 1;
            }
        }
    }
}

/// An unmatched report is treated as an event when the software ID is
/// 0 or the sub ID is below 0x80.
///
/// This is observed firmware behavior, not a guarantee: HID++2.0
/// responses with feature indices at or above 0x80 would be mistaken
/// for HID++1.0 notifications, but no known device has that many
/// features.
pub(crate) fn is_event(report: &Report) -> bool {
    report.software_id() == 0 || report.sub_id() < 0x80
}

// ----- Test helpers -----


// ----- Tests -----
