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

//! Background-thread multiplexing dispatcher.

// ----- Modules -----

use super::{
    check_report_descriptor, is_event, AsyncReport, Dispatcher, DispatcherError,
    EventHandler, ListenerId, ListenerMap, ReportInfo,
};
use crate::hid::descriptor::ReportDescriptor;
use crate::hid::RawDevice;
use crate::report::{DeviceIndex, Report, ReportError};
use crate::{hidpp10, hidpp20};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::Duration;

// ----- Structs -----

/// Future slot resolved by the reader thread.
struct ResponseSlot {
    state: Mutex<Option<Result<Report, DispatcherError>>>,
    cond: Condvar,
}

impl ResponseSlot {
    fn new() -> Arc<ResponseSlot> {
        Arc::new(ResponseSlot {
            state: Mutex::new(None),
            cond: Condvar::new(),
        })
    }

    fn resolve(&self, result: Result<Report, DispatcherError>) {
        let mut state = self.state.lock().unwrap();
        if state.is_none() {
            *state = Some(result);
            self.cond.notify_all();
        }
    }

    fn is_pending(&self) -> bool {
        self.state.lock().unwrap().is_none()
    }

    fn wait(&self) -> Result<Report, DispatcherError> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(result) = state.take() {
                return result;
            }
            state = self.cond.wait(state).unwrap();
        }
    }

    /// Wait up to `timeout`; `None` means still pending.
    fn wait_timeout(&self, timeout: Duration) -> Option<Result<Report, DispatcherError>> {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(result) = state.take() {
                return Some(result);
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self.cond.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }
}

struct PendingCommand {
    id: u64,
    request: Report,
    slot: Arc<ResponseSlot>,
}

struct PendingNotification {
    id: u64,
    index: u8,
    sub_id: u8,
    slot: Arc<ResponseSlot>,
}

#[derive(Default)]
struct CommandList {
    next_id: u64,
    entries: Vec<PendingCommand>,
}

#[derive(Default)]
struct NotificationList {
    next_id: u64,
    entries: Vec<PendingNotification>,
}

struct Shared {
    dev: Box<dyn RawDevice>,
    /// Guards the pending command list and the write side of the
    /// device, so a response cannot arrive before its matcher is
    /// installed.
    commands: Mutex<CommandList>,
    /// Guards the handler map and the one-shot notification list.
    listeners: Mutex<(ListenerMap, NotificationList)>,
    stopped: AtomicBool,
    /// Set before `stopped`; replayed to every pending and future
    /// call.
    exception: Mutex<Option<DispatcherError>>,
}

impl Shared {
    fn stored_error(&self) -> DispatcherError {
        self.exception
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(DispatcherError::NotRunning)
    }
}

/// Dispatcher with a dedicated reader thread.
///
/// Calls may be issued from any thread, including from event handlers
/// (which run on the reader thread); each call's completion is waited
/// on by its caller.
pub struct ThreadedDispatcher {
    shared: Arc<Shared>,
    report_info: ReportInfo,
    thread: Option<thread::JoinHandle<()>>,
}

impl ThreadedDispatcher {
    /// Probe the descriptor and spawn the reader thread.
    pub fn new(dev: Box<dyn RawDevice>) -> Result<ThreadedDispatcher, DispatcherError> {
        let desc = ReportDescriptor::parse(dev.report_descriptor()).map_err(|e| {
            warn!("Unparseable report descriptor: {}", e);
            DispatcherError::NoHidppReport
        })?;
        let report_info = check_report_descriptor(&desc)?;
        let shared = Arc::new(Shared {
            dev,
            commands: Mutex::new(CommandList::default()),
            listeners: Mutex::new((ListenerMap::default(), NotificationList::default())),
            stopped: AtomicBool::new(false),
            exception: Mutex::new(None),
        });
        let thread_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("hidpp-dispatcher".to_string())
            .spawn(move || run(thread_shared))
            .map_err(DispatcherError::from)?;
        Ok(ThreadedDispatcher {
            shared,
            report_info,
            thread: Some(thread),
        })
    }

    /// Stop the reader thread, failing every pending call.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.dev.interrupt_read();
    }
}

impl Drop for ThreadedDispatcher {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

impl Dispatcher for ThreadedDispatcher {
    fn vendor_id(&self) -> u16 {
        self.shared.dev.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.shared.dev.product_id()
    }

    fn name(&self) -> String {
        self.shared.dev.name().to_string()
    }

    fn report_info(&self) -> ReportInfo {
        self.report_info
    }

    fn send_command_without_response(&self, report: &Report) -> Result<(), DispatcherError> {
        let _commands = self.shared.commands.lock().unwrap();
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(self.shared.stored_error());
        }
        self.shared.dev.write_report(report.raw())?;
        Ok(())
    }

    fn send_command(
        &self,
        report: Report,
    ) -> Result<Box<dyn AsyncReport + '_>, DispatcherError> {
        let mut commands = self.shared.commands.lock().unwrap();
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(self.shared.stored_error());
        }
        self.shared.dev.write_report(report.raw())?;
        commands.next_id += 1;
        let id = commands.next_id;
        let slot = ResponseSlot::new();
        commands.entries.push(PendingCommand {
            id,
            request: report,
            slot: slot.clone(),
        });
        Ok(Box::new(CommandHandle {
            shared: Arc::downgrade(&self.shared),
            id,
            slot,
        }))
    }

    fn get_notification(
        &self,
        index: DeviceIndex,
        sub_id: u8,
    ) -> Result<Box<dyn AsyncReport + '_>, DispatcherError> {
        let mut listeners = self.shared.listeners.lock().unwrap();
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(self.shared.stored_error());
        }
        let notifications = &mut listeners.1;
        notifications.next_id += 1;
        let id = notifications.next_id;
        let slot = ResponseSlot::new();
        notifications.entries.push(PendingNotification {
            id,
            index: index.into(),
            sub_id,
            slot: slot.clone(),
        });
        Ok(Box::new(NotificationHandle {
            shared: Arc::downgrade(&self.shared),
            id,
            slot,
        }))
    }

    fn register_event_handler(
        &self,
        index: DeviceIndex,
        sub_id: u8,
        handler: EventHandler,
    ) -> ListenerId {
        let mut listeners = self.shared.listeners.lock().unwrap();
        listeners.0.register(index.into(), sub_id, handler)
    }

    fn unregister_event_handler(&self, id: ListenerId) {
        let mut listeners = self.shared.listeners.lock().unwrap();
        listeners.0.unregister(id);
    }
}

// ----- Reader thread -----

fn run(shared: Arc<Shared>) {
    let mut buf = [0u8; 64];
    while !shared.stopped.load(Ordering::SeqCst) {
        match shared.dev.read_report(&mut buf, None) {
            Ok(0) => {
                // Interrupted; the loop condition rechecks `stopped`
            }
            Ok(len) => process_report(&shared, &buf[..len]),
            Err(e) => {
                error!("Failed to read HID report: {}", e);
                *shared.exception.lock().unwrap() = Some(DispatcherError::from(e));
                break;
            }
        }
    }
    shared.stopped.store(true, Ordering::SeqCst);
    let exception = shared.stored_error();
    {
        let mut commands = shared.commands.lock().unwrap();
        if !commands.entries.is_empty() {
            warn!("Unfinished commands while stopping dispatcher");
            for cmd in commands.entries.drain(..) {
                cmd.slot.resolve(Err(exception.clone()));
            }
        }
    }
    {
        let mut listeners = shared.listeners.lock().unwrap();
        if !listeners.1.entries.is_empty() {
            warn!("Unreceived notifications while stopping dispatcher");
            for notification in listeners.1.entries.drain(..) {
                notification.slot.resolve(Err(exception.clone()));
            }
        }
    }
}

fn process_report(shared: &Shared, raw: &[u8]) {
    let report = match Report::from_raw(raw.to_vec()) {
        Ok(report) => report,
        Err(ReportError::InvalidReportId(_)) => {
            // Other report types share the node, ignore them
            return;
        }
        Err(ReportError::InvalidReportLength) => {
            error!("Ignored report with invalid length");
            return;
        }
    };

    let index = report.device_index();

    if let Some((sub_id, address, error_code)) = report.check_error10() {
        let mut commands = shared.commands.lock().unwrap();
        match commands.entries.iter().position(|cmd| {
            index == cmd.request.device_index()
                && sub_id == cmd.request.sub_id()
                && address == cmd.request.address()
        }) {
            Some(pos) => {
                let cmd = commands.entries.remove(pos);
                cmd.slot
                    .resolve(Err(hidpp10::Error::from_code(error_code).into()));
            }
            None => warn!("HID++1.0 error message was not matched with any command"),
        }
    } else if let Some((feature, function, sw_id, error_code)) = report.check_error20() {
        let mut commands = shared.commands.lock().unwrap();
        match commands.entries.iter().position(|cmd| {
            index == cmd.request.device_index()
                && feature == cmd.request.feature_index()
                && function == cmd.request.function()
                && sw_id == cmd.request.software_id()
        }) {
            Some(pos) => {
                let cmd = commands.entries.remove(pos);
                cmd.slot
                    .resolve(Err(hidpp20::Error::from_code(error_code).into()));
            }
            None => warn!("HID++2.0 error message was not matched with any command"),
        }
    } else {
        {
            let mut commands = shared.commands.lock().unwrap();
            if let Some(pos) = commands.entries.iter().position(|cmd| {
                report.device_index() == cmd.request.device_index()
                    && report.sub_id() == cmd.request.sub_id()
                    && report.address() == cmd.request.address()
            }) {
                let cmd = commands.entries.remove(pos);
                cmd.slot.resolve(Ok(report));
                return;
            }
        }
        if is_event(&report) {
            let mut listeners = shared.listeners.lock().unwrap();
            let (handlers, notifications) = &mut *listeners;
            let mut i = 0;
            while i < notifications.entries.len() {
                let entry = &notifications.entries[i];
                if entry.index == report.device_index() && entry.sub_id == report.sub_id() {
                    let entry = notifications.entries.remove(i);
                    entry.slot.resolve(Ok(report.clone()));
                } else {
                    i += 1;
                }
            }
            handlers.process_event(&report);
        } else {
            warn!("Answer was not matched with any command");
        }
    }
}

// ----- Async handles -----

struct CommandHandle {
    shared: Weak<Shared>,
    id: u64,
    slot: Arc<ResponseSlot>,
}

impl CommandHandle {
    fn cancel(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut commands = shared.commands.lock().unwrap();
            commands.entries.retain(|cmd| cmd.id != self.id);
        }
    }
}

impl AsyncReport for CommandHandle {
    fn get(self: Box<Self>) -> Result<Report, DispatcherError> {
        self.slot.wait()
    }

    fn get_timeout(self: Box<Self>, timeout: Duration) -> Result<Report, DispatcherError> {
        if let Some(result) = self.slot.wait_timeout(timeout) {
            return result;
        }
        let shared = match self.shared.upgrade() {
            Some(shared) => shared,
            None => return Err(DispatcherError::NotRunning),
        };
        let mut commands = shared.commands.lock().unwrap();
        // The reader might have resolved the slot while we were
        // acquiring the lock.
        if !self.slot.is_pending() {
            drop(commands);
            return self.slot.wait();
        }
        commands.entries.retain(|cmd| cmd.id != self.id);
        Err(DispatcherError::Timeout)
    }
}

impl Drop for CommandHandle {
    fn drop(&mut self) {
        if self.slot.is_pending() {
            self.cancel();
        }
    }
}

struct NotificationHandle {
    shared: Weak<Shared>,
    id: u64,
    slot: Arc<ResponseSlot>,
}

impl NotificationHandle {
    fn cancel(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut listeners = shared.listeners.lock().unwrap();
            listeners.1.entries.retain(|n| n.id != self.id);
        }
    }
}

impl AsyncReport for NotificationHandle {
    fn get(self: Box<Self>) -> Result<Report, DispatcherError> {
        self.slot.wait()
    }

    fn get_timeout(self: Box<Self>, timeout: Duration) -> Result<Report, DispatcherError> {
        if let Some(result) = self.slot.wait_timeout(timeout) {
            return result;
        }
        let shared = match self.shared.upgrade() {
            Some(shared) => shared,
            None => return Err(DispatcherError::NotRunning),
        };
        let mut listeners = shared.listeners.lock().unwrap();
        if !self.slot.is_pending() {
            drop(listeners);
            return self.slot.wait();
        }
        listeners.1.entries.retain(|n| n.id != self.id);
        Err(DispatcherError::Timeout)
    }
}

impl Drop for NotificationHandle {
    fn drop(&mut self) {
        if self.slot.is_pending() {
            self.cancel();
        }
    }
}

// ----- Tests -----
