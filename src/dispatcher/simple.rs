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

//! Single-threaded pumping dispatcher.

// ----- Modules -----

use super::{
    check_report_descriptor, AsyncReport, Dispatcher, DispatcherError, EventHandler,
    ListenerId, ListenerMap, ReportInfo,
};
use crate::hid::descriptor::ReportDescriptor;
use crate::hid::RawDevice;
use crate::report::{DeviceIndex, Report, ReportError};
use crate::{hidpp10, hidpp20};
use std::cell::RefCell;
use std::time::Duration;

// ----- Structs -----

/// Dispatcher servicing all I/O on the calling thread.
///
/// `send_command` writes the request and the returned handle pumps
/// the read loop inline until its own answer shows up; every event
/// passing by during the pump is delivered to the registered
/// handlers on the same stack.
///
/// Limitation: an event handler invoked while pumping must not issue
/// another command on the same dispatcher.
pub struct SimpleDispatcher<D: RawDevice> {
    dev: D,
    report_info: ReportInfo,
    listeners: RefCell<ListenerMap>,
}

impl<D: RawDevice> SimpleDispatcher<D> {
    /// Probe the report descriptor and take ownership of the node.
    pub fn new(dev: D) -> Result<SimpleDispatcher<D>, DispatcherError> {
        let desc = ReportDescriptor::parse(dev.report_descriptor()).map_err(|e| {
            warn!("Unparseable report descriptor: {}", e);
            DispatcherError::NoHidppReport
        })?;
        let report_info = check_report_descriptor(&desc)?;
        Ok(SimpleDispatcher {
            dev,
            report_info,
            listeners: RefCell::new(ListenerMap::default()),
        })
    }

    /// Access the underlying transport.
    pub fn raw_device(&self) -> &D {
        &self.dev
    }

    /// Pump reports, delivering events to registered handlers, until
    /// the read is interrupted with [`SimpleDispatcher::stop`].
    ///
    /// `timeout` bounds each individual read, not the whole loop.
    pub fn listen(&self, timeout: Option<Duration>) {
        loop {
            match self.get_report(timeout) {
                Ok(_) => {
                    debug!("Ignored report while listening for events");
                }
                Err(DispatcherError::Timeout) => return,
                Err(e) => {
                    error!("Failed to read HID report: {}", e);
                    return;
                }
            }
        }
    }

    /// Interrupt a pending or upcoming read.
    pub fn stop(&self) {
        self.dev.interrupt_read();
    }

    /// Read one HID++ report, skipping foreign reports and delivering
    /// any non-error report to matching event handlers before
    /// returning it.
    fn get_report(&self, timeout: Option<Duration>) -> Result<Report, DispatcherError> {
        loop {
            let mut buf = [0u8; 64];
            let len = self.dev.read_report(&mut buf, timeout)?;
            if len == 0 {
                return Err(DispatcherError::Timeout);
            }
            match Report::from_raw(buf[..len].to_vec()) {
                Ok(report) => {
                    if report.check_error10().is_none() && report.check_error20().is_none() {
                        self.listeners.borrow_mut().process_event(&report);
                    }
                    return Ok(report);
                }
                Err(ReportError::InvalidReportId(_)) => {
                    // Other report types share the node, ignore them
                }
                Err(ReportError::InvalidReportLength) => {
                    error!("Ignored report with invalid length");
                }
            }
        }
    }
}

impl<D: RawDevice> Dispatcher for SimpleDispatcher<D> {
    fn vendor_id(&self) -> u16 {
        self.dev.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.dev.product_id()
    }

    fn name(&self) -> String {
        self.dev.name().to_string()
    }

    fn report_info(&self) -> ReportInfo {
        self.report_info
    }

    fn send_command_without_response(&self, report: &Report) -> Result<(), DispatcherError> {
        self.dev.write_report(report.raw())?;
        Ok(())
    }

    fn send_command(
        &self,
        report: Report,
    ) -> Result<Box<dyn AsyncReport + '_>, DispatcherError> {
        self.dev.write_report(report.raw())?;
        Ok(Box::new(CommandResponse {
            dispatcher: self,
            request: report,
        }))
    }

    fn get_notification(
        &self,
        index: DeviceIndex,
        sub_id: u8,
    ) -> Result<Box<dyn AsyncReport + '_>, DispatcherError> {
        Ok(Box::new(Notification {
            dispatcher: self,
            index: index.into(),
            sub_id,
        }))
    }

    fn register_event_handler(
        &self,
        index: DeviceIndex,
        sub_id: u8,
        handler: EventHandler,
    ) -> ListenerId {
        self.listeners
            .borrow_mut()
            .register(index.into(), sub_id, handler)
    }

    fn unregister_event_handler(&self, id: ListenerId) {
        self.listeners.borrow_mut().unregister(id);
    }
}

// ----- Async handles -----

struct CommandResponse<'d, D: RawDevice> {
    dispatcher: &'d SimpleDispatcher<D>,
    request: Report,
}

impl<'d, D: RawDevice> CommandResponse<'d, D> {
    fn pump(&self, timeout: Option<Duration>) -> Result<Report, DispatcherError> {
        loop {
            let response = self.dispatcher.get_report(timeout)?;
            if response.device_index() != self.request.device_index() {
                debug!("Ignored response because of different device index");
                continue;
            }
            if let Some((sub_id, address, error_code)) = response.check_error10() {
                if sub_id == self.request.sub_id() && address == self.request.address() {
                    return Err(hidpp10::Error::from_code(error_code).into());
                }
                debug!("Ignored HID++1.0 error response");
                continue;
            }
            if let Some((feature, function, sw_id, error_code)) = response.check_error20() {
                if feature == self.request.feature_index()
                    && function == self.request.function()
                    && sw_id == self.request.software_id()
                {
                    return Err(hidpp20::Error::from_code(error_code).into());
                }
                debug!("Ignored HID++2.0 error response");
                continue;
            }
            if response.sub_id() == self.request.sub_id()
                && response.address() == self.request.address()
            {
                return Ok(response);
            }
        }
    }
}

impl<'d, D: RawDevice> AsyncReport for CommandResponse<'d, D> {
    fn get(self: Box<Self>) -> Result<Report, DispatcherError> {
        self.pump(None)
    }

    // The timeout bounds each inner read; the protocol has no
    // intermediate progress to measure.
    fn get_timeout(self: Box<Self>, timeout: Duration) -> Result<Report, DispatcherError> {
        self.pump(Some(timeout))
    }
}

struct Notification<'d, D: RawDevice> {
    dispatcher: &'d SimpleDispatcher<D>,
    index: u8,
    sub_id: u8,
}

impl<'d, D: RawDevice> Notification<'d, D> {
    fn pump(&self, timeout: Option<Duration>) -> Result<Report, DispatcherError> {
        loop {
            let report = self.dispatcher.get_report(timeout)?;
            if report.device_index() == self.index && report.sub_id() == self.sub_id {
                return Ok(report);
            }
            debug!("Ignored report while waiting for notification");
        }
    }
}

impl<'d, D: RawDevice> AsyncReport for Notification<'d, D> {
    fn get(self: Box<Self>) -> Result<Report, DispatcherError> {
        self.pump(None)
    }

    fn get_timeout(self: Box<Self>, timeout: Duration) -> Result<Report, DispatcherError> {
        self.pump(Some(timeout))
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::super::test_util::MockDevice;
    use super::*;
    use crate::logging::setup_logging_lite;
    use crate::report::ReportType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn ping_call_resolves_with_response() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|report| {
            assert_eq!(report, &[0x10, 0x01, 0x00, 0x11, 0x00, 0x00, 0x00]);
            vec![vec![0x10, 0x01, 0x00, 0x11, 0x04, 0x02, 0x00]]
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let request = Report::new20(
            ReportType::Short,
            DeviceIndex::WirelessDevice1,
            0x00,
            0x01,
            0x01,
        );
        let response = dispatcher
            .send_command(request)
            .unwrap()
            .get_timeout(TIMEOUT)
            .unwrap();
        assert_eq!(response.parameters(), &[0x04, 0x02, 0x00]);
    }

    #[test]
    fn hidpp10_error_fails_the_call() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|report| {
            assert_eq!(report, &[0x10, 0xFF, 0x81, 0xFE, 0x00, 0x00, 0x00]);
            vec![vec![0x10, 0xFF, 0x8F, 0x81, 0xFE, 0x01, 0x00]]
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let request = Report::new10(
            ReportType::Short,
            DeviceIndex::DefaultDevice,
            0x81,
            0xFE,
        );
        let err = dispatcher
            .send_command(request)
            .unwrap()
            .get_timeout(TIMEOUT)
            .unwrap_err();
        match err {
            DispatcherError::Hidpp10(e) => {
                assert_eq!(e, hidpp10::Error::InvalidSubId);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn unrelated_reports_are_skipped_while_pumping() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|_| {
            vec![
                // Foreign (mouse) report, dropped by the codec
                vec![0x02, 0x00, 0x01],
                // Event for another device index
                vec![0x10, 0x02, 0x41, 0x00, 0x01, 0x00, 0x00],
                // The actual answer
                vec![0x10, 0x01, 0x81, 0x00, 0x12, 0x34, 0x56],
            ]
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let request = Report::new10(
            ReportType::Short,
            DeviceIndex::WirelessDevice1,
            0x81,
            0x00,
        );
        let response = dispatcher
            .send_command(request)
            .unwrap()
            .get_timeout(TIMEOUT)
            .unwrap();
        assert_eq!(response.parameters(), &[0x12, 0x34, 0x56]);
    }

    #[test]
    fn events_reach_handlers_during_pump() {
        setup_logging_lite().ok();
        let dev = MockDevice::with_responder(Box::new(|_| {
            vec![
                vec![0x10, 0x01, 0x41, 0x00, 0x01, 0x00, 0x00], // event
                vec![0x10, 0x01, 0x81, 0x00, 0x00, 0x00, 0x00], // answer
            ]
        }));
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let events = Arc::new(AtomicUsize::new(0));
        let seen = events.clone();
        dispatcher.register_event_handler(
            DeviceIndex::WirelessDevice1,
            0x41,
            Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                true
            }),
        );
        let request = Report::new10(
            ReportType::Short,
            DeviceIndex::WirelessDevice1,
            0x81,
            0x00,
        );
        dispatcher
            .send_command(request)
            .unwrap()
            .get_timeout(TIMEOUT)
            .unwrap();
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn timeout_when_no_response() {
        setup_logging_lite().ok();
        let dispatcher = SimpleDispatcher::new(MockDevice::new()).unwrap();
        let request = Report::new10(
            ReportType::Short,
            DeviceIndex::DefaultDevice,
            0x81,
            0x00,
        );
        let err = dispatcher
            .send_command(request)
            .unwrap()
            .get_timeout(Duration::from_millis(10))
            .unwrap_err();
        match err {
            DispatcherError::Timeout => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn notification_resolves_on_matching_event() {
        setup_logging_lite().ok();
        let dev = MockDevice::new();
        dev.inject(vec![0x10, 0x02, 0x41, 0x00, 0x01, 0x00, 0x00]); // wrong index
        dev.inject(vec![0x10, 0x01, 0x41, 0x00, 0x02, 0x00, 0x00]);
        let dispatcher = SimpleDispatcher::new(dev).unwrap();
        let report = dispatcher
            .get_notification(DeviceIndex::WirelessDevice1, 0x41)
            .unwrap()
            .get_timeout(TIMEOUT)
            .unwrap();
        assert_eq!(report.parameters(), &[0x02, 0x00, 0x00]);
    }
}
