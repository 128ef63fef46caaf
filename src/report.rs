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

// ----- Modules -----

use core::convert::TryFrom;
use core::fmt;
use num_enum::{IntoPrimitive, TryFromPrimitive};

// ----- Enumerations -----

/// HID++ report type, doubling as the HID report ID.
///
/// The only difference between report types is the length of their
/// parameters.
#[repr(u8)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, IntoPrimitive, TryFromPrimitive)]
pub enum ReportType {
    /// 3 parameter bytes
    Short = 0x10,
    /// 16 parameter bytes
    Long = 0x11,
    /// Device-declared parameter length (20 bytes or more)
    VeryLong = 0x12,
}

impl ReportType {
    /// Parameter length fixed by the report type, `None` for the
    /// device-declared very long reports.
    pub fn parameter_length(self) -> Option<usize> {
        match self {
            ReportType::Short => Some(SHORT_PARAM_LENGTH),
            ReportType::Long => Some(LONG_PARAM_LENGTH),
            ReportType::VeryLong => None,
        }
    }
}

/// Device index inside a HID++ report.
///
/// Receiver and paired wireless devices share one hidraw node; the
/// index directs a report to a particular device.
#[repr(u8)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, IntoPrimitive, TryFromPrimitive)]
pub enum DeviceIndex {
    /// Older corded devices
    CordedDevice = 0x00,
    WirelessDevice1 = 0x01,
    WirelessDevice2 = 0x02,
    WirelessDevice3 = 0x03,
    WirelessDevice4 = 0x04,
    WirelessDevice5 = 0x05,
    WirelessDevice6 = 0x06,
    /// Receiver, or corded/bluetooth devices
    DefaultDevice = 0xFF,
}

// ----- Consts -----

pub const SHORT_PARAM_LENGTH: usize = 3;
pub const LONG_PARAM_LENGTH: usize = 16;
/// Smallest parameter count a very long report may declare.
pub const VERY_LONG_MIN_PARAM_LENGTH: usize = 20;

pub const HEADER_LENGTH: usize = 4;

/// Byte offsets inside the raw report (report ID included).
mod offset {
    pub const TYPE: usize = 0;
    pub const DEVICE_INDEX: usize = 1;
    pub const SUB_ID: usize = 2;
    pub const ADDRESS: usize = 3;
    pub const PARAMETERS: usize = 4;
}

/// SubID of HID++1.0 error reports.
const ERROR_MESSAGE_10: u8 = 0x8F;
/// Feature index of HID++2.0 error reports.
const ERROR_MESSAGE_20: u8 = 0xFF;

// ----- Structs -----

/// Report construction or parse failure.
#[derive(Debug, PartialEq, Eq)]
pub enum ReportError {
    /// Leading byte is not a HID++ report ID. Other HID reports
    /// coexist on the same node, so this is usually not an error
    /// worth surfacing to the user.
    InvalidReportId(u8),
    /// The buffer length does not match the length implied by the
    /// report ID.
    InvalidReportLength,
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::InvalidReportId(id) => {
                write!(f, "invalid report ID 0x{:02x} for a HID++ report", id)
            }
            ReportError::InvalidReportLength => {
                write!(f, "invalid report length for a HID++ report")
            }
        }
    }
}

impl std::error::Error for ReportError {}

/// One HID++ report, usable with both protocol versions.
///
/// Common fields are the type, the device index and the parameters.
/// HID++1.0 frames the third and fourth header bytes as sub ID and
/// address; HID++2.0 frames the same bytes as feature index and
/// function/software ID. Both views are always available, the caller
/// picks the one matching the device's protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    data: Vec<u8>,
}

impl Report {
    /// Parse a raw report, report ID in the first byte.
    pub fn from_raw(data: Vec<u8>) -> Result<Report, ReportError> {
        if data.is_empty() {
            return Err(ReportError::InvalidReportLength);
        }
        let rtype = ReportType::try_from(data[0])
            .map_err(|_| ReportError::InvalidReportId(data[0]))?;
        match rtype.parameter_length() {
            Some(len) => {
                if data.len() != HEADER_LENGTH + len {
                    return Err(ReportError::InvalidReportLength);
                }
            }
            None => {
                if data.len() < HEADER_LENGTH + VERY_LONG_MIN_PARAM_LENGTH {
                    return Err(ReportError::InvalidReportLength);
                }
            }
        }
        Ok(Report { data })
    }

    fn empty(rtype: ReportType) -> Report {
        let len = HEADER_LENGTH
            + rtype
                .parameter_length()
                .unwrap_or(VERY_LONG_MIN_PARAM_LENGTH);
        let mut data = vec![0; len];
        data[offset::TYPE] = rtype.into();
        Report { data }
    }

    fn type_for_params(len: usize) -> Result<ReportType, ReportError> {
        match len {
            SHORT_PARAM_LENGTH => Ok(ReportType::Short),
            LONG_PARAM_LENGTH => Ok(ReportType::Long),
            n if n >= VERY_LONG_MIN_PARAM_LENGTH => Ok(ReportType::VeryLong),
            _ => Err(ReportError::InvalidReportLength),
        }
    }

    /// HID++1.0 report with zeroed parameters.
    pub fn new10(
        rtype: ReportType,
        device_index: DeviceIndex,
        sub_id: u8,
        address: u8,
    ) -> Report {
        let mut report = Report::empty(rtype);
        report.data[offset::DEVICE_INDEX] = device_index.into();
        report.data[offset::SUB_ID] = sub_id;
        report.data[offset::ADDRESS] = address;
        report
    }

    /// HID++1.0 report, type deduced from the parameter length.
    pub fn with_params10(
        device_index: DeviceIndex,
        sub_id: u8,
        address: u8,
        params: &[u8],
    ) -> Result<Report, ReportError> {
        let rtype = Report::type_for_params(params.len())?;
        let mut data = Vec::with_capacity(HEADER_LENGTH + params.len());
        data.push(rtype.into());
        data.push(device_index.into());
        data.push(sub_id);
        data.push(address);
        data.extend_from_slice(params);
        Ok(Report { data })
    }

    /// HID++2.0 report with zeroed parameters.
    pub fn new20(
        rtype: ReportType,
        device_index: DeviceIndex,
        feature_index: u8,
        function: u8,
        sw_id: u8,
    ) -> Report {
        let mut report = Report::empty(rtype);
        report.data[offset::DEVICE_INDEX] = device_index.into();
        report.data[offset::SUB_ID] = feature_index;
        report.data[offset::ADDRESS] = (function & 0x0F) << 4 | (sw_id & 0x0F);
        report
    }

    /// HID++2.0 report, type deduced from the parameter length.
    pub fn with_params20(
        device_index: DeviceIndex,
        feature_index: u8,
        function: u8,
        sw_id: u8,
        params: &[u8],
    ) -> Result<Report, ReportError> {
        let rtype = Report::type_for_params(params.len())?;
        let mut data = Vec::with_capacity(HEADER_LENGTH + params.len());
        data.push(rtype.into());
        data.push(device_index.into());
        data.push(feature_index);
        data.push((function & 0x0F) << 4 | (sw_id & 0x0F));
        data.extend_from_slice(params);
        Ok(Report { data })
    }

    pub fn report_type(&self) -> ReportType {
        // Validated in every constructor
        ReportType::try_from(self.data[offset::TYPE]).unwrap()
    }

    /// Raw device index byte; compare against `DeviceIndex` values.
    pub fn device_index(&self) -> u8 {
        self.data[offset::DEVICE_INDEX]
    }

    pub fn sub_id(&self) -> u8 {
        self.data[offset::SUB_ID]
    }

    pub fn set_sub_id(&mut self, sub_id: u8) {
        self.data[offset::SUB_ID] = sub_id;
    }

    pub fn address(&self) -> u8 {
        self.data[offset::ADDRESS]
    }

    pub fn set_address(&mut self, address: u8) {
        self.data[offset::ADDRESS] = address;
    }

    pub fn feature_index(&self) -> u8 {
        self.data[offset::SUB_ID]
    }

    pub fn set_feature_index(&mut self, feature_index: u8) {
        self.data[offset::SUB_ID] = feature_index;
    }

    pub fn function(&self) -> u8 {
        (self.data[offset::ADDRESS] & 0xF0) >> 4
    }

    pub fn set_function(&mut self, function: u8) {
        self.data[offset::ADDRESS] =
            (function & 0x0F) << 4 | (self.data[offset::ADDRESS] & 0x0F);
    }

    pub fn software_id(&self) -> u8 {
        self.data[offset::ADDRESS] & 0x0F
    }

    pub fn set_software_id(&mut self, sw_id: u8) {
        self.data[offset::ADDRESS] =
            (self.data[offset::ADDRESS] & 0xF0) | (sw_id & 0x0F);
    }

    pub fn parameters(&self) -> &[u8] {
        &self.data[offset::PARAMETERS..]
    }

    pub fn parameters_mut(&mut self) -> &mut [u8] {
        &mut self.data[offset::PARAMETERS..]
    }

    /// Raw report bytes including the report ID, as written to the
    /// HID node.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Check for a HID++1.0 error report and extract
    /// (sub ID, address, error code) of the failed request.
    pub fn check_error10(&self) -> Option<(u8, u8, u8)> {
        if self.report_type() != ReportType::Short
            || self.data[offset::SUB_ID] != ERROR_MESSAGE_10
        {
            return None;
        }
        Some((self.data[3], self.data[4], self.data[5]))
    }

    /// Check for a HID++2.0 error report and extract
    /// (feature index, function, software ID, error code) of the
    /// failed request.
    pub fn check_error20(&self) -> Option<(u8, u8, u8, u8)> {
        if self.report_type() != ReportType::Long
            || self.data[offset::SUB_ID] != ERROR_MESSAGE_20
        {
            return None;
        }
        Some((
            self.data[3],
            (self.data[4] & 0xF0) >> 4,
            self.data[4] & 0x0F,
            self.data[5],
        ))
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::setup_logging_lite;

    #[test]
    fn raw_roundtrip_short_and_long() {
        setup_logging_lite().ok();
        let short = vec![0x10, 0x01, 0x00, 0x11, 0x04, 0x02, 0x00];
        let report = Report::from_raw(short.clone()).unwrap();
        assert_eq!(report.raw(), &short[..]);
        assert_eq!(report.report_type(), ReportType::Short);

        let mut long = vec![0u8; 20];
        long[0] = 0x11;
        long[1] = 0xFF;
        let report = Report::from_raw(long.clone()).unwrap();
        assert_eq!(report.raw(), &long[..]);
        assert_eq!(report.report_type(), ReportType::Long);
    }

    #[test]
    fn invalid_report_id() {
        // Mouse input report on the same node
        let err = Report::from_raw(vec![0x02, 0x00, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, ReportError::InvalidReportId(0x02));
    }

    #[test]
    fn invalid_report_length() {
        let err = Report::from_raw(vec![0x10, 0x01, 0x00]).unwrap_err();
        assert_eq!(err, ReportError::InvalidReportLength);
        let err = Report::from_raw(vec![0x11, 0x01, 0x00, 0x11, 0x00]).unwrap_err();
        assert_eq!(err, ReportError::InvalidReportLength);
    }

    #[test]
    fn hidpp20_header_views() {
        let report = Report::new20(
            ReportType::Short,
            DeviceIndex::WirelessDevice1,
            0x00,
            0x01,
            0x01,
        );
        assert_eq!(report.raw(), &[0x10, 0x01, 0x00, 0x11, 0x00, 0x00, 0x00]);
        assert_eq!(report.feature_index(), 0x00);
        assert_eq!(report.function(), 0x01);
        assert_eq!(report.software_id(), 0x01);
        // The same bytes seen through the 1.0 view
        assert_eq!(report.sub_id(), 0x00);
        assert_eq!(report.address(), 0x11);
    }

    #[test]
    fn hidpp10_error_report() {
        // GetRegisterShort 0xFE failing with InvalidSubID
        let raw = vec![0x10, 0xFF, 0x8F, 0x81, 0xFE, 0x01, 0x00];
        let report = Report::from_raw(raw).unwrap();
        assert_eq!(report.check_error10(), Some((0x81, 0xFE, 0x01)));
        assert_eq!(report.check_error20(), None);
    }

    #[test]
    fn hidpp20_error_report() {
        let mut raw = vec![0u8; 20];
        raw[0] = 0x11; // Long
        raw[1] = 0x01;
        raw[2] = 0xFF; // error feature index
        raw[3] = 0x05; // failed feature
        raw[4] = 0x21; // function 2, sw_id 1
        raw[5] = 0x08; // Busy
        let report = Report::from_raw(raw).unwrap();
        assert_eq!(report.check_error20(), Some((0x05, 0x02, 0x01, 0x08)));
        assert_eq!(report.check_error10(), None);
    }

    #[test]
    fn params_guess_type() {
        let report =
            Report::with_params10(DeviceIndex::DefaultDevice, 0x81, 0x00, &[0; 3])
                .unwrap();
        assert_eq!(report.report_type(), ReportType::Short);
        let report =
            Report::with_params10(DeviceIndex::DefaultDevice, 0x83, 0xA2, &[0; 16])
                .unwrap();
        assert_eq!(report.report_type(), ReportType::Long);
        let err =
            Report::with_params10(DeviceIndex::DefaultDevice, 0x81, 0x00, &[0; 5])
                .unwrap_err();
        assert_eq!(err, ReportError::InvalidReportLength);
    }

    #[test]
    fn set_header_fields() {
        let mut report = Report::new10(
            ReportType::Short,
            DeviceIndex::DefaultDevice,
            0x81,
            0x00,
        );
        report.set_address(0xFE);
        report.set_sub_id(0x80);
        assert_eq!(report.sub_id(), 0x80);
        assert_eq!(report.address(), 0xFE);
        report.set_function(0x03);
        report.set_software_id(0x02);
        assert_eq!(report.function(), 0x03);
        assert_eq!(report.software_id(), 0x02);
        assert_eq!(report.address(), 0x32);
    }
}
