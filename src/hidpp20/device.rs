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

use super::{UnsupportedFeature, DEFAULT_SOFTWARE_ID};
use crate::dispatcher::{Dispatcher, DispatcherError};
use crate::report::{DeviceIndex, Report, LONG_PARAM_LENGTH, SHORT_PARAM_LENGTH};
use core::fmt;
use std::time::Duration;

// ----- Consts -----

/// Upper bound on any single function call exchange.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

// ----- Errors -----

/// Failure while resolving or calling a feature.
#[derive(Debug)]
pub enum FeatureError {
    Dispatcher(DispatcherError),
    Unsupported(UnsupportedFeature),
}

impl fmt::Display for FeatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureError::Dispatcher(e) => write!(f, "{}", e),
            FeatureError::Unsupported(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FeatureError {}

impl From<DispatcherError> for FeatureError {
    fn from(e: DispatcherError) -> FeatureError {
        FeatureError::Dispatcher(e)
    }
}

impl From<UnsupportedFeature> for FeatureError {
    fn from(e: UnsupportedFeature) -> FeatureError {
        FeatureError::Unsupported(e)
    }
}

// ----- Structs -----

/// HID++2.0 function call access for one device behind a dispatcher.
#[derive(Clone, Copy)]
pub struct Device<'d> {
    dispatcher: &'d dyn Dispatcher,
    index: DeviceIndex,
    software_id: u8,
}

impl<'d> Device<'d> {
    pub fn new(dispatcher: &'d dyn Dispatcher, index: DeviceIndex) -> Device<'d> {
        Device::with_software_id(dispatcher, index, DEFAULT_SOFTWARE_ID)
    }

    /// Use a non-default software ID; required when several processes
    /// talk to the same device.
    pub fn with_software_id(
        dispatcher: &'d dyn Dispatcher,
        index: DeviceIndex,
        software_id: u8,
    ) -> Device<'d> {
        assert!(
            software_id != 0 && software_id <= 0x0F,
            "software ID is a non-zero 4-bit value"
        );
        Device {
            dispatcher,
            index,
            software_id,
        }
    }

    pub fn device_index(&self) -> DeviceIndex {
        self.index
    }

    pub fn dispatcher(&self) -> &'d dyn Dispatcher {
        self.dispatcher
    }

    /// Call a feature function, returning the response parameters.
    pub fn call_function(
        &self,
        feature_index: u8,
        function: u8,
        params: &[u8],
    ) -> Result<Vec<u8>, DispatcherError> {
        debug!("Calling feature 0x{:02x}/function {}", feature_index, function);
        assert!(params.len() <= LONG_PARAM_LENGTH, "parameters too long");
        let mut padded = params.to_vec();
        if padded.len() <= SHORT_PARAM_LENGTH {
            padded.resize(SHORT_PARAM_LENGTH, 0);
        } else {
            padded.resize(LONG_PARAM_LENGTH, 0);
        }
        let request = Report::with_params20(
            self.index,
            feature_index,
            function,
            self.software_id,
            &padded,
        )
        .expect("padded parameters have a valid length");
        let response = self
            .dispatcher
            .send_command(request)?
            .get_timeout(CALL_TIMEOUT)?;
        Ok(response.parameters().to_vec())
    }
}

/// The root feature, always at index 0: feature lookup and ping.
pub struct IRoot<'a, 'd> {
    dev: &'a Device<'d>,
}

impl<'a, 'd> IRoot<'a, 'd> {
    pub const INDEX: u8 = 0;

    const GET_FEATURE: u8 = 0;

    pub fn new(dev: &'a Device<'d>) -> IRoot<'a, 'd> {
        IRoot { dev }
    }

    /// Map a feature ID to its index on this device, with the
    /// obsolete and hidden flags. Index 0 means the feature is not
    /// supported.
    pub fn get_feature_flags(
        &self,
        feature_id: u16,
    ) -> Result<(u8, bool, bool), DispatcherError> {
        let results = self.dev.call_function(
            IRoot::INDEX,
            IRoot::GET_FEATURE,
            &feature_id.to_be_bytes(),
        )?;
        Ok((
            results[0],
            results[1] & (1 << 7) != 0,
            results[1] & (1 << 6) != 0,
        ))
    }

    /// Map a feature ID to its index, failing when the device does
    /// not implement it.
    pub fn get_feature(&self, feature_id: u16) -> Result<u8, FeatureError> {
        let (index, _, _) = self.get_feature_flags(feature_id)?;
        if index == 0 {
            return Err(UnsupportedFeature { feature_id }.into());
        }
        Ok(index)
    }
}

// ----- Tests -----
