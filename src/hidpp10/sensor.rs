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

//! Optical sensor resolution mapping.
//!
//! Profiles store the firmware's internal resolution code, not DPI.
//! Each sensor model translates between the two, either through a
//! discrete resolution list or a linear ratio.

// ----- Traits -----

/// DPI to internal resolution code translation of one sensor model.
pub trait Sensor {
    /// Internal code nearest to `dpi`.
    fn from_dpi(&self, dpi: u32) -> u32;
    /// DPI value of the internal code, 0 for the unset code 0.
    fn to_dpi(&self, internal_value: u32) -> u32;

    fn minimum_resolution(&self) -> u32;
    fn maximum_resolution(&self) -> u32;
    fn resolution_step_hint(&self) -> u32;
}

// ----- Structs -----

/// Sensor with a discrete resolution list; the internal code is the
/// list index with bit 7 set.
pub struct ListSensor {
    resolutions: Vec<u32>,
}

impl ListSensor {
    pub fn new(resolutions: &[u32]) -> ListSensor {
        ListSensor {
            resolutions: resolutions.to_vec(),
        }
    }

    pub fn from_range(first: u32, last: u32, step: u32) -> ListSensor {
        let mut resolutions = Vec::new();
        let mut dpi = first;
        while dpi <= last {
            resolutions.push(dpi);
            dpi += step;
        }
        ListSensor { resolutions }
    }

    pub fn resolutions(&self) -> &[u32] {
        &self.resolutions
    }

    /// S6006 sensor (G9).
    pub fn s6006() -> ListSensor {
        ListSensor::new(&[400, 800, 1600, 2000])
    }

    /// S6090 sensor (G700).
    pub fn s6090() -> ListSensor {
        ListSensor::from_range(0, 3200, 200)
    }
}

impl Sensor for ListSensor {
    fn from_dpi(&self, dpi: u32) -> u32 {
        // 0 is not a valid resolution, skip it
        let first = if self.resolutions[0] == 0 { 1 } else { 0 };
        let mut nearest = first;
        for (i, resolution) in self.resolutions.iter().enumerate().skip(first) {
            let distance = if *resolution > dpi {
                *resolution - dpi
            } else {
                dpi - *resolution
            };
            let best = self.resolutions[nearest];
            let best_distance = if best > dpi { best - dpi } else { dpi - best };
            if distance < best_distance {
                nearest = i;
            }
        }
        0x80 | (nearest as u32 & 0x7F)
    }

    fn to_dpi(&self, internal_value: u32) -> u32 {
        if internal_value == 0 {
            return 0;
        }
        // Bit 7 marks a valid resolution code
        if internal_value & 0x80 == 0 {
            warn!("Invalid resolution value 0x{:02x}", internal_value);
            return 0;
        }
        let index = (internal_value & 0x7F) as usize;
        match self.resolutions.get(index) {
            Some(dpi) => *dpi,
            None => {
                warn!("Resolution index {} out of range", index);
                0
            }
        }
    }

    fn minimum_resolution(&self) -> u32 {
        let first = if self.resolutions[0] == 0 { 1 } else { 0 };
        self.resolutions[first]
    }

    fn maximum_resolution(&self) -> u32 {
        *self.resolutions.last().unwrap()
    }

    fn resolution_step_hint(&self) -> u32 {
        0
    }
}

/// Sensor with a linear DPI/code ratio, clamped to its range.
pub struct RangeSensor {
    min: u32,
    max: u32,
    step: u32,
    ratio_dividend: u32,
    ratio_divisor: u32,
}

impl RangeSensor {
    pub fn new(
        min: u32,
        max: u32,
        step: u32,
        ratio_dividend: u32,
        ratio_divisor: u32,
    ) -> RangeSensor {
        RangeSensor {
            min,
            max,
            step,
            ratio_dividend,
            ratio_divisor,
        }
    }

    /// S9500 sensor (G500).
    pub fn s9500() -> RangeSensor {
        RangeSensor::new(200, 5700, 50, 17, 400)
    }

    /// S9808 sensor (G500s).
    pub fn s9808() -> RangeSensor {
        RangeSensor::new(200, 8200, 50, 1, 50)
    }
}

impl Sensor for RangeSensor {
    fn from_dpi(&self, dpi: u32) -> u32 {
        let dpi = dpi.max(self.min).min(self.max);
        (dpi * self.ratio_dividend + self.ratio_divisor / 2) / self.ratio_divisor
    }

    fn to_dpi(&self, internal_value: u32) -> u32 {
        if internal_value == 0 {
            return 0;
        }
        let dpi = (internal_value * self.ratio_divisor + self.ratio_dividend / 2)
            / self.ratio_dividend;
        dpi.min(self.max)
    }

    fn minimum_resolution(&self) -> u32 {
        self.min
    }

    fn maximum_resolution(&self) -> u32 {
        self.max
    }

    fn resolution_step_hint(&self) -> u32 {
        self.step
    }
}

// ----- Tests -----

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_sensor_nearest_match() {
        let sensor = ListSensor::s6006();
        assert_eq!(sensor.from_dpi(400), 0x80);
        assert_eq!(sensor.from_dpi(800), 0x81);
        assert_eq!(sensor.from_dpi(2000), 0x83);
        // Nearest neighbor
        assert_eq!(sensor.from_dpi(500), 0x80);
        assert_eq!(sensor.from_dpi(700), 0x81);
        assert_eq!(sensor.from_dpi(3000), 0x83);
        assert_eq!(sensor.from_dpi(100), 0x80);
    }

    #[test]
    fn list_sensor_decoding() {
        let sensor = ListSensor::s6006();
        assert_eq!(sensor.to_dpi(0), 0);
        assert_eq!(sensor.to_dpi(0x80), 400);
        assert_eq!(sensor.to_dpi(0x83), 2000);
        // Missing valid bit
        assert_eq!(sensor.to_dpi(0x02), 0);
    }

    #[test]
    fn list_sensor_skips_leading_zero() {
        let sensor = ListSensor::s6090();
        // Index 0 holds resolution 0 and is never chosen
        assert_eq!(sensor.from_dpi(0), 0x81);
        assert_eq!(sensor.minimum_resolution(), 200);
        assert_eq!(sensor.maximum_resolution(), 3200);
        assert_eq!(sensor.from_dpi(400), 0x82);
    }

    #[test]
    fn range_sensor_ratio_and_clamping() {
        let sensor = RangeSensor::s9500();
        // 400 dpi * 17 / 400 = 17
        assert_eq!(sensor.from_dpi(400), 17);
        assert_eq!(sensor.to_dpi(17), 400);
        // Clamped below and above
        assert_eq!(sensor.from_dpi(0), sensor.from_dpi(200));
        assert_eq!(sensor.from_dpi(60000), sensor.from_dpi(5700));
        assert_eq!(sensor.to_dpi(0), 0);

        let sensor = RangeSensor::s9808();
        assert_eq!(sensor.from_dpi(400), 8);
        assert_eq!(sensor.to_dpi(8), 400);
    }
}
