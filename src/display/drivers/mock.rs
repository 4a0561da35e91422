/*
 *  display/drivers/mock.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock panel driver for testing without hardware
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;

use crate::display::error::DisplayError;
use crate::display::traits::{ColorDepth, DisplayCapabilities, DisplayDriver};
use crate::vframebuf::VarFrameBuf;

use std::sync::{Arc, Mutex};

/// Mock display driver for testing
///
/// Records every operation and keeps a copy of the last presented frame.
/// Clones share state, so a test can keep one handle after boxing the other.
#[derive(Debug, Clone)]
pub struct MockDriver {
    capabilities: DisplayCapabilities,
    state: Arc<Mutex<MockDriverState>>,
}

/// Internal state for the mock driver (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct MockDriverState {
    pub init_count: usize,
    pub present_count: usize,
    pub clear_count: usize,

    /// Copy of the last frame handed to present()
    pub last_frame: Option<VarFrameBuf<Rgb888>>,

    pub is_initialized: bool,

    /// Simulate failures (for error testing)
    pub simulate_present_failure: bool,
    pub simulate_init_failure: bool,
}

impl MockDriver {
    pub fn new_with_size(width: u32, height: u32) -> Self {
        Self {
            capabilities: DisplayCapabilities {
                width,
                height,
                color_depth: ColorDepth::Rgb888,
            },
            state: Arc::new(Mutex::new(MockDriverState::default())),
        }
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockDriverState>> {
        Arc::clone(&self.state)
    }

    pub fn present_count(&self) -> usize {
        self.state.lock().unwrap().present_count
    }

    /// Pixel from the last presented frame
    pub fn last_pixel(&self, x: i32, y: i32) -> Option<Rgb888> {
        let state = self.state.lock().unwrap();
        state.last_frame.as_ref()?.pixel(Point::new(x, y))
    }

    /// Count of non-black pixels in the last presented frame
    pub fn count_lit_pixels(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .last_frame
            .as_ref()
            .map(|f| f.as_slice().iter().filter(|&&p| p != Rgb888::BLACK).count())
            .unwrap_or(0)
    }

    /// Count of pixels of one colour inside a rectangle of the last frame
    pub fn count_in(&self, x0: i32, y0: i32, w: i32, h: i32, color: Rgb888) -> usize {
        (y0..y0 + h)
            .flat_map(|y| (x0..x0 + w).map(move |x| (x, y)))
            .filter(|&(x, y)| self.last_pixel(x, y) == Some(color))
            .count()
    }
}

impl DisplayDriver for MockDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let mut state = self.state.lock().unwrap();
        state.init_count += 1;
        if state.simulate_init_failure {
            return Err(DisplayError::InitializationFailed("Simulated init failure".to_string()));
        }
        state.is_initialized = true;
        Ok(())
    }

    fn present(&mut self, frame: &VarFrameBuf<Rgb888>) -> Result<(), DisplayError> {
        let mut state = self.state.lock().unwrap();
        if !state.is_initialized {
            return Err(DisplayError::NotInitialized);
        }
        if state.simulate_present_failure {
            return Err(DisplayError::Io(std::io::Error::other("Simulated present failure")));
        }
        state.present_count += 1;
        state.last_frame = Some(frame.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let mut state = self.state.lock().unwrap();
        state.clear_count += 1;
        state.last_frame = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_driver_creation() {
        let driver = MockDriver::new_with_size(64, 64);
        assert_eq!(driver.dimensions(), (64, 64));
        assert_eq!(driver.capabilities().color_depth, ColorDepth::Rgb888);
    }

    #[test]
    fn test_present_before_init_fails() {
        let mut driver = MockDriver::new_with_size(8, 8);
        let frame = VarFrameBuf::new(8, 8, Rgb888::BLACK);
        assert!(matches!(driver.present(&frame), Err(DisplayError::NotInitialized)));
    }

    #[test]
    fn test_present_records_frame() {
        let mut driver = MockDriver::new_with_size(8, 8);
        driver.init().unwrap();
        let mut frame = VarFrameBuf::new(8, 8, Rgb888::BLACK);
        frame.draw_iter([Pixel(Point::new(2, 3), Rgb888::RED)]).unwrap();
        driver.present(&frame).unwrap();

        assert_eq!(driver.present_count(), 1);
        assert_eq!(driver.last_pixel(2, 3), Some(Rgb888::RED));
        assert_eq!(driver.count_lit_pixels(), 1);
    }

    #[test]
    fn test_simulated_failures() {
        let mut driver = MockDriver::new_with_size(8, 8);
        driver.state().lock().unwrap().simulate_init_failure = true;
        assert!(driver.init().is_err());

        driver.state().lock().unwrap().simulate_init_failure = false;
        driver.init().unwrap();
        driver.state().lock().unwrap().simulate_present_failure = true;
        let frame = VarFrameBuf::new(8, 8, Rgb888::BLACK);
        assert!(driver.present(&frame).is_err());
        assert_eq!(driver.present_count(), 0);
    }
}
