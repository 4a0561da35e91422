/*
 *  display/traits.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Presentation sink abstraction
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

use crate::display::error::DisplayError;
use crate::vframebuf::VarFrameBuf;

/// Pixel formats a sink can be driven in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorDepth {
    /// 16 bpp, 5-6-5
    Rgb565,

    /// 24 bits of colour, stored as 32 bpp XRGB
    Rgb888,
}

/// Display capabilities and metadata
#[derive(Debug, Clone)]
pub struct DisplayCapabilities {
    /// Display width in pixels
    pub width: u32,

    /// Display height in pixels
    pub height: u32,

    pub color_depth: ColorDepth,
}

/// Minimal hardware abstraction - all panel sinks implement this trait
///
/// A sink only ever sees whole frames. Compositing happens before `present`,
/// so a driver never shows a half drawn bar or label.
pub trait DisplayDriver: Send {
    /// Returns the capabilities of this display
    fn capabilities(&self) -> &DisplayCapabilities;

    /// Returns the display dimensions as (width, height)
    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    /// Open and prepare the device
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Show a fully composited frame. Frames larger than the device are clipped.
    fn present(&mut self, frame: &VarFrameBuf<Rgb888>) -> Result<(), DisplayError>;

    /// Blank the device
    fn clear(&mut self) -> Result<(), DisplayError>;
}
