/*
 *  display/mod.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Panel compositor: bars, then labels, then one whole frame to the driver
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

pub mod traits;
pub mod error;
pub mod drivers;

use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use log::info;

use crate::bars::BarRenderer;
use crate::config::{DriverKind, PanelConfig};
use crate::gradient::TIER_COUNT;
use crate::textlayout::{LabelBoard, Slot};
use crate::vframebuf::VarFrameBuf;

pub use traits::DisplayDriver;
pub use error::DisplayError;
use drivers::fbdev::FbdevDriver;

/// Type alias for boxed display driver trait objects
pub type BoxedDriver = Box<dyn DisplayDriver>;

pub const TITLE_COLOR: Rgb888 = Rgb888::new(0xFF, 0x00, 0x00);
pub const ARTIST_COLOR: Rgb888 = Rgb888::new(0x00, 0xFF, 0x00);

/// Tier index to colour. Entry 0 is never drawn.
pub const PALETTE: [Rgb888; TIER_COUNT] = [
    Rgb888::new(0x00, 0x00, 0x00),
    Rgb888::new(0x00, 0xFF, 0x00), // green
    Rgb888::new(0xAD, 0xFF, 0x2F), // green-yellow
    Rgb888::new(0xFF, 0xFF, 0x00), // yellow
    Rgb888::new(0xFF, 0x8C, 0x00), // dark orange
    Rgb888::new(0xFF, 0x00, 0x00), // red
];

/// Vertical centre line and colour for each label slot.
pub fn slot_style(slot: Slot) -> (i32, Rgb888) {
    match slot {
        Slot::TitleLine1 => (6, TITLE_COLOR),
        Slot::TitleLine2 => (12, TITLE_COLOR),
        Slot::ArtistLine1 => (19, ARTIST_COLOR),
        Slot::ArtistLine2 => (25, ARTIST_COLOR),
    }
}

/// Build the configured driver. Not yet initialised.
pub fn create_driver(config: &PanelConfig) -> Result<BoxedDriver, DisplayError> {
    match config.driver() {
        DriverKind::Fbdev => {
            info!("panel: fbdev {} ({}x{})", config.device(), config.width(), config.height());
            Ok(Box::new(FbdevDriver::new(config.device(), config.width(), config.height())))
        }
    }
}

/// The presentation sink the scheduler talks to.
pub struct Panel {
    driver: BoxedDriver,
    frame: VarFrameBuf<Rgb888>,
    font: &'static MonoFont<'static>,
}

impl Panel {
    /// Takes ownership of the driver and initialises it.
    pub fn new(mut driver: BoxedDriver, font: &'static MonoFont<'static>) -> Result<Self, DisplayError> {
        driver.init()?;
        let (w, h) = driver.dimensions();
        info!("panel ready: {}x{} {:?}", w, h, driver.capabilities().color_depth);
        Ok(Self {
            driver,
            frame: VarFrameBuf::new(w, h, Rgb888::BLACK),
            font,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.driver.dimensions()
    }

    /// Composite bars and labels into a fresh frame and hand it to the driver.
    pub fn present(&mut self, bars: &BarRenderer, labels: &LabelBoard) -> Result<(), DisplayError> {
        self.frame.clear_color(Rgb888::BLACK);

        for (band, column) in bars.columns().iter().enumerate() {
            self.frame.blit_indexed(
                Point::new(bars.column_x(band), 0),
                column.width(),
                column.pixels(),
                &PALETTE,
            );
        }

        for (slot, label) in labels.iter() {
            if label.is_empty() {
                continue;
            }
            let (y, color) = slot_style(slot);
            let style = MonoTextStyle::new(self.font, color);
            Text::with_baseline(label.text(), Point::new(label.x(), y), style, Baseline::Middle)
                .draw(&mut self.frame)
                .ok();
        }

        self.driver.present(&self.frame)
    }

    /// Show an all-black frame, used on the way out.
    pub fn blank(&mut self) -> Result<(), DisplayError> {
        self.frame.clear_color(Rgb888::BLACK);
        self.driver.present(&self.frame)?;
        self.driver.clear()
    }
}
