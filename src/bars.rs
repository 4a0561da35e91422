/*
 *  bars.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Eight band bar columns rendered from the level vector
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

use crate::gradient::{GradientTable, TIER_OFF};
use crate::levels::LevelVector;

pub const BAR_COUNT: usize = 8;
pub const BAR_WIDTH: u32 = 7;
pub const BAR_GAP: u32 = 1;
pub const MAX_BAR_HEIGHT: u32 = 32;

// upstream senders are tuned to level * (max / 16), keep it exact
const LEVEL_SCALE_DIVISOR: u32 = 16;

/// Placement of the bar columns on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarLayout {
    pub panel_width: u32,
    pub bar_width: u32,
    pub gap: u32,
}

impl BarLayout {
    /// Left edge of the first bar, centring the whole group.
    pub fn offset_x(&self) -> u32 {
        let group = BAR_COUNT as u32 * (self.bar_width + self.gap);
        self.panel_width.saturating_sub(group) / 2
    }

    pub fn column_x(&self, band: usize) -> i32 {
        (self.offset_x() + band as u32 * (self.bar_width + self.gap)) as i32
    }
}

impl Default for BarLayout {
    fn default() -> Self {
        Self {
            panel_width: 64,
            bar_width: BAR_WIDTH,
            gap: BAR_GAP,
        }
    }
}

/// One band's bitmap of tier indices, row-major, row 0 at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarColumn {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl BarColumn {
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width as usize, height as usize);
        Self { width, height, pixels: vec![TIER_OFF; width * height] }
    }

    pub fn width(&self) -> usize { self.width }
    #[cfg(test)]
    pub fn height(&self) -> usize { self.height }
    pub fn pixels(&self) -> &[u8] { &self.pixels }

    #[cfg(test)]
    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.width && y < self.height {
            return Some(self.pixels[y * self.width + x]);
        }
        None
    }

    /// Number of rows currently showing a colour.
    #[cfg(test)]
    pub fn lit_rows(&self) -> u32 {
        if self.width == 0 {
            return 0;
        }
        self.pixels
            .chunks_exact(self.width)
            .filter(|row| row[0] != TIER_OFF)
            .count() as u32
    }
}

/// Owns the eight columns and rewrites them from incoming levels.
#[derive(Debug, Clone)]
pub struct BarRenderer {
    gradient: GradientTable,
    layout: BarLayout,
    columns: Vec<BarColumn>,
}

impl BarRenderer {
    pub fn new(gradient: GradientTable, layout: BarLayout) -> Self {
        let height = gradient.height() as u32;
        let columns = (0..BAR_COUNT)
            .map(|_| BarColumn::new(layout.bar_width, height))
            .collect();
        Self { gradient, layout, columns }
    }

    /// Rows a level asks for, before the gradient cuts it at max bar height.
    #[inline]
    pub fn lit_height(&self, level: u8) -> u32 {
        level as u32 * self.gradient.max_bar_height() / LEVEL_SCALE_DIVISOR
    }

    /// Rewrite one column in full. Out of range bands are ignored.
    pub fn render(&mut self, band: usize, level: u8) {
        let lit = self.lit_height(level) as usize;
        let gradient = &self.gradient;
        let Some(column) = self.columns.get_mut(band) else {
            return;
        };
        let (w, h) = (column.width, column.height);
        if w == 0 {
            return;
        }
        for (y, row) in column.pixels.chunks_exact_mut(w).enumerate() {
            let tier = if h - 1 - y < lit { gradient.tier_for(y) } else { TIER_OFF };
            row.fill(tier);
        }
    }

    pub fn render_all(&mut self, levels: &LevelVector) {
        for (band, &level) in levels.bands().iter().enumerate() {
            self.render(band, level);
        }
    }

    pub fn columns(&self) -> &[BarColumn] {
        &self.columns
    }

    pub fn column_x(&self, band: usize) -> i32 {
        self.layout.column_x(band)
    }
}
