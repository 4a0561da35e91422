/*
 *  vframebuf.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Runtime sized RGB framebuffer the panel composites into
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

use core::convert::Infallible;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::PixelColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// A runtime-sized framebuffer for embedded-graphics.
#[derive(Debug, Clone)]
pub struct VarFrameBuf<C: PixelColor> {
    buf: Vec<C>,
    w: usize,
    h: usize,
}

impl<C: PixelColor + Clone> VarFrameBuf<C> {
    pub fn new(width: u32, height: u32, fill: C) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self { buf: vec![fill; w * h], w, h }
    }

    pub fn width(&self) -> usize { self.w }
    pub fn height(&self) -> usize { self.h }

    pub fn as_slice(&self) -> &[C] { &self.buf }

    pub fn clear_color(&mut self, color: C) {
        self.buf.fill(color);
    }

    #[cfg(test)]
    pub fn pixel(&self, p: Point) -> Option<C> {
        self.idx(p).map(|i| self.buf[i])
    }

    /// Copy a row-major bitmap of palette indices with its top-left at `origin`.
    ///
    /// Index 0 is transparent. Indices past the palette and pixels off the
    /// buffer are skipped.
    pub fn blit_indexed(&mut self, origin: Point, width: usize, indices: &[u8], palette: &[C]) {
        if width == 0 {
            return;
        }
        for (row, line) in indices.chunks_exact(width).enumerate() {
            for (col, &index) in line.iter().enumerate() {
                if index == 0 {
                    continue;
                }
                let Some(&color) = palette.get(index as usize) else {
                    continue;
                };
                let p = origin + Point::new(col as i32, row as i32);
                if let Some(i) = self.idx(p) {
                    self.buf[i] = color;
                }
            }
        }
    }

    /// Map (x,y) to linear index; returns None if out of bounds
    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as usize, p.y as usize);
            if x < self.w && y < self.h {
                return Some(y * self.w + x);
            }
        }
        None
    }
}

impl<C: PixelColor> OriginDimensions for VarFrameBuf<C> {
    fn size(&self) -> Size {
        Size::new(self.w as u32, self.h as u32)
    }
}

impl<C: PixelColor + Clone> DrawTarget for VarFrameBuf<C> {
    type Color = C;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.clear_color(color);
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        // clip first, glyph backgrounds hang off the panel edge often enough
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };
        let (x0, x1) = (area.top_left.x as usize, bottom_right.x as usize);
        for y in area.top_left.y as usize..=bottom_right.y as usize {
            let base = y * self.w;
            self.buf[base + x0..=base + x1].fill(color);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::pixelcolor::Rgb888;
    use embedded_graphics::primitives::PrimitiveStyle;

    #[test]
    fn test_blit_skips_transparent_index() {
        let mut fb = VarFrameBuf::new(4, 4, Rgb888::BLACK);
        let palette = [Rgb888::WHITE, Rgb888::RED, Rgb888::GREEN];
        fb.blit_indexed(Point::new(1, 1), 2, &[0, 1, 2, 0], &palette);
        assert_eq!(fb.pixel(Point::new(1, 1)), Some(Rgb888::BLACK));
        assert_eq!(fb.pixel(Point::new(2, 1)), Some(Rgb888::RED));
        assert_eq!(fb.pixel(Point::new(1, 2)), Some(Rgb888::GREEN));
        assert_eq!(fb.pixel(Point::new(2, 2)), Some(Rgb888::BLACK));
    }

    #[test]
    fn test_blit_clips_and_ignores_bad_index() {
        let mut fb = VarFrameBuf::new(2, 2, Rgb888::BLACK);
        let palette = [Rgb888::BLACK, Rgb888::BLUE];
        fb.blit_indexed(Point::new(1, 1), 2, &[1, 1, 9, 1], &palette);
        assert_eq!(fb.pixel(Point::new(1, 1)), Some(Rgb888::BLUE));
        assert_eq!(fb.pixel(Point::new(0, 0)), Some(Rgb888::BLACK));
        assert_eq!(fb.pixel(Point::new(2, 2)), None);
    }

    #[test]
    fn test_fill_solid_clips() {
        let mut fb = VarFrameBuf::new(4, 4, Rgb888::BLACK);
        Rectangle::new(Point::new(2, -1), Size::new(5, 2))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.pixel(Point::new(2, 0)), Some(Rgb888::RED));
        assert_eq!(fb.pixel(Point::new(3, 0)), Some(Rgb888::RED));
        assert_eq!(fb.pixel(Point::new(1, 0)), Some(Rgb888::BLACK));
        assert_eq!(fb.pixel(Point::new(2, 1)), Some(Rgb888::BLACK));
    }
}
