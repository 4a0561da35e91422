/*
 *  display/drivers/fbdev.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Linux framebuffer device sink (/dev/fbN), memory mapped
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

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use log::{debug, info};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use crate::display::error::DisplayError;
use crate::display::traits::{ColorDepth, DisplayCapabilities, DisplayDriver};
use crate::vframebuf::VarFrameBuf;

const FBIOGET_VSCREENINFO: u64 = 0x4600;
const FBIOGET_FSCREENINFO: u64 = 0x4602;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbVarScreenInfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbFixScreenInfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

/// Where one colour channel lives inside a packed pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub offset: u32,
    pub length: u32,
}

impl Channel {
    #[inline]
    fn place(&self, value: u8) -> u32 {
        if self.length == 0 {
            return 0;
        }
        let len = self.length.min(8);
        ((value as u32) >> (8 - len)) << self.offset
    }
}

impl From<FbBitfield> for Channel {
    fn from(b: FbBitfield) -> Self {
        Self { offset: b.offset, length: b.length }
    }
}

/// Packed pixel layout reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub bytes_per_pixel: usize,
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
}

impl PixelLayout {
    #[cfg(test)]
    pub const RGB565: Self = Self {
        bytes_per_pixel: 2,
        red: Channel { offset: 11, length: 5 },
        green: Channel { offset: 5, length: 6 },
        blue: Channel { offset: 0, length: 5 },
    };

    #[cfg(test)]
    pub const XRGB8888: Self = Self {
        bytes_per_pixel: 4,
        red: Channel { offset: 16, length: 8 },
        green: Channel { offset: 8, length: 8 },
        blue: Channel { offset: 0, length: 8 },
    };

    fn from_var(var: &FbVarScreenInfo) -> Result<Self, DisplayError> {
        match var.bits_per_pixel {
            16 | 32 => Ok(Self {
                bytes_per_pixel: var.bits_per_pixel as usize / 8,
                red: var.red.into(),
                green: var.green.into(),
                blue: var.blue.into(),
            }),
            bits_per_pixel => Err(DisplayError::UnsupportedFormat { bits_per_pixel }),
        }
    }

    pub fn color_depth(&self) -> ColorDepth {
        if self.bytes_per_pixel == 2 { ColorDepth::Rgb565 } else { ColorDepth::Rgb888 }
    }

    #[inline]
    pub fn pack(&self, c: Rgb888) -> u32 {
        self.red.place(c.r()) | self.green.place(c.g()) | self.blue.place(c.b())
    }

    /// Write one packed pixel, little endian, into `out`.
    #[inline]
    pub fn write(&self, out: &mut [u8], c: Rgb888) {
        let bytes = self.pack(c).to_le_bytes();
        out[..self.bytes_per_pixel].copy_from_slice(&bytes[..self.bytes_per_pixel]);
    }
}

/// Copy `frame` into a raw device buffer, clipping to `width` x `height`.
fn blit(frame: &VarFrameBuf<Rgb888>, dst: &mut [u8], layout: &PixelLayout, line_length: usize, width: usize, height: usize) {
    let w = frame.width().min(width);
    let h = frame.height().min(height);
    let bpp = layout.bytes_per_pixel;
    for (y, row) in frame.as_slice().chunks_exact(frame.width().max(1)).take(h).enumerate() {
        let base = y * line_length;
        for (x, &c) in row.iter().take(w).enumerate() {
            let at = base + x * bpp;
            if let Some(out) = dst.get_mut(at..at + bpp) {
                layout.write(out, c);
            }
        }
    }
}

fn ioctl_read<T: Default>(file: &File, request: u64) -> io::Result<T> {
    let mut info = T::default();
    // SAFETY: request matches the layout of T and the kernel writes at most size_of::<T>()
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, &mut info as *mut T) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(info)
}

struct Mapped {
    _file: File,
    mmap: MmapMut,
    layout: PixelLayout,
    line_length: usize,
}

pub struct FbdevDriver {
    path: PathBuf,
    capabilities: DisplayCapabilities,
    mapped: Option<Mapped>,
}

impl FbdevDriver {
    pub fn new(path: impl AsRef<Path>, width: u32, height: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            capabilities: DisplayCapabilities {
                width,
                height,
                color_depth: ColorDepth::Rgb888,
            },
            mapped: None,
        }
    }

    fn open(&self) -> Result<Mapped, DisplayError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| DisplayError::InitializationFailed(format!("{}: {}", self.path.display(), e)))?;

        let var: FbVarScreenInfo = ioctl_read(&file, FBIOGET_VSCREENINFO)?;
        let fix: FbFixScreenInfo = ioctl_read(&file, FBIOGET_FSCREENINFO)?;
        let layout = PixelLayout::from_var(&var)?;

        let line_length = fix.line_length as usize;
        let len = line_length * var.yres as usize;
        if len == 0 {
            return Err(DisplayError::InitializationFailed(format!(
                "{}: empty framebuffer ({}x{})",
                self.path.display(),
                var.xres,
                var.yres
            )));
        }

        // SAFETY: the mapping is only touched through this driver, and the file stays open alongside it
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };

        debug!(
            "fbdev {}: {}x{} {}bpp, stride {}",
            self.path.display(),
            var.xres,
            var.yres,
            var.bits_per_pixel,
            line_length
        );

        Ok(Mapped { _file: file, mmap, layout, line_length })
    }
}

impl DisplayDriver for FbdevDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let mapped = self.open()?;
        let device_w = (mapped.line_length / mapped.layout.bytes_per_pixel) as u32;
        let device_h = (mapped.mmap.len() / mapped.line_length) as u32;
        if device_w < self.capabilities.width || device_h < self.capabilities.height {
            info!(
                "fbdev {} smaller than panel ({}x{} < {}x{}), clipping",
                self.path.display(),
                device_w,
                device_h,
                self.capabilities.width,
                self.capabilities.height
            );
        }
        self.capabilities.color_depth = mapped.layout.color_depth();
        self.mapped = Some(mapped);
        self.clear()
    }

    fn present(&mut self, frame: &VarFrameBuf<Rgb888>) -> Result<(), DisplayError> {
        let mapped = self.mapped.as_mut().ok_or(DisplayError::NotInitialized)?;
        let device_w = mapped.line_length / mapped.layout.bytes_per_pixel;
        let device_h = mapped.mmap.len() / mapped.line_length;
        blit(frame, &mut mapped.mmap, &mapped.layout, mapped.line_length, device_w, device_h);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let mapped = self.mapped.as_mut().ok_or(DisplayError::NotInitialized)?;
        mapped.mmap.fill(0);
        Ok(())
    }
}
