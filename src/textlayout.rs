/*
 *  textlayout.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Title/artist wrapping and centring onto the four label slots
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

use arrayvec::ArrayString;
use embedded_graphics::mono_font::MonoFont;

pub const MAX_LINE_CHARS: usize = 15;
/// What a cleared-for-layout slot holds, so the renderer never sees empty text.
pub const PLACEHOLDER: &str = " ";

// 15 chars of up to 4 bytes each
pub type LabelText = ArrayString<64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    TitleLine1,
    TitleLine2,
    ArtistLine1,
    ArtistLine2,
}

impl Slot {
    pub const ALL: [Slot; 4] = [
        Slot::TitleLine1,
        Slot::TitleLine2,
        Slot::ArtistLine1,
        Slot::ArtistLine2,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSlot {
    text: LabelText,
    x: i32,
}

impl LabelSlot {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Horizontal pixel offset of the text's left edge.
    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn set_text(&mut self, s: &str) {
        self.text.clear();
        for c in s.chars() {
            if self.text.try_push(c).is_err() {
                break;
            }
        }
    }
}

/// The four text slots drawn over the bars.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelBoard {
    slots: [LabelSlot; 4],
}

impl LabelBoard {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn get(&self, slot: Slot) -> &LabelSlot {
        &self.slots[slot.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &LabelSlot)> {
        Slot::ALL.into_iter().zip(self.slots.iter())
    }

    fn get_mut(&mut self, slot: Slot) -> &mut LabelSlot {
        &mut self.slots[slot.index()]
    }

    fn fill(&mut self, text: &str) {
        for slot in self.slots.iter_mut() {
            slot.set_text(text);
        }
    }
}

/// Glyph width oracle. One fixed average width per font; no per-glyph measuring.
pub trait GlyphMetrics {
    fn average_glyph_width(&self) -> u32;
}

impl GlyphMetrics for MonoFont<'_> {
    fn average_glyph_width(&self) -> u32 {
        self.character_size.width + self.character_spacing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLayout {
    panel_width: u32,
    glyph_width: u32,
    max_chars: usize,
}

impl TextLayout {
    pub fn new(panel_width: u32, metrics: &impl GlyphMetrics) -> Self {
        Self {
            panel_width,
            glyph_width: metrics.average_glyph_width(),
            max_chars: MAX_LINE_CHARS,
        }
    }

    #[cfg(test)]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self
    }

    #[cfg(test)]
    pub fn glyph_width(&self) -> u32 {
        self.glyph_width
    }

    /// Recompute all four slots from a title and artist.
    ///
    /// Every slot is reset to the placeholder before any is filled. Offsets are
    /// only recomputed for slots that end up non-empty.
    pub fn layout(&self, board: &mut LabelBoard, title: &str, artist: &str) {
        board.fill(PLACEHOLDER);
        self.place(board, Slot::TitleLine1, Slot::TitleLine2, title);
        self.place(board, Slot::ArtistLine1, Slot::ArtistLine2, artist);

        for slot in board.slots.iter_mut() {
            if !slot.is_empty() {
                slot.x = self.offset_for(slot.text());
            }
        }
    }

    /// Playback stopped: every slot becomes truly empty, not the placeholder.
    pub fn clear(&self, board: &mut LabelBoard) {
        board.fill("");
    }

    /// Split text into at most two lines of `max_chars`.
    ///
    /// The break is the last space strictly before `max_chars`, or a hard break
    /// at `max_chars` when there is none. The second line is cut to `max_chars`.
    pub fn wrap<'a>(&self, text: &'a str) -> (&'a str, Option<&'a str>) {
        let Some((window_end, _)) = text.char_indices().nth(self.max_chars) else {
            return (text, None);
        };
        let split = text[..window_end].rfind(' ').unwrap_or(window_end);
        let first = text[..split].trim();
        let rest = text[split..].trim();
        let second = match rest.char_indices().nth(self.max_chars) {
            Some((cut, _)) => &rest[..cut],
            None => rest,
        };
        (first, Some(second))
    }

    /// Left offset that centres `text`, using the fixed average glyph width.
    pub fn offset_for(&self, text: &str) -> i32 {
        let text_width = text.chars().count() as i64 * self.glyph_width as i64;
        (self.panel_width as i64 - text_width).div_euclid(2).max(0) as i32
    }

    fn place(&self, board: &mut LabelBoard, line1: Slot, line2: Slot, text: &str) {
        if text.is_empty() {
            return;
        }
        let (first, second) = self.wrap(text);
        board.get_mut(line1).set_text(first);
        if let Some(second) = second {
            board.get_mut(line2).set_text(second);
        }
    }
}
