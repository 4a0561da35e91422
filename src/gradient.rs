/*
 *  gradient.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Height based colour ramp for the bar columns
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

/// Tier index meaning "pixel off" (transparent when composited).
pub const TIER_OFF: u8 = 0;
/// Number of palette entries the tiers address, off included.
pub const TIER_COUNT: usize = 6;

// fraction of max bar height, evaluated greater-than, outermost first
const TIER_THRESHOLDS: [(f64, u8); 4] = [
    (0.80, 5),
    (0.65, 4),
    (0.45, 3),
    (0.25, 2),
];
const TIER_BASE: u8 = 1;

/// Precomputed row -> colour tier mapping (green at the bottom, red at the top).
///
/// Row 0 is the top of the panel. Rows whose distance from the bottom reaches
/// `max_bar_height` are always off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradientTable {
    tiers: Vec<u8>,
    max_bar_height: u32,
}

impl GradientTable {
    pub fn new(panel_height: u32, max_bar_height: u32) -> Self {
        let h = panel_height as usize;
        let max = max_bar_height as f64;
        let tiers = (0..h)
            .map(|row| {
                let from_bottom = (h - 1 - row) as u32;
                if from_bottom >= max_bar_height {
                    return TIER_OFF;
                }
                let rel = from_bottom as f64;
                TIER_THRESHOLDS
                    .iter()
                    .find(|(fraction, _)| rel > max * fraction)
                    .map(|&(_, tier)| tier)
                    .unwrap_or(TIER_BASE)
            })
            .collect();

        Self { tiers, max_bar_height }
    }

    /// Tier for a panel row; rows outside the panel are off.
    #[inline]
    pub fn tier_for(&self, row: usize) -> u8 {
        self.tiers.get(row).copied().unwrap_or(TIER_OFF)
    }

    pub fn height(&self) -> usize {
        self.tiers.len()
    }

    pub fn max_bar_height(&self) -> u32 {
        self.max_bar_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_above_max_height_are_off() {
        let table = GradientTable::new(64, 32);
        for row in 0..64 {
            let from_bottom = 63 - row;
            if from_bottom >= 32 {
                assert_eq!(table.tier_for(row), TIER_OFF, "row {}", row);
            } else {
                assert_ne!(table.tier_for(row), TIER_OFF, "row {}", row);
            }
        }
    }

    #[test]
    fn test_tier_rises_with_bar_height() {
        let table = GradientTable::new(64, 32);
        let mut last = 0;
        // walk upwards from the bottom row through the lit range
        for from_bottom in 0..32 {
            let tier = table.tier_for(63 - from_bottom);
            assert!(tier >= last, "tier dropped at {}", from_bottom);
            last = tier;
        }
        assert_eq!(last, 5);
    }

    #[test]
    fn test_threshold_boundaries_for_32() {
        // thresholds: 25.6, 20.8, 14.4, 8.0 - ties stay in the lower tier
        let table = GradientTable::new(64, 32);
        let tier_at = |from_bottom: usize| table.tier_for(63 - from_bottom);
        assert_eq!(tier_at(0), 1);
        assert_eq!(tier_at(8), 1);
        assert_eq!(tier_at(9), 2);
        assert_eq!(tier_at(14), 2);
        assert_eq!(tier_at(15), 3);
        assert_eq!(tier_at(20), 3);
        assert_eq!(tier_at(21), 4);
        assert_eq!(tier_at(25), 4);
        assert_eq!(tier_at(26), 5);
        assert_eq!(tier_at(31), 5);
    }

    #[test]
    fn test_threshold_exact_product_stays_lower() {
        // 180 * 0.65 is exactly 117 in double precision
        let table = GradientTable::new(200, 180);
        assert_eq!(table.tier_for(199 - 117), 3);
        assert_eq!(table.tier_for(199 - 118), 4);
        assert_eq!(table.tier_for(199 - 144), 4);
        assert_eq!(table.tier_for(199 - 145), 5);
    }

    #[test]
    fn test_out_of_range_row() {
        let table = GradientTable::new(64, 32);
        assert_eq!(table.height(), 64);
        assert_eq!(table.tier_for(64), TIER_OFF);
        assert_eq!(table.tier_for(usize::MAX), TIER_OFF);
    }

    #[test]
    fn test_max_height_larger_than_panel() {
        let table = GradientTable::new(16, 64);
        assert!((0..16).all(|row| table.tier_for(row) != TIER_OFF));
        assert_eq!(table.max_bar_height(), 64);
    }
}
