/*
 *  pacer.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Frame cadence for the scheduler loop
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
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

pub struct Pacer {
    next_deadline: Instant,
    frame: Duration,
}

// the matrix refresh is effectively free, 60fps keeps the bars lively
// without spinning a core
impl Pacer {
    pub fn new(target_fps: u32) -> Self {
        Self { next_deadline: Instant::now(), frame: Self::frame_for(target_fps) }
    }

    #[inline]
    fn frame_for(fps: u32) -> Duration {
        Duration::from_micros((1_000_000u32 / fps.max(1)) as u64)
    }

    #[cfg(test)]
    pub fn frame(&self) -> Duration {
        self.frame
    }

    /// Sleep off whatever is left of the current frame.
    ///
    /// A frame that overran does not try to catch up, the next one starts now.
    pub async fn pace(&mut self) {
        let now = Instant::now();
        if now < self.next_deadline {
            sleep_until(self.next_deadline).await;
            self.next_deadline += self.frame;
        } else {
            self.next_deadline = now + self.frame;
        }
    }
}
