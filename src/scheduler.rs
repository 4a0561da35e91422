/*
 *  scheduler.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Single threaded frame loop: levels, gated metadata service, present
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

use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::time::Instant;

use crate::bars::BarRenderer;
use crate::display::{DisplayError, Panel};
use crate::levels::{LevelError, LevelSource};
use crate::nowplaying::{ConnectionState, MetadataTransport, NowPlayingService};
use crate::pacer::Pacer;
use crate::textlayout::{LabelBoard, TextLayout};

/// Lets the metadata service run once per interval.
#[derive(Debug, Clone, Copy)]
pub struct ServiceGate {
    interval: Duration,
    last: Instant,
}

impl ServiceGate {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self { interval, last: now }
    }

    /// Strictly more than one interval since the last reset.
    #[inline]
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last) > self.interval
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }
}

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick {
    pub bars_updated: bool,
    pub serviced: Option<ConnectionState>,
    pub presented: bool,
}

pub struct FrameScheduler<L, T> {
    levels: L,
    bars: BarRenderer,
    metadata: NowPlayingService<T>,
    layout: TextLayout,
    labels: LabelBoard,
    panel: Panel,
    gate: ServiceGate,
    pacer: Pacer,
    present_failing: bool,
}

impl<L: LevelSource, T: MetadataTransport> FrameScheduler<L, T> {
    pub fn new(
        levels: L,
        bars: BarRenderer,
        metadata: NowPlayingService<T>,
        layout: TextLayout,
        panel: Panel,
        service_interval: Duration,
        fps: u32,
    ) -> Self {
        Self {
            levels,
            bars,
            metadata,
            layout,
            labels: LabelBoard::new(),
            panel,
            gate: ServiceGate::new(service_interval, Instant::now()),
            pacer: Pacer::new(fps),
            present_failing: false,
        }
    }

    /// Initial metadata connect. Failure leaves the service degraded, not dead.
    pub async fn start(&mut self) -> ConnectionState {
        let state = self.metadata.start().await;
        self.gate.reset(Instant::now());
        state
    }

    /// One iteration. Nothing in here returns an error; every input boundary
    /// absorbs its own failures.
    pub async fn tick(&mut self, now: Instant) -> Tick {
        let mut tick = Tick::default();

        match self.levels.poll_once() {
            Ok(Some(levels)) => {
                self.bars.render_all(&levels);
                tick.bars_updated = true;
            }
            Ok(None) => {}
            Err(LevelError::Malformed { len }) => debug!("levels: dropped {} byte datagram", len),
            Err(e) => warn!("levels: {}", e),
        }

        if self.gate.is_due(now) {
            let state = self.metadata.service_once(&self.layout, &mut self.labels).await;
            // the poll may have eaten into the next interval, measure from its end
            self.gate.reset(Instant::now().max(now));
            tick.serviced = Some(state);
        }

        tick.presented = self.present();
        tick
    }

    fn present(&mut self) -> bool {
        match self.panel.present(&self.bars, &self.labels) {
            Ok(()) => {
                if self.present_failing {
                    info!("panel: present recovered");
                    self.present_failing = false;
                }
                true
            }
            Err(e) => {
                // once per outage, not once per frame
                if !self.present_failing {
                    error!("panel: present failed: {}", e);
                    self.present_failing = true;
                }
                false
            }
        }
    }

    /// Run forever. Cancel the future to stop.
    pub async fn run(&mut self) {
        loop {
            self.tick(Instant::now()).await;
            self.pacer.pace().await;
        }
    }

    /// Show a blank panel, used at shutdown.
    pub fn blank(&mut self) -> Result<(), DisplayError> {
        self.panel.blank()
    }

    #[cfg(test)]
    pub fn labels(&self) -> &LabelBoard {
        &self.labels
    }

    #[cfg(test)]
    pub fn bars(&self) -> &BarRenderer {
        &self.bars
    }

    #[cfg(test)]
    pub fn metadata(&self) -> &NowPlayingService<T> {
        &self.metadata
    }
}
