/*
 *  main.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Eight band level meter and now-playing text on a 64x64 RGB panel
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

use anyhow::Context;
use env_logger::Env;
use log::{error, info};

use tokio::signal::unix::{signal, SignalKind};

mod bars;
mod config;
mod display;
mod gradient;
mod levels;
mod mqtt;
mod nowplaying;
mod pacer;
mod scheduler;
mod textlayout;
mod vframebuf;

use bars::{BarLayout, BarRenderer};
use display::Panel;
use gradient::GradientTable;
use levels::LevelReceiver;
use mqtt::{MqttSettings, MqttTransport};
use nowplaying::{ConnectionState, NowPlayingService};
use scheduler::FrameScheduler;
use textlayout::TextLayout;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Waits for SIGINT, SIGTERM or SIGHUP and logs which one arrived.
async fn signal_handler() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

// one cooperative thread, the frame loop never shares its buffers
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load().context("loading configuration")?;

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level()))
        .format_timestamp_secs()
        .init();

    info!("{} - every band, every beat", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let panel_cfg = cfg.panel();
    let font = panel_cfg.font().font();
    let driver = display::create_driver(&panel_cfg).context("creating panel driver")?;
    let panel = Panel::new(driver, font).context("initialising panel")?;
    let (width, height) = panel.dimensions();

    let bars = BarRenderer::new(
        GradientTable::new(height, panel_cfg.max_bar_height()),
        BarLayout {
            panel_width: width,
            bar_width: panel_cfg.bar_width(),
            gap: panel_cfg.bar_gap(),
        },
    );
    let layout = TextLayout::new(width, font);

    let level_addr = cfg.levels().socket_addr()?;
    let levels = LevelReceiver::bind(level_addr)
        .with_context(|| format!("binding level socket {}", level_addr))?;
    info!("levels: listening on udp {}", levels.local_addr()?);

    let mqtt_cfg = cfg.mqtt();
    let settings = MqttSettings::from(&mqtt_cfg);
    let topic = settings.topic.clone();
    let metadata = NowPlayingService::new(MqttTransport::new(settings), topic, mqtt_cfg.poll_timeout());

    let mut scheduler = FrameScheduler::new(
        levels,
        bars,
        metadata,
        layout,
        panel,
        cfg.service_interval(),
        panel_cfg.fps(),
    );

    if scheduler.start().await == ConnectionState::Degraded {
        info!("now playing: starting degraded, will keep retrying");
    }

    info!("entering frame loop at {} fps", panel_cfg.fps());
    tokio::select! {
        _ = scheduler.run() => {}
        res = signal_handler() => {
            if let Err(e) = res {
                error!("signal handler failed: {}", e);
            }
        }
    }

    if let Err(e) = scheduler.blank() {
        error!("panel: blank on exit failed: {}", e);
    }
    info!("bye");
    Ok(())
}
