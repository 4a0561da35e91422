/*
 *  nowplaying.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Now-playing metadata: message decoding, transport seam and the
 *  reconnecting service that feeds the label board
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

use log::{Level, debug, info, log, warn};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::textlayout::{LabelBoard, TextLayout};

pub const NOW_PLAYING_TOPIC: &str = "current_playing";
pub const POLL_WINDOW: Duration = Duration::from_millis(100);

const STATUS_STOPPED: &str = "stopped";

/// A decoded metadata message. Replaces whatever was shown before, wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NowPlaying {
    Track { title: String, artist: String },
    Stopped,
}

impl NowPlaying {
    /// Decode a `current_playing` payload.
    ///
    /// `music` wins over `status`; when `music` is present both it and `artist`
    /// must be strings or the message is dropped. Returns `None` for anything
    /// unrecognised or malformed.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let data: Value = serde_json::from_slice(payload).ok()?;
        let obj = data.as_object()?;

        if let Some(music) = obj.get("music") {
            let title = music.as_str()?;
            let artist = obj.get("artist")?.as_str()?;
            return Some(NowPlaying::Track {
                title: title.to_string(),
                artist: artist.to_string(),
            });
        }

        match obj.get("status").and_then(Value::as_str) {
            Some(STATUS_STOPPED) => Some(NowPlaying::Stopped),
            _ => None,
        }
    }

    /// Push this message onto the label board.
    pub fn apply(&self, layout: &TextLayout, labels: &mut LabelBoard) {
        match self {
            NowPlaying::Track { title, artist } => layout.layout(labels, title, artist),
            NowPlaying::Stopped => layout.clear(labels),
        }
    }
}

impl fmt::Display for NowPlaying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NowPlaying::Track { title, artist } => write!(f, "'{}' by '{}'", title, artist),
            NowPlaying::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Degraded,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker not configured")]
    NotConfigured,
    #[error("not connected")]
    NotConnected,
    #[error("timed out waiting for broker")]
    Timeout,
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("mqtt connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
}

/// Publish/subscribe transport seen as a black box.
///
/// `poll` waits at most `window` and hands every message received in that
/// window to `on_message` before it returns. Nothing runs outside `poll`.
#[allow(async_fn_in_trait)]
pub trait MetadataTransport {
    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn poll(
        &mut self,
        window: Duration,
        on_message: &mut dyn FnMut(&str, &[u8]),
    ) -> Result<(), TransportError>;

    async fn reconnect(&mut self) -> Result<(), TransportError>;
}

/// Owns the subscription, the connection state and the last good metadata.
pub struct NowPlayingService<T> {
    transport: T,
    topic: String,
    poll_window: Duration,
    state: ConnectionState,
    current: Option<NowPlaying>,
    // set once an outage has been reported at warn level, cleared on recovery
    outage_logged: bool,
}

impl<T: MetadataTransport> NowPlayingService<T> {
    pub fn new(transport: T, topic: impl Into<String>, poll_window: Duration) -> Self {
        Self {
            transport,
            topic: topic.into(),
            poll_window,
            state: ConnectionState::Disconnected,
            current: None,
            outage_logged: false,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<&NowPlaying> {
        self.current.as_ref()
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Warn for the first failure of an outage, debug for every repeat.
    fn outage_level(&mut self) -> Level {
        if std::mem::replace(&mut self.outage_logged, true) {
            Level::Debug
        } else {
            Level::Warn
        }
    }

    fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.outage_logged = false;
    }

    /// Initial connect. A failure here is not fatal, the next service tick retries.
    pub async fn start(&mut self) -> ConnectionState {
        match self.transport.connect().await {
            Ok(()) => {
                info!("now playing: subscribed to '{}'", self.topic);
                self.mark_connected();
            }
            Err(TransportError::NotConfigured) => {
                warn!("now playing: no broker configured, text disabled");
                self.outage_logged = true;
                self.state = ConnectionState::Degraded;
            }
            Err(e) => {
                warn!("now playing: connect failed: {}", e);
                self.outage_logged = true;
                self.state = ConnectionState::Degraded;
            }
        }
        self.state
    }

    /// One bounded poll, decoding any messages straight onto the labels.
    ///
    /// A transport failure moves to Degraded and makes a single reconnect
    /// attempt. Nothing escapes to the caller but the resulting state.
    pub async fn service_once(&mut self, layout: &TextLayout, labels: &mut LabelBoard) -> ConnectionState {
        let topic = self.topic.as_str();
        let current = &mut self.current;
        let mut on_message = |msg_topic: &str, payload: &[u8]| {
            if msg_topic != topic {
                return;
            }
            match NowPlaying::decode(payload) {
                Some(now_playing) => {
                    if current.as_ref() != Some(&now_playing) {
                        info!("now playing: {}", now_playing);
                    }
                    now_playing.apply(layout, labels);
                    *current = Some(now_playing);
                }
                None => debug!("now playing: ignored payload ({} bytes)", payload.len()),
            }
        };

        match self.transport.poll(self.poll_window, &mut on_message).await {
            Ok(()) => {
                if self.state != ConnectionState::Connected {
                    info!("now playing: connection restored");
                }
                self.mark_connected();
            }
            Err(poll_err) => {
                debug!("now playing: poll failed: {}", poll_err);
                self.state = ConnectionState::Degraded;
                match self.transport.reconnect().await {
                    Ok(()) => {
                        info!("now playing: reconnected");
                        self.mark_connected();
                    }
                    Err(e) => {
                        let level = self.outage_level();
                        log!(level, "now playing: {}, reconnect failed: {}", poll_err, e);
                    }
                }
            }
        }
        self.state
    }
}
