/*
 *  mqtt.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  MQTT transport for now-playing metadata
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

use log::{debug, info};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

use crate::config::MqttConfig;
use crate::nowplaying::{MetadataTransport, TransportError};

// plenty for one subscription and the odd ping
const REQUEST_CAPACITY: usize = 10;

/// Everything needed to (re)build a session, resolved once at startup.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl From<&MqttConfig> for MqttSettings {
    fn from(cfg: &MqttConfig) -> Self {
        Self {
            broker: cfg.broker.clone(),
            port: cfg.port(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            topic: cfg.topic().to_string(),
            client_id: cfg.client_id().to_string(),
            keep_alive: cfg.keep_alive(),
            connect_timeout: cfg.connect_timeout(),
        }
    }
}

struct Session {
    client: AsyncClient,
    eventloop: EventLoop,
}

/// rumqttc client driven only from inside `connect`/`poll`/`reconnect`.
pub struct MqttTransport {
    settings: MqttSettings,
    session: Option<Session>,
}

impl MqttTransport {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings, session: None }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn options(&self) -> Result<MqttOptions, TransportError> {
        let host = self.settings.broker.as_deref().ok_or(TransportError::NotConfigured)?;
        let mut opts = MqttOptions::new(self.settings.client_id.as_str(), host, self.settings.port);
        opts.set_keep_alive(self.settings.keep_alive);
        opts.set_clean_session(true);
        if let Some(user) = self.settings.username.as_deref() {
            opts.set_credentials(user, self.settings.password.as_deref().unwrap_or(""));
        }
        Ok(opts)
    }

    fn subscribe(&self, client: &AsyncClient) -> Result<(), TransportError> {
        client.try_subscribe(self.settings.topic.as_str(), QoS::AtMostOnce)?;
        Ok(())
    }
}

impl MetadataTransport for MqttTransport {
    /// Fresh session: wait for CONNACK within the connect timeout, then queue
    /// the subscription. The SUBSCRIBE goes out on the next poll.
    async fn connect(&mut self) -> Result<(), TransportError> {
        let opts = self.options()?;
        let (client, mut eventloop) = AsyncClient::new(opts, REQUEST_CAPACITY);
        let deadline = Instant::now() + self.settings.connect_timeout;

        loop {
            match timeout_at(deadline, eventloop.poll()).await {
                Err(_) => return Err(TransportError::Timeout),
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    debug!("mqtt connack: {:?}", ack.code);
                    break;
                }
                Ok(Ok(_)) => {}
            }
        }

        self.subscribe(&client)?;
        info!(
            "mqtt connected to {}:{}",
            self.settings.broker.as_deref().unwrap_or("?"),
            self.settings.port
        );
        self.session = Some(Session { client, eventloop });
        Ok(())
    }

    async fn poll(
        &mut self,
        window: Duration,
        on_message: &mut dyn FnMut(&str, &[u8]),
    ) -> Result<(), TransportError> {
        let deadline = Instant::now() + window;
        let topic = self.settings.topic.as_str();
        let session = self.session.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            match timeout_at(deadline, session.eventloop.poll()).await {
                Err(_) => return Ok(()), // window used up
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    on_message(&publish.topic, &publish.payload);
                }
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                    // broker dropped our clean session, ask again
                    session.client.try_subscribe(topic, QoS::AtMostOnce)?;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        // the old session is discarded, whatever state it was in
        self.session = None;
        self.connect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const TOPIC: &str = "current_playing";

    fn settings(broker: Option<&str>, port: u16) -> MqttSettings {
        MqttSettings {
            broker: broker.map(str::to_string),
            port,
            username: None,
            password: None,
            topic: TOPIC.to_string(),
            client_id: "vumatrix-test".to_string(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(2),
        }
    }

    async fn read_packet(s: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
        let header = s.read_u8().await?;
        let (mut len, mut shift) = (0usize, 0);
        loop {
            let b = s.read_u8().await?;
            len |= ((b & 0x7F) as usize) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0u8; len];
        s.read_exact(&mut body).await?;
        Ok((header, body))
    }

    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut body = (topic.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(topic.as_bytes());
        body.extend_from_slice(payload);
        let mut pkt = vec![0x30, body.len() as u8];
        pkt.extend(body);
        pkt
    }

    /// Accepts one client, acks connect and subscribe, publishes `payload`
    /// and then holds the connection open.
    async fn fake_broker(payload: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            let (header, _) = read_packet(&mut s).await.unwrap();
            assert_eq!(header >> 4, 1, "expected CONNECT");
            s.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

            let (header, body) = read_packet(&mut s).await.unwrap();
            assert_eq!(header >> 4, 8, "expected SUBSCRIBE");
            s.write_all(&[0x90, 0x03, body[0], body[1], 0x00]).await.unwrap();
            s.write_all(&publish_packet(TOPIC, payload)).await.unwrap();

            while read_packet(&mut s).await.is_ok() {}
        });
        port
    }

    #[tokio::test]
    async fn test_connect_without_broker_is_not_configured() {
        let mut t = MqttTransport::new(settings(None, 1883));
        assert!(matches!(t.connect().await, Err(TransportError::NotConfigured)));
        assert!(!t.is_connected());
    }

    #[tokio::test]
    async fn test_poll_before_connect() {
        let mut t = MqttTransport::new(settings(Some("127.0.0.1"), 1883));
        let mut sink = |_: &str, _: &[u8]| {};
        assert!(matches!(
            t.poll(Duration::from_millis(10), &mut sink).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_silent_broker_times_out() {
        // accepts TCP but never answers CONNECT
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut s = settings(Some("127.0.0.1"), port);
        s.connect_timeout = Duration::from_millis(150);
        let mut t = MqttTransport::new(s);

        let started = std::time::Instant::now();
        assert!(matches!(t.connect().await, Err(TransportError::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(listener);
    }

    #[tokio::test]
    async fn test_refused_connection_is_an_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut t = MqttTransport::new(settings(Some("127.0.0.1"), port));
        assert!(t.reconnect().await.is_err());
        assert!(!t.is_connected());
    }

    #[tokio::test]
    async fn test_receives_publish_within_window() {
        let port = fake_broker(br#"{"music":"Song","artist":"Band"}"#).await;
        let mut t = MqttTransport::new(settings(Some("127.0.0.1"), port));
        t.connect().await.unwrap();
        assert!(t.is_connected());

        let mut got: Vec<(String, Vec<u8>)> = Vec::new();
        let mut collect = |topic: &str, payload: &[u8]| got.push((topic.to_string(), payload.to_vec()));
        let started = std::time::Instant::now();
        t.poll(Duration::from_millis(500), &mut collect).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, TOPIC);
        assert_eq!(got[0].1, br#"{"music":"Song","artist":"Band"}"#.to_vec());
    }
}
