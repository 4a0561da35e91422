/*
 *  levels.rs
 *
 *  vumatrix - audio-reactive LED matrix
 *  (c) 2020-26 Stuart Hunter
 *
 *  Non-blocking UDP ingestion of per-band audio levels
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

use std::io;
use std::net::{SocketAddr, UdpSocket};
use thiserror::Error;

use crate::bars::BAR_COUNT;

pub const LEVEL_PORT: u16 = 21324;
pub const LEVEL_DATAGRAM_LEN: usize = BAR_COUNT;

// larger than a valid datagram so oversize packets are seen, not truncated to fit
const RECV_BUF_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("malformed level datagram: {len} bytes (expected 8)")]
    Malformed { len: usize },
    #[error("level socket error: {0}")]
    Transport(#[from] io::Error),
}

/// One level per band, left to right, 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelVector([u8; BAR_COUNT]);

impl LevelVector {
    #[cfg(test)]
    pub fn new(bands: [u8; BAR_COUNT]) -> Self {
        Self(bands)
    }

    /// All or nothing: anything but exactly eight bytes is rejected whole.
    pub fn decode(datagram: &[u8]) -> Result<Self, LevelError> {
        <[u8; LEVEL_DATAGRAM_LEN]>::try_from(datagram)
            .map(Self)
            .map_err(|_| LevelError::Malformed { len: datagram.len() })
    }

    pub fn bands(&self) -> &[u8; BAR_COUNT] {
        &self.0
    }
}

/// Anything that can hand the scheduler at most one level vector per call
/// without blocking.
pub trait LevelSource {
    fn poll_once(&mut self) -> Result<Option<LevelVector>, LevelError>;
}

pub struct LevelReceiver {
    socket: UdpSocket,
    buf: [u8; RECV_BUF_SIZE],
}

impl LevelReceiver {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Self::from_socket(UdpSocket::bind(addr)?)
    }

    pub fn from_socket(socket: UdpSocket) -> io::Result<Self> {
        socket.set_nonblocking(true)?; // never stall the frame loop
        Ok(Self { socket, buf: [0u8; RECV_BUF_SIZE] })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl LevelSource for LevelReceiver {
    /// Exactly one receive attempt. `Ok(None)` means nothing was pending.
    fn poll_once(&mut self) -> Result<Option<LevelVector>, LevelError> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((len, _src)) => LevelVector::decode(&self.buf[..len]).map(Some),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(LevelError::Transport(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn loopback() -> (LevelReceiver, UdpSocket) {
        let rx = LevelReceiver::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();
        (rx, tx)
    }

    // loopback delivery is near-instant but not guaranteed to beat the next call
    fn poll_until_ready(rx: &mut LevelReceiver) -> Result<Option<LevelVector>, LevelError> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match rx.poll_once() {
                Ok(None) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(5)),
                other => return other,
            }
        }
    }

    #[test]
    fn test_decode_exact_length() {
        let v = LevelVector::decode(&[0, 32, 64, 128, 255, 16, 8, 0]).unwrap();
        assert_eq!(v.bands(), &[0, 32, 64, 128, 255, 16, 8, 0]);
    }

    #[test]
    fn test_decode_rejects_other_lengths() {
        for len in [0usize, 1, 7, 9, 16, 64] {
            let data = vec![1u8; len];
            match LevelVector::decode(&data) {
                Err(LevelError::Malformed { len: got }) => assert_eq!(got, len),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_empty_socket_returns_none_immediately() {
        let (mut rx, _tx) = loopback();
        let started = Instant::now();
        assert!(matches!(rx.poll_once(), Ok(None)));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_receives_level_datagram() {
        let (mut rx, tx) = loopback();
        tx.send_to(&[1, 2, 3, 4, 5, 6, 7, 8], rx.local_addr().unwrap()).unwrap();
        let v = poll_until_ready(&mut rx).unwrap().unwrap();
        assert_eq!(v.bands(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_oversize_datagram_is_malformed_not_truncated() {
        let (mut rx, tx) = loopback();
        tx.send_to(&[9u8; 12], rx.local_addr().unwrap()).unwrap();
        assert!(matches!(poll_until_ready(&mut rx), Err(LevelError::Malformed { len: 12 })));
        // the bad datagram is consumed
        assert!(matches!(rx.poll_once(), Ok(None)));
    }

    #[test]
    fn test_one_datagram_per_poll() {
        let (mut rx, tx) = loopback();
        let addr = rx.local_addr().unwrap();
        tx.send_to(&[1u8; 8], addr).unwrap();
        tx.send_to(&[2u8; 8], addr).unwrap();
        assert_eq!(poll_until_ready(&mut rx).unwrap().unwrap().bands(), &[1u8; 8]);
        assert_eq!(poll_until_ready(&mut rx).unwrap().unwrap().bands(), &[2u8; 8]);
    }
}
