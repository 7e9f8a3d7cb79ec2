//! Alert delivery over a length-prefixed TCP socket.
//!
//! Wire format, one payload per connection, no acknowledgement:
//!
//! ```text
//! +----------------------+------------------+
//! | length: u32 (BE)     | image: length B  |
//! +----------------------+------------------+
//! ```
//!
//! Every dispatch opens a fresh connection and closes it after the write.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::DispatchError;

pub const DEFAULT_ALERT_ADDR: &str = "127.0.0.1:9999";

/// Size of the big-endian length prefix.
pub const ALERT_HEADER_LEN: usize = 4;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Pushes alert images to the local alerting endpoint.
#[derive(Clone, Debug)]
pub struct AlertDispatcher {
    addr: SocketAddr,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, write: Duration) -> Self {
        self.connect_timeout = connect;
        self.write_timeout = write;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send one image. The connection is closed before returning.
    pub fn dispatch(&self, image: &[u8]) -> Result<(), DispatchError> {
        let payload = encode_payload(image)?;
        let mut stream = TcpStream::connect_timeout(&self.addr, self.connect_timeout).map_err(
            |source| DispatchError::Connect {
                addr: self.addr,
                source,
            },
        )?;
        stream
            .set_write_timeout(Some(self.write_timeout))
            .map_err(DispatchError::Write)?;
        stream.write_all(&payload).map_err(DispatchError::Write)?;
        stream.flush().map_err(DispatchError::Write)?;
        log::debug!(
            "AlertDispatcher: sent {} byte alert to {}",
            image.len(),
            self.addr
        );
        Ok(())
    }
}

/// Prefix `image` with its length as a big-endian u32.
pub fn encode_payload(image: &[u8]) -> Result<Vec<u8>, DispatchError> {
    let len = u32::try_from(image.len()).map_err(|_| DispatchError::PayloadTooLarge(image.len()))?;
    let mut payload = Vec::with_capacity(ALERT_HEADER_LEN + image.len());
    payload.extend_from_slice(&len.to_be_bytes());
    payload.extend_from_slice(image);
    Ok(payload)
}

/// Read one payload from `reader`, refusing lengths above `max_len`.
pub fn read_payload<R: Read>(reader: &mut R, max_len: usize) -> io::Result<Vec<u8>> {
    let mut header = [0u8; ALERT_HEADER_LEN];
    reader.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("alert payload of {} bytes exceeds limit of {}", len, max_len),
        ));
    }
    let mut image = vec![0u8; len];
    reader.read_exact(&mut image)?;
    Ok(image)
}
