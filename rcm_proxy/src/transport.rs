//! Transport trait, TCP and loopback implementations.
//!
//! A transport is a connected, bidirectional, frame-preserving byte
//! channel, split into a send half and a receive half so the two can
//! live on different threads. TCP frames with a little-endian u32
//! length prefix; the in-process loopback passes frames over channels
//! and is what the tests use.

use crate::error::TransportError;
use crate::message::MAX_FRAME_LEN;
use std::time::Duration;

/// Send half of a connected transport.
pub trait TransportTx: Send {
    /// Send one frame body.
    fn send(&mut self, body: &[u8]) -> Result<(), TransportError>;

    /// Close the connection; further sends fail.
    fn shutdown(&mut self);
}

/// Receive half of a connected transport.
pub trait TransportRx: Send {
    /// Receive one frame body, waiting at most `timeout`.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

/// A connected transport, ready to be split across threads.
pub type TransportPair = (Box<dyn TransportTx>, Box<dyn TransportRx>);

pub mod tcp {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

    pub struct TcpTx {
        stream: TcpStream,
    }

    impl TransportTx for TcpTx {
        fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
            if body.len() > MAX_FRAME_LEN {
                return Err(TransportError::FrameTooLarge { len: body.len() });
            }
            let len = (body.len() as u32).to_le_bytes();
            self.stream.write_all(&len)?;
            self.stream.write_all(body)?;
            Ok(())
        }

        fn shutdown(&mut self) {
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }

    pub struct TcpRx {
        stream: TcpStream,
    }

    impl TcpRx {
        fn read_exact_mapped(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
            self.stream.read_exact(buf).map_err(|e| match e.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                    TransportError::Timeout
                }
                std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe => TransportError::Closed,
                _ => TransportError::Io { source: e },
            })
        }
    }

    impl TransportRx for TcpRx {
        fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
            self.stream.set_read_timeout(Some(timeout))?;

            let mut len_buf = [0u8; 4];
            self.read_exact_mapped(&mut len_buf)?;
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_FRAME_LEN {
                return Err(TransportError::FrameTooLarge { len });
            }

            let mut body = vec![0u8; len];
            self.read_exact_mapped(&mut body)?;
            Ok(body)
        }
    }

    fn split(stream: TcpStream) -> std::io::Result<TransportPair> {
        stream.set_nodelay(true)?;
        let recv = stream.try_clone()?;
        Ok((
            Box::new(TcpTx { stream }) as Box<dyn TransportTx>,
            Box::new(TcpRx { stream: recv }) as Box<dyn TransportRx>,
        ))
    }

    /// Connect to a listening interface server.
    pub fn connect(addr: &str) -> std::io::Result<TransportPair> {
        split(TcpStream::connect(addr)?)
    }

    /// Listening socket handing out transport pairs.
    pub struct Listener {
        listener: TcpListener,
    }

    impl Listener {
        pub fn bind(addr: &str) -> std::io::Result<Self> {
            Ok(Self { listener: TcpListener::bind(addr)? })
        }

        pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
            self.listener.local_addr()
        }

        /// Block until the next client connects.
        pub fn accept(&self) -> std::io::Result<TransportPair> {
            let (stream, _peer) = self.listener.accept()?;
            split(stream)
        }
    }
}

pub mod loopback {
    use super::*;
    use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

    pub struct LoopbackTx {
        tx: Option<Sender<Vec<u8>>>,
    }

    impl TransportTx for LoopbackTx {
        fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
            self.tx
                .as_ref()
                .ok_or(TransportError::Closed)?
                .send(body.to_vec())
                .map_err(|_| TransportError::Closed)
        }

        fn shutdown(&mut self) {
            // dropping the only sender disconnects the peer's receiver
            self.tx = None;
        }
    }

    pub struct LoopbackRx {
        rx: Receiver<Vec<u8>>,
    }

    impl TransportRx for LoopbackRx {
        fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
            self.rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => TransportError::Timeout,
                RecvTimeoutError::Disconnected => TransportError::Closed,
            })
        }
    }

    /// In-process connected transport pair.
    pub fn pair() -> (TransportPair, TransportPair) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            (
                Box::new(LoopbackTx { tx: Some(a_tx) }) as Box<dyn TransportTx>,
                Box::new(LoopbackRx { rx: a_rx }) as Box<dyn TransportRx>,
            ),
            (
                Box::new(LoopbackTx { tx: Some(b_tx) }) as Box<dyn TransportTx>,
                Box::new(LoopbackRx { rx: b_rx }) as Box<dyn TransportRx>,
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_round_trip() {
        let ((mut a_tx, _a_rx), (_b_tx, mut b_rx)) = loopback::pair();
        a_tx.send(b"hello").unwrap();
        assert_eq!(b_rx.recv_timeout(Duration::from_millis(100)).unwrap(), b"hello");
    }

    #[test]
    fn test_loopback_timeout_and_close() {
        let ((mut a_tx, _a_rx), (_b_tx, mut b_rx)) = loopback::pair();
        assert!(matches!(
            b_rx.recv_timeout(Duration::from_millis(10)),
            Err(TransportError::Timeout)
        ));
        a_tx.shutdown();
        assert!(matches!(
            b_rx.recv_timeout(Duration::from_millis(10)),
            Err(TransportError::Closed)
        ));
        assert!(matches!(a_tx.send(b"late"), Err(TransportError::Closed)));
    }
}
