//! Buffered, packet framed connection to `searchd`.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::{
    Result,
    common::{span, verbose},
    connection::Config,
    mysql::{
        BackendProtocol, FrontendProtocol, HEADER_LEN, MAX_PAYLOAD, ProtocolError, ServerError,
        backend, frontend,
    },
    net::Socket,
};

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Buffered connection to `searchd`.
///
/// Keeps track of the packet sequence id of the current exchange.
#[derive(Debug)]
pub struct WireStream {
    socket: Socket,
    read_buf: BytesMut,
    write_buf: BytesMut,
    seq: u8,
}

impl WireStream {
    pub async fn connect(config: &Config) -> io::Result<Self> {
        let socket = match &config.socket {
            Some(path) => Socket::connect_socket(path).await?,
            None => Socket::connect_tcp(&config.host, config.port).await?,
        };

        Ok(Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            seq: 0,
        })
    }

    /// Buffer a message as the start of a new command, the sequence id restarts at zero.
    pub fn command<F: FrontendProtocol>(&mut self, message: F) {
        span!("command");
        self.seq = 0;
        self.send(message);
    }

    /// Buffer a message continuing the current exchange.
    pub fn send<F: FrontendProtocol>(&mut self, message: F) {
        frontend::write(message, &mut self.seq, &mut self.write_buf);
    }

    pub fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        while self.write_buf.has_remaining() {
            let n = ready!(Pin::new(&mut self.socket).poll_write(cx, &self.write_buf))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            verbose!("sent {n} bytes");
            self.write_buf.advance(n);
        }
        Pin::new(&mut self.socket).poll_flush(cx)
    }

    pub fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        Pin::new(&mut self.socket).poll_shutdown(cx)
    }

    /// Poll to receive a message.
    ///
    /// Flushes any buffered message first. An `ERR` packet is returned as [`Err`].
    pub fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        if self.write_buf.has_remaining() {
            ready!(self.poll_flush(cx)?);
        }

        loop {
            if let Some(body) = self.try_frame()? {
                if backend::is_err(&body) {
                    let err = ServerError::decode(body)?;
                    verbose!("server error: {err}");
                    return Poll::Ready(Err(err.into()));
                }
                return Poll::Ready(Ok(B::decode(body)?));
            }

            if ready!(self.poll_read(cx))? == 0 {
                return Poll::Ready(Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()));
            }
        }
    }

    /// Split one complete message out of the read buffer, joining continuation packets.
    fn try_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        span!("frame", seq = self.seq);
        let mut offset = 0;
        let mut packets = 0usize;
        let mut total = 0;

        loop {
            let Some(mut header) = self.read_buf.get(offset..offset + HEADER_LEN) else {
                return Ok(None);
            };
            let len = header.get_uint_le(3) as usize;
            let found = header.get_u8();
            let expect = self.seq.wrapping_add(packets as u8);

            if found != expect {
                return Err(ProtocolError::Sequence { expect, found });
            }
            if self.read_buf.len() < offset + HEADER_LEN + len {
                self.read_buf.reserve(offset + HEADER_LEN + len - self.read_buf.len());
                return Ok(None);
            }

            offset += HEADER_LEN + len;
            total += len;
            packets += 1;

            if len < MAX_PAYLOAD {
                break;
            }
        }

        self.seq = self.seq.wrapping_add(packets as u8);
        verbose!(packets, len = total, "recv message");

        if packets == 1 {
            self.read_buf.advance(HEADER_LEN);
            return Ok(Some(self.read_buf.split_to(total).freeze()));
        }

        let mut body = BytesMut::with_capacity(total);
        for _ in 0..packets {
            let len = (&self.read_buf[..3]).get_uint_le(3) as usize;
            self.read_buf.advance(HEADER_LEN);
            body.put(self.read_buf.split_to(len));
        }
        Ok(Some(body.freeze()))
    }

    fn poll_read(&mut self, cx: &mut Context) -> Poll<io::Result<usize>> {
        self.read_buf.reserve(DEFAULT_BUF_CAPACITY);

        let n = {
            let dst = self.read_buf.chunk_mut();
            let dst = unsafe { dst.as_uninit_slice_mut() };
            let mut buf = ReadBuf::uninit(dst);
            let ptr = buf.filled().as_ptr();
            ready!(Pin::new(&mut self.socket).poll_read(cx, &mut buf)?);

            // Ensure the pointer does not change from under us
            assert_eq!(ptr, buf.filled().as_ptr());
            buf.filled().len()
        };

        // Safety: This is guaranteed to be the number of initialized (and read)
        // bytes due to the invariants provided by `ReadBuf::filled`.
        unsafe {
            self.read_buf.advance_mut(n);
        }

        Poll::Ready(Ok(n))
    }
}

impl BackendProtocol for Bytes {
    fn decode(body: Bytes) -> Result<Self, ProtocolError> {
        Ok(body)
    }
}
