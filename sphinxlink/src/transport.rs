//! The [`Transport`] trait.
use std::{
    io,
    task::{Context, Poll},
};

use crate::{
    Result,
    mysql::{BackendProtocol, FrontendProtocol},
};

/// Where an unfinished response was left off.
///
/// Passed to [`Transport::release`] so the rest of the response can be skipped before the next
/// command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    /// The next packet is the first packet of a (possibly following) response.
    Header,
    /// This many column definitions are left, then an `EOF`.
    Columns(u64),
    /// Inside the rows of a result set.
    Rows,
}

/// A buffered stream which can send and receive MySQL protocol message.
pub trait Transport: Unpin {
    /// Poll to flush the underlying io.
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>>;

    /// Poll to receive a message.
    ///
    /// Calling `poll_recv` will also try to [`poll_flush`][1] if there is buffered message.
    ///
    /// Implementor should handle `ERR` packet and return it as [`Err`].
    ///
    /// [1]: Transport::poll_flush
    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>>;

    /// Send message as a new command, restarting the packet sequence.
    ///
    /// Note that this send is buffered, caller must also call
    /// [`poll_flush`][1] or [`flush`][2] afterwards.
    ///
    /// [1]: Transport::poll_flush
    /// [2]: TransportExt::flush
    fn send<F: FrontendProtocol>(&mut self, message: F);

    /// Release the result cursor of the current command.
    ///
    /// `pending` is [`None`] when the response was read to its final terminator, otherwise
    /// implementor should skip the rest of the response before the next command.
    ///
    /// Called exactly once per result.
    fn release(&mut self, pending: Option<Pending>);
}

impl<P> Transport for &mut P where P: Transport {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        P::poll_flush(self, cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        P::poll_recv(self, cx)
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        P::send(self, message);
    }

    fn release(&mut self, pending: Option<Pending>) {
        P::release(self, pending);
    }
}

impl<P> Transport for tokio::sync::OwnedMutexGuard<P> where P: Transport {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        P::poll_flush(self, cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        P::poll_recv(self, cx)
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        P::send(self, message);
    }

    fn release(&mut self, pending: Option<Pending>) {
        P::release(self, pending);
    }
}

/// An extension trait to provide `Future` API for [`Transport`].
pub trait TransportExt: Transport {
    /// Flush the underlying io.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> {
        std::future::poll_fn(|cx|self.poll_flush(cx))
    }

    /// Receive a server message.
    fn recv<B: BackendProtocol>(&mut self) -> impl Future<Output = Result<B>> {
        std::future::poll_fn(|cx|self.poll_recv(cx))
    }
}

impl<T> TransportExt for T where T: Transport { }
