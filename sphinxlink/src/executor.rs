//! The [`Executor`] trait.
use std::ops::DerefMut;

use crate::{Connection, Result, transport::Transport};

/// A type that can returns a [`Connection`] to run a command on.
pub trait Executor {
    /// The returned transport, which exclusively borrow the connection until dropped.
    type Transport: Transport + DerefMut<Target = Connection> + Send;

    /// Acquire the transport.
    fn connection(self) -> impl Future<Output = Result<Self::Transport>> + Send;
}

impl<'a> Executor for &'a mut Connection {
    type Transport = &'a mut Connection;

    fn connection(self) -> impl Future<Output = Result<Self::Transport>> + Send {
        std::future::ready(Ok(self))
    }
}

#[cfg(test)]
mod test {
    use super::Executor;
    use crate::{query::query, row::RowShape};

    #[allow(unused, reason = "type assertion")]
    async fn assert_type<E: Executor>(e: E) {
        let _ = query("", e).fetch_all(&RowShape::text(1)).await;
    }

    #[allow(unused, reason = "type assertion")]
    async fn assert_type2<E: Executor>(e: E) {
        let mut e = e.connection().await.unwrap();
        let _ = query("", &mut *e).fetch_all(&RowShape::text(1)).await;
        let _ = query("", &mut *e).fetch_all(&RowShape::text(1)).await;
    }
}
