//! RAII connection lease.

use std::ops::{Deref, DerefMut};

use crate::core::traits::ConnectionProvider;
use crate::error::Result;

/// A connection borrowed from a [`ConnectionProvider`], returned to it on
/// drop, on every exit path.
pub struct ConnectionLease<P: ConnectionProvider> {
    provider: P,
    connection: Option<P::Connection>,
}

impl<P: ConnectionProvider> ConnectionLease<P> {
    pub async fn acquire(provider: &P) -> Result<Self> {
        let connection = provider.acquire().await?;
        Ok(Self {
            provider: provider.clone(),
            connection: Some(connection),
        })
    }

    /// Return the connection now rather than at end of scope.
    pub fn release(self) {}
}

impl<P: ConnectionProvider> Deref for ConnectionLease<P> {
    type Target = P::Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_ref() {
            Some(connection) => connection,
            None => unreachable!("connection lease used after release"),
        }
    }
}

impl<P: ConnectionProvider> DerefMut for ConnectionLease<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.connection.as_mut() {
            Some(connection) => connection,
            None => unreachable!("connection lease used after release"),
        }
    }
}

impl<P: ConnectionProvider> Drop for ConnectionLease<P> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.provider.release(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingProvider;
    use crate::core::traits::SqlConnection;

    #[tokio::test]
    async fn test_lease_releases_on_drop() {
        let provider = RecordingProvider::new();
        {
            let mut lease = ConnectionLease::acquire(&provider).await.unwrap();
            lease.execute("SELECT 1", &[]).await.unwrap();
            assert_eq!(provider.outstanding(), 1);
        }
        assert_eq!(provider.outstanding(), 0);
        assert_eq!(provider.acquired(), 1);
    }

    #[tokio::test]
    async fn test_explicit_release() {
        let provider = RecordingProvider::new();
        let lease = ConnectionLease::acquire(&provider).await.unwrap();
        lease.release();
        assert_eq!(provider.outstanding(), 0);
    }
}
