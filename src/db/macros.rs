//! Backend dispatch macro.
//!
//! Expands one expression per [`BackendConnection`](crate::db::backend::BackendConnection)
//! variant, binding the inner adapter to the given identifier. The MongoDB arm
//! only exists when the `mongo` feature is enabled.
//!
//! # Example
//!
//! ```ignore
//! dispatch_backend!(self, conn => conn.probe_read().await)
//! ```

#[macro_export]
macro_rules! dispatch_backend {
    ($conn:expr, $adapter:ident => $body:expr) => {
        match $conn {
            $crate::db::backend::BackendConnection::MySql($adapter) => $body,
            $crate::db::backend::BackendConnection::Postgres($adapter) => $body,
            #[cfg(feature = "mongo")]
            $crate::db::backend::BackendConnection::Mongo($adapter) => $body,
        }
    };
}

pub use dispatch_backend;
