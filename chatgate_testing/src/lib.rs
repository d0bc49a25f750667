//! Utilities for driving a [`Session`](chatgate::session::Session) against
//! an in-memory chat server during tests.
//!
//! [`mock_backend`] returns a connector to hand to the session builder and a
//! backend handle that yields one [`MockServer`] per connection the session
//! opens. The server side speaks raw protocol lines, so tests script the
//! exact traffic a real server would produce.
//!
//! ```rust,no_run
//! use chatgate::{credentials::Credentials, session::Session};
//! use chatgate_testing::mock_backend;
//!
//! # async fn example() -> std::io::Result<()> {
//! let (connector, mut backend) = mock_backend();
//! let session = Session::builder(Credentials::new("me", "irc.test"))
//!     .connector(connector)
//!     .build();
//! let connect = tokio::spawn(async move { session.connect().await });
//! let mut server = backend.accept().await.expect("connection");
//! server.register("me").await?;
//! # Ok(())
//! # }
//! ```

pub mod lines;
pub mod logging;
pub mod mock_server;

pub use logging::{LoggerHandle, logger};
pub use mock_server::{MockBackend, MockConnector, MockServer, mock_backend};

/// Result type for fallible tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
