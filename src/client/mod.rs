//! Chat client
//!
//! [`ClientSession`] owns the connection: it sends commands parsed from
//! input lines and turns server frames into [`ClientEvent`]s. Downloads are
//! saved under `<download_root>/<username>/`.
//!
//! # Example
//!
//! ```no_run
//! use chatrelay::client::ClientSession;
//! use chatrelay::config::ClientConfig;
//!
//! # async fn example() -> chatrelay::Result<()> {
//! let config = ClientConfig::new("127.0.0.1:5050", "alice");
//! let (session, mut events) = ClientSession::connect(config).await?;
//!
//! session.submit_line("hello everyone").await?;
//! while let Some(event) = events.recv().await {
//!     println!("{}", event);
//! }
//! # Ok(())
//! # }
//! ```

mod command;
mod events;
mod session;

pub use command::{Command, DISCONNECT_USAGE, DOWNLOAD_USAGE, HELP, LIST_FILES_USAGE, MSG_USAGE};
pub use events::ClientEvent;
pub use session::{ClientSession, LineOutcome};
