pub mod client;
pub mod config;
pub mod error;
pub mod notify;
pub mod session;
pub mod state;
pub mod transport;

pub use client::DashboardClient;
pub use config::ClientConfig;
pub use error::{HandlerError, ParseError, StoreError, TransportError};
pub use notify::{Notification, NotificationLevel, SessionEvent};
pub use session::{LocalMutation, StoreHandle};
pub use state::{DashboardSnapshot, DashboardState, PingStats};
pub use transport::{ConnectionManager, ConnectionState, ReconnectPolicy};
