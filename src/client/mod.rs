//! Backend client with bearer injection and single-flight token refresh.

pub mod auth;
pub mod broker;
pub mod coordinator;
pub mod errors;
pub mod http;
pub mod navigator;

pub use auth::RegisterRequest;
pub use broker::BrokerClient;
pub use errors::{ClientError, RefreshError};
pub use http::{ApiClient, ClientConfig, DEFAULT_TIMEOUT};
pub use navigator::{BroadcastNavigator, Navigator};
