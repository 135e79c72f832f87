// Network layer: REST client for the PTMS API and the real-time chat link.

pub mod api;
pub mod chat;
pub mod connection;
pub mod reconnect;

pub use api::{ApiClient, ApiResponse, PtmsApi};
pub use chat::{spawn_chat_client, ChatClientConfig, ChatCommand, ChatHandle, ChatNotification};
pub use connection::ChatConnection;
pub use reconnect::ReconnectPolicy;
