pub mod names;
pub mod session;
pub mod typing;

use tokio::sync::mpsc;
use tracing::info;

use ptms_net::{spawn_chat_client, ChatClientConfig, ChatHandle, ChatNotification, PtmsApi};
use ptms_shared::{PtmsError, PtmsResult};

use crate::config::ClientConfig;
use crate::session::SessionState;

pub use names::NameCache;
pub use session::{ChatMessage, ChatSession};
pub use typing::TypingDebouncer;

/// Everything the chat screen needs while it is open. The connection ends on
/// [`ChatHandle::disconnect`], or once both the handle and the session are
/// dropped.
pub struct OpenChat {
    pub session: ChatSession,
    pub handle: ChatHandle,
    pub notifications: mpsc::Receiver<ChatNotification>,
}

/// Load the name directory and start the chat connection for an online
/// session.
pub async fn open_chat<A: PtmsApi + ?Sized>(
    api: &A,
    config: &ClientConfig,
    state: &SessionState,
) -> PtmsResult<OpenChat> {
    let (token, user_id) = match (&state.token, state.user_id()) {
        (Some(token), Some(user_id)) if state.is_online() => (token.clone(), user_id),
        _ => return Err(PtmsError::Auth("chat needs an online session".into())),
    };
    let endpoints = config.endpoints()?;

    let names = NameCache::load(api, &token).await;

    let mut chat_config = ChatClientConfig::new(endpoints.chat_url.clone(), token);
    chat_config.heartbeat = config.heartbeat;
    chat_config.reconnect = config.reconnect_policy();

    info!(url = %endpoints.chat_url, user = %user_id, names = names.len(), "Opening chat");
    let (handle, notifications) = spawn_chat_client(chat_config);
    let session = ChatSession::new(user_id, names, handle.commands(), config.typing_idle);

    Ok(OpenChat {
        session,
        handle,
        notifications,
    })
}
