pub mod bootstrap;
pub mod chat;
pub mod config;
pub mod events;
pub mod session;

use tracing_subscriber::{fmt, EnvFilter};

pub use bootstrap::{BootstrapManager, BootstrapProgress, BootstrapStage, BootstrapSummary};
pub use chat::{open_chat, ChatSession, OpenChat};
pub use config::ClientConfig;
pub use events::ChatUiEvent;
pub use session::SessionState;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("ptms_client=debug,ptms_net=debug,ptms_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    tracing::info!("PTMS client core initialised");
}
