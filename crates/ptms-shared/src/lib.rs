//! Types shared by every PTMS crate: identifiers, domain records, the chat
//! wire protocol, endpoint derivation and the common error taxonomy.

pub mod constants;
pub mod credential;
pub mod endpoints;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{PtmsError, PtmsResult};
