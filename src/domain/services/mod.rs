pub mod actions;
mod chat_session;
mod snapshot;
#[cfg(test)]
pub mod testing;
mod tool_dispatcher;

pub use chat_session::*;
pub use snapshot::*;
pub use tool_dispatcher::*;
