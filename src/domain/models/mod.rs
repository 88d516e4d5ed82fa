mod action;
mod backend;
mod canvas;
mod credentials;
mod diagram;
mod event;
mod history;
mod message;
mod role;
mod slash_commands;
mod tool;

pub use action::*;
pub use backend::*;
pub use canvas::*;
pub use credentials::*;
pub use diagram::*;
pub use event::*;
pub use history::*;
pub use message::*;
pub use role::*;
pub use slash_commands::*;
pub use tool::*;
