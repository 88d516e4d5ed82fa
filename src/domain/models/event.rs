use super::Message;

#[derive(Clone, Debug)]
pub enum Event {
    LoadingChanged(bool),
    MessageAdded(Message),
    MessageAppended { id: String, text: String },
    MessageReplaced(Message),
    MessagesReset(Vec<Message>),
    Notice(String),
    ToolCalled(String),
}
