#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Cancel(),
    Evaluate(),
    ReloadDiagram(),
    SendMessage(String),
    SetCredential(String),
    SetProject(String),
}
