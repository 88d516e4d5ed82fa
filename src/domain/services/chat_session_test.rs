use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ChatSession;
use super::SessionSettings;
use super::CREDENTIAL_ERROR;
use super::EVALUATE_PROMPT;
use super::GENERIC_ERROR;
use super::NO_DIAGRAM;
use crate::domain::models::Content;
use crate::domain::models::ContentRole;
use crate::domain::models::Event;
use crate::domain::models::MessageType;
use crate::domain::models::Part;
use crate::domain::models::Role;
use crate::domain::models::Zoom;
use crate::domain::services::testing::call;
use crate::domain::services::testing::element;
use crate::domain::services::testing::text;
use crate::domain::services::testing::RecordingCanvas;
use crate::domain::services::testing::Reply;
use crate::domain::services::testing::ScriptedBackend;
use crate::domain::services::TurnOutcome;

fn session(
    backend: &Arc<ScriptedBackend>,
    canvas: &Arc<RecordingCanvas>,
) -> (ChatSession, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let mut session = ChatSession::new(
        backend.clone(),
        canvas.clone(),
        SessionSettings::default(),
        tx,
    );
    session.set_project_description("A URL shortener");

    return (session, rx);
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    return events;
}

fn texts(content: &Content) -> Vec<String> {
    return content
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text(text) => return Some(text.to_string()),
            _ => return None,
        })
        .collect();
}

fn roles(contents: &[Content]) -> Vec<ContentRole> {
    return contents.iter().map(|c| return c.role).collect();
}

async fn evaluated(
    backend: &Arc<ScriptedBackend>,
    canvas: &Arc<RecordingCanvas>,
) -> (ChatSession, mpsc::UnboundedReceiver<Event>) {
    let (mut session, mut rx) = session(backend, canvas);
    let outcome = session.start_evaluation(&CancellationToken::new()).await;
    assert_eq!(outcome, TurnOutcome::Completed);
    drain(&mut rx);

    return (session, rx);
}

#[test]
fn it_seeds_the_initial_message() {
    let backend = ScriptedBackend::new(vec![]);
    let canvas = RecordingCanvas::with_elements(vec![element("E0")]);
    let (mut session, mut rx) = session(&backend, &canvas);

    assert_eq!(session.messages().len(), 1);
    assert!(session.messages()[0].is_initial());
    assert!(session.messages()[0].content.contains("\"A URL shortener\""));
    assert!(!session.has_evaluated());
    assert!(matches!(drain(&mut rx).as_slice(), [Event::MessagesReset(_)]));

    session.set_project_description("A URL shortener");
    session.set_project_description("   ");
    assert!(drain(&mut rx).is_empty());
    assert_eq!(session.project_description(), "A URL shortener");
}

#[tokio::test]
async fn it_refuses_to_evaluate_an_empty_diagram() {
    let backend = ScriptedBackend::new(vec![Reply::Events(vec![text("unused")])]);

    for canvas in [
        RecordingCanvas::with_elements(vec![]),
        RecordingCanvas::uninitialized(),
    ] {
        let (mut session, _rx) = session(&backend, &canvas);
        let outcome = session.start_evaluation(&CancellationToken::new()).await;

        assert_eq!(outcome, TurnOutcome::Skipped);
        assert_eq!(session.messages().len(), 2);
        let reply = &session.messages()[1];
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, NO_DIAGRAM);
        assert!(!session.has_evaluated());
        assert!(!session.is_loading());
    }

    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn it_evaluates_and_applies_modifications() {
    let backend = ScriptedBackend::new(vec![
        Reply::Events(vec![text("Let me look. "), call("get_diagram_data", json!({}))]),
        Reply::Events(vec![call(
            "apply_modifications",
            json!({ "elements": [element("E1")], "appState": { "zoom": { "value": 2 } } }),
        )]),
        Reply::Events(vec![text("Done")]),
    ]);
    let canvas = RecordingCanvas::with_elements(vec![element("E0")]);
    let (mut session, mut rx) = session(&backend, &canvas);
    drain(&mut rx);

    let outcome = session.start_evaluation(&CancellationToken::new()).await;
    assert_eq!(outcome, TurnOutcome::Completed);
    assert!(session.has_evaluated());
    assert!(!session.is_loading());

    let updates = canvas.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].elements, Some(vec![element("E1")]));
    assert_eq!(
        updates[0].app_state.as_ref().unwrap().zoom,
        Some(Zoom { value: 2.0 })
    );

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, EVALUATE_PROMPT);
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].content, "Let me look. Done");
    assert!(messages[2].raw_history.is_some());

    let first = &backend.requests()[0];
    assert_eq!(first.contents.len(), 1);
    assert!(texts(&first.contents[0])[0].starts_with("Project: A URL shortener"));
    assert!(first.system_instruction.contains("A URL shortener"));

    let events = drain(&mut rx);
    let loading = events
        .iter()
        .filter_map(|event| match event {
            Event::LoadingChanged(loading) => return Some(*loading),
            _ => return None,
        })
        .collect::<Vec<bool>>();
    assert_eq!(loading, vec![true, false]);
    assert!(matches!(events.first(), Some(Event::LoadingChanged(true))));
    assert!(matches!(events.last(), Some(Event::LoadingChanged(false))));
    assert!(events
        .iter()
        .any(|event| return matches!(event, Event::ToolCalled(name) if name == "apply_modifications")));
}

#[tokio::test]
async fn it_ignores_invalid_messages() {
    let backend = ScriptedBackend::new(vec![Reply::Events(vec![text("ok")])]);
    let canvas = RecordingCanvas::with_elements(vec![element("E0")]);
    let (mut session, _rx) = session(&backend, &canvas);
    let token = CancellationToken::new();

    assert_eq!(session.send_message("Hi", &token).await, TurnOutcome::Skipped);
    assert_eq!(backend.calls(), 0);
    assert_eq!(session.messages().len(), 1);

    session.start_evaluation(&token).await;
    assert_eq!(session.send_message("  \n", &token).await, TurnOutcome::Skipped);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn it_surfaces_credential_errors() {
    let backend = ScriptedBackend::new(vec![
        Reply::Events(vec![text("Looks fine.")]),
        Reply::Status(403),
        Reply::Events(vec![text("Back again.")]),
    ]);
    let canvas = RecordingCanvas::with_elements(vec![element("E0")]);
    let (mut session, _rx) = evaluated(&backend, &canvas).await;
    let token = CancellationToken::new();
    let before = session.messages().len();

    let outcome = session.send_message("Hello", &token).await;
    assert_eq!(outcome, TurnOutcome::Failed);
    assert!(!session.is_loading());

    let added = &session.messages()[before..];
    let assistant = added
        .iter()
        .filter(|m| return m.role == Role::Assistant)
        .collect::<Vec<_>>();
    assert_eq!(assistant.len(), 1);
    assert_eq!(assistant[0].content, CREDENTIAL_ERROR);
    assert_eq!(assistant[0].message_type(), MessageType::Error);

    session.send_message("Retry", &token).await;
    let contents = &backend.requests()[2].contents;
    assert_eq!(
        roles(contents),
        vec![ContentRole::User, ContentRole::Model, ContentRole::User]
    );
    assert_eq!(texts(contents.last().unwrap()), vec!["Hello", "Retry"]);
    assert!(contents
        .iter()
        .all(|c| return !texts(c).contains(&CREDENTIAL_ERROR.to_string())));
}

#[tokio::test]
async fn it_surfaces_generic_errors_after_partial_text() {
    let backend = ScriptedBackend::new(vec![
        Reply::Events(vec![text("Looks fine.")]),
        Reply::Error("boom".to_string()),
        Reply::Broken(vec![text("Half")], "connection reset".to_string()),
    ]);
    let canvas = RecordingCanvas::with_elements(vec![element("E0")]);
    let (mut session, _rx) = evaluated(&backend, &canvas).await;
    let token = CancellationToken::new();

    session.send_message("One", &token).await;
    let last = session.messages().last().unwrap();
    assert_eq!(last.content, GENERIC_ERROR);
    assert!(last.raw_history.is_none());

    let before = session.messages().len();
    session.send_message("Two", &token).await;
    let added = &session.messages()[before..];
    assert_eq!(added.len(), 3);
    assert_eq!(added[1].content, "Half");
    assert_eq!(added[1].message_type(), MessageType::Normal);
    assert_eq!(added[2].content, GENERIC_ERROR);
    assert!(!session.is_loading());
}

#[tokio::test]
async fn it_carries_history_forward() {
    let backend = ScriptedBackend::new(vec![
        Reply::Events(vec![call("get_diagram_data", json!({}))]),
        Reply::Events(vec![text("Add a cache.")]),
        Reply::Events(vec![text("Added.")]),
    ]);
    let canvas = RecordingCanvas::with_elements(vec![element("E0")]);
    let (mut session, _rx) = evaluated(&backend, &canvas).await;

    session
        .send_message("Where should it go?", &CancellationToken::new())
        .await;

    let contents = &backend.requests()[2].contents;
    assert_eq!(
        roles(contents),
        vec![
            ContentRole::User,
            ContentRole::Model,
            ContentRole::User,
            ContentRole::Model,
            ContentRole::User,
        ]
    );
    assert!(matches!(contents[2].parts[0], Part::FunctionResponse(_)));
    assert_eq!(texts(&contents[3]), vec!["Add a cache."]);
    assert_eq!(texts(&contents[4]), vec!["Where should it go?"]);
    assert!(contents
        .iter()
        .all(|c| return texts(c).iter().all(|t| return !t.starts_with("Hi!"))));
}

#[tokio::test]
async fn it_resets_when_the_project_changes() {
    let backend = ScriptedBackend::new(vec![Reply::Events(vec![text("ok")])]);
    let canvas = RecordingCanvas::with_elements(vec![element("E0")]);
    let (mut session, _rx) = evaluated(&backend, &canvas).await;
    assert!(session.has_evaluated());

    session.set_project_description("A chat server");
    assert!(!session.has_evaluated());
    assert_eq!(session.messages().len(), 1);
    assert!(session.messages()[0].content.contains("A chat server"));
}

#[tokio::test]
async fn it_cancels_a_running_turn() {
    let backend = ScriptedBackend::new(vec![Reply::Hang(vec![text("Partial")])]);
    let canvas = RecordingCanvas::with_elements(vec![element("E0")]);
    let (mut session, mut rx) = session(&backend, &canvas);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let outcome = session.start_evaluation(&token).await;
    assert_eq!(outcome, TurnOutcome::Cancelled);
    assert!(!session.is_loading());

    let last = session.messages().last().unwrap();
    assert_eq!(last.content, "Partial");
    assert!(last.raw_history.is_none());
    assert!(drain(&mut rx)
        .iter()
        .any(|event| return matches!(event, Event::Notice(_))));
}

#[tokio::test]
async fn it_ends_the_turn_on_unknown_tools() {
    let backend = ScriptedBackend::new(vec![Reply::Events(vec![call(
        "delete_everything",
        json!({}),
    )])]);
    let canvas = RecordingCanvas::with_elements(vec![element("E0")]);
    let (mut session, _rx) = session(&backend, &canvas);

    let outcome = session.start_evaluation(&CancellationToken::new()).await;
    assert_eq!(
        outcome,
        TurnOutcome::UnknownTool("delete_everything".to_string())
    );
    assert_eq!(backend.calls(), 1);
    assert!(!session.is_loading());
    assert!(canvas.updates().is_empty());

    let history = session.messages().last().unwrap().raw_history.clone().unwrap();
    assert!(history.iter().all(|c| return !c.has_tool_calls()));
}
