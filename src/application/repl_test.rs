use super::parse_input;
use super::Input;
use super::Renderer;
use crate::domain::models::Action;
use crate::domain::models::Event;
use crate::domain::models::Message;
use crate::domain::models::Role;

#[test]
fn it_parses_chat_and_commands() {
    assert_eq!(parse_input("   "), Input::Empty);
    assert_eq!(parse_input("/q"), Input::Quit);
    assert_eq!(parse_input("/help"), Input::Help);
    assert_eq!(parse_input("/d"), Input::Diagram);
    assert_eq!(parse_input("/ev"), Input::Dispatch(Action::Evaluate()));
    assert_eq!(parse_input("/cancel"), Input::Dispatch(Action::Cancel()));
    assert_eq!(parse_input("/reload"), Input::Dispatch(Action::ReloadDiagram()));
    assert_eq!(
        parse_input("/key  abc123 "),
        Input::Dispatch(Action::SetCredential("abc123".to_string()))
    );
    assert_eq!(
        parse_input("/project A   todo app"),
        Input::Dispatch(Action::SetProject("A todo app".to_string()))
    );
    assert_eq!(
        parse_input("Where should the cache go?"),
        Input::Dispatch(Action::SendMessage(
            "Where should the cache go?".to_string()
        ))
    );
    assert_eq!(
        parse_input("/unknown thing"),
        Input::Dispatch(Action::SendMessage("/unknown thing".to_string()))
    );
}

#[test]
fn it_asks_for_a_project_description() {
    assert!(matches!(parse_input("/project"), Input::Usage(_)));
}

#[test]
fn it_streams_fragments_onto_one_line() {
    let mut renderer = Renderer::default();
    let placeholder = Message::new(Role::Assistant, "");
    let id = placeholder.id.to_string();

    let start = renderer.render(&Event::MessageAdded(placeholder.clone()));
    assert!(start.contains("ExcaliGenius: "));

    let fragment = renderer.render(&Event::MessageAppended {
        id: id.to_string(),
        text: "Looks ".to_string(),
    });
    assert_eq!(fragment, "Looks ");

    let stray = renderer.render(&Event::MessageAppended {
        id: "other".to_string(),
        text: "ignored".to_string(),
    });
    assert_eq!(stray, "");

    let mut done = placeholder;
    done.append("Looks good");
    assert_eq!(renderer.render(&Event::MessageReplaced(done)), "\n");
    assert_eq!(renderer.render(&Event::LoadingChanged(false)), "");
}

#[test]
fn it_prints_errors_in_place_of_the_placeholder() {
    let mut renderer = Renderer::default();
    let mut placeholder = Message::new(Role::Assistant, "");
    renderer.render(&Event::MessageAdded(placeholder.clone()));

    placeholder.convert_to_error("API Error: Please check your API key and try again.");
    let out = renderer.render(&Event::MessageReplaced(placeholder));
    assert!(out.contains("API Error: Please check your API key and try again."));
    assert!(out.ends_with('\n'));
}

#[test]
fn it_ends_the_line_before_a_notice() {
    let mut renderer = Renderer::default();
    renderer.render(&Event::MessageAdded(Message::new(Role::Assistant, "")));

    let out = renderer.render(&Event::Notice("Request cancelled.".to_string()));
    assert!(out.starts_with('\n'));
    assert!(out.contains("Request cancelled."));
    assert_eq!(renderer.render(&Event::LoadingChanged(false)), "");
}

#[test]
fn it_skips_user_messages_and_renders_resets() {
    let mut renderer = Renderer::default();
    assert_eq!(
        renderer.render(&Event::MessageAdded(Message::new(Role::User, "hello"))),
        ""
    );

    let out = renderer.render(&Event::MessagesReset(vec![Message::initial("A todo app")]));
    assert!(out.contains("\"A todo app\""));
}

#[test]
fn it_renders_each_reset_message_on_its_own_line() {
    let mut renderer = Renderer::default();
    let out = renderer.render(&Event::MessagesReset(vec![
        Message::new(Role::Assistant, "One"),
        Message::new(Role::Assistant, "Two"),
    ]));

    assert!(out.contains("One\n"));
    assert!(out.ends_with("Two\n"));
    assert!(!out.contains("\n\n"));
    assert_eq!(out.matches('\n').count(), 2);
}
