#![cfg(test)]

use super::*;
use crate::config::EngineConfig;
use crate::llm::ModelError;
use crate::llm::scripted::ScriptedModel;
use crate::protocol::write_frame_to_stream;
use crate::stream::{Finish, FinishReason, Frame, drain};
use crate::tree::FileSystemTree;
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};

fn stop_finishes(frames: &[Frame]) -> usize {
    frames
        .iter()
        .filter(|f| {
            matches!(
                f,
                Frame::Finish(Finish {
                    finish_reason: FinishReason::Stop,
                    ..
                })
            )
        })
        .count()
}

fn hub_with(model: ScriptedModel) -> (TempDir, Hub) {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(model);
    let engine = Engine::new(model.clone(), model, EngineConfig::default());
    let hub = Hub::new(
        engine,
        Store::new(dir.path().join("projects")),
        Notifier::start(),
        Formatter::Builtin,
    );
    (dir, hub)
}

fn modify(old: &str, new: &str) -> serde_json::Value {
    json!({ "updates": [
        { "type": "modification", "filepath": "a.txt", "oldCode": old, "newCode": new }
    ]})
}

async fn seed(hub: &Hub) -> Project {
    let files = FileSystemTree::from_files([("a.txt", "hello world")]).unwrap();
    hub.store()
        .create_project("ada", "Greeter", "build a greeter", &files)
        .await
        .unwrap()
}

fn conversation(prompt: &str) -> Vec<Message> {
    vec![
        Message::user("build a greeter"),
        Message::assistant(""),
        Message::user(prompt),
    ]
}

#[tokio::test]
async fn successful_change_is_persisted_and_announced() {
    let (_dir, hub) = hub_with(
        ScriptedModel::new("base")
            .text("base")
            .tools("", &[("updateFiles", modify("world", "there"))])
            .text("")
            .text("The greeting now says hello there.")
            .streamed("Updating the greeting."),
    );
    let project = seed(&hub).await;
    let mut updates = hub.notifier().subscribe("ada");
    let (sink, mut rx) = Sink::new();

    let updated = hub
        .change(&project.id, conversation("say there"), &sink)
        .await
        .unwrap();

    assert_eq!(updated.messages.len(), 3);
    assert_eq!(updated.messages[1].contents, "say there");
    assert!(updated.messages[2].contents.contains("hello there"));
    let files = hub.store().current_files(&project.id).await.unwrap();
    assert_eq!(files.read("a.txt").unwrap(), "hello there");

    let notification = updates.recv().await.unwrap();
    assert_eq!(notification.project_id, project.id);
    assert_eq!(notification.project.messages.len(), 3);
    assert!(drain(&mut rx).last().unwrap().is_final_stop());
}

#[tokio::test]
async fn failed_run_leaves_current_files_untouched() {
    let (_dir, hub) = hub_with(
        ScriptedModel::new("base")
            .text("base")
            .tools("", &[("updateFiles", modify("hello", "goodbye"))])
            .tools("", &[("updateFiles", modify("world", "moon"))])
            .fail(ModelError::RateLimited { retry_after: None })
            .streamed("Sure."),
    );
    let project = seed(&hub).await;
    let (sink, mut rx) = Sink::new();

    assert!(
        hub.change(&project.id, conversation("change it all"), &sink)
            .await
            .is_err()
    );

    let after = hub.store().get_project(&project.id).await.unwrap().unwrap();
    assert_eq!(after, project);
    assert_eq!(
        after.current_files().read("a.txt").unwrap(),
        "hello world"
    );
    let frames = drain(&mut rx);
    assert_eq!(stop_finishes(&frames), 0);
    assert!(frames.iter().any(|f| matches!(f, Frame::Finish(finish) if finish.is_continued)));
    assert!(frames.iter().any(|f| matches!(f, Frame::Error(_))));
}

#[tokio::test]
async fn unknown_project_is_rejected_on_the_stream() {
    let (_dir, hub) = hub_with(ScriptedModel::new("base"));
    let (sink, mut rx) = Sink::new();
    let err = hub
        .change("missing", conversation("hi"), &sink)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no such project"));
    let frames = drain(&mut rx);
    assert!(matches!(&frames[0], Frame::Error(e) if e.contains("no such project")));
}

#[tokio::test]
async fn conversation_must_end_with_the_prompt() {
    let (_dir, hub) = hub_with(ScriptedModel::new("base"));
    let project = seed(&hub).await;
    let (sink, _rx) = Sink::new();
    let messages = vec![Message::user("hi"), Message::assistant("hello")];
    assert!(hub.change(&project.id, messages, &sink).await.is_err());
    // Blank trailing messages are dropped before looking for the prompt.
    let (sink, _rx) = Sink::new();
    let messages = vec![Message::assistant("hello"), Message::user("  ")];
    assert!(hub.change(&project.id, messages, &sink).await.is_err());
}

#[tokio::test]
async fn change_over_a_socket_streams_frames_until_close() {
    let (_dir, hub) = hub_with(
        ScriptedModel::new("base")
            .text("base")
            .text("Nothing needed changing.")
            .text("No changes were made.")
            .streamed("Let me check."),
    );
    let project = seed(&hub).await;
    let (mut client, hub_end) = UnixStream::pair().unwrap();
    serve_in_background(hub_end, Arc::new(hub));

    write_frame_to_stream(
        &mut client,
        &Request::Change {
            project_id: project.id.clone(),
            messages: conversation("anything to fix?"),
        },
    )
    .await
    .unwrap();

    let mut lines = BufReader::new(client).lines();
    let mut frames = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        frames.push(Frame::decode(&line).unwrap());
    }
    assert!(matches!(frames.first(), Some(Frame::Start { .. })));
    assert!(frames.last().unwrap().is_final_stop());
    assert_eq!(stop_finishes(&frames), 1);
}

#[test]
fn socket_path_preparation_refuses_regular_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run").join("socket");
    prepare_socket_path(&path).unwrap();
    assert!(path.parent().unwrap().is_dir());
    std::fs::write(&path, "not a socket").unwrap();
    assert!(prepare_socket_path(&path).is_err());
    assert!(path.exists());
}

#[tokio::test]
async fn stale_socket_is_removed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("socket");
    drop(UnixListener::bind(&path).unwrap());
    assert!(path.exists());
    prepare_socket_path(&path).unwrap();
    assert!(!path.exists());
}
