#![cfg(test)]

use super::*;
use crate::history::Role;
use tempfile::TempDir;

fn test_store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::new(dir.path().join("projects"));
    (dir, store)
}

fn tree(contents: &str) -> FileSystemTree {
    FileSystemTree::from_files([("src/App.tsx", contents)]).unwrap()
}

#[tokio::test]
async fn create_and_load_project() {
    let (_dir, store) = test_store();
    let project = store
        .create_project("ada", "Pomodoro Timer", "build a timer", &tree("v1"))
        .await
        .unwrap();

    let loaded = store.get_project(&project.id).await.unwrap().unwrap();
    assert_eq!(loaded, project);
    assert_eq!(loaded.messages.len(), 1);
    assert_eq!(loaded.messages[0].kind, MessageKind::User);
    assert_eq!(loaded.messages[0].contents, "build a timer");
    assert_eq!(loaded.current_files(), tree("v1"));
}

#[tokio::test]
async fn ids_are_uuids() {
    let (_dir, store) = test_store();
    let a = store
        .create_project("ada", "A", "one", &tree("v1"))
        .await
        .unwrap();
    let b = store
        .create_project("ada", "B", "two", &tree("v1"))
        .await
        .unwrap();
    assert_ne!(a.id, b.id);
    assert!(a.id.parse::<Uuid>().is_ok());
    let message_id = a.messages[0].id.strip_prefix("msg-").unwrap();
    assert!(message_id.parse::<Uuid>().is_ok());
}

#[tokio::test]
async fn unknown_project_has_empty_files() {
    let (_dir, store) = test_store();
    assert!(store.get_project("nope").await.unwrap().is_none());
    assert!(store.current_files("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn path_like_ids_are_rejected() {
    let (_dir, store) = test_store();
    assert!(store.get_project("../etc/passwd").await.is_err());
    assert!(store.get_project("").await.is_err());
}

#[tokio::test]
async fn commit_run_appends_prompt_and_reply() {
    let (_dir, store) = test_store();
    let project = store
        .create_project("ada", "Timer", "build a timer", &tree("v1"))
        .await
        .unwrap();

    let project = store
        .commit_run(&project.id, "add a reset button", &tree("v2"), "Added reset.", false)
        .await
        .unwrap();
    assert_eq!(project.messages.len(), 3);
    assert_eq!(project.messages[1].contents, "add a reset button");
    assert_eq!(project.messages[2].kind, MessageKind::Assistant);
    assert_eq!(store.current_files(&project.id).await.unwrap(), tree("v2"));

    let history = project.history();
    assert_eq!(history[2].role, Role::Assistant);
    assert_eq!(history[1].content, "add a reset button");
}

#[tokio::test]
async fn initial_commit_adds_only_the_reply() {
    let (_dir, store) = test_store();
    let project = store
        .create_project("ada", "Timer", "build a timer", &tree("starter"))
        .await
        .unwrap();
    let project = store
        .commit_run(&project.id, "build a timer", &tree("v1"), "Here is your timer.", true)
        .await
        .unwrap();
    assert_eq!(project.messages.len(), 2);
    assert_eq!(project.current_files(), tree("v1"));
}

#[tokio::test]
async fn current_files_skip_messages_without_a_snapshot() {
    let (_dir, store) = test_store();
    let mut project = store
        .create_project("ada", "Timer", "build", &tree("v1"))
        .await
        .unwrap();
    project.messages.push(StoredMessage {
        id: "m".into(),
        kind: MessageKind::Assistant,
        contents: "thinking".into(),
        created_at: timestamp(),
        files: None,
    });
    assert_eq!(project.current_files(), tree("v1"));
}

#[tokio::test]
async fn commit_to_missing_project_fails() {
    let (_dir, store) = test_store();
    let err = store
        .commit_run("ghost", "x", &tree("v"), "y", false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no such project"));
}

#[tokio::test]
async fn list_projects_filters_by_owner_newest_first() {
    let (_dir, store) = test_store();
    assert!(store.list_projects("ada").await.unwrap().is_empty());

    let first = store
        .create_project("ada", "First", "a", &tree("1"))
        .await
        .unwrap();
    let second = store
        .create_project("ada", "Second", "b", &tree("2"))
        .await
        .unwrap();
    store
        .create_project("bob", "Other", "c", &tree("3"))
        .await
        .unwrap();

    let listed = store.list_projects("ada").await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);

    // Touching the older project moves it to the front.
    store
        .commit_run(&first.id, "again", &tree("1b"), "ok", false)
        .await
        .unwrap();
    let listed = store.list_projects("ada").await.unwrap();
    assert_eq!(listed[0].id, first.id);
}

#[tokio::test]
async fn rename_and_delete_check_ownership() {
    let (_dir, store) = test_store();
    let project = store
        .create_project("ada", "Old", "a", &tree("1"))
        .await
        .unwrap();

    assert!(store.rename_project(&project.id, "bob", "Stolen").await.is_err());
    let renamed = store.rename_project(&project.id, "ada", "New").await.unwrap();
    assert_eq!(renamed.title, "New");

    assert!(store.delete_project(&project.id, "bob").await.is_err());
    assert!(store.delete_project(&project.id, "ada").await.unwrap());
    assert!(!store.delete_project(&project.id, "ada").await.unwrap());
    assert!(store.get_project(&project.id).await.unwrap().is_none());
}

#[tokio::test]
async fn saves_leave_no_temporary_files() {
    let (_dir, store) = test_store();
    let project = store
        .create_project("ada", "T", "a", &tree("1"))
        .await
        .unwrap();
    store
        .commit_run(&project.id, "b", &tree("2"), "c", false)
        .await
        .unwrap();
    let names: Vec<String> = std::fs::read_dir(store.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec![format!("{}.json", project.id)]);
}

#[test]
fn timestamps_sort_chronologically() {
    let a = timestamp();
    let b = timestamp();
    assert!(a <= b);
    assert!(a.ends_with('Z'));
    assert_eq!(a.len(), "2024-01-01T00:00:00.000000000Z".len());
}
