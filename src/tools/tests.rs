#![cfg(test)]

use super::update_files::{UpdateReport, apply_updates};
use super::*;
use crate::patch::{EditKind, EditOperation};
use crate::stream::{Frame, drain};
use serde_json::json;

fn op(kind: EditKind, filepath: &str, old: &str, new: Option<&str>) -> EditOperation {
    EditOperation {
        kind,
        filepath: filepath.to_string(),
        old_code: old.to_string(),
        new_code: new.map(str::to_string),
    }
}

fn workspace(files: &[(&str, &str)]) -> (Arc<Workspace>, tokio::sync::mpsc::UnboundedReceiver<Frame>) {
    let tree = FileSystemTree::from_files(files.iter().copied()).unwrap();
    let (sink, rx) = Sink::new();
    (Workspace::new(tree, sink, 20), rx)
}

#[test]
fn modification_scenario() {
    let mut tree = FileSystemTree::from_files([("a.txt", "hello world")]).unwrap();
    let report = apply_updates(
        &mut tree,
        &[op(EditKind::Modification, "a.txt", "world", Some("there"))],
    )
    .unwrap();
    assert_eq!(report.results["a.txt"], "hello there");
    assert!(report.errors.is_empty());
    assert_eq!(tree.read("a.txt").unwrap(), "hello there");
}

#[test]
fn addition_to_missing_file_reports_not_found() {
    let mut tree = FileSystemTree::new();
    let report = apply_updates(
        &mut tree,
        &[op(EditKind::Addition, "missing.txt", "x", Some("y"))],
    )
    .unwrap();
    assert!(report.results.is_empty());
    assert!(report.errors["missing.txt"].contains("not found"));
    assert!(tree.is_empty());
}

#[test]
fn one_file_failing_does_not_block_another() {
    let mut tree = FileSystemTree::from_files([("src/App.tsx", "const a = 1;")]).unwrap();
    let report = apply_updates(
        &mut tree,
        &[
            op(EditKind::Modification, "src/Gone.tsx", "x", Some("y")),
            op(EditKind::Modification, "src/App.tsx", "1", Some("2")),
        ],
    )
    .unwrap();
    assert_eq!(report.results["src/App.tsx"], "const a = 2;");
    assert!(report.errors.contains_key("src/Gone.tsx"));
}

#[test]
fn failing_edit_leaves_its_file_untouched() {
    let mut tree = FileSystemTree::from_files([("a.ts", "one\ntwo\n")]).unwrap();
    let report = apply_updates(
        &mut tree,
        &[
            op(EditKind::Modification, "a.ts", "one", Some("uno")),
            op(EditKind::Removal, "a.ts", "three", None),
        ],
    )
    .unwrap();
    assert!(report.results.is_empty());
    let message = &report.errors["a.ts"];
    assert!(message.contains("edit 2"), "{message}");
    assert!(message.contains("removal"), "{message}");
    assert_eq!(tree.read("a.ts").unwrap(), "one\ntwo\n");
}

#[test]
fn edits_to_one_file_see_each_other() {
    let mut tree = FileSystemTree::from_files([("a.ts", "let x = 1;")]).unwrap();
    let report = apply_updates(
        &mut tree,
        &[
            op(EditKind::Modification, "a.ts", "1", Some("2")),
            op(EditKind::Addition, "a.ts", "let x = 2;", Some("let y = x;")),
        ],
    )
    .unwrap();
    assert_eq!(report.results["a.ts"], "let x = 2;\nlet y = x;");
}

#[test]
fn malformed_batch_is_rejected_whole() {
    let mut tree = FileSystemTree::from_files([("a.ts", "abc")]).unwrap();
    let err = apply_updates(
        &mut tree,
        &[
            op(EditKind::Modification, "a.ts", "a", Some("A")),
            op(EditKind::Modification, "a.ts", "b", None),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, ValidationError::Item { index: 1, .. }));
    assert_eq!(tree.read("a.ts").unwrap(), "abc");
}

#[tokio::test]
async fn invoke_rejects_bad_shape() {
    let (ws, _rx) = workspace(&[("a.ts", "abc")]);
    let tools = agent_tools(&ws);
    let out = invoke(&tools, "updateFiles", json!({ "updates": "nope" }))
        .await
        .unwrap();
    assert!(out["error"].as_str().unwrap().starts_with("invalid arguments"));
    assert!(invoke(&tools, "deleteEverything", json!({})).await.is_err());
}

#[tokio::test]
async fn invoke_update_files_reports_json() {
    let (ws, _rx) = workspace(&[("a.txt", "hello world")]);
    let tools = agent_tools(&ws);
    let out = invoke(
        &tools,
        "updateFiles",
        json!({ "updates": [
            { "type": "modification", "filepath": "a.txt", "oldCode": "world", "newCode": "there" },
            { "type": "addition", "filepath": "missing.txt", "oldCode": "x", "newCode": "y" }
        ]}),
    )
    .await
    .unwrap();
    let report: UpdateReport = serde_json::from_value(out).unwrap();
    assert_eq!(report.results["a.txt"], "hello there");
    assert!(report.errors.contains_key("missing.txt"));
    assert_eq!(ws.snapshot().await.read("a.txt").unwrap(), "hello there");
}

#[tokio::test]
async fn list_and_read() {
    let (ws, _rx) = workspace(&[
        ("package.json", "{}"),
        ("src/App.tsx", "app"),
        ("src/main.tsx", "main"),
    ]);
    let tools = agent_tools(&ws);

    let all = invoke(&tools, "listFiles", json!({})).await.unwrap();
    assert_eq!(all, json!(["package.json", "src/App.tsx", "src/main.tsx"]));
    let src = invoke(&tools, "listFiles", json!({ "path": "./src/" }))
        .await
        .unwrap();
    assert_eq!(src, json!(["src/App.tsx", "src/main.tsx"]));

    let read = invoke(
        &tools,
        "readFiles",
        json!({ "paths": ["src/App.tsx", "src", "nope.ts"] }),
    )
    .await
    .unwrap();
    assert_eq!(read["src/App.tsx"], "app");
    assert!(read["src"].as_str().unwrap().contains("not a file"));
    assert!(read["nope.ts"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn empty_tree_lists_nothing() {
    let (ws, _rx) = workspace(&[]);
    let tools = agent_tools(&ws);
    assert_eq!(
        invoke(&tools, "listFiles", json!({})).await.unwrap(),
        json!([])
    );
}

#[tokio::test]
async fn preliminary_response_streams_and_is_remembered() {
    let (ws, mut rx) = workspace(&[]);
    let tools = agent_tools(&ws);
    invoke(
        &tools,
        "preliminaryResponse",
        json!({ "text": "Adding a footer with social links." }),
    )
    .await
    .unwrap();
    let frames = drain(&mut rx);
    assert!(matches!(frames[0], Frame::Start { .. }));
    assert!(frames.iter().all(|f| !f.is_final_stop()));
    assert_eq!(ws.take_remarks(), vec!["Adding a footer with social links."]);
    assert!(ws.take_remarks().is_empty());
}

#[tokio::test]
async fn remarks_survive_a_poisoned_lock() {
    let (ws, _rx) = workspace(&[]);
    ws.emit("First.", Usage::default(), true);
    let poisoner = ws.clone();
    let panicked = std::thread::spawn(move || {
        let _guard = poisoner.remarks.lock().unwrap();
        panic!("poison the remarks lock");
    })
    .join();
    assert!(panicked.is_err());
    assert!(ws.remarks.is_poisoned());

    ws.emit("Second.", Usage::default(), true);
    assert_eq!(ws.take_remarks(), vec!["First.", "Second."]);
}

#[test]
fn definitions_carry_schemas() {
    let (ws, _rx) = workspace(&[]);
    let defs = definitions(&agent_tools(&ws));
    let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        ["listFiles", "preliminaryResponse", "readFiles", "updateFiles"]
    );
    let update = &defs[3].parameters;
    let item = &update["properties"]["updates"]["items"];
    assert_eq!(item["properties"]["type"]["enum"][1], "modification");
    assert_eq!(item["required"], json!(["type", "filepath", "oldCode"]));
}
