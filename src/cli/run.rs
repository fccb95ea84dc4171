use eyre::{Result, eyre};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;

use crate::cli::{io, render, specials};
use crate::config::Settings;
use crate::history::Message;
use crate::hub;
use crate::protocol::{Request, write_frame_to_stream};
use crate::store::Store;

use super::connect::obtain_control_stream;

/// CLI entrypoint: hub mode, project commands, or a change request.
pub async fn run() -> Result<()> {
    let mut args = std::env::args();
    let _ = args.next(); // binary name
    let command = args.next().unwrap_or_default();
    let rest: Vec<String> = args.collect();

    if specials::handle_specials_if_needed(&command) {
        return Ok(());
    }

    let settings = Settings::load()?;
    let store = Store::new(settings.projects_dir());

    match command.as_str() {
        "serve" | "run" => hub::run(&settings).await,
        "new" => {
            let prompt = require_prompt(&rest)?;
            let request = Request::Create {
                owner: settings.owner.clone(),
                prompt,
            };
            send_and_render(&settings, &request).await
        }
        "list" => {
            for project in store.list_projects(&settings.owner).await? {
                println!("{}\t{}\t{}", project.id, project.updated_at, project.title);
            }
            Ok(())
        }
        "files" => {
            let id = single(&rest, "files <project-id>")?;
            let files = store.current_files(id).await?;
            for (path, contents) in files.files() {
                println!("{path}\t{}", contents.len());
            }
            Ok(())
        }
        "rename" => {
            let Some((id, title)) = rest.split_first().filter(|(_, t)| !t.is_empty()) else {
                return Err(eyre!("usage: remodel rename <project-id> <title>"));
            };
            let project = store
                .rename_project(id, &settings.owner, &title.join(" "))
                .await?;
            println!("{}\t{}", project.id, project.title);
            Ok(())
        }
        "delete" => {
            let id = single(&rest, "delete <project-id>")?;
            if !store.delete_project(id, &settings.owner).await? {
                return Err(eyre!("no such project: {id}"));
            }
            Ok(())
        }
        "watch" => watch(&settings).await,
        project_id => {
            let prompt = require_prompt(&rest)?;
            let Some(project) = store.get_project(project_id).await? else {
                return Err(eyre!("no such project: {project_id}"));
            };
            let mut messages = project.history();
            messages.push(Message::user(prompt));
            let request = Request::Change {
                project_id: project.id,
                messages,
            };
            send_and_render(&settings, &request).await
        }
    }
}

fn require_prompt(words: &[String]) -> Result<String> {
    io::prompt_from(words)?.ok_or_else(|| eyre!("no prompt given\n\n{}", specials::usage()))
}

fn single<'a>(rest: &'a [String], usage: &str) -> Result<&'a str> {
    match rest {
        [one] => Ok(one.as_str()),
        _ => Err(eyre!("usage: remodel {usage}")),
    }
}

async fn connect_and_send(settings: &Settings, request: &Request) -> Result<UnixStream> {
    let mut stream = obtain_control_stream(settings).await?;
    write_frame_to_stream(&mut stream, request).await?;
    Ok(stream)
}

async fn send_and_render(settings: &Settings, request: &Request) -> Result<()> {
    let stream = connect_and_send(settings, request).await?;
    let mut stdout = tokio::io::stdout();
    let usage = render::render_stream(stream, &mut stdout)
        .await?
        .into_result()?;
    tracing::info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        "cli: run complete"
    );
    Ok(())
}

/// Print a line per project update until the hub goes away.
async fn watch(settings: &Settings) -> Result<()> {
    let request = Request::Subscribe {
        owner: settings.owner.clone(),
    };
    let stream = connect_and_send(settings, &request).await?;
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        let notification: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "cli: skipping undecodable notification");
                continue;
            }
        };
        let project = &notification["project"];
        println!(
            "{}\t{}\t{} messages",
            notification["projectId"].as_str().unwrap_or("?"),
            project["title"].as_str().unwrap_or(""),
            project["messages"].as_array().map_or(0, Vec::len)
        );
    }
    Ok(())
}
