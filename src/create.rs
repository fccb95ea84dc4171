//! Initial generation of a new project.
//!
//! A project starts from the starter tree. Its entry file is planned from the
//! project prompt and rewritten with the plan-then-apply path; the result
//! becomes the project's first assistant version.
use eyre::Result;

use crate::engine::Engine;
use crate::history;
use crate::llm::{LanguageModel, ModelMessage, Request};
use crate::logging::timed;
use crate::plan::{self, Formatter, UpdatePlan};
use crate::prompting;
use crate::store::{Project, Store};
use crate::stream::{Sink, Usage};
use crate::tree::{ENTRY_FILE, starter};

const TITLE_MAX_TOKENS: u32 = 30;
const TITLE_MAX_WORDS: usize = 4;

pub struct NewProject<'a> {
    pub owner: &'a str,
    pub prompt: &'a str,
}

/// Create the project and run its initial generation, streaming progress into `sink`.
///
/// The project record exists as soon as its title is known. When generation
/// fails it keeps the starter files and the stream ends with an error frame.
pub async fn create(
    engine: &Engine,
    store: &Store,
    formatter: &Formatter,
    request: NewProject<'_>,
    sink: &Sink,
) -> Result<Project> {
    match generate(engine, store, formatter, request, sink).await {
        Ok(project) => Ok(project),
        Err(e) => {
            tracing::error!(error = %e, "create: initial generation failed");
            sink.fail(&e.to_string());
            Err(e)
        }
    }
}

async fn generate(
    engine: &Engine,
    store: &Store,
    formatter: &Formatter,
    request: NewProject<'_>,
    sink: &Sink,
) -> Result<Project> {
    let NewProject { owner, prompt } = request;
    let model = engine.base_model().as_ref();
    let chunk_chars = engine.config().chunk_chars;
    let max_tokens = engine.config().agent_max_tokens;

    let title = title(model, prompt).await;
    let mut files = starter();
    let project = store.create_project(owner, &title, prompt, &files).await?;
    tracing::info!(project_id = %project.id, %title, "create: project started");
    sink.emit_turn(
        &format!("Creating \"{title}\" as project {}.", project.id),
        chunk_chars,
        Usage::default(),
        true,
    );

    let entry = files.read(ENTRY_FILE)?.to_string();
    let update_plan = plan::plan(model, prompt, ENTRY_FILE, &entry, max_tokens).await?;
    let outline = outline(&update_plan);
    sink.emit_turn(&outline, chunk_chars, Usage::default(), true);

    let results = plan::execute(model, formatter, &mut files, &[update_plan], max_tokens).await;
    let failed = results.values().filter(|r| !r.success).count();
    if failed > 0 {
        tracing::warn!(project_id = %project.id, failed, "create: some planned files were not updated");
    }

    let report = serde_json::to_value(&results)?;
    let (overview, usage) = timed("concluding", engine.conclude(&[report])).await?;
    let commentary = history::join_commentary(&[outline, overview.clone()]);
    let project = store
        .commit_run(&project.id, prompt, &files, &commentary, true)
        .await?;
    sink.emit_turn(&overview, chunk_chars, usage, false);
    Ok(project)
}

/// Short title for the project; falls back to the prompt's first words.
pub async fn title(model: &dyn LanguageModel, prompt: &str) -> String {
    let request = Request {
        system: prompting::TITLE.to_string(),
        messages: vec![ModelMessage::user(prompting::fill(
            prompting::TITLE_REQUEST,
            &[("prompt", prompt)],
        ))],
        tools: Vec::new(),
        max_tokens: TITLE_MAX_TOKENS,
    };
    match timed("title", model.complete(&request)).await {
        Ok(completion) => match clean_title(&completion.text()) {
            Some(title) => title,
            None => fallback_title(prompt),
        },
        Err(e) => {
            tracing::warn!(error = %e, "create: title generation failed, using prompt");
            fallback_title(prompt)
        }
    }
}

fn clean_title(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_start_matches("Title:")
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '#' || c.is_whitespace());
    (!line.is_empty()).then(|| line.to_string())
}

pub fn fallback_title(prompt: &str) -> String {
    let words: Vec<&str> = prompt.split_whitespace().take(TITLE_MAX_WORDS).collect();
    if words.is_empty() {
        return "Untitled Project".to_string();
    }
    words.join(" ")
}

fn outline(plan: &UpdatePlan) -> String {
    let mut out = format!("Planned {} updates to {}:", plan.updates.len(), plan.file_path);
    for update in &plan.updates {
        out.push_str(&format!("\n- {} ({})", update.context.trim(), update.kind));
    }
    out
}
