use serde::{Deserialize, Serialize};

use crate::history::Message;
use crate::llm::{LanguageModel, ModelMessage, Request};
use crate::logging::timed;
use crate::prompting;

/// Which model binding drives the agent loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Base,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Base => f.write_str("base"),
            Complexity::Complex => f.write_str("complex"),
        }
    }
}

/// Anything but a clear `complex` is `base`.
pub fn parse_label(text: &str) -> Complexity {
    let word = text
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_ascii_lowercase();
    if word == "complex" {
        Complexity::Complex
    } else {
        Complexity::Base
    }
}

/// Ask `model` whether the request needs the stronger binding.
/// Never fails: any model error degrades to [`Complexity::Base`].
pub async fn classify(
    model: &dyn LanguageModel,
    history: &[Message],
    prompt: &str,
    max_tokens: u32,
) -> Complexity {
    let mut messages: Vec<ModelMessage> = history.iter().map(ModelMessage::from).collect();
    messages.push(ModelMessage::user(prompt));
    let request = Request {
        system: prompting::CLASSIFIER.to_string(),
        messages,
        tools: Vec::new(),
        max_tokens,
    };
    match timed("classify", model.complete(&request)).await {
        Ok(completion) => {
            let complexity = parse_label(&completion.text());
            tracing::info!(%complexity, "engine: complexity check");
            complexity
        }
        Err(e) => {
            tracing::warn!(error = %e, "engine: complexity check failed, falling back to base");
            Complexity::Base
        }
    }
}
