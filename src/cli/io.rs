use eyre::eyre;
use std::io::Read;

fn stdin_is_tty() -> bool {
    atty::is(atty::Stream::Stdin)
}

/// If stdin is not a TTY, read it fully as a single UTF-8 string.
/// Returns `None` when stdin is a TTY or when the input is empty/whitespace.
pub fn read_whole_stdin() -> eyre::Result<Option<String>> {
    if stdin_is_tty() {
        return Ok(None);
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| eyre!(e))?;
    Ok(non_blank(buf))
}

fn non_blank(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Prompt from positional words, else from piped stdin.
pub fn prompt_from(words: &[String]) -> eyre::Result<Option<String>> {
    match non_blank(words.join(" ")) {
        Some(prompt) => Ok(Some(prompt)),
        None => Ok(read_whole_stdin()?.map(|s| s.trim().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_make_the_prompt() {
        let words = vec!["make".to_string(), "it".to_string(), "blue".to_string()];
        assert_eq!(prompt_from(&words).unwrap().as_deref(), Some("make it blue"));
    }

    #[test]
    fn blank_text_is_no_prompt() {
        assert_eq!(non_blank(" \n\t".to_string()), None);
        assert_eq!(non_blank("x".to_string()).as_deref(), Some("x"));
    }
}
