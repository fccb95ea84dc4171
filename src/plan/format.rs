//! Canonical formatting of regenerated source files.
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formatter {
    /// Line endings, trailing whitespace and a single final newline.
    Builtin,
    /// External program: argv with `{path}` substituted, source on stdin, result on stdout.
    Command(Vec<String>),
}

#[derive(Debug)]
pub enum FormatError {
    Spawn { program: String, source: std::io::Error },
    Failed { code: Option<i32>, stderr: String },
    Empty,
    Io(std::io::Error),
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::Spawn { program, source } => {
                write!(f, "could not start formatter `{program}`: {source}")
            }
            FormatError::Failed { code, stderr } => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                write!(f, "formatter exited with {code}: {}", stderr.trim())
            }
            FormatError::Empty => write!(f, "formatter produced no output"),
            FormatError::Io(e) => write!(f, "formatter io error: {e}"),
        }
    }
}

impl std::error::Error for FormatError {}

impl From<std::io::Error> for FormatError {
    fn from(e: std::io::Error) -> Self {
        FormatError::Io(e)
    }
}

impl Formatter {
    /// Empty argv means the built-in normalizer.
    pub fn from_argv(argv: Vec<String>) -> Self {
        if argv.is_empty() {
            Formatter::Builtin
        } else {
            Formatter::Command(argv)
        }
    }

    pub async fn format(&self, path: &str, source: &str) -> Result<String, FormatError> {
        let formatted = match self {
            Formatter::Builtin => normalize(source),
            Formatter::Command(argv) => run(argv, path, source).await?,
        };
        if formatted.trim().is_empty() {
            return Err(FormatError::Empty);
        }
        Ok(formatted)
    }
}

/// Unix line endings, no trailing whitespace, exactly one trailing newline.
pub fn normalize(source: &str) -> String {
    let unix = source.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unix.len() + 1);
    for line in unix.lines() {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    let trimmed = out.trim_end_matches('\n').len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

async fn run(argv: &[String], path: &str, source: &str) -> Result<String, FormatError> {
    let Some((program, args)) = argv.split_first() else {
        return Ok(normalize(source));
    };
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args.iter().map(|a| a.replace("{path}", path)))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| FormatError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let feed = async {
        if let Some(mut stdin) = stdin_pipe {
            stdin.write_all(source.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        Ok::<(), std::io::Error>(())
    };
    let read_out = async {
        let mut out = Vec::new();
        if let Some(mut s) = stdout_pipe {
            s.read_to_end(&mut out).await?;
        }
        Ok::<Vec<u8>, std::io::Error>(out)
    };
    let read_err = async {
        let mut out = Vec::new();
        if let Some(mut s) = stderr_pipe {
            s.read_to_end(&mut out).await?;
        }
        Ok::<Vec<u8>, std::io::Error>(out)
    };
    let (fed, stdout, stderr) = tokio::join!(feed, read_out, read_err);
    let status = child.wait().await?;
    let stderr = String::from_utf8_lossy(&stderr?).to_string();
    if !status.success() {
        return Err(FormatError::Failed {
            code: status.code(),
            stderr,
        });
    }
    // A formatter may close stdin early once it has read enough.
    if let Err(e) = fed {
        tracing::debug!(error = %e, "plan: formatter stdin closed early");
    }
    Ok(String::from_utf8_lossy(&stdout?).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_cleans_whitespace() {
        assert_eq!(normalize("a  \r\nb\t\n\n\n"), "a\nb\n");
        assert_eq!(normalize("x"), "x\n");
    }

    #[tokio::test]
    async fn builtin_rejects_blank_output() {
        let f = Formatter::from_argv(Vec::new());
        assert_eq!(f, Formatter::Builtin);
        assert!(matches!(f.format("a.ts", " \n").await, Err(FormatError::Empty)));
        assert_eq!(f.format("a.ts", "let a = 1;  ").await.unwrap(), "let a = 1;\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_pipes_source_through() {
        let f = Formatter::from_argv(vec!["cat".into()]);
        assert_eq!(f.format("a.ts", "const a = 1;\n").await.unwrap(), "const a = 1;\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_failure_is_reported() {
        let f = Formatter::from_argv(vec!["sh".into(), "-c".into(), "echo bad {path} >&2; exit 3".into()]);
        match f.format("src/App.tsx", "x").await {
            Err(FormatError::Failed { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("bad src/App.tsx"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let f = Formatter::from_argv(vec!["definitely-not-a-formatter-xyz".into()]);
        assert!(matches!(
            f.format("a.ts", "x").await,
            Err(FormatError::Spawn { .. })
        ));
    }
}
