use crate::app::{self, Settings};
use crate::error::AppError;
use crate::extract::ExtractPolicy;
use crate::provider::Provider;
use crate::session::Session;
use clap::ValueEnum;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const HELP: &str = "Type a description of the app and press Enter.\n\
Commands: /files, /package [PATH], /preview, /model <name>, /policy <whole-text|markers>, /clear, /quit";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Generate(String),
    Files,
    Package(Option<PathBuf>),
    Preview,
    Model(String),
    Policy(ExtractPolicy),
    Clear,
    Quit,
    Help,
    Invalid(String),
}

fn parse_line(line: &str) -> Option<Action> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(cmd) = line.strip_prefix('/') else {
        return Some(Action::Generate(line.to_string()));
    };

    let (name, rest) = cmd.split_once(' ').unwrap_or((cmd, ""));
    let rest = rest.trim();
    let action = match name {
        "files" => Action::Files,
        "package" if rest.is_empty() => Action::Package(None),
        "package" => Action::Package(Some(PathBuf::from(rest))),
        "preview" => Action::Preview,
        "model" if !rest.is_empty() => Action::Model(rest.to_string()),
        "policy" => match ExtractPolicy::from_str(rest, true) {
            Ok(p) => Action::Policy(p),
            Err(_) => Action::Invalid(format!("unknown policy: {rest:?}")),
        },
        "clear" => Action::Clear,
        "quit" | "exit" => Action::Quit,
        "help" => Action::Help,
        _ => Action::Invalid(format!("unknown command: /{cmd}")),
    };
    Some(action)
}

/// Read lines from `input` until EOF or /quit. Errors are reported and the loop goes on.
pub async fn run_shell<R>(
    input: R,
    out: &mut dyn Write,
    provider: &dyn Provider,
    mut settings: Settings,
    default_out: PathBuf,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut session = Session::new();
    let mut lines = input.lines();

    writeln!(out, "{HELP}")?;
    prompt(out, &settings)?;

    while let Some(line) = lines.next_line().await? {
        let Some(action) = parse_line(&line) else {
            prompt(out, &settings)?;
            continue;
        };

        match action {
            Action::Quit => break,
            Action::Help => writeln!(out, "{HELP}")?,
            Action::Invalid(msg) => writeln!(out, "{msg}")?,
            Action::Clear => {
                session.clear();
                writeln!(out, "session cleared")?;
            }
            Action::Model(model) => {
                settings.model = model;
                writeln!(out, "model set to: {}", settings.model)?;
            }
            Action::Policy(policy) => {
                settings.policy = policy;
                writeln!(out, "policy set to: {policy:?}")?;
            }
            Action::Files => app::render_files(out, session.files())?,
            Action::Preview => app::render_preview(out, session.files())?,
            Action::Generate(text) => {
                writeln!(out, "Generating with {}...", settings.model)?;
                match app::generate(&mut session, provider, &settings, &text).await {
                    Ok(files) if files.is_blank() => writeln!(out, "{}", AppError::NoFiles)?,
                    Ok(files) => writeln!(out, "Code generated! ({} files, see /files)", files.len())?,
                    Err(e) => report(out, &e)?,
                }
            }
            Action::Package(dest) => {
                let dest = dest.unwrap_or_else(|| default_out.clone());
                let saved = app::package(&mut session, &settings).and_then(|archive| {
                    let path = archive.persist_to(&dest)?;
                    Ok((path, archive.entries()))
                });
                match saved {
                    Ok((path, entries)) => writeln!(out, "Saved {} ({entries} files)", path.display())?,
                    Err(e) => report(out, &e)?,
                }
            }
        }
        prompt(out, &settings)?;
    }

    Ok(())
}

fn prompt(out: &mut dyn Write, settings: &Settings) -> std::io::Result<()> {
    write!(out, "[{}] > ", settings.model)?;
    out.flush()
}

fn report(out: &mut dyn Write, err: &AppError) -> std::io::Result<()> {
    tracing::debug!(error = ?err, "action failed");
    writeln!(out, "error: {err}")
}
