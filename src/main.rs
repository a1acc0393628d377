mod app;
mod cli;
mod config;
mod error;
mod extract;
mod package;
mod paths;
mod provider;
mod session;
mod shell;

use anyhow::Context;
use clap::Parser;
use session::Session;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries generated files; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_path()?;
    let cfg = config::Config::load_optional(&config_path)?;
    tracing::debug!(?config_path, loaded = cfg.is_some(), "resolved config");

    let settings = app::resolve_settings(&args, cfg.as_ref(), std::env::var("GEMINI_API_KEY").ok());
    let mut stdout = std::io::stdout();

    match args.cmd {
        Some(cli::Command::Extract { input }) => {
            let files = extract::extract_files(settings.policy, &read_answer(&input)?);
            let mut session = Session::new();
            session.record(input.display().to_string(), files);
            app::render_files(&mut stdout, session.files())?;
            return save_package(&mut session, &settings, &args.output.out);
        }
        Some(cli::Command::Preview { input }) => {
            let files = extract::extract_files(settings.policy, &read_answer(&input)?);
            app::render_preview(&mut stdout, Some(&files))?;
            return Ok(());
        }
        Some(cli::Command::Shell) => {
            let http = http_client(&settings)?;
            let provider = app::build_provider(&http, &settings)?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let out = args.output.out.clone();
            return shell::run_shell(stdin, &mut stdout, provider.as_ref(), settings, out).await;
        }
        None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: appgen \"a todo list app\" or `appgen shell`");
    }

    let http = http_client(&settings)?;
    let provider = app::build_provider(&http, &settings)?;

    let mut session = Session::new();
    let files = app::generate(&mut session, provider.as_ref(), &settings, &prompt)
        .await
        .context("generation failed")?;
    app::render_files(&mut stdout, Some(files))?;

    save_package(&mut session, &settings, &args.output.out)
}

fn http_client(settings: &app::Settings) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(settings.request_timeout)
        .build()
        .context("failed to build HTTP client")
}

fn read_answer(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read model answer: {}", path.display()))
}

fn save_package(session: &mut Session, settings: &app::Settings, out: &Path) -> anyhow::Result<()> {
    tracing::debug!(prompt = ?session.prompt(), "packaging session files");
    let archive = match app::package(session, settings) {
        Ok(archive) => archive,
        Err(error::AppError::NoFiles) => {
            tracing::warn!("nothing extracted; skipping package");
            return Ok(());
        }
        Err(e) => return Err(e).context("packaging failed"),
    };
    let saved = archive.persist_to(out).context("failed to save archive")?;
    println!("Saved {} ({} files)", saved.display(), archive.entries());
    Ok(())
}
