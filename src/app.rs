use crate::error::AppError;
use crate::extract::{extract_files, ExtractPolicy, FileSet, PRIMARY_FILE};
use crate::package::{package_project, PackagedArchive};
use crate::provider::{self, GenerationRequest, ModelParameters, Provider};
use crate::session::Session;
use crate::{cli, config};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything an action needs, resolved once from flags, environment and config.
#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    pub provider: String,
    pub policy: ExtractPolicy,
    pub params: ModelParameters,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub build_dir: Option<PathBuf>,
    pub request_timeout: Duration,
}

/// Flags win over the environment, which wins over config.toml.
pub fn resolve_settings(
    args: &cli::Args,
    cfg: Option<&config::Config>,
    env_api_key: Option<String>,
) -> Settings {
    let defaults = ModelParameters::default();

    Settings {
        model: args
            .model
            .clone()
            .or_else(|| cfg.and_then(|c| c.model.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        provider: args
            .provider
            .clone()
            .or_else(|| cfg.and_then(|c| c.provider.clone()))
            .unwrap_or_else(|| "google".to_string()),
        policy: args
            .output
            .policy
            .or_else(|| cfg.and_then(|c| c.policy))
            .unwrap_or_default(),
        params: ModelParameters {
            temperature: cfg
                .and_then(|c| c.generation.temperature)
                .unwrap_or(defaults.temperature),
            max_output_tokens: cfg
                .and_then(|c| c.generation.max_output_tokens)
                .unwrap_or(defaults.max_output_tokens),
            safety: cfg
                .map(|c| c.generation.safety.clone())
                .unwrap_or(defaults.safety),
        },
        api_key: env_api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| cfg.and_then(|c| c.google.api_key.clone())),
        api_base: cfg.and_then(|c| c.google.api_base.clone()),
        build_dir: cfg.and_then(|c| c.build_dir.clone()),
        request_timeout: cfg
            .and_then(|c| c.request_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT),
    }
}

pub fn build_provider(
    http: &reqwest::Client,
    settings: &Settings,
) -> Result<Box<dyn Provider + Send + Sync>, AppError> {
    match settings.provider.as_str() {
        "google" => {
            #[cfg(feature = "google")]
            {
                let Some(key) = settings.api_key.clone() else {
                    return Err(AppError::MissingCredential);
                };
                let p = match &settings.api_base {
                    Some(base) => provider::google::GoogleProvider::with_api_base(http.clone(), key, base)?,
                    None => provider::google::GoogleProvider::new(http.clone(), key)?,
                };
                Ok(Box::new(p))
            }
            #[cfg(not(feature = "google"))]
            {
                let _ = http;
                Err(AppError::UnknownProvider(
                    "google (not enabled in this build)".to_string(),
                ))
            }
        }
        "stub" => Ok(Box::new(provider::stub::StubProvider::new())),
        other => Err(AppError::UnknownProvider(other.to_string())),
    }
}

/// Prompt -> request -> extract -> session. The session is untouched on failure.
pub async fn generate<'s>(
    session: &'s mut Session,
    provider: &dyn Provider,
    settings: &Settings,
    prompt: &str,
) -> Result<&'s FileSet, AppError> {
    if prompt.trim().is_empty() {
        return Err(AppError::EmptyPrompt);
    }

    let req = GenerationRequest {
        model: settings.model.clone(),
        prompt: prompt.to_string(),
        params: settings.params.clone(),
    };
    let resp = provider::request_generation(provider, req).await?;
    let files = extract_files(settings.policy, &resp.raw_text);
    if files.is_blank() {
        tracing::warn!(policy = ?settings.policy, "no files found in the answer");
    }

    Ok(session.record(prompt.to_string(), files))
}

/// Package the session's files, replacing any earlier archive.
///
/// A blank file set counts as no files.
pub fn package<'s>(
    session: &'s mut Session,
    settings: &Settings,
) -> Result<&'s PackagedArchive, AppError> {
    let files = session
        .files()
        .filter(|f| !f.is_blank())
        .ok_or(AppError::NoFiles)?;
    let archive = package_project(files, settings.build_dir.as_deref())?;
    Ok(session.set_archive(archive))
}

pub fn render_files(out: &mut dyn Write, files: Option<&FileSet>) -> std::io::Result<()> {
    let Some(files) = files.filter(|f| !f.is_blank()) else {
        writeln!(out, "{}", AppError::NoFiles)?;
        return Ok(());
    };

    for (name, contents) in files.iter() {
        writeln!(out, "==> {name} <==")?;
        if contents.is_empty() {
            writeln!(out, "(empty)")?;
        } else {
            writeln!(out, "{}", contents.trim_end_matches('\n'))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Static rendering of the primary file. Generated code is never run.
pub fn render_preview(out: &mut dyn Write, files: Option<&FileSet>) -> std::io::Result<()> {
    let Some(files) = files.filter(|f| !f.primary().trim().is_empty()) else {
        writeln!(out, "No app generated yet.")?;
        return Ok(());
    };

    writeln!(out, "{PRIMARY_FILE} (preview only, not executed)")?;
    let lines: Vec<&str> = files.primary().lines().collect();
    let width = lines.len().to_string().len();
    for (i, line) in lines.iter().enumerate() {
        writeln!(out, "{:>width$} | {line}", i + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(provider: &str) -> Settings {
        let args = Args::parse_from(["appgen", "--provider", provider]);
        resolve_settings(&args, None, None)
    }

    fn render(f: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn flags_beat_env_beat_config() {
        let cfg: config::Config = toml::from_str(
            r#"
model = "from-config"
policy = "markers"
[google]
api_key = "config-key"
"#,
        )
        .unwrap();

        let args = Args::parse_from(["appgen", "-m", "from-flag", "hi"]);
        let s = resolve_settings(&args, Some(&cfg), Some("env-key".to_string()));
        assert_eq!(s.model, "from-flag");
        assert_eq!(s.policy, ExtractPolicy::Markers);
        assert_eq!(s.api_key.as_deref(), Some("env-key"));

        let s = resolve_settings(&args, Some(&cfg), Some("  ".to_string()));
        assert_eq!(s.api_key.as_deref(), Some("config-key"));
    }

    #[test]
    fn defaults_without_config() {
        let s = resolve_settings(&Args::parse_from(["appgen"]), None, None);
        assert_eq!(s.model, DEFAULT_MODEL);
        assert_eq!(s.provider, "google");
        assert_eq!(s.policy, ExtractPolicy::WholeText);
        assert_eq!(s.params, ModelParameters::default());
        assert_eq!(s.request_timeout, DEFAULT_TIMEOUT);
        assert!(s.api_key.is_none());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let Err(err) = build_provider(&reqwest::Client::new(), &settings_for("openai")) else {
            panic!("expected an unknown provider error");
        };
        assert!(matches!(err, AppError::UnknownProvider(ref p) if p == "openai"));
    }

    #[tokio::test]
    async fn missing_credential_blocks_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut settings = settings_for("google");
        settings.api_base = Some(server.uri());
        let Err(err) = build_provider(&reqwest::Client::new(), &settings) else {
            panic!("expected a missing credential error");
        };
        assert!(matches!(err, AppError::MissingCredential));
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let mut session = Session::new();
        let settings = settings_for("stub");
        let provider = build_provider(&reqwest::Client::new(), &settings).unwrap();
        let err = generate(&mut session, provider.as_ref(), &settings, "  \n")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyPrompt));
        assert!(session.files().is_none());
    }

    #[tokio::test]
    async fn generate_then_package_with_gemini() {
        let server = MockServer::start().await;
        let event = json!({"candidates": [{"content": {"parts": [{"text": "hello world"}]}}]});
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:streamGenerateContent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(format!("data: {event}\n\n"), "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let mut settings = settings_for("google");
        settings.api_key = Some("k".to_string());
        settings.api_base = Some(server.uri());
        settings.build_dir = Some(scratch.path().to_path_buf());
        let provider = build_provider(&reqwest::Client::new(), &settings).unwrap();

        let mut session = Session::new();
        let files = generate(&mut session, provider.as_ref(), &settings, "say hello")
            .await
            .unwrap();
        assert_eq!(files.primary(), "hello world");

        let archive = package(&mut session, &settings).unwrap();
        assert_eq!(archive.entries(), 4);
        assert!(archive.path().is_file());
    }

    #[tokio::test]
    async fn provider_failure_leaves_session_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let mut settings = settings_for("google");
        settings.api_key = Some("k".to_string());
        settings.api_base = Some(server.uri());
        let provider = build_provider(&reqwest::Client::new(), &settings).unwrap();

        let mut session = Session::new();
        session.record("old".to_string(), FileSet::new("old = True"));
        let err = generate(&mut session, provider.as_ref(), &settings, "new")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Provider(_)));
        assert_eq!(session.prompt(), Some("old"));
        assert_eq!(session.files().unwrap().primary(), "old = True");
    }

    #[test]
    fn package_without_files_is_no_files() {
        let mut session = Session::new();
        let err = package(&mut session, &settings_for("stub")).unwrap_err();
        assert!(matches!(err, AppError::NoFiles));
    }

    #[test]
    fn blank_extraction_is_not_packaged() {
        let scratch = tempfile::tempdir().unwrap();
        let mut settings = settings_for("stub");
        settings.build_dir = Some(scratch.path().to_path_buf());

        let mut session = Session::new();
        session.record("p".to_string(), extract_files(ExtractPolicy::Markers, "sorry"));
        let err = package(&mut session, &settings).unwrap_err();

        assert!(matches!(err, AppError::NoFiles));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn render_files_lists_each_file() {
        let files = extract_files(
            ExtractPolicy::Markers,
            "app.py\n```\nprint(1)\n```\nrequirements.txt\n```\nstreamlit\n```",
        );
        let text = render(|out| render_files(out, Some(&files)));
        assert_eq!(
            text,
            "==> README.md <==\n(empty)\n\n==> app.py <==\nprint(1)\n\n==> requirements.txt <==\nstreamlit\n\n"
        );
    }

    #[test]
    fn render_files_reports_no_files_yet() {
        assert_eq!(
            render(|out| render_files(out, None)),
            "No files yet. Generate an app first.\n"
        );
        let blank = extract_files(ExtractPolicy::Markers, "sorry");
        assert_eq!(
            render(|out| render_files(out, Some(&blank))),
            "No files yet. Generate an app first.\n"
        );
    }

    #[test]
    fn preview_is_numbered_text() {
        let files = FileSet::new("import streamlit as st\nst.title('x')\n");
        assert_eq!(
            render(|out| render_preview(out, Some(&files))),
            "app.py (preview only, not executed)\n1 | import streamlit as st\n2 | st.title('x')\n"
        );
        assert_eq!(render(|out| render_preview(out, None)), "No app generated yet.\n");
    }
}
