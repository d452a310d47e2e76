// Member Portal: membership application intake
// Main library entry point

pub mod auth;
pub mod client;
pub mod config;
pub mod hooks;
pub mod models;
pub mod security;
pub mod store;
pub mod tui;
pub mod utils;
pub mod widgets;
pub mod wizard;

use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{application_guard, GuardDecision, Session};
use crate::client::{HttpBackend, InMemoryBackend};
use crate::config::PortalConfig;
use crate::models::section::SectionId;
use crate::security::TokenStore;
use crate::store::DraftStore;
use crate::wizard::{sample, StepError, StepOutcome, WizardController};

/// Initialize logging system with dual format (JSON + human-readable)
fn init_logging(with_stdout: bool, level: log::LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = utils::path_resolver::resolve_log_folder()?;
    std::fs::create_dir_all(&log_dir)?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");
    let json_log_file = log_dir.join(format!("member-portal-{}.log", timestamp));
    let txt_log_file = log_dir.join(format!("member-portal-{}.txt", timestamp));

    // stdout stays off while the TUI owns the terminal.
    let mut dispatch = fern::Dispatch::new().level(level);

    if with_stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                        None,
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", txt_line));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

/// Config is loaded before logging so its level applies; problems are
/// reported after logging is up.
fn load_config_and_logging(with_stdout: bool) -> Option<PortalConfig> {
    let loaded = PortalConfig::load();
    let level = loaded
        .as_ref()
        .map(|c| c.log_level_filter())
        .unwrap_or(log::LevelFilter::Debug);
    if let Err(e) = init_logging(with_stdout, level) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    match loaded {
        Ok(cfg) => {
            info!(
                "[PHASE: initialization] [STEP: config] API base {} (timeout {}s, max {} files)",
                cfg.api_base_url, cfg.request_timeout_secs, cfg.upload.max_files
            );
            Some(cfg)
        }
        Err(e) => {
            error!("[PHASE: initialization] [STEP: config] {}", e);
            eprintln!("Configuration error: {}", e);
            None
        }
    }
}

fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create async runtime: {}", e))
}

fn token_store() -> anyhow::Result<TokenStore> {
    let data_dir = utils::path_resolver::resolve_data_folder()?;
    Ok(TokenStore::new(&data_dir))
}

/// Interactive wizard against the configured portal backend.
///
/// Requires a stored session token that passes the application guard.
pub fn run_tui() {
    let Some(cfg) = load_config_and_logging(false) else {
        std::process::exit(2);
    };
    info!(
        "[PHASE: initialization] Member portal TUI starting at {}",
        chrono::Utc::now()
    );

    if let Err(e) = tui_session(&cfg) {
        error!("[PHASE: tui] [STEP: fatal] TUI exited with error: {:?}", e);
        eprintln!("Member portal error: {}", e);
        std::process::exit(1);
    }
}

fn tui_session(cfg: &PortalConfig) -> anyhow::Result<()> {
    let rt = build_runtime()?;
    let tokens = token_store()?;
    let token = rt.block_on(tokens.load())?;
    let session = match token.as_deref().map(Session::from_token) {
        Some(Ok(s)) => Some(s),
        Some(Err(e)) => {
            warn!("[PHASE: auth] [STEP: session] Stored token rejected: {}", e);
            None
        }
        None => None,
    };

    match application_guard(session.as_ref()) {
        GuardDecision::Allow => {}
        GuardDecision::Redirect(route) => {
            info!("[PHASE: auth] [STEP: guard] Redirect to {:?}", route);
            anyhow::bail!(
                "The application wizard is not available for this session ({:?}). Sign in with --token <jwt>.",
                route
            );
        }
        GuardDecision::AccessDenied { module } => {
            anyhow::bail!("Access denied to {}", module);
        }
    }
    let token = token.unwrap_or_default();

    let backend = HttpBackend::new(&cfg.api_base_url, token, cfg.request_timeout())?;
    let store = Arc::new(DraftStore::new(Arc::new(backend)));
    let mut wizard = WizardController::new(store.clone(), cfg.to_upload_config());
    tui::start_wizard(&rt, &mut wizard)?;

    let result = tui::run(&rt, wizard);
    rt.block_on(store.unmount());
    result
}

/// Non-interactive TUI smoke mode (for automated checks).
/// Renders a single frame and exits.
pub fn run_tui_smoke(target: Option<String>) {
    load_config_and_logging(false);
    info!(
        "[PHASE: initialization] TUI smoke starting at {}",
        chrono::Utc::now()
    );

    let target = target.as_deref().unwrap_or("1");
    match tui::smoke(target) {
        Ok(screen) => {
            info!(
                "[PHASE: tui] [STEP: smoke] Rendered {} lines for target={}",
                screen.lines().count(),
                target
            );
        }
        Err(e) => {
            error!(
                "[PHASE: tui] [STEP: smoke] TUI smoke exited with error: {:?}",
                e
            );
            eprintln!("Member portal error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Deterministic end-to-end intake run against the in-memory backend.
/// Writes `intake_smoke_transcript.log` under the log folder and exits 0/1.
pub fn run_intake_smoke() {
    let cfg = load_config_and_logging(true).unwrap_or_default();
    info!(
        "[PHASE: initialization] Intake smoke starting at {}",
        chrono::Utc::now()
    );

    let log_dir = match utils::path_resolver::resolve_log_folder() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to resolve log folder: {}", e);
            std::process::exit(1);
        }
    };
    let work_dir = std::env::temp_dir().join(format!("member-portal-intake-{}", Uuid::new_v4()));

    let result = build_runtime().and_then(|rt| {
        std::fs::create_dir_all(&work_dir)?;
        rt.block_on(intake_smoke(&cfg, &work_dir))
    });
    if let Err(e) = std::fs::remove_dir_all(&work_dir) {
        warn!("[PHASE: intake] [STEP: cleanup] Could not remove {:?}: {}", work_dir, e);
    }

    let (lines, ok) = match result {
        Ok(lines) => (lines, true),
        Err(e) => (vec![format!("FAILED: {:#}", e)], false),
    };
    let transcript_path = log_dir.join("intake_smoke_transcript.log");
    if let Err(e) = std::fs::write(&transcript_path, lines.join("\n") + "\n") {
        error!("[PHASE: intake] [STEP: transcript] Could not write transcript: {}", e);
    }
    for line in &lines {
        println!("{}", line);
    }

    if !ok {
        error!("[PHASE: intake] [STEP: smoke] Intake smoke failed");
        std::process::exit(1);
    }
    info!(
        "[PHASE: intake] [STEP: smoke] Transcript written to {:?}",
        transcript_path
    );
}

async fn intake_smoke(cfg: &PortalConfig, files: &Path) -> anyhow::Result<Vec<String>> {
    let mut transcript = Vec::new();
    let backend = Arc::new(InMemoryBackend::new());
    let store = Arc::new(DraftStore::new(backend.clone()));
    let mut wizard = WizardController::new(store.clone(), cfg.to_upload_config());

    let step = wizard.start().await?;
    transcript.push(format!(
        "start: {:?} membership, step {}/{}",
        wizard.membership_type(),
        step,
        wizard.total_steps()
    ));

    match wizard.save_and_next().await {
        Err(StepError::Validation(errors)) => transcript.push(format!(
            "empty step rejected locally: {} field error(s), {} request(s) sent",
            errors.len(),
            backend.submit_calls()
        )),
        other => anyhow::bail!("expected validation errors on an empty step, got {:?}", other),
    }

    sample::fill_section(&mut wizard, SectionId::CompanyDetails, files).await?;
    backend.fail_next_submits(1, "Service temporarily unavailable");
    match wizard.save_and_next().await {
        Err(StepError::Save(msg)) if wizard.current_step() == 1 => {
            transcript.push(format!("save failure kept step 1: {}", msg))
        }
        other => anyhow::bail!("expected a save failure on step 1, got {:?}", other),
    }

    while !wizard.is_completed() {
        let id = wizard
            .current_section()
            .ok_or_else(|| anyhow::anyhow!("no section for step {}", wizard.current_step()))?;
        if wizard.current_step() > 1 {
            sample::fill_section(&mut wizard, id, files).await?;
        }
        let outcome = wizard.save_and_next().await?;
        let docs = wizard
            .hook(id)
            .map(|h| h.data().document_slots().len())
            .unwrap_or(0);
        transcript.push(format!(
            "{}: saved ({} attachment slot(s)) -> {}",
            id,
            docs,
            match outcome {
                StepOutcome::Advanced(n) => format!("step {}", n),
                StepOutcome::Completed => "completed".to_string(),
            }
        ));
    }

    transcript.push(format!(
        "backend: {} submit(s), {} upload(s), {} document(s) stored",
        backend.submit_calls(),
        backend.upload_calls(),
        backend.document_count()
    ));

    // A second mount must see the saved draft.
    store.unmount().await;
    let reloaded = Arc::new(DraftStore::new(backend.clone()));
    let draft = reloaded.load_draft().await?;
    let saved = SectionId::ALL
        .iter()
        .filter(|id| draft.section(**id).is_some())
        .count();
    if saved != draft.total_steps() {
        anyhow::bail!(
            "reload lost data: {} of {} sections",
            saved,
            draft.total_steps()
        );
    }
    transcript.push(format!(
        "reload: {} of {} sections present",
        saved,
        draft.total_steps()
    ));

    let status = reloaded.track_status().await?;
    transcript.push(format!("track status: {:?}", status.application.status));
    transcript.push("RESULT: PASS".to_string());
    Ok(transcript)
}

/// Store a portal session token (encrypted at rest) for later runs.
pub fn run_store_token(token: &str) {
    load_config_and_logging(true);
    let result = Session::from_token(token)
        .map_err(anyhow::Error::from)
        .and_then(|session| {
            let rt = build_runtime()?;
            rt.block_on(token_store()?.save(token))?;
            Ok(session)
        });
    match result {
        Ok(session) => {
            println!(
                "Signed in as {} ({:?}) until {}",
                session
                    .email
                    .as_deref()
                    .map(utils::logging::mask_email)
                    .unwrap_or_else(|| session.user_id.clone()),
                session.role,
                session.expires_at
            );
        }
        Err(e) => {
            error!("[PHASE: auth] [STEP: token_store] {}", e);
            eprintln!("Could not store token: {}", e);
            std::process::exit(1);
        }
    }
}

/// Forget the stored session token.
pub fn run_logout() {
    load_config_and_logging(true);
    let result = build_runtime().and_then(|rt| rt.block_on(token_store()?.clear()));
    match result {
        Ok(true) => println!("Signed out."),
        Ok(false) => println!("No stored session."),
        Err(e) => {
            eprintln!("Could not clear the session: {}", e);
            std::process::exit(1);
        }
    }
}

/// Write a default config file to the resolved config path.
pub fn run_init_config() {
    let Some(path) = utils::path_resolver::resolve_config_path() else {
        eprintln!("No configuration directory available; set MEMBER_PORTAL_CONFIG.");
        std::process::exit(1);
    };
    match PortalConfig::write_default(&path) {
        Ok(()) => println!("Wrote {}", display_path(&path)),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn display_path(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| PathBuf::from(path))
        .display()
        .to_string()
}
