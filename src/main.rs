//! # psyportal - patient client for the clinic backend
//!
//! Logs in with an access code, lists tasks and messages, and runs the
//! dual-channel notification watcher (push when available, polling always).
//!
//! Usage:
//!   psyportal init                      # Write a default config file
//!   psyportal login ABC123              # Validate access code, start a session
//!   psyportal watch                     # Run notification watcher until Ctrl-C
//!   psyportal notifications allow       # Grant notification permission
//!   psyportal assignments               # Pending questionnaires
//!   psyportal answer 12                 # Fill in and submit questionnaire 12
//!   psyportal messages                  # Chat history
//!   psyportal send "Hola"               # Message your therapist
//!   psyportal logout                    # End session, forget known items

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use psyportal_api::HttpBackend;
use psyportal_core::traits::{AlertSink, Backend, KnownSetStore, PermissionStore};
use psyportal_core::types::{
    Answer, CompletionStatus, PermissionState, Question, QuestionKind, has_unread,
};
use psyportal_core::{PortalConfig, Session, SessionStore};
use psyportal_notify::{
    ChannelInitializer, FileKnownStore, FilePermissionStore, ForegroundHandler, InitOutcome,
    LogAlerts, Poller, RelayPushProvider, notifier_from_config, spawn_heartbeat, spawn_poller,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "psyportal",
    version,
    about = "🧠 psyportal — patient client for the clinic"
)]
struct Cli {
    /// Config file path [default: ~/.psyportal/config.toml]
    #[arg(short, long)]
    config: Option<String>,

    /// Data directory (session, known items, permission)
    #[arg(long, default_value = "~/.psyportal")]
    data_dir: String,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file (kept if one already exists)
    Init,
    /// Log in with the access code given by your therapist
    Login { code: String },
    /// End the session on this device
    Logout,
    /// Your and your therapist's online status
    Status,
    /// Pending questionnaires
    Assignments,
    /// Answer a pending questionnaire and submit it
    Answer {
        /// Assignment id, as listed by `psyportal assignments`
        id: i64,
    },
    /// Chat history with your therapist
    Messages {
        /// Last message id you have read (for the unread marker)
        #[arg(long)]
        last_read: Option<i64>,
    },
    /// Send a message to your therapist
    Send {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Notification permission
    Notifications {
        #[command(subcommand)]
        action: NotificationAction,
    },
    /// Ask the backend to send a test push notification
    TestPush,
    /// Watch for new tasks and messages until Ctrl-C
    Watch,
}

#[derive(Subcommand)]
enum NotificationAction {
    Allow,
    Deny,
    Status,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "psyportal=debug,psyportal_notify=debug,psyportal_api=debug,psyportal_core=debug"
    } else {
        "psyportal=info,psyportal_notify=info,psyportal_api=info,psyportal_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(PortalConfig::default_path);
    let config = match &cli.config {
        None => PortalConfig::load()?,
        Some(_) if config_path.exists() => {
            let mut config = PortalConfig::load_from(&config_path)?;
            config.apply_env();
            config
        }
        Some(_) => {
            let mut config = PortalConfig::default();
            config.apply_env();
            config
        }
    };

    if let Command::Init = cli.command {
        if config_path.exists() {
            println!("📄 Config already exists: {}", config_path.display());
        } else {
            match &cli.config {
                None => config.save()?,
                Some(_) => config.save_to(&config_path)?,
            }
            println!("✅ Wrote {}", config_path.display());
        }
        return Ok(());
    }

    let data_dir = expand_path(&cli.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let backend = Arc::new(HttpBackend::new(&config.api)?);
    let sessions = SessionStore::new(&data_dir);
    let known = FileKnownStore::new(&data_dir);
    let permissions = FilePermissionStore::new(&data_dir);

    match cli.command {
        Command::Init => {}
        Command::Login { code } => {
            let patient = backend.validate_access_code(&code).await?;
            sessions.save(&patient)?;
            known.clear()?;
            println!("✅ Logged in as {}", patient.patient_code);
            println!("   👩‍⚕️ Therapist: {} ({})", patient.psychologist_name, patient.psychologist_schedule);
            if permissions.current() == PermissionState::Default {
                println!("   🔔 Run `psyportal notifications allow` to receive notifications.");
            }
        }
        Command::Logout => {
            if let Some(patient) = sessions.load() {
                if let Err(e) = backend.logout(&Session::new(patient)).await {
                    tracing::warn!("⚠️ Backend logout failed: {e}");
                }
            }
            sessions.clear()?;
            known.clear()?;
            println!("👋 Logged out");
        }
        Command::Status => {
            let session = sessions.require()?;
            let status = backend.status(&session).await?;
            let profile = backend.profile(&session).await.unwrap_or_default();
            let name = profile
                .psychologist_name
                .unwrap_or_else(|| session.patient().psychologist_name.clone());
            let online = if status.psychologist_is_online { "🟢 online" } else { "⚪ offline" };
            println!("👩‍⚕️ {name}: {online}");
            if let Some(schedule) = profile.psychologist_schedule {
                println!("   🕘 {schedule}");
            }
        }
        Command::Assignments => {
            let session = sessions.require()?;
            let pending = backend.pending_assignments(&session).await?;
            let schedule = backend.assignments(&session).await.unwrap_or_default();
            let now = chrono::Utc::now();
            if pending.is_empty() {
                println!("📭 No pending questionnaires");
            }
            for p in &pending {
                let due = schedule
                    .iter()
                    .any(|a| a.id == p.assignment_id && a.is_due(now));
                let marker = if p.is_late(now) {
                    "  ⌛ overdue"
                } else if due {
                    "  ⏰ due now"
                } else {
                    ""
                };
                println!("📝 [{}] {}{marker}", p.assignment_id, p.title());
            }
        }
        Command::Answer { id } => {
            let session = sessions.require()?;
            let pending = backend.pending_assignments(&session).await?;
            let completion = pending
                .iter()
                .find(|p| p.assignment_id == id && p.status == CompletionStatus::Sent)
                .with_context(|| format!("No pending questionnaire with id {id}"))?;
            println!("📝 {}", completion.title());
            if let Some(description) = completion.questionnaire.description.as_deref() {
                println!("   {description}");
            }
            let questions = completion.questionnaire.questions();
            let mut answers = Vec::with_capacity(questions.len());
            for (index, question) in questions.iter().enumerate() {
                let answer = ask_question(index, questions.len(), question).await?;
                answers.push(Answer {
                    question_index: index,
                    question_text: question.text.clone(),
                    answer,
                });
            }
            backend
                .submit_assignment(&session, completion.assignment_id, &answers)
                .await?;
            println!("✅ Answers sent. Thank you!");
        }
        Command::Messages { last_read } => {
            let session = sessions.require()?;
            let messages = backend.messages(&session).await?;
            for m in &messages {
                let who = if m.is_from_patient { "You" } else { "Therapist" };
                println!("[{}] {who}: {}", m.id, m.content);
            }
            if has_unread(&messages, last_read) {
                println!("✉️  You have unread messages");
            }
        }
        Command::Send { text } => {
            let session = sessions.require()?;
            let sent = backend.send_message(&session, &text.join(" ")).await?;
            println!("📤 Sent (#{})", sent.id);
        }
        Command::Notifications { action } => match action {
            NotificationAction::Allow => {
                permissions.set(PermissionState::Granted)?;
                println!("🔔 Notifications allowed");
            }
            NotificationAction::Deny => {
                permissions.set(PermissionState::Denied)?;
                println!("🔕 Notifications denied");
            }
            NotificationAction::Status => {
                println!("🔔 Permission: {}", permissions.current());
            }
        },
        Command::TestPush => {
            let session = sessions.require()?;
            backend.test_push(&session).await?;
            println!("✅ Test notification requested");
        }
        Command::Watch => {
            let session = sessions.require()?;
            watch(&config, &data_dir, backend, session).await?;
        }
    }

    Ok(())
}

async fn watch(
    config: &PortalConfig,
    data_dir: &Path,
    backend: Arc<HttpBackend>,
    session: Session,
) -> Result<()> {
    let push = Arc::new(RelayPushProvider::new(&config.push.device_token));
    let alerts: Arc<dyn AlertSink> = Arc::new(LogAlerts);
    let init = ChannelInitializer::new(
        Arc::new(FilePermissionStore::new(data_dir)),
        push.clone(),
        backend.clone(),
        alerts.clone(),
    );

    let mut outcome = init.start(&session).await;
    if outcome == InitOutcome::PromptRequired {
        outcome = if ask_consent().await? {
            init.accept_prompt(&session).await
        } else {
            init.decline_prompt()
        };
    }
    tracing::info!("📡 Delivery: {:?}", outcome);

    let _foreground = match outcome {
        InitOutcome::PushActive => ForegroundHandler::new(alerts.clone()).subscribe(push.as_ref()),
        _ => None,
    };

    let store: Arc<dyn KnownSetStore> = Arc::new(FileKnownStore::new(data_dir));
    let poller = Poller::new(
        backend.clone(),
        session.clone(),
        store,
        notifier_from_config(&config.notify),
    );
    let poll = spawn_poller(poller, Duration::from_secs(config.poll.interval_secs));
    let heartbeat = spawn_heartbeat(
        backend,
        session,
        Duration::from_secs(config.poll.heartbeat_secs),
    );

    println!("👀 Watching for new tasks and messages — Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    poll.stop().await;
    heartbeat.stop().await;
    println!("⏹️ Stopped");
    Ok(())
}

async fn read_line() -> Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|n| (n > 0).then_some(line))
    })
    .await??;
    Ok(line)
}

/// Ask one question until the input is acceptable for its kind.
async fn ask_question(index: usize, total: usize, question: &Question) -> Result<serde_json::Value> {
    println!();
    println!("❓ {}/{} {}", index + 1, total, question.text);
    match &question.kind {
        QuestionKind::Scale { min, max } => println!("   Enter a number from {min} to {max}"),
        QuestionKind::Choice { options } => {
            for (n, option) in options.iter().enumerate() {
                println!("   {}. {option}", n + 1);
            }
        }
        QuestionKind::Text => println!("   Type your answer"),
    }
    loop {
        let line = read_line()
            .await?
            .context("Input closed before the questionnaire was finished")?;
        match question.parse_answer(&line) {
            Some(answer) => return Ok(answer),
            None => println!("   ⚠️ Please enter a valid answer"),
        }
    }
}

/// Consent prompt. Only an interactive "yes" counts; without a terminal the
/// answer is no and permission stays undecided.
async fn ask_consent() -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        tracing::info!("🔔 Run `psyportal notifications allow` to enable notifications");
        return Ok(false);
    }
    println!("🔔 Enable notifications so you don't miss questionnaires and messages from your therapist? [y/N]");
    let answer = read_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "si" | "sí"))
}
