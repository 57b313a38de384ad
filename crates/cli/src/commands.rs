//! Subcommand implementations.

use std::sync::Arc;

use adopet_lifecycle::{ErrorKind, Outcome};
use adopet_service::{
    AdoptionService, AdoptionView, Clock, EscalationScheduler, ManualClock, ReconcileReport,
    ServiceError, SystemClock, TracingGamification, TracingNotifier, TransitionReport,
};
use adopet_storage::MemoryStorage;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::config::{AdopetConfig, ConfigError};
use crate::state::{StateError, StateFile};
use crate::{Commands, OutputFormat};

#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("could not render output: {0}")]
    Render(String),

    #[error("{0}")]
    Usage(String),
}

impl CliError {
    pub(crate) fn kind(&self) -> Option<ErrorKind> {
        match self {
            CliError::Service(e) => e.kind(),
            _ => None,
        }
    }
}

pub(crate) struct Context {
    pub(crate) config: AdopetConfig,
    pub(crate) output: OutputFormat,
    /// Pinned clock, if any.
    pub(crate) now: Option<OffsetDateTime>,
}

type Service = AdoptionService<MemoryStorage>;

pub(crate) async fn dispatch(command: Commands, ctx: Context) -> Result<(), CliError> {
    if let Commands::Config = command {
        return print_config(&ctx);
    }
    if let (Commands::Run { .. }, Some(_)) = (&command, ctx.now) {
        return Err(CliError::Usage(
            "--now pins the clock and cannot be used with run".to_string(),
        ));
    }

    let state = StateFile::new(&ctx.config.store.state_path);
    let storage = Arc::new(state.load()?);
    let clock: Arc<dyn Clock> = match ctx.now {
        Some(at) => Arc::new(ManualClock::new(at)),
        None => Arc::new(SystemClock),
    };
    let service = Arc::new(
        AdoptionService::new(
            storage.clone(),
            clock,
            Arc::new(TracingNotifier),
            Arc::new(TracingGamification),
        )
        .with_confirmation_window(ctx.config.confirmation_window()),
    );

    let mutates = !matches!(command, Commands::Show { .. } | Commands::Feed);
    let result = execute(command, &ctx, &service, &state, &storage).await;
    service.flush().await;
    if mutates {
        state.save(&storage)?;
    }
    result
}

async fn execute(
    command: Commands,
    ctx: &Context,
    service: &Arc<Service>,
    state: &StateFile,
    storage: &Arc<MemoryStorage>,
) -> Result<(), CliError> {
    let out = ctx.output;
    match command {
        Commands::ListPet {
            pet_id,
            owner,
            name,
        } => {
            let view = service.list_pet(&pet_id, &owner, &name).await?;
            print_view(&view, out)
        }
        Commands::Interest { pet_id, user } => {
            service.record_interest(&pet_id, &user).await?;
            let interests = service.interests(&pet_id).await?;
            match out {
                OutputFormat::Text => {
                    println!("{pet_id}: {} interested", interests.len());
                    Ok(())
                }
                OutputFormat::Json => print_json(&serde_json::json!({
                    "pet_id": pet_id,
                    "interests": interests,
                })),
            }
        }
        Commands::Nominate {
            pet_id,
            tutor,
            adopter,
        } => print_report(&service.nominate(&pet_id, &tutor, &adopter).await?, out),
        Commands::AdopterConfirm { pet_id, adopter } => {
            print_report(&service.confirm_by_adopter(&pet_id, &adopter).await?, out)
        }
        Commands::Register { pet_id, adopter } => print_report(
            &service
                .register_adoption(&pet_id, adopter.as_deref())
                .await?,
            out,
        ),
        Commands::Confirm { pet_id } => {
            print_report(&service.confirm_by_platform(&pet_id).await?, out)
        }
        Commands::Reject { pet_id, reason } => print_report(
            &service
                .reject_by_platform(&pet_id, reason.as_deref())
                .await?,
            out,
        ),
        Commands::RejectNomination { pet_id, reason } => print_report(
            &service
                .reject_nomination(&pet_id, reason.as_deref())
                .await?,
            out,
        ),
        Commands::Show { pet_id } => print_view(&service.view(&pet_id).await?, out),
        Commands::Feed => {
            let feed = service.open_feed().await?;
            match out {
                OutputFormat::Text => {
                    for view in &feed {
                        println!("{}\t{}\towner={}", view.pet_id, view.pet_name, view.owner_id);
                    }
                    Ok(())
                }
                OutputFormat::Json => print_json(&feed),
            }
        }
        Commands::Reconcile => print_reconcile(&service.reconcile().await, out),
        Commands::Run { interval_secs } => {
            run_scheduler(ctx, service, state, storage, interval_secs).await;
            Ok(())
        }
        Commands::Config => print_config(ctx),
    }
}

async fn run_scheduler(
    ctx: &Context,
    service: &Arc<Service>,
    state: &StateFile,
    storage: &Arc<MemoryStorage>,
    interval_secs: Option<u64>,
) {
    let interval = interval_secs
        .filter(|secs| *secs > 0)
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| ctx.config.scheduler_interval());
    let scheduler = EscalationScheduler::new(service.clone())
        .with_interval(interval)
        .with_run_on_start(ctx.config.scheduler.run_on_start);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received; stopping scheduler"),
            Err(e) => tracing::error!(error = %e, "could not listen for interrupt"),
        }
        let _ = shutdown_tx.send(true);
    });

    let out = ctx.output;
    scheduler
        .run(shutdown_rx, |report| {
            if let Err(e) = state.save(storage) {
                tracing::error!(path = %state.path().display(), error = %e, "state not saved");
            }
            if let Err(e) = print_reconcile(report, out) {
                tracing::warn!(error = %e, "tick report not printed");
            }
        })
        .await;
}

// ── Rendering ────────────────────────────────────────────────────────────────

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CliError::Render(e.to_string()))?;
    println!("{json}");
    Ok(())
}

fn print_report(report: &TransitionReport, out: OutputFormat) -> Result<(), CliError> {
    match out {
        OutputFormat::Text => {
            let outcome = match report.outcome {
                Outcome::Applied => "applied",
                Outcome::NoOp => "no-op",
            };
            println!(
                "{}: {} -> {} ({outcome})",
                report.view.pet_id, report.from, report.view.state
            );
            Ok(())
        }
        OutputFormat::Json => print_json(report),
    }
}

fn print_view(view: &AdoptionView, out: OutputFormat) -> Result<(), CliError> {
    if out == OutputFormat::Json {
        return print_json(view);
    }
    println!("pet:        {} ({})", view.pet_id, view.pet_name);
    println!("owner:      {}", view.owner_id);
    println!("status:     {}", view.status.as_str());
    println!("state:      {}", view.state);
    if let Some(candidate) = &view.pending_adopter_id {
        println!("nominee:    {candidate}");
    }
    if let Some(adoption) = &view.adoption {
        println!(
            "adopter:    {} (registered {})",
            adoption.adopter_id,
            format_instant(adoption.adopted_at)
        );
    }
    if let Some(at) = view.platform_confirmed_at {
        println!("confirmed:  {}", format_instant(at));
    }
    if let Some(at) = view.rejected_at {
        match &view.rejection_reason {
            Some(reason) => println!("rejected:   {} ({reason})", format_instant(at)),
            None => println!("rejected:   {}", format_instant(at)),
        }
    }
    Ok(())
}

fn print_reconcile(report: &ReconcileReport, out: OutputFormat) -> Result<(), CliError> {
    match out {
        OutputFormat::Text => {
            println!(
                "advanced={} finalized={} confirmed={} skipped={} failed={}",
                report.advanced(),
                report.finalized,
                report.confirmed,
                report.skipped,
                report.failed
            );
            Ok(())
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "advanced": report.advanced(),
            "finalized": report.finalized,
            "confirmed": report.confirmed,
            "skipped": report.skipped,
            "failed": report.failed,
        })),
    }
}

fn print_config(ctx: &Context) -> Result<(), CliError> {
    match ctx.output {
        OutputFormat::Text => {
            let rendered = ctx
                .config
                .to_toml()
                .map_err(|e| CliError::Render(e.to_string()))?;
            print!("{rendered}");
            Ok(())
        }
        OutputFormat::Json => print_json(&ctx.config),
    }
}

fn format_instant(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}
