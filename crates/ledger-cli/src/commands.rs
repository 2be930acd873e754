//! Command implementations. Each returns a report for `summary` to print.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ledger_persistence::{
    AutosaveScheduler, Ledger, LedgerCodec, LedgerEntry, SchedulerStats, SnapshotFormat, Tracked,
    file_digest, load_from_file, save_to_file,
};
use tracing::{info, info_span, warn};

use crate::cli::{CheckArgs, InspectArgs, MigrateArgs, RecordArgs};
use crate::settings::Settings;

/// Extra time allowed past the autosave delay before giving up on the worker.
const DRAIN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct InspectReport {
    pub path: PathBuf,
    pub name: String,
    pub created_at: String,
    pub format: SnapshotFormat,
    pub consistent: bool,
    pub entry_count: usize,
    pub balance_minor: i64,
    pub accounts: BTreeMap<String, i128>,
    pub digest: String,
    pub entries: Option<Vec<LedgerEntry>>,
}

#[derive(Debug)]
pub struct CheckReport {
    pub path: PathBuf,
    pub format: SnapshotFormat,
    pub consistent: bool,
    pub entry_count: usize,
}

#[derive(Debug)]
pub struct MigrateReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub from: SnapshotFormat,
    /// Input was already current and `--force` was not given.
    pub skipped: bool,
    pub digest: String,
}

#[derive(Debug)]
pub struct RecordReport {
    pub path: PathBuf,
    pub added: u32,
    pub last_sequence: u64,
    pub balance_minor: i64,
    pub stats: SchedulerStats,
    /// The worker had not caught up, so the command saved directly.
    pub explicit_save: bool,
}

pub fn run_inspect(args: &InspectArgs) -> Result<InspectReport> {
    let span = info_span!("inspect", path = %args.file.display());
    let _guard = span.enter();

    let loaded = load_from_file(&LedgerCodec, &args.file)?;
    let digest = file_digest(&args.file)?;
    let ledger = loaded.value;

    let mut accounts = BTreeMap::new();
    for entry in &ledger.entries {
        *accounts.entry(entry.account.clone()).or_insert(0i128) += i128::from(entry.amount_minor);
    }
    let created_at = ledger
        .created_at()
        .map_or_else(|| ledger.created_at.clone(), |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string());

    Ok(InspectReport {
        path: args.file.clone(),
        name: ledger.name.clone(),
        created_at,
        format: loaded.format,
        consistent: loaded.consistent,
        entry_count: ledger.entries.len(),
        balance_minor: ledger.balance_minor,
        accounts,
        digest,
        entries: args.entries.then_some(ledger.entries),
    })
}

pub fn run_check(args: &CheckArgs) -> Result<CheckReport> {
    let loaded = load_from_file(&LedgerCodec, &args.file)?;
    if !loaded.consistent {
        warn!(path = %args.file.display(), "Ledger failed its consistency check");
    }
    Ok(CheckReport {
        path: args.file.clone(),
        format: loaded.format,
        consistent: loaded.consistent,
        entry_count: loaded.value.entries.len(),
    })
}

pub fn run_migrate(args: &MigrateArgs) -> Result<MigrateReport> {
    let span = info_span!("migrate", input = %args.input.display());
    let _guard = span.enter();

    let loaded = load_from_file(&LedgerCodec, &args.input)?;
    let output = args.output.clone().unwrap_or_else(|| args.input.clone());

    if loaded.format == SnapshotFormat::Primary && !args.force && output == args.input {
        return Ok(MigrateReport {
            digest: file_digest(&args.input)?,
            input: args.input.clone(),
            output,
            from: loaded.format,
            skipped: true,
        });
    }
    if !loaded.consistent {
        warn!("Migrating an inconsistent ledger as-is");
    }

    save_to_file(&LedgerCodec, &loaded.value, &output)
        .with_context(|| format!("write {}", output.display()))?;
    info!(from = ?loaded.format, output = %output.display(), "Migration complete");

    Ok(MigrateReport {
        digest: file_digest(&output)?,
        input: args.input.clone(),
        output,
        from: loaded.format,
        skipped: false,
    })
}

pub fn run_record(args: &RecordArgs, settings: &Settings) -> Result<RecordReport> {
    let span = info_span!("record", path = %args.file.display());
    let _guard = span.enter();

    if args.repeat == 0 {
        bail!("--repeat must be at least 1");
    }
    let ledger = open_or_create(&args.file, args.create.as_deref())?;

    let mut autosave = settings.autosave.clone();
    if let Some(ms) = args.autosave_ms {
        autosave.delay_ms = ms;
    }
    let scheduler = AutosaveScheduler::new(settings.scheduler.clone());

    let tracked = Tracked::new(ledger.name.clone(), LedgerCodec, ledger);
    tracked.enable_autosave(&args.file, &autosave, &scheduler)?;

    let mut added = 0u32;
    for _ in 0..args.repeat {
        let sequence =
            tracked.update(|l| l.record(args.account.as_str(), args.amount, args.memo.clone()))?;
        if sequence.is_none() {
            warn!(added, "Posting would overflow the ledger balance, stopping");
            break;
        }
        added += 1;
    }

    if autosave.enabled && !scheduler.wait_for_drain(autosave.delay() + DRAIN_GRACE)? {
        warn!("Autosave worker did not finish in time");
    }

    // Anything the worker did not write (disabled, failed, or still pending)
    // is saved here so the command never exits with unsaved postings.
    let explicit_save = tracked.is_dirty()?;
    if explicit_save {
        tracked
            .save_to_file(&args.file)
            .with_context(|| format!("save {}", args.file.display()))?;
    }

    if added < args.repeat {
        bail!(
            "posting {} of {} would overflow the balance of {}; {} saved",
            added + 1,
            args.repeat,
            args.file.display(),
            added
        );
    }

    let (last_sequence, balance_minor) = tracked.read(|l| (l.last_sequence, l.balance_minor))?;
    Ok(RecordReport {
        path: args.file.clone(),
        added,
        last_sequence,
        balance_minor,
        stats: scheduler.stats(),
        explicit_save,
    })
}

fn open_or_create(path: &Path, create: Option<&str>) -> Result<Ledger> {
    if path.exists() {
        let loaded = load_from_file(&LedgerCodec, path)?;
        if !loaded.consistent {
            bail!(
                "{} failed its consistency check; run `ledger check` before recording",
                path.display()
            );
        }
        return Ok(loaded.value);
    }
    match create {
        Some(name) => {
            info!(name, "Creating new ledger");
            Ok(Ledger::new(name))
        }
        None => bail!(
            "{} does not exist (pass --create NAME to start a new ledger)",
            path.display()
        ),
    }
}
