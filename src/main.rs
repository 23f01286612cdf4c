mod aggregator;
mod config;
mod error;
mod extractor;
mod invoice_gen;
mod models;
mod prompt;
mod reconciler;
mod sheets;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use bigdecimal::{BigDecimal, Zero};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::aggregator::{build_invoice, entries_for_invoice, ids_in_output_dir, resolve_invoice_id};
use crate::config::Config;
use crate::error::InvoicerError;
use crate::extractor::{cell, extract_entries, ColumnMap, Selection};
use crate::invoice_gen::{format_hours, format_money, InvoiceGenerator};
use crate::models::{EntryStatus, InvoiceDocument, TerminalStatus};
use crate::reconciler::{apply, ReconcilePlan};
use crate::sheets::{GoogleSheets, RowSource, SheetError};

/// Build invoices from the time-tracking sheet and mark the billed rows.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Config document (defaults to $INVOICER_CONFIG, then config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer yes to the write-back confirmation
    #[arg(short, long, global = true)]
    yes: bool,

    /// Leave the sheet untouched after generating the invoice
    #[arg(long, global = true)]
    no_write_back: bool,

    /// Status given to the invoiced rows
    #[arg(long, value_enum, default_value_t = TerminalStatus::Billed, global = true)]
    mark: TerminalStatus,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Invoice every WIP entry (the default)
    Generate,
    /// Re-run the status and highlight update for an existing invoice
    Reconcile {
        #[arg(long)]
        invoice: String,
    },
    /// Show the most recent rows and how many are still WIP
    Recent {
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Show the spreadsheet the credentials can reach
    Info,
}

/// How the run treats the sheet once the invoice exists.
#[derive(Debug, Clone, Copy)]
struct WriteBack {
    enabled: bool,
    assume_yes: bool,
    mark: TerminalStatus,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::init(cli.config.as_deref())?;
    let write_back = WriteBack {
        enabled: !cli.no_write_back,
        assume_yes: cli.yes,
        mark: cli.mark,
    };

    let sheets = GoogleSheets::connect(
        &config.google_sheets.spreadsheet_id,
        &config.google_sheets.credentials_path,
    )
    .await
    .context("connecting to Google Sheets")?;

    match cli.command.unwrap_or(Commands::Generate) {
        Commands::Generate => {
            generate(&sheets, &config, write_back, &mut io::stdin().lock()).await?;
        }
        Commands::Reconcile { invoice } => {
            show_invoice_hours(&sheets, &config, &invoice).await?;
            let mut input = io::stdin().lock();
            reconcile_invoice(&sheets, &config, &invoice, &[], write_back, &mut input).await?;
        }
        Commands::Recent { count } => show_recent(&sheets, &config, count).await?,
        Commands::Info => show_info(&sheets).await?,
    }

    Ok(())
}

async fn read_sheet<S: RowSource>(source: &S, config: &Config) -> Result<(Vec<Vec<String>>, ColumnMap)> {
    let worksheet = &config.google_sheets.worksheet;
    let rows = source
        .read_rows(worksheet)
        .await
        .with_context(|| format!("reading worksheet '{}'", worksheet))?;
    let header = rows.first().ok_or(SheetError::EmptySheet)?;
    let columns = ColumnMap::from_headers(header)?;
    Ok((rows, columns))
}

/// Invoice all WIP entries, write the artifacts, then offer the write-back.
///
/// `input` answers the write-back confirmation unless `write_back.assume_yes` is set.
async fn generate<S: RowSource, R: BufRead>(
    source: &S,
    config: &Config,
    write_back: WriteBack,
    input: &mut R,
) -> Result<InvoiceDocument> {
    println!("Reading WIP entries from '{}'...", config.google_sheets.worksheet);
    let (rows, columns) = read_sheet(source, config).await?;

    let extraction = extract_entries(&rows, &columns, &Selection::Status(EntryStatus::Wip));
    report_skipped_rows(extraction.warnings.len());
    if extraction.entries.is_empty() {
        return Err(InvoicerError::NoData("no WIP entries found in the worksheet".to_string()).into());
    }
    println!("Found {} WIP entries", extraction.entries.len());

    let mut known_ids: Vec<String> = rows
        .iter()
        .skip(1)
        .map(|row| cell(row, columns.invoice).to_string())
        .collect();
    known_ids.extend(ids_in_output_dir(&config.output.output_dir));

    let invoice_id = resolve_invoice_id(
        &extraction.entries,
        &config.invoice.prefix,
        known_ids.iter().map(String::as_str),
        config.invoice.last_number,
    )?;
    let entries = entries_for_invoice(extraction.entries, &invoice_id);
    if entries.is_empty() {
        return Err(InvoicerError::NoData(format!("no WIP entries belong to invoice {}", invoice_id)).into());
    }

    println!("Generating invoice {}", invoice_id);
    let invoice = build_invoice(&entries, &invoice_id, config, Local::now().date_naive())?;
    let files = InvoiceGenerator::new(&config.output)?.generate_invoice(&invoice)?;

    println!();
    println!("Invoice Number: {}", invoice.invoice_id);
    println!("Invoice Date:   {}", invoice.issue_date.format("%m/%d/%Y"));
    println!("Due Date:       {}", invoice.due_date.format("%m/%d/%Y"));
    for (category, hours) in &invoice.category_totals {
        println!("  {}: {} h", category, format_hours(hours));
    }
    println!("Total Hours:    {}", format_hours(&invoice.total_hours));
    println!(
        "Hourly Rate:    {} ({} before discount)",
        format_money(&invoice.hourly_rate),
        format_money(&invoice.original_rate())
    );
    println!("Balance Due:    {}", format_money(&invoice.balance_due));
    println!();
    println!("Files Created:");
    for (kind, path) in [("HTML", &files.html), ("PDF", &files.pdf), ("JSON", &files.json)] {
        if let Some(path) = path {
            println!("  {}: {}", kind, path.display());
        }
    }

    if write_back.enabled {
        // The invoice is on disk; a failed write-back must not fail the run.
        if let Err(err) =
            reconcile_invoice(source, config, &invoice.invoice_id, &invoice.source_rows(), write_back, input)
                .await
        {
            warn!(error = %format!("{:#}", err), "sheet write-back skipped");
            println!("Warning: the sheet was not updated: {:#}", err);
        }
    }

    Ok(invoice)
}

/// Re-scan the sheet for `invoice_id`, show the pending changes, and apply them once confirmed.
async fn reconcile_invoice<S: RowSource, R: BufRead>(
    source: &S,
    config: &Config,
    invoice_id: &str,
    seed_rows: &[usize],
    write_back: WriteBack,
    input: &mut R,
) -> Result<()> {
    let (rows, columns) = read_sheet(source, config).await?;
    let mut plan = ReconcilePlan::compute(
        &rows,
        &columns,
        invoice_id,
        seed_rows,
        write_back.mark,
        &config.highlight,
    );

    if plan.is_empty() {
        println!("No rows found for invoice {}", invoice_id);
        return Ok(());
    }

    println!();
    println!("Rows for invoice {}:", invoice_id);
    for entry in &plan.entries {
        let change = if entry.status.is_wip() {
            format!("{} -> {}", entry.status, plan.target)
        } else {
            format!("{} (highlight only)", entry.status)
        };
        println!(
            "  Row {}: {} | {}h | {} | {}",
            entry.row_number,
            entry.date,
            entry.hours,
            truncate(&entry.description, 50),
            change
        );
    }

    let pending = plan.pending().count();
    let resolved = plan.resolved().count();
    if resolved > 0 {
        println!("{} rows are already past WIP and will only be highlighted", resolved);
    }
    let question = format!(
        "Mark {} entries as {} and highlight all {} rows?",
        pending,
        plan.target,
        plan.entries.len()
    );
    let confirmed = write_back.assume_yes
        || prompt::confirm(&question, input, &mut io::stdout())
            .context("reading confirmation")?;
    if !confirmed {
        println!("Sheet left unchanged");
        return Ok(());
    }

    let report = apply(source, &config.google_sheets.worksheet, &mut plan).await;
    match report.warning {
        Some(warning) => println!("Warning: {}", warning),
        None => println!(
            "Updated {} entries to {} and highlighted {} rows",
            report.transitioned, plan.target, report.highlighted
        ),
    }
    info!(invoice = invoice_id, "reconciliation finished");

    Ok(())
}

/// Billable hours already tagged with `invoice_id`, whatever their status.
async fn show_invoice_hours<S: RowSource>(source: &S, config: &Config, invoice_id: &str) -> Result<()> {
    let (rows, columns) = read_sheet(source, config).await?;
    let extraction = extract_entries(&rows, &columns, &Selection::Invoice(invoice_id.to_string()));
    let hours = extraction
        .entries
        .iter()
        .fold(BigDecimal::zero(), |total, entry| total + &entry.hours);
    println!(
        "Invoice {} covers {} entries ({} h)",
        invoice_id,
        extraction.entries.len(),
        format_hours(&hours)
    );
    Ok(())
}

async fn show_recent<S: RowSource>(source: &S, config: &Config, count: usize) -> Result<()> {
    let (rows, columns) = read_sheet(source, config).await?;
    let data_rows = rows.len() - 1;

    println!("Headers: {}", rows[0].join(" | "));
    println!("Total rows: {}", rows.len());
    println!();
    println!("Last {} entries:", count.min(data_rows));
    for (index, row) in rows.iter().enumerate().skip(1).skip(data_rows.saturating_sub(count)) {
        println!(
            "  Row {}: {} | {}h | {} | {} | {}",
            index + 1,
            cell(row, columns.date),
            cell(row, columns.hours),
            truncate(cell(row, columns.task), 30),
            cell(row, columns.invoice),
            cell(row, columns.status)
        );
    }

    let extraction = extract_entries(&rows, &columns, &Selection::All);
    let wip = extraction.entries.iter().filter(|entry| entry.status.is_wip()).count();
    println!();
    println!("Billable entries: {} ({} WIP)", extraction.entries.len(), wip);
    report_skipped_rows(extraction.warnings.len());
    Ok(())
}

// Each skipped row is already logged with its row number; stdout only gets the count.
fn report_skipped_rows(skipped: usize) {
    if let Some(summary) = skipped_rows_summary(skipped) {
        println!("{}", summary);
    }
}

fn skipped_rows_summary(skipped: usize) -> Option<String> {
    (skipped > 0).then(|| format!("Skipped {} rows with unreadable hours (see log for details)", skipped))
}

async fn show_info(sheets: &GoogleSheets) -> Result<()> {
    let info = sheets.spreadsheet_info().await?;
    println!("Title: {}", info.title);
    println!("URL: {}", info.url);
    println!("Service account: {}", info.service_account);
    println!("Worksheets:");
    for worksheet in &info.worksheets {
        println!("  {} ({} rows x {} columns)", worksheet.title, worksheet.rows, worksheet.columns);
    }
    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
