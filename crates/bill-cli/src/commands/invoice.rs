//! Invoice command: fetch a user's calendar and produce one invoice per customer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bill_core::{BillingPeriod, CustomerCode, InvoiceDataset, MAX_YEAR, MIN_YEAR, build_invoices};
use bill_feed::FeedClient;
use clap::Args;
use thiserror::Error;
use tokio::task::{self, JoinError, JoinSet};

use crate::config::{DispatchConfig, InvoiceHeader, UserConfig};
use crate::dispatch::{self, DispatchError, Dispatcher};
use crate::render::{self, JsonRenderer, RenderError, Renderer, TextRenderer};

/// Arguments of `bill invoice`.
#[derive(Debug, Clone, Args)]
pub struct InvoiceArgs {
    /// User whose calendar and configuration are used.
    pub username: String,

    /// Billing month (1-12).
    #[arg(value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: u32,

    /// Billing year.
    #[arg(value_parser = clap::value_parser!(i32).range(i64::from(MIN_YEAR)..=i64::from(MAX_YEAR)))]
    pub year: i32,

    /// Render JSON documents instead of plain text.
    #[arg(long)]
    pub json: bool,

    /// Render documents but do not dispatch them.
    #[arg(long)]
    pub dry_run: bool,

    /// Read the feed from a local .ics file instead of fetching it.
    #[arg(long, value_name = "ICS")]
    pub from_file: Option<PathBuf>,
}

/// Per-customer failures. These never abort the run.
#[derive(Debug, Error)]
pub enum CustomerError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("invoice task failed: {0}")]
    Task(#[from] JoinError),
}

type Outcome = (CustomerCode, Result<Delivered, CustomerError>);

/// What happened to one customer's invoice.
#[derive(Debug)]
struct Delivered {
    path: PathBuf,
    total: String,
    dispatched: bool,
}

/// Shared, read-only inputs of the per-customer tasks.
struct Delivery {
    renderer: Box<dyn Renderer>,
    dispatcher: Option<(Arc<dyn Dispatcher>, DispatchConfig)>,
    header: InvoiceHeader,
    output_dir: PathBuf,
}

/// Runs the invoice command.
pub fn run(args: &InvoiceArgs, config_path: Option<&Path>) -> Result<()> {
    let period = BillingPeriod::new(args.month, args.year).context("invalid billing period")?;
    let config = UserConfig::load(&args.username, config_path)
        .context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    runtime.block_on(execute(args, config, period))
}

async fn execute(args: &InvoiceArgs, config: UserConfig, period: BillingPeriod) -> Result<()> {
    let raw = load_feed(args, &config, period).await?;
    let run = build_invoices(&raw, config.timezone, period)
        .context("failed to parse calendar feed")?;

    for skipped in &run.skipped {
        tracing::warn!(%skipped, "event skipped");
        eprintln!("Skipped: {skipped}");
    }
    if run.stats.unclassified > 0 {
        eprintln!(
            "{} event(s) in {period} carry no customer code",
            run.stats.unclassified
        );
    }

    let dispatcher = match (&config.dispatch, args.dry_run) {
        (Some(dispatch), false) => Some((
            dispatch::from_config(dispatch).context("failed to set up dispatcher")?,
            dispatch.clone(),
        )),
        (Some(_), true) => {
            tracing::info!("dry run, invoices will not be dispatched");
            None
        }
        (None, _) => {
            tracing::info!("no [dispatch] section, invoices are only rendered");
            None
        }
    };
    let renderer: Box<dyn Renderer> = if args.json {
        Box::new(JsonRenderer::today())
    } else {
        Box::new(TextRenderer::today())
    };
    let delivery = Arc::new(Delivery {
        renderer,
        dispatcher,
        header: config.invoice,
        output_dir: config.output_dir,
    });

    let datasets = run.aggregation.into_sorted();
    let total = datasets.len();
    let mut tasks = JoinSet::new();
    let mut codes = HashMap::with_capacity(total);
    for dataset in datasets {
        let delivery = Arc::clone(&delivery);
        let code = dataset.customer().clone();
        let handle = tasks.spawn(async move { deliver(&delivery, &dataset).await });
        codes.insert(handle.id(), code);
    }
    let outcomes = join_customers(tasks, codes).await;

    let mut succeeded = 0;
    for (code, outcome) in &outcomes {
        match outcome {
            Ok(delivered) => {
                succeeded += 1;
                let action = if delivered.dispatched { "dispatched" } else { "rendered" };
                println!(
                    "{code}  {}  {action}  {}",
                    delivered.total,
                    delivered.path.display()
                );
            }
            Err(err) => {
                tracing::error!(customer = %code, %err, "invoice failed");
                eprintln!("{code}: {err}");
            }
        }
    }
    eprintln!("{succeeded} of {total} customers succeeded");

    Ok(())
}

/// Waits for every customer task, pairing each result with its customer.
///
/// A task that panicked becomes a [`CustomerError::Task`] for its customer.
/// The result is ordered by customer code.
async fn join_customers(
    mut tasks: JoinSet<Result<Delivered, CustomerError>>,
    mut codes: HashMap<task::Id, CustomerCode>,
) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(codes.len());
    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(err) => (err.id(), Err(CustomerError::Task(err))),
        };
        match codes.remove(&id) {
            Some(code) => outcomes.push((code, result)),
            None => tracing::error!(%id, "finished task has no customer"),
        }
    }
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));
    outcomes
}

/// Fetches the feed and archives it, or reads it from `--from-file`.
async fn load_feed(args: &InvoiceArgs, config: &UserConfig, period: BillingPeriod) -> Result<Vec<u8>> {
    if let Some(path) = &args.from_file {
        return tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read feed file {}", path.display()));
    }

    let client = FeedClient::new(config.feed.timeout).context("failed to create feed client")?;
    let raw = client
        .fetch(&config.feed.url, &config.feed.credentials)
        .await
        .context("failed to fetch calendar feed")?;

    let archive = config
        .output_dir
        .join(format!("feed_{}.ics", period.label()));
    tokio::fs::write(&archive, &raw)
        .await
        .with_context(|| format!("failed to archive feed to {}", archive.display()))?;
    tracing::debug!(path = %archive.display(), bytes = raw.len(), "archived feed");

    Ok(raw)
}

async fn deliver(delivery: &Delivery, dataset: &InvoiceDataset) -> Result<Delivered, CustomerError> {
    let path = render::write_invoice(
        delivery.renderer.as_ref(),
        dataset,
        &delivery.header,
        &delivery.output_dir,
    )
    .await?;

    let dispatched = if let Some((dispatcher, config)) = &delivery.dispatcher {
        let message = dispatch::compose(dataset, config, path.clone());
        dispatcher.dispatch(&message).await?;
        true
    } else {
        false
    };

    Ok(Delivered {
        path,
        total: dataset.total_hours_minutes(),
        dispatched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivered(path: &str) -> Result<Delivered, CustomerError> {
        Ok(Delivered {
            path: PathBuf::from(path),
            total: "01:00".to_string(),
            dispatched: false,
        })
    }

    #[tokio::test]
    async fn panicked_task_is_reported_for_its_customer() {
        let mut tasks = JoinSet::new();
        let mut codes = HashMap::new();

        let ok = tasks.spawn(async { delivered("XYZ_2024-03.txt") });
        codes.insert(ok.id(), CustomerCode::new("XYZ").unwrap());
        let boom = tasks.spawn(async { panic!("renderer exploded") });
        codes.insert(boom.id(), CustomerCode::new("ABC").unwrap());

        let outcomes = join_customers(tasks, codes).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0.as_str(), "ABC");
        let err = outcomes[0].1.as_ref().unwrap_err();
        assert!(matches!(err, CustomerError::Task(_)));
        assert!(err.to_string().starts_with("invoice task failed"));
        assert_eq!(outcomes[1].0.as_str(), "XYZ");
        assert!(outcomes[1].1.is_ok());
    }
}
