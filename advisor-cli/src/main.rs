use std::fs;
use std::io;
use std::path::PathBuf;

use advisor_core::{
    Column, CredentialProvider, DEFAULT_TOP_K, FailurePolicy, InteractiveCredentialProvider,
    Outcome, Report, ReportFlow, ReportRequest, ResourceDimension, ScopeSelection,
    StaticCredentialProvider, open_session, run_report,
};
use advisor_sdk::FetchContext;
use anyhow::{Context as _, Result};
use clap::{ArgAction, Args, Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

// Link sources so they register.
#[cfg(feature = "azure")]
use mod_azure as _;
use mod_fixture as _;

#[derive(Parser, Debug)]
#[command(
    name = "advisor-report",
    version,
    about = "Azure Advisor recommendations as a table, chart and PDF report"
)]
struct Cli {
    #[command(flatten)]
    credentials: CredentialArgs,

    #[command(flatten)]
    scope: ScopeArgs,

    /// Recommendation source (defaults to `fixture` when --fixture is given, else `azure`)
    #[arg(long, env = "ADVISOR_SOURCE")]
    source: Option<String>,

    /// JSON file replayed by the fixture source
    #[arg(long, value_name = "FILE")]
    fixture: Option<PathBuf>,

    #[arg(long, env = "AZURE_AUTHORITY_HOST", value_name = "URL")]
    authority_host: Option<String>,

    #[arg(long, env = "AZURE_MANAGEMENT_ENDPOINT", value_name = "URL")]
    management_endpoint: Option<String>,

    /// Resource column added to the table
    #[arg(long, value_enum, default_value_t = ResourceColumn::ResourceGroup)]
    resource_column: ResourceColumn,

    /// What to do when one subscription fails in a multi-subscription run
    #[arg(long, value_enum, default_value_t = ErrorPolicy::Abort)]
    on_scope_error: ErrorPolicy,

    /// Output written to stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Column counted by the bar chart
    #[arg(long, value_enum, default_value_t = ChartColumn::Category)]
    chart_column: ChartColumn,

    /// Number of bars kept in the chart
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top: usize,

    /// Write the bar chart as SVG
    #[arg(long, value_name = "FILE")]
    chart: Option<PathBuf>,

    /// Write the PDF report into this directory
    #[arg(long, value_name = "DIR")]
    pdf_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
struct CredentialArgs {
    /// TOML file with AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET;
    /// takes precedence over the individual flags
    #[arg(long, value_name = "FILE")]
    secrets: Option<PathBuf>,

    #[arg(long, env = "AZURE_TENANT_ID")]
    tenant_id: Option<String>,

    #[arg(long, env = "AZURE_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,
}

impl CredentialArgs {
    fn provider(&self) -> Box<dyn CredentialProvider> {
        match &self.secrets {
            Some(path) => Box::new(StaticCredentialProvider::new(path)),
            None => Box::new(InteractiveCredentialProvider {
                tenant_id: self.tenant_id.clone(),
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
            }),
        }
    }
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct ScopeArgs {
    /// One subscription id
    #[arg(long, value_name = "ID")]
    subscription: Option<String>,

    /// One subscription, looked up by display name
    #[arg(long, value_name = "NAME")]
    subscription_name: Option<String>,

    /// Newline-delimited subscription ids; `-` reads stdin
    #[arg(long, value_name = "FILE")]
    subscription_list: Option<PathBuf>,

    /// Every subscription the credential can see
    #[arg(long)]
    all: bool,
}

impl ScopeArgs {
    fn selection(&self) -> Result<ScopeSelection> {
        if let Some(id) = &self.subscription {
            return Ok(ScopeSelection::single(id)?);
        }
        if let Some(name) = &self.subscription_name {
            return Ok(ScopeSelection::by_display_name(name)?);
        }
        if let Some(path) = &self.subscription_list {
            let text = if path.as_os_str() == "-" {
                io::read_to_string(io::stdin()).context("failed to read subscription list")?
            } else {
                fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?
            };
            return Ok(ScopeSelection::from_list_text(&text)?);
        }
        Ok(ScopeSelection::AllAccessible)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ResourceColumn {
    None,
    ResourceGroup,
    Resource,
}

impl From<ResourceColumn> for ResourceDimension {
    fn from(value: ResourceColumn) -> Self {
        match value {
            ResourceColumn::None => ResourceDimension::Omitted,
            ResourceColumn::ResourceGroup => ResourceDimension::ResourceGroup,
            ResourceColumn::Resource => ResourceDimension::Resource,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ErrorPolicy {
    Abort,
    Skip,
}

impl From<ErrorPolicy> for FailurePolicy {
    fn from(value: ErrorPolicy) -> Self {
        match value {
            ErrorPolicy::Abort => FailurePolicy::Abort,
            ErrorPolicy::Skip => FailurePolicy::Skip,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Markdown,
    Html,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ChartColumn {
    Category,
    Impact,
    Subscription,
    ResourceGroup,
    Resource,
}

impl From<ChartColumn> for Column {
    fn from(value: ChartColumn) -> Self {
        match value {
            ChartColumn::Category => Column::Category,
            ChartColumn::Impact => Column::Impact,
            ChartColumn::Subscription => Column::Subscription,
            ChartColumn::ResourceGroup => Column::ResourceGroup,
            ChartColumn::Resource => Column::Resource,
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let request = ReportRequest {
        selection: cli.scope.selection()?,
        resource: cli.resource_column.into(),
        policy: cli.on_scope_error.into(),
    };

    let mut ctx = FetchContext::new();
    ctx.set_authority_host(cli.authority_host.clone());
    ctx.set_management_endpoint(cli.management_endpoint.clone());
    ctx.set_fixture(cli.fixture.clone());

    let source = cli.source.as_deref().unwrap_or(if cli.fixture.is_some() {
        "fixture"
    } else {
        "azure"
    });
    let provider = cli.credentials.provider();
    let session = open_session(source, provider.as_ref(), &ctx)?;

    let mut flow = ReportFlow::new();
    match flow.submit(|| run_report(session.as_ref(), &request))? {
        Outcome::Empty(empty) => {
            for failure in &empty.skipped {
                eprintln!("skipped {}: {}", failure.scope, failure.error);
            }
            eprintln!(
                "Nothing to report: {} subscription(s) queried, no recommendations found.",
                empty.scopes_queried
            );
            Ok(())
        }
        Outcome::Report(report) => emit(&cli, &report),
    }
}

fn emit(cli: &Cli, report: &Report) -> Result<()> {
    for failure in &report.skipped {
        eprintln!("skipped {}: {}", failure.scope, failure.error);
    }

    let chart = if cli.chart.is_some() || matches!(cli.format, OutputFormat::Html) {
        Some(report.chart(cli.chart_column.into(), cli.top)?)
    } else {
        None
    };

    match cli.format {
        OutputFormat::Table => println!("{}", report.to_text()),
        OutputFormat::Markdown => println!("{}", report.to_markdown()?),
        OutputFormat::Html => println!("{}", report.to_html(chart.as_ref())?),
        OutputFormat::Json => {
            let payload = report.to_json_value();
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    if let (Some(path), Some(chart)) = (&cli.chart, &chart) {
        fs::write(path, chart.to_svg())
            .with_context(|| format!("failed to write chart to {}", path.display()))?;
        info!(path = %path.display(), "wrote chart");
    }

    if let Some(dir) = &cli.pdf_dir {
        let path = report.write_pdf(dir)?;
        eprintln!("PDF report written to {}", path.display());
    }

    Ok(())
}
