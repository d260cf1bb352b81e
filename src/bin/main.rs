use clap::Parser;
use heatshot::{Error, RawRequest, Runner, Settings};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "heatshot")]
#[command(about = "Capture a liquidation heatmap once it has finished rendering")]
#[command(version)]
struct Cli {
    /// Input record (JSON) with coin, exchange, quoteCurrency, timeRange
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Settings file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Coin symbol, e.g. ETH (overrides input)
    #[arg(long)]
    coin: Option<String>,

    /// Exchange name, e.g. OKX (overrides input)
    #[arg(long)]
    exchange: Option<String>,

    /// Quote currency: USDT, USD or USDC (overrides input)
    #[arg(long)]
    quote: Option<String>,

    /// Time range code: 12h, 24h, 48h, 3d, 1w, 2w, 1M, 3M, 6M, 1y (overrides input)
    #[arg(long)]
    range: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate input and settings without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn request(&self) -> heatshot::Result<RawRequest> {
        let mut raw = match self.input {
            Some(ref path) => RawRequest::load(path)?,
            None => RawRequest::default(),
        };
        if let Some(ref coin) = self.coin {
            raw.coin = Some(coin.clone());
        }
        if let Some(ref exchange) = self.exchange {
            raw.exchange = Some(exchange.clone());
        }
        if let Some(ref quote) = self.quote {
            raw.quote_currency = Some(quote.clone());
        }
        if let Some(ref range) = self.range {
            raw.time_range = Some(range.clone());
        }
        if self.headful {
            raw.headless = Some(false);
        }
        Ok(raw)
    }
}

#[tokio::main]
async fn main() -> heatshot::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    // stdout carries the result record only
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let settings = match cli.config {
        Some(ref path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let raw = cli.request()?;

    if cli.check {
        let request = match raw.resolve() {
            Ok(request) => request,
            Err(e) => invalid(e),
        };
        eprintln!(
            "Input valid: {} {} {}",
            request.exchange,
            request.symbol(),
            request.time_range
        );
        eprintln!("  Target: {}", settings.target.url);
        eprintln!(
            "  Viewport: {}x{} @{}x",
            settings.browser.viewport.width,
            settings.browser.viewport.height,
            settings.browser.device_scale
        );
        eprintln!(
            "  Readiness: {} stable samples every {}ms, timeout {}ms",
            settings.readiness.stable_samples,
            settings.readiness.poll_interval_ms,
            settings.readiness.timeout_ms
        );
        return Ok(());
    }

    let store = heatshot::store::from_config(&settings.storage)?;
    let runner = Runner::new(settings, heatshot::EokaLauncher, store);

    let result = match runner.capture(&raw).await {
        Ok(result) => result,
        Err(e) => invalid(e),
    };

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        std::process::exit(1);
    }

    Ok(())
}

fn invalid(e: Error) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(2);
}
