//! KAT — Kalshi Algorithmic Trading console.
//!
//! Entry point. Loads configuration, initialises structured logging and
//! runs one of the console surfaces until it finishes or Ctrl+C is pressed.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kat::client::dashboard::DashboardClient;
use kat::client::pipeline::PipelineClient;
use kat::client::{DashboardApi, PipelineApi};
use kat::config::AppConfig;
use kat::dashboard::orders::{FormStatus, OrderForm};
use kat::dashboard::proxy::{spawn_proxy, ProxyState};
use kat::dashboard::{MarketsPage, NewsPage, OverviewPage, QueryClient};
use kat::feed::demo::DemoFeed;
use kat::opener::glitch::Canvas;
use kat::opener::host::{OpenerHost, Window};
use kat::opener::{Opener, Viewport};
use kat::site::controls::{ControlPanel, LiveViews};
use kat::site::MainSite;
use kat::types::OrderSide;

const BANNER: &str = r#"
 _  __    _  _____
| |/ /   / \|_   _|
| ' /   / _ \ | |
| . \  / ___ \| |
|_|\_\/_/   \_\_|

  Kalshi Algorithmic Trading
"#;

#[derive(Parser)]
#[command(name = "kat", version, about = "KAT console: opener, live site and dashboard")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the opener headless until it completes.
    Opener,
    /// Opener, then the main site with its live views.
    Site {
        #[arg(long)]
        skip_opener: bool,
        /// Seconds between page renders.
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
        render_every: u64,
    },
    /// Dashboard pages plus the backend proxy.
    Dashboard {
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
        render_every: u64,
    },
    /// Submit one limit order.
    Order {
        #[arg(long)]
        ticker: String,
        #[arg(long, default_value = "yes")]
        side: OrderSide,
        #[arg(long, default_value = "1")]
        count: String,
        #[arg(long, default_value = "50")]
        price: String,
    },
    /// Send the credentials named in the config to the pipeline.
    Configure,
    /// Set the buy ceiling and profit target, in cents.
    Thresholds {
        #[arg(long)]
        max_buy: i64,
        #[arg(long)]
        profit_target: i64,
    },
    /// Start the pipeline.
    Start,
    /// Pause the pipeline.
    Pause,
    /// Start the pipeline if paused, pause it if running.
    Toggle,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load_or_default(&cli.config)?;
    init_logging();

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received.");
                shutdown.cancel();
            }
        });
    }

    match cli.command {
        Command::Opener => {
            run_opener(&cfg, &shutdown).await?;
        }
        Command::Site {
            skip_opener,
            render_every,
        } => {
            println!("{BANNER}");
            if !skip_opener && !run_opener(&cfg, &shutdown).await? {
                return Ok(());
            }
            run_site(&cfg, Duration::from_secs(render_every), &shutdown).await?;
        }
        Command::Dashboard { render_every } => {
            println!("{BANNER}");
            run_dashboard(&cfg, Duration::from_secs(render_every), &shutdown).await?;
        }
        Command::Order {
            ticker,
            side,
            count,
            price,
        } => {
            let api: Arc<dyn DashboardApi> = Arc::new(DashboardClient::from_config(&cfg.backend)?);
            let queries = QueryClient::from_config(api.clone(), &cfg.dashboard);
            let mut form = OrderForm::new();
            form.ticker = ticker;
            form.side = side;
            form.set_count_input(&count);
            form.set_price_input(&price);

            let status = form.submit(api.as_ref(), &queries).await;
            println!("{}", form.message());
            if status != FormStatus::Success {
                bail!("order not placed");
            }
        }
        Command::Configure => {
            let credentials = cfg.credentials.from_env()?;
            let resp = control_panel(&cfg)?.configure(&credentials).await?;
            println!("configured: {}", resp.configured);
            if !resp.configured {
                bail!("backend reports pipeline unconfigured");
            }
        }
        Command::Thresholds {
            max_buy,
            profit_target,
        } => {
            let held = control_panel(&cfg)?
                .submit_thresholds(max_buy, profit_target)
                .await?;
            println!(
                "max buy {}¢, profit target {}¢",
                held.max_buy_price, held.profit_target_cents
            );
        }
        Command::Start => {
            control_panel(&cfg)?.start().await?;
            println!("pipeline started");
        }
        Command::Pause => {
            control_panel(&cfg)?.pause().await?;
            println!("pipeline paused");
        }
        Command::Toggle => {
            let api = Arc::new(PipelineClient::from_config(&cfg.backend)?);
            let status = api.status().await?;
            ControlPanel::new(api).toggle(&status).await?;
            println!("pipeline {}", if status.running { "paused" } else { "started" });
        }
    }

    info!("KAT shut down cleanly.");
    Ok(())
}

fn control_panel(cfg: &AppConfig) -> Result<ControlPanel> {
    Ok(ControlPanel::new(Arc::new(PipelineClient::from_config(&cfg.backend)?)))
}

/// Run the opener to completion. Returns false when interrupted.
async fn run_opener(cfg: &AppConfig, shutdown: &CancellationToken) -> Result<bool> {
    let viewport = Viewport::new(cfg.opener.width, cfg.opener.height);
    let window = Window::new(viewport);
    let (done_tx, done_rx) = oneshot::channel();

    let host = OpenerHost::spawn(
        Opener::from_config(&cfg.opener),
        Canvas::new(viewport),
        &window,
        move || {
            let _ = done_tx.send(());
        },
    );

    let mut hud = host.hud();
    let mut last_phase = hud.borrow().phase;
    tokio::pin!(done_rx);
    let completed = loop {
        tokio::select! {
            biased;
            _ = &mut done_rx => break true,
            _ = shutdown.cancelled() => {
                host.skip();
                break false;
            }
            changed = hud.changed() => {
                if changed.is_err() {
                    break false;
                }
                let snapshot = hud.borrow_and_update().clone();
                if snapshot.phase != last_phase {
                    last_phase = snapshot.phase;
                    info!(phase = ?snapshot.phase, frames = snapshot.frames, "{snapshot}");
                }
            }
        }
    };

    let canvas = host.join().await?;
    info!(
        completed,
        luminance = format!("{:.3}", canvas.mean_luminance()),
        "Opener finished"
    );
    Ok(completed && !shutdown.is_cancelled())
}

async fn run_site(cfg: &AppConfig, render_every: Duration, shutdown: &CancellationToken) -> Result<()> {
    let api = Arc::new(PipelineClient::from_config(&cfg.backend)?);
    info!(base = %api.base(), "Main site live views starting");

    let views = LiveViews::spawn(api, &cfg.feed, shutdown);
    let (demo, demo_task) =
        DemoFeed::new(cfg.feed.demo_cap).spawn(cfg.feed.demo_interval(), shutdown.clone());
    let site = MainSite::new();

    let mut ticker = tokio::time::interval(render_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let trades = demo.borrow().clone();
                println!("{}", site.render(&trades));
                println!("{}", views.render(20));
            }
        }
    }

    views.stop();
    if let Err(e) = demo_task.await {
        warn!(error = %e, "Demo feed task failed");
    }
    Ok(())
}

async fn run_dashboard(
    cfg: &AppConfig,
    render_every: Duration,
    shutdown: &CancellationToken,
) -> Result<()> {
    let proxy_state = Arc::new(ProxyState::new(cfg.backend.dashboard_base.clone())?);
    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.dashboard.proxy_port));
    let proxy = spawn_proxy(proxy_state, addr, shutdown.clone()).await?;

    let api: Arc<dyn DashboardApi> = Arc::new(DashboardClient::from_config(&cfg.backend)?);
    let queries = QueryClient::from_config(api, &cfg.dashboard);
    let refresh = queries.spawn_ticker_refresh(cfg.feed.tickers_interval(), shutdown.clone());

    let mut ticker = tokio::time::interval(render_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                println!("{}", OverviewPage::load(&queries, cfg.dashboard.overview_news_limit).await.render());
                println!("{}", MarketsPage::load(&queries).await.render());
                println!("{}", NewsPage::load(&queries, cfg.dashboard.news_limit).await.render());
            }
        }
    }

    if let Err(e) = refresh.await {
        warn!(error = %e, "Ticker refresh task failed");
    }
    match proxy.task.await {
        Ok(result) => result?,
        Err(e) => warn!(error = %e, "Proxy task failed"),
    }
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kat=info"));

    let json_logging = std::env::var("KAT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
