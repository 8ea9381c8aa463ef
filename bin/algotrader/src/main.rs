mod menu;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    cfg_as_dict, get_configuration_files, load_risk_parameters, Config, ExchangeClient,
    MarketFeed, RawConfig, RiskParameters, TradeConfig, TradingMode,
};
use engine::{BybitClient, BybitFeed, CandleLifecycle, Trader};
use menu::{is_stop_command, Action, Console};
use paper::PaperClient;
use strategy::{Strategy, StrategyRegistry};

struct Session {
    trade_config: Arc<TradeConfig>,
    client: Arc<dyn ExchangeClient>,
    feed: Arc<dyn MarketFeed>,
    risk: RiskParameters,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading configuration")?;
    let risk = load_risk_parameters(&cfg.risk_config_path).context("loading risk parameters")?;
    let trade_config = Arc::new(cfg.trade_config());
    info!(mode = %cfg.trading_mode, instrument = %trade_config, "Algotrader starting");

    // ── Exchange (injected based on TRADING_MODE) ─────────────────────────────
    let client: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!(rest_url = %cfg.rest_url, "Live trading mode, orders go to Bybit");
            Arc::new(BybitClient::new(
                &cfg.rest_url,
                cfg.credentials.clone(),
                cfg.recv_window,
            )?)
        }
        TradingMode::Paper => {
            info!(
                slippage_bps = cfg.paper_slippage_bps,
                "Paper trading mode, fills are simulated"
            );
            let market_data = BybitClient::new(&cfg.rest_url, None, cfg.recv_window)?;
            Arc::new(
                PaperClient::new(cfg.paper_slippage_bps).with_market_data(Arc::new(market_data)),
            )
        }
    };
    let feed: Arc<dyn MarketFeed> = Arc::new(BybitFeed::new(&cfg.ws_url, &cfg.channel));

    let session = Session {
        trade_config,
        client,
        feed,
        risk,
    };
    let mut console = Console::new();

    while let Some(strategy) = select_strategy(&mut console, &cfg.strategies_dir, &session).await? {
        let actions: Vec<String> = Action::ALL.iter().map(|a| a.label().to_string()).collect();
        let Some(choice) = console.choose("Select an action", &actions, Some(1)).await? else {
            break;
        };
        match Action::ALL[choice] {
            Action::Exit => break,
            Action::Backtest => {
                let run = backtest::run_backtest(
                    strategy.as_ref(),
                    session.client.as_ref(),
                    backtest::DEFAULT_BARS,
                );
                match run.await {
                    Ok((report, _)) => println!("{report}"),
                    Err(e) => error!(strategy = %strategy.name(), error = %e, "Backtest failed"),
                }
            }
            Action::Execute => execute(&mut console, &session, strategy).await?,
        }
    }

    info!("Algotrader exiting");
    Ok(())
}

/// Strategy, then parameter file, then construction. Construction errors
/// return to the strategy prompt. `None` once stdin closes.
async fn select_strategy(
    console: &mut Console,
    strategies_dir: &Path,
    session: &Session,
) -> anyhow::Result<Option<Arc<dyn Strategy>>> {
    let entries = StrategyRegistry::enabled(strategies_dir.join("strategies.ini"))?;
    if entries.is_empty() {
        bail!("no strategies enabled in {}", strategies_dir.display());
    }
    let labels: Vec<String> = entries
        .iter()
        .map(|e| format!("{} ({})", e.name, e.key))
        .collect();

    loop {
        let Some(choice) = console.choose("Select a strategy", &labels, Some(0)).await? else {
            return Ok(None);
        };
        let key = entries[choice].key;

        let cfg_dir = strategies_dir.join(key).join("cfg");
        let files = if cfg_dir.is_dir() {
            get_configuration_files(&cfg_dir)
                .unwrap_or_else(|e| {
                    warn!(strategy = %key, error = %e, "Could not list configuration files");
                    None
                })
                .filter(|files| !files.is_empty())
        } else {
            None
        };
        let raw: Option<RawConfig> = match files {
            None => {
                info!(
                    strategy = %key,
                    dir = %cfg_dir.display(),
                    "No configuration files, using defaults"
                );
                None
            }
            Some(files) => {
                let chosen = console
                    .choose("Select a configuration file", &files, Some(0))
                    .await?;
                let Some(file) = chosen else {
                    return Ok(None);
                };
                match cfg_as_dict(cfg_dir.join(&files[file])) {
                    Ok(raw) => Some(raw),
                    Err(e) => {
                        warn!(
                            strategy = %key,
                            error = %e,
                            "Unreadable configuration file, using defaults"
                        );
                        None
                    }
                }
            }
        };

        match StrategyRegistry::build(key, session.trade_config.clone(), raw.as_ref()) {
            Ok(strategy) => return Ok(Some(strategy)),
            Err(e) => error!(strategy = %key, error = %e, "Strategy construction failed"),
        }
    }
}

/// Run the lifecycle until `q`, `stop`, Ctrl-C or end of input.
async fn execute(
    console: &mut Console,
    session: &Session,
    strategy: Arc<dyn Strategy>,
) -> anyhow::Result<()> {
    let trader = Trader::new(strategy, session.client.clone(), session.risk.clone());
    trader.prepare().await;
    let lifecycle = CandleLifecycle::new(
        session.feed.clone(),
        Arc::new(trader),
        session.trade_config.clone(),
    );
    if let Err(e) = lifecycle.start().await {
        error!(error = %e, "Could not start execution");
        return Ok(());
    }
    println!("Running. Type 'q' or 'stop' to return to the menu.");

    loop {
        tokio::select! {
            line = console.next_line() => match line {
                Ok(Some(line)) if is_stop_command(&line) => break,
                Ok(Some(_)) => println!("Type 'q' or 'stop' to return to the menu."),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Console read failed");
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Ctrl-C handler failed");
                }
                break;
            }
        }
    }

    lifecycle.stop().await;
    Ok(())
}
