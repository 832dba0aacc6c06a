//! parlay-edge command line.
//!
//! Loads configuration, initialises structured logging, opens the JSON
//! repository and dispatches one subcommand: odds maths, scoring,
//! settlement, backtesting or weight suggestions.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn};

use parlay_edge::backtest::calibration::Calibrator;
use parlay_edge::backtest::reweight::suggest_weights;
use parlay_edge::backtest::{
    compare_with_baseline, BacktestAggregator, BacktestConfig, BacktestRequest, GroupField,
};
use parlay_edge::config::AppConfig;
use parlay_edge::odds;
use parlay_edge::odds::kelly::KellyCalculator;
use parlay_edge::scoring::{rank_candidates, SignalAggregator};
use parlay_edge::settlement::{closing_line_value, settle_pick, void_pick};
use parlay_edge::storage::{commit_settlement, load_settled_picks, JsonFileRepository, Repository};
use parlay_edge::types::{DateRange, Outcome, PickCandidate};

#[derive(Parser)]
#[command(name = "parlay-edge")]
#[command(version)]
#[command(about = "Odds maths, pick scoring, settlement and backtesting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, env = "PARLAY_EDGE_CONFIG", default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an American price and optionally size a stake
    Odds {
        /// American odds (e.g. -110, +150)
        #[arg(allow_hyphen_values = true)]
        american: i32,
        /// Opposing side's price, for a no-vig fair line
        #[arg(long, allow_hyphen_values = true)]
        opposing: Option<i32>,
        /// Estimated win probability (0-1), for EV and Kelly sizing
        #[arg(long)]
        prob: Option<f64>,
        #[arg(long, default_value = "100")]
        stake: Decimal,
        /// Bankroll for Kelly sizing
        #[arg(long)]
        bankroll: Option<Decimal>,
    },
    /// Combine parlay legs into one price
    Parlay {
        #[arg(required = true, allow_hyphen_values = true)]
        legs: Vec<i32>,
        #[arg(long, default_value = "100")]
        stake: Decimal,
    },
    /// Score stored (or imported) picks and print them ranked
    Score {
        /// JSON array of picks to import before scoring
        #[arg(long)]
        input: Option<String>,
        /// Number of ranked picks to print
        #[arg(long, default_value = "20")]
        top: usize,
    },
    /// Settle a pick from its actual value, or void it
    Settle {
        pick_id: String,
        /// Observed stat value
        #[arg(long, conflicts_with = "void", required_unless_present = "void")]
        actual: Option<f64>,
        /// Void with this reason instead of grading
        #[arg(long)]
        void: Option<String>,
        /// Price taken, for closing-line value
        #[arg(long, allow_hyphen_values = true, requires = "closing")]
        opening: Option<i32>,
        /// Closing price, for closing-line value
        #[arg(long, allow_hyphen_values = true, requires = "opening")]
        closing: Option<i32>,
    },
    /// Replay settled picks over a date range
    Backtest {
        /// First day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
        #[arg(long)]
        category: Option<String>,
        /// Override the configured grouping (comma separated)
        #[arg(long, value_delimiter = ',')]
        group_by: Option<Vec<GroupField>>,
        /// Re-score with the current scoring config
        #[arg(long)]
        rescore: bool,
        /// Prior run id to compare against
        #[arg(long)]
        baseline: Option<String>,
        /// Also print a calibration report
        #[arg(long)]
        calibrate: bool,
    },
    /// Suggest engine weights from settled history
    Reweight,
}

fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Odds { american, opposing, prob, stake, bankroll } => {
            run_odds(&cfg, american, opposing, prob, stake, bankroll)
        }
        Commands::Parlay { legs, stake } => run_parlay(&legs, stake),
        Commands::Score { input, top } => run_score(&cfg, input.as_deref(), top),
        Commands::Settle { pick_id, actual, void, opening, closing } => {
            run_settle(&cfg, &pick_id, actual, void, opening.zip(closing))
        }
        Commands::Backtest { from, to, category, group_by, rescore, baseline, calibrate } => {
            let mut backtest = cfg.backtest.clone();
            if let Some(group_by) = group_by {
                backtest.group_by = group_by;
            }
            backtest.rescore |= rescore;
            run_backtest(&cfg, &backtest, from, to, category, baseline, calibrate)
        }
        Commands::Reweight => run_reweight(&cfg),
    }
}

fn open_repository(cfg: &AppConfig) -> Result<JsonFileRepository> {
    JsonFileRepository::open(&cfg.storage.data_dir)
}

fn run_odds(
    cfg: &AppConfig,
    american: i32,
    opposing: Option<i32>,
    prob: Option<f64>,
    stake: Decimal,
    bankroll: Option<Decimal>,
) -> Result<()> {
    println!("american:  {american:+}");
    println!("decimal:   {:.4}", odds::american_to_decimal(american)?);
    println!("implied:   {:.2}%", odds::implied_probability(american)? * 100.0);
    println!("payout:    {} on {}", odds::compute_payout(stake, american)?, stake);

    if let Some(other) = opposing {
        let (fair, _) = odds::no_vig_probabilities(american, other)?;
        println!("no-vig:    {:.2}%", fair * 100.0);
    }

    if let Some(p) = prob {
        println!("ev/unit:   {:+.4}", odds::expected_value(p, american)?);
        if let Some(bankroll) = bankroll {
            let kelly = KellyCalculator::new(cfg.staking.clone());
            match kelly.size(p, american, bankroll)? {
                Some(s) => println!(
                    "stake:     {} ({:.2}% of bankroll, raw kelly {:.2}%)",
                    s.stake,
                    s.stake_fraction * 100.0,
                    s.kelly_fraction * 100.0
                ),
                None => println!("stake:     none (no edge or below minimum)"),
            }
        }
    }
    Ok(())
}

fn run_parlay(legs: &[i32], stake: Decimal) -> Result<()> {
    let price = odds::combine_parlay_odds(legs)?;
    println!("legs:      {}", legs.len());
    println!("price:     {price:+}");
    println!(
        "implied:   {:.2}%",
        odds::parlay_implied_probability(legs)? * 100.0
    );
    println!("payout:    {} on {}", odds::compute_payout(stake, price)?, stake);
    Ok(())
}

fn run_score(cfg: &AppConfig, input: Option<&str>, top: usize) -> Result<()> {
    let repo = open_repository(cfg)?;
    let mut picks = repo.load_picks()?;

    if let Some(path) = input {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read picks file: {path}"))?;
        let imported: Vec<PickCandidate> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse picks file: {path}"))?;
        info!(count = imported.len(), path, "Imported picks");
        for pick in imported {
            match picks.iter_mut().find(|p| p.id == pick.id) {
                Some(existing) if existing.is_settled() => {
                    warn!(pick_id = %pick.id, "Ignoring import of a settled pick");
                }
                Some(existing) => *existing = pick,
                None => picks.push(pick),
            }
        }
    }

    let aggregator = SignalAggregator::new(cfg.scoring.clone());
    let summary = aggregator.apply_batch(&mut picks);
    repo.save_picks(&picks)?;

    let ranked = rank_candidates(&picks);
    println!(
        "scored {} | blocked {} | no signals {} | settled skipped {}",
        summary.scored, summary.blocked, summary.no_signals, summary.skipped_settled
    );
    for (rank, pick) in ranked.iter().filter(|p| !p.is_settled()).take(top).enumerate() {
        println!("{:>3}. {}", rank + 1, pick);
    }
    Ok(())
}

fn run_settle(
    cfg: &AppConfig,
    pick_id: &str,
    actual: Option<f64>,
    void: Option<String>,
    clv_prices: Option<(i32, i32)>,
) -> Result<()> {
    let repo = open_repository(cfg)?;
    let mut picks = repo.load_picks()?;
    let pick = picks
        .iter_mut()
        .find(|p| p.id == pick_id)
        .with_context(|| format!("No pick with id {pick_id}"))?;

    let now = Utc::now();
    let mut record = match (void, actual) {
        (Some(reason), _) => void_pick(pick, reason, now)?,
        (None, Some(value)) => settle_pick(pick, value, now)?,
        (None, None) => anyhow::bail!("either --actual or --void is required"),
    };

    if let Some((opening, closing)) = clv_prices {
        let clv = closing_line_value(opening, closing, record.outcome == Outcome::Hit)?;
        record = record.with_clv(clv);
    }

    commit_settlement(&repo, &record, &picks)?;

    println!("{pick_id}: {}", record.outcome);
    if let Some(clv) = record.clv {
        println!("clv: {:?} {:+.4}", clv.direction, clv.magnitude);
    }
    Ok(())
}

fn run_backtest(
    cfg: &AppConfig,
    backtest: &BacktestConfig,
    from: NaiveDate,
    to: NaiveDate,
    category: Option<String>,
    baseline: Option<String>,
    calibrate: bool,
) -> Result<()> {
    let end = to
        .checked_add_days(Days::new(1))
        .context("End date out of range")?;
    let range = DateRange::new(
        Utc.from_utc_datetime(&from.and_time(chrono::NaiveTime::MIN)),
        Utc.from_utc_datetime(&end.and_time(chrono::NaiveTime::MIN)),
    );

    let repo = open_repository(cfg)?;
    let settled = load_settled_picks(&repo)?;

    let aggregator = BacktestAggregator::from_config(backtest, &cfg.scoring);
    let run = aggregator.run(
        &settled,
        BacktestRequest {
            run_id: uuid::Uuid::new_v4().to_string(),
            range,
            category: category.clone(),
            baseline_run_id: baseline.clone(),
            completed_at: Utc::now(),
        },
    );
    repo.save_run(&run)?;

    println!("run {} ({})", run.id, run.range);
    println!("{}", run.overall);
    for group in &run.groups {
        println!("  {group}");
    }
    if run.blocked > 0 {
        println!("  {} picks blocked by current rules", run.blocked);
    }

    if let Some(baseline_id) = baseline {
        let cmp = compare_with_baseline(&run, &baseline_id, &repo)?;
        println!("vs {}: {}", cmp.baseline_run_id, cmp.overall);
        for g in &cmp.groups {
            println!("  {}: {}", g.group_key, g.deltas);
        }
    }

    if calibrate {
        let in_range = BacktestAggregator::filter(&settled, &run.range, category.as_deref());
        let report = Calibrator::from_settled(in_range).report();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to render calibration")?
        );
    }
    Ok(())
}

fn run_reweight(cfg: &AppConfig) -> Result<()> {
    let repo = open_repository(cfg)?;
    let settled = load_settled_picks(&repo)?;
    let suggestion = suggest_weights(&settled, &cfg.scoring, &cfg.reweight);

    match suggestion.overall_hit_rate {
        Some(rate) => println!("overall hit rate {:.1}%", rate * 100.0),
        None => println!("no decided picks yet"),
    }
    for acc in &suggestion.engines {
        let current = cfg.scoring.weight_for(&acc.engine).unwrap_or(0.0);
        let suggested = suggestion
            .weights
            .get(&acc.engine)
            .map(|w| format!("{w:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} n={:<5} hit={:>5.1}% weight {:.2} -> {}",
            acc.engine,
            acc.samples,
            acc.hit_rate * 100.0,
            current,
            suggested
        );
    }
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parlay_edge=info"));

    let json_logging = std::env::var("PARLAY_EDGE_LOG_JSON").is_ok();

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
