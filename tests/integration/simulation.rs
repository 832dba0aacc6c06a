//! End-to-end slate simulation.
//!
//! Scores a known slate, settles it, backtests it twice (recorded scores,
//! then re-scored with a stricter rule set) and compares the two runs.

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use parlay_edge::backtest::calibration::Calibrator;
    use parlay_edge::backtest::reweight::{suggest_weights, ReweightConfig};
    use parlay_edge::backtest::{
        compare_with_baseline, BacktestAggregator, BacktestConfig, BacktestRequest, GroupField,
    };
    use parlay_edge::config::AppConfig;
    use parlay_edge::scoring::{rank_candidates, SignalAggregator};
    use parlay_edge::settlement::{closing_line_value, settle_pick, void_pick};
    use parlay_edge::storage::{load_settled_picks, Repository};
    use parlay_edge::types::*;

    use crate::mock_repository::{slate_start, MockRepository};

    const CONFIG: &str = r#"
[[scoring.penalties]]
pattern_type = "tag"
pattern_key = "injury"
severity = "penalize"
penalty_amount = 0.2

[backtest]
group_by = ["category"]
"#;

    /// Same rules plus a block on rushing props.
    const STRICT_CONFIG: &str = r#"
[[scoring.penalties]]
pattern_type = "tag"
pattern_key = "injury"
severity = "penalize"
penalty_amount = 0.2

[[scoring.penalties]]
pattern_type = "prop_type"
pattern_key = "rushing_yards"
severity = "block"

[backtest]
group_by = ["category"]
rescore = true
"#;

    fn settle_time() -> DateTime<Utc> {
        slate_start() + Duration::days(1)
    }

    fn window() -> DateRange {
        DateRange::new(slate_start(), slate_start() + Duration::days(3))
    }

    fn request(id: &str, baseline: Option<&str>) -> BacktestRequest {
        BacktestRequest {
            run_id: id.to_string(),
            range: window(),
            category: None,
            baseline_run_id: baseline.map(str::to_string),
            completed_at: settle_time() + Duration::days(1),
        }
    }

    /// Score the slate and persist composites.
    fn score_slate(repo: &MockRepository, cfg: &AppConfig) -> Vec<PickCandidate> {
        let mut picks = repo.load_picks().unwrap();
        let summary = SignalAggregator::new(cfg.scoring.clone()).apply_batch(&mut picks);
        assert_eq!(summary.scored, 8);
        assert_eq!(summary.blocked, 0);
        repo.save_picks(&picks).unwrap();
        picks
    }

    /// Grade every pick: 5 hits, 2 misses, 1 void.
    fn settle_slate(repo: &MockRepository) {
        let mut picks = repo.load_picks().unwrap();
        let results = [
            ("nba-1", Some(30.0)),
            ("nba-2", Some(12.0)),
            ("nba-3", Some(7.0)),
            ("nba-4", None),
            ("nfl-1", Some(260.0)),
            ("nfl-2", Some(40.0)),
            ("nfl-3", Some(3.0)),
            ("nfl-4", Some(70.0)),
        ];

        for (id, actual) in results {
            let pick = picks.iter_mut().find(|p| p.id == id).unwrap();
            let record = match actual {
                Some(value) => settle_pick(pick, value, settle_time()).unwrap(),
                None => void_pick(pick, "did not play", settle_time()).unwrap(),
            };
            repo.save_settlement(&record).unwrap();
        }
        repo.save_picks(&picks).unwrap();
    }

    #[test]
    fn test_scoring_and_ranking() {
        let repo = MockRepository::with_default_slate();
        let cfg = AppConfig::parse(CONFIG).unwrap();
        let picks = score_slate(&repo, &cfg);

        let nfl4 = picks.iter().find(|p| p.id == "nfl-4").unwrap();
        assert!((nfl4.composite_score.unwrap() - 65.0).abs() < 1e-9);
        assert_eq!(nfl4.confidence_tier, Some(ConfidenceTier::Strong));
        assert!(picks.iter().all(|p| p.contributing_engines == Some(2)));

        let ranked: Vec<_> = rank_candidates(&picks).into_iter().map(|p| p.id).collect();
        assert_eq!(
            ranked,
            vec!["nba-1", "nfl-1", "nba-2", "nfl-3", "nfl-4", "nba-3", "nfl-2", "nba-4"]
        );
    }

    #[test]
    fn test_full_cycle() {
        let repo = MockRepository::with_default_slate();
        let cfg = AppConfig::parse(CONFIG).unwrap();
        score_slate(&repo, &cfg);
        settle_slate(&repo);

        let settled = load_settled_picks(&repo).unwrap();
        assert_eq!(settled.len(), 8);

        // Baseline: recorded scores, grouped by category.
        let baseline = BacktestAggregator::from_config(&cfg.backtest, &cfg.scoring)
            .run(&settled, request("run-a", None));
        repo.save_run(&baseline).unwrap();

        assert_eq!(baseline.overall.hits, 5);
        assert_eq!(baseline.overall.misses, 2);
        assert_eq!(baseline.overall.voids, 1);
        assert_eq!(baseline.overall.staked, Decimal::from(7));
        assert!(baseline.overall.units > Decimal::ZERO);
        let keys: Vec<_> = baseline.groups.iter().map(|g| g.group_key.as_str()).collect();
        assert_eq!(keys, vec!["category=NBA", "category=NFL"]);
        assert_eq!(baseline.groups[0].voids, 1);
        assert_eq!(baseline.groups[1].hit_rate, Some(0.75));

        // Candidate: a stricter rule set drops the rushing prop.
        let strict = AppConfig::parse(STRICT_CONFIG).unwrap();
        let candidate = BacktestAggregator::from_config(&strict.backtest, &strict.scoring)
            .run(&settled, request("run-b", Some("run-a")));
        repo.save_run(&candidate).unwrap();

        assert_eq!(candidate.blocked, 1);
        assert_eq!(candidate.overall.hits, 4);
        assert!(candidate.config.scoring.is_some());

        let cmp = compare_with_baseline(&candidate, "run-a", &repo).unwrap();
        assert_eq!(cmp.overall.total_picks, -1);
        assert_eq!(cmp.overall.hits, -1);
        assert_eq!(cmp.overall.misses, 0);
        assert_eq!(cmp.groups.len(), 2);
        assert_eq!(cmp.groups[0].deltas.total_picks, 0);
        assert_eq!(cmp.groups[1].deltas.hits, -1);
        assert!(cmp.only_in_current.is_empty());
        assert!(cmp.only_in_baseline.is_empty());

        // Run ids are unique.
        assert!(matches!(repo.save_run(&candidate), Err(EdgeError::Storage(_))));
    }

    #[test]
    fn test_settled_picks_are_immutable() {
        let repo = MockRepository::with_default_slate();
        let cfg = AppConfig::parse(CONFIG).unwrap();
        score_slate(&repo, &cfg);
        settle_slate(&repo);

        let mut picks = repo.load_picks().unwrap();
        let pick = picks.iter_mut().find(|p| p.id == "nba-1").unwrap();
        assert_eq!(pick.outcome, Outcome::Hit);

        let scorer = SignalAggregator::new(cfg.scoring.clone());
        assert!(matches!(scorer.apply(pick), Err(EdgeError::AlreadySettled { .. })));
        assert!(matches!(
            settle_pick(pick, 10.0, settle_time()),
            Err(EdgeError::AlreadySettled { .. })
        ));

        let mut regrade = SettlementRecord::pending("nba-1");
        regrade.resolve(Outcome::Miss, settle_time()).unwrap();
        assert_eq!(
            repo.save_settlement(&regrade),
            Err(EdgeError::AlreadySettled { pick_id: "nba-1".into(), outcome: Outcome::Hit })
        );
    }

    #[test]
    fn test_closing_line_value_recorded() {
        let repo = MockRepository::with_default_slate();
        let mut picks = repo.load_picks().unwrap();
        let pick = picks.iter_mut().find(|p| p.id == "nba-1").unwrap();

        let record = settle_pick(pick, 30.0, settle_time()).unwrap();
        let clv = closing_line_value(-110, -130, record.outcome == Outcome::Hit).unwrap();
        let record = record.with_clv(clv);
        repo.save_settlement(&record).unwrap();

        let stored = repo.load_settlements().unwrap();
        let clv = stored[0].clv.unwrap();
        assert_eq!(clv.direction, ClvDirection::Positive);
        assert!(clv.side_won);
    }

    #[test]
    fn test_calibration_and_reweight() {
        let repo = MockRepository::with_default_slate();
        let cfg = AppConfig::parse(CONFIG).unwrap();
        score_slate(&repo, &cfg);
        settle_slate(&repo);
        let settled = load_settled_picks(&repo).unwrap();

        let report = Calibrator::from_settled(&settled).report();
        assert_eq!(report.total_points, 7);
        assert!(report.overall_brier.is_some());
        assert_eq!(report.category_brier.len(), 2);

        let suggestion = suggest_weights(
            &settled,
            &cfg.scoring,
            &ReweightConfig { min_samples: 1, ..ReweightConfig::default() },
        );
        // Every pick carries both engines, so both track the overall rate.
        assert_eq!(suggestion.overall_hit_rate, Some(5.0 / 7.0));
        assert_eq!(suggestion.weights.get("form"), Some(&1.0));
        assert_eq!(suggestion.weights.get("matchup"), Some(&1.0));
    }

    #[test]
    fn test_storage_failure_surfaces() {
        let repo = MockRepository::with_default_slate();
        repo.set_error("simulated disk failure");

        let aggregator = BacktestAggregator::new(vec![GroupField::Tier]);
        let result = load_settled_picks(&repo).map(|s| aggregator.run(&s, request("x", None)));
        assert!(matches!(result, Err(EdgeError::Storage(_))));

        let run = BacktestAggregator::from_config(&BacktestConfig::default(), &Default::default())
            .run(&[], request("empty", None));
        assert_eq!(run.overall.total_picks, 0);
        assert_eq!(run.overall.hit_rate, None);
        assert!(compare_with_baseline(&run, "missing", &repo).is_err());
    }
}
