use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use turtle_engine::indicators::Indicators;
use turtle_engine::models::{Bar, RunStatus};
use turtle_engine::performance::PerformanceCalculator;
use turtle_engine::{BacktestEngine, PriceSeries, StrategyConfig};

const CAPITAL: f64 = 50_000.0;

/// One step of a bounded random walk: close-to-close return, overnight gap,
/// and how far the high and low stretch beyond the body.
type Step = (f64, f64, f64, f64);

fn step_strategy() -> impl Strategy<Value = Step> {
    (-0.04f64..0.04, -0.015f64..0.015, 0.0f64..0.02, 0.0f64..0.02)
}

/// `scale` shrinks every move, down to near-flat series whose ATR is a tiny
/// fraction of price.
fn build_series(start_price: f64, scale: f64, steps: &[Step]) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let mut prev_close = start_price;
    let bars = steps
        .iter()
        .enumerate()
        .map(|(i, (ret, gap, up, down))| {
            let open = prev_close * (1.0 + gap * scale);
            let close = prev_close * (1.0 + ret * scale);
            let high = open.max(close) * (1.0 + up * scale);
            let low = open.min(close) * (1.0 - down * scale);
            prev_close = close;
            Bar {
                date: start + Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume: 2_500_000.0,
            }
        })
        .collect();
    PriceSeries::new(bars).expect("random walk bars are well formed")
}

fn conservative_config() -> impl Strategy<Value = StrategyConfig> {
    (
        3usize..25,
        3usize..25,
        2usize..15,
        2usize..15,
        1.0f64..=4.0,
        0.005f64..=0.05,
        any::<bool>(),
        5usize..21,
    )
        .prop_map(
            |(
                long_breakout,
                short_breakout,
                long_exit,
                short_exit,
                stop_loss_atr,
                risk_per_trade,
                use_trailing_stop,
                atr_period,
            )| StrategyConfig {
                long_breakout,
                short_breakout,
                long_exit,
                short_exit,
                stop_loss_atr,
                risk_per_trade,
                use_trailing_stop,
                atr_period,
                ..StrategyConfig::default()
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replay_invariants_hold(
        start_price in 20.0f64..300.0,
        scale in prop_oneof![0.0005f64..0.01, 0.01f64..1.0],
        steps in prop::collection::vec(step_strategy(), 30..160),
        config in conservative_config(),
    ) {
        let series = build_series(start_price, scale, &steps);
        let engine = BacktestEngine::new(config).unwrap();
        let result = engine.run(&series, CAPITAL).unwrap();

        prop_assert_eq!(result.status, RunStatus::Complete);
        prop_assert_eq!(result.equity_curve.len(), series.len());
        prop_assert!(result.open_position.is_none());

        for point in &result.equity_curve {
            prop_assert!(point.equity >= 0.0, "equity {} on {}", point.equity, point.date);
        }

        prop_assert!(result.summary.max_drawdown >= 0.0);
        prop_assert!(result.summary.max_drawdown <= 100.0);

        let mut realized = 0.0;
        for (i, trade) in result.trades.iter().enumerate() {
            prop_assert_eq!(trade.id, i as u64 + 1);
            prop_assert!(trade.exit_date > trade.entry_date);
            prop_assert!(trade.quantity > 0);
            realized += trade.pnl;
        }
        for pair in result.trades.windows(2) {
            prop_assert!(pair[1].entry_date >= pair[0].exit_date);
        }

        let final_equity = result.summary.final_equity;
        prop_assert!((final_equity - (CAPITAL + realized)).abs() < 1e-6 * CAPITAL);

        let again = engine.run(&series, CAPITAL).unwrap();
        prop_assert_eq!(result, again);
    }

    #[test]
    fn channels_and_atr_are_well_ordered(
        steps in prop::collection::vec(step_strategy(), 1..120),
        config in conservative_config(),
    ) {
        let series = build_series(100.0, 1.0, &steps);
        let indicators = Indicators::compute(&series, &config);
        prop_assert_eq!(indicators.len(), series.len());

        for i in 0..indicators.len() {
            let snapshot = indicators.snapshot(i).unwrap();
            if let Some(atr) = snapshot.atr {
                prop_assert!(atr >= 0.0);
            }
            if let (Some(high), Some(low)) = (snapshot.entry_high, snapshot.exit_low) {
                let window = config.long_breakout.min(config.long_exit);
                let bars = &series.bars()[i + 1 - window..=i];
                prop_assert!(high >= low);
                prop_assert!(bars.iter().all(|bar| bar.high <= high));
                prop_assert!(bars.iter().all(|bar| bar.low >= low));
            }
        }
    }

    #[test]
    fn increasing_equity_has_zero_drawdown(
        start in 1_000.0f64..1_000_000.0,
        gains in prop::collection::vec(0.0001f64..0.05, 1..200),
    ) {
        let mut equity = start;
        let start_date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let curve: Vec<_> = std::iter::once(start)
            .chain(gains.iter().map(|gain| {
                equity *= 1.0 + gain;
                equity
            }))
            .enumerate()
            .map(|(i, value)| turtle_engine::models::EquityPoint {
                date: start_date + Duration::days(i as i64),
                equity: value,
                benchmark_equity: value,
                cash: value,
                positions_value: 0.0,
                open_positions: 0,
            })
            .collect();
        let info = PerformanceCalculator::calculate_max_drawdown(&curve);
        prop_assert_eq!(info.max_drawdown_percent, 0.0);
        prop_assert_eq!(info.max_drawdown, 0.0);
    }
}
