//! Period-aligned control loop.
//!
//! Each cycle asks the strategy side which (symbol, timeframe) pairs are
//! live, and runs one pipeline pass per pair whose period just started.
//! A pass is fetch OHLCV -> backtest -> parse signals at -1 and -2 ->
//! `execute_signal`, all through a fresh `ScopedCallbacks`. Only a pass that
//! succeeds end to end is recorded in the last-run registry.

use chrono::{DateTime, DurationRound, TimeDelta, Timelike, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

use crate::callbacks::{Callbacks, ExchangeCallbacks, StrategyCallbacks};
use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::execution::{execute_signal, ScopedCallbacks, StepOutcome};
use crate::models::OhlcvRequest;
use crate::strategy::{SignalState, StrategyParams};

/// Seconds after a period boundary during which a pass may still start
pub const PERIOD_TOLERANCE_SECS: u32 = 5;

/// Time source for period alignment and last-run stamps
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct TradingBot<C: ?Sized> {
    callbacks: Arc<C>,
    config: BotConfig,
    clock: Clock,
    last_run: Mutex<HashMap<String, DateTime<Utc>>>,
    running: AtomicBool,
    shutdown: Notify,
}

impl<C> TradingBot<C>
where
    C: Callbacks + ?Sized,
{
    pub fn new(callbacks: Arc<C>, config: BotConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            callbacks,
            config,
            clock: Arc::new(Utc::now),
            last_run: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.last_run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_run(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.registry().get(symbol).copied()
    }

    pub fn mark_executed(&self, symbol: &str, at: DateTime<Utc>) {
        self.registry().insert(symbol.to_string(), at);
    }

    /// True at a boundary of the symbol's period (minute of day divisible by the
    /// period, within the first few seconds) that has not been run yet
    pub fn is_new_period(&self, params: &StrategyParams, now: DateTime<Utc>) -> bool {
        let period = params.period_minutes();
        let minute_of_day = now.hour() * 60 + now.minute();

        if minute_of_day % period != 0 || now.second() > PERIOD_TOLERANCE_SECS {
            return false;
        }

        let period_start = now.duration_trunc(TimeDelta::minutes(1)).unwrap_or(now);
        match self.last_run(&params.symbol) {
            Some(last) => last < period_start,
            None => true,
        }
    }

    /// One full pipeline pass for one symbol. Does not touch the registry.
    pub async fn process_symbol(&self, params: &StrategyParams) -> Result<StepOutcome> {
        let proxy = ScopedCallbacks::new(&*self.callbacks, params.symbol.clone());

        let ohlcv = proxy
            .fetch_ohlcv(&OhlcvRequest {
                context: params.context(),
                symbol: params.symbol.clone(),
                timeframe: params.timeframe().to_string(),
                since: None,
                limit: Some(self.config.ohlcv_limit),
                enable_cache: true,
                enable_test: false,
            })
            .await
            .map_err(|e| BotError::exchange("fetch_ohlcv", e))?;

        if ohlcv.is_empty() {
            return Err(BotError::MissingData("fetch_ohlcv"));
        }

        let frame = proxy
            .run_backtest(params, &ohlcv)
            .await
            .map_err(|e| BotError::exchange("run_backtest", e))?;

        let curr = proxy
            .parse_signal(&frame, params, -1)
            .await
            .map_err(|e| BotError::exchange("parse_signal", e))?;
        let prev = proxy
            .parse_signal(&frame, params, -2)
            .await
            .map_err(|e| BotError::exchange("parse_signal", e))?;

        tracing::debug!(
            symbol = %params.symbol,
            bars = ohlcv.len(),
            actions = curr.actions.len(),
            "Signals parsed"
        );

        execute_signal(&proxy, &self.config, params, &curr, &prev).await
    }

    /// Run the execution step alone with explicit signals, through a fresh proxy
    pub async fn execute_step(
        &self,
        params: &StrategyParams,
        curr: &SignalState,
        prev: &SignalState,
    ) -> Result<StepOutcome> {
        let proxy = ScopedCallbacks::new(&*self.callbacks, params.symbol.clone());
        execute_signal(&proxy, &self.config, params, curr, prev).await
    }

    /// One tick: process every aligned symbol once. Returns how many passes succeeded.
    /// Fails only when the strategy list cannot be fetched or is ambiguous.
    pub async fn run_cycle(&self) -> Result<usize> {
        let strategies = self
            .callbacks
            .get_strategy_params()
            .await
            .map_err(|e| BotError::exchange("get_strategy_params", e))?;
        ensure_unique_symbols(&strategies)?;

        let mut succeeded = 0;
        for params in &strategies {
            let now = (self.clock)();
            if !self.is_new_period(params, now) {
                continue;
            }

            tracing::info!(
                symbol = %params.symbol,
                timeframe = %params.timeframe(),
                "Period boundary reached, running pipeline"
            );

            match self.process_symbol(params).await {
                Ok(outcome) => {
                    self.mark_executed(&params.symbol, (self.clock)());
                    succeeded += 1;
                    tracing::info!(symbol = %params.symbol, ?outcome, "Pipeline pass complete");
                }
                Err(e) => {
                    tracing::error!(
                        symbol = %params.symbol,
                        "Pipeline pass failed, will retry next period: {}",
                        e
                    );
                }
            }
        }

        Ok(succeeded)
    }

    /// Loop until `stop()`. An in-flight cycle always runs to completion.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        let interval = Duration::from_secs_f64(self.config.loop_interval_sec);
        tracing::info!(interval_secs = self.config.loop_interval_sec, "Control loop started");

        while self.is_running() {
            if let Err(e) = self.run_cycle().await {
                tracing::error!("Cycle failed: {}", e);
            }

            if !self.is_running() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.notified() => {}
            }
        }

        tracing::info!("Control loop stopped");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// The last-run registry is keyed by symbol, so each symbol may have one strategy
fn ensure_unique_symbols(strategies: &[StrategyParams]) -> Result<()> {
    let mut seen = HashSet::new();
    let duplicates: Vec<&str> = strategies
        .iter()
        .filter(|params| !seen.insert(params.symbol.as_str()))
        .map(|params| params.symbol.as_str())
        .collect();

    if duplicates.is_empty() {
        return Ok(());
    }
    Err(BotError::Config(format!(
        "only one strategy per symbol is allowed, duplicated: {}",
        duplicates.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::mock::MockCallbacks;
    use crate::models::PositionSide;
    use crate::strategy::SignalAction;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, second).unwrap()
    }

    fn fixed(time: DateTime<Utc>) -> Clock {
        Arc::new(move || time)
    }

    fn bot(mock: Arc<MockCallbacks>, now: DateTime<Utc>) -> TradingBot<MockCallbacks> {
        TradingBot::new(mock, BotConfig::default())
            .unwrap()
            .with_clock(fixed(now))
    }

    fn entry_signal(symbol: &str) -> SignalState {
        SignalState::new(
            vec![SignalAction::limit_entry(symbol, PositionSide::Long, 50000.0)],
            false,
        )
    }

    #[test]
    fn test_is_new_period_four_hour_alignment() {
        let bot = bot(Arc::new(MockCallbacks::new()), at(0, 0, 0));
        let four_hour = StrategyParams::new("ohlcv_4h", "BTC/USDT");

        assert!(!bot.is_new_period(&four_hour, at(1, 0, 3)));
        assert!(!bot.is_new_period(&four_hour, at(2, 0, 0)));
        assert!(bot.is_new_period(&four_hour, at(4, 0, 3)));
        assert!(bot.is_new_period(&four_hour, at(0, 0, 0)));
    }

    #[test]
    fn test_is_new_period_daily_alignment() {
        let bot = bot(Arc::new(MockCallbacks::new()), at(0, 0, 0));
        let daily = StrategyParams::new("ohlcv_1d", "BTC/USDT");

        assert!(bot.is_new_period(&daily, at(0, 0, 3)));
        assert!(!bot.is_new_period(&daily, at(1, 0, 3)));
        assert!(!bot.is_new_period(&daily, at(12, 0, 0)));
    }

    #[test]
    fn test_is_new_period_tolerance_window() {
        let bot = bot(Arc::new(MockCallbacks::new()), at(0, 0, 0));
        let params = StrategyParams::new("ohlcv_15m", "BTC/USDT");

        assert!(bot.is_new_period(&params, at(10, 15, 0)));
        assert!(bot.is_new_period(&params, at(10, 15, 5)));
        assert!(!bot.is_new_period(&params, at(10, 15, 6)));
        assert!(!bot.is_new_period(&params, at(10, 16, 0)));
    }

    #[test]
    fn test_is_new_period_once_per_period() {
        let bot = bot(Arc::new(MockCallbacks::new()), at(0, 0, 0));
        let params = StrategyParams::new("ohlcv_15m", "BTC/USDT");

        bot.mark_executed("BTC/USDT", at(10, 15, 1));
        assert!(!bot.is_new_period(&params, at(10, 15, 3)));
        assert!(bot.is_new_period(&params, at(10, 30, 1)));

        // other symbols are tracked independently
        let eth = StrategyParams::new("ohlcv_15m", "ETH/USDT");
        assert!(bot.is_new_period(&eth, at(10, 15, 3)));
    }

    #[tokio::test]
    async fn test_process_symbol_runs_stages_in_order() {
        let mock = Arc::new(MockCallbacks::new());
        mock.set_signal(-1, entry_signal("BTC/USDT"));
        let bot = bot(mock.clone(), at(10, 15, 0));
        let params = StrategyParams::new("trade_1h", "BTC/USDT");

        let outcome = bot.process_symbol(&params).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Executed { .. }));

        let methods = mock.methods();
        assert_eq!(
            &methods[..4],
            &["fetch_ohlcv", "run_backtest", "parse_signal", "parse_signal"]
        );
        assert!(methods.contains(&"create_limit_order"));

        let ohlcv = &mock.payloads("fetch_ohlcv")[0];
        assert_eq!(ohlcv["timeframe"], "1h");
        assert_eq!(ohlcv["limit"], 500);
        assert_eq!(ohlcv["enable_cache"], true);
        assert_eq!(ohlcv["enable_test"], false);

        let indices: Vec<_> = mock
            .payloads("parse_signal")
            .iter()
            .map(|p| p["index"].as_i64().unwrap())
            .collect();
        assert_eq!(indices, vec![-1, -2]);
    }

    #[tokio::test]
    async fn test_run_cycle_marks_success_once_per_period() {
        let mock = Arc::new(MockCallbacks::new());
        mock.set_signal(-1, entry_signal("BTC/USDT"));
        let bot = bot(mock.clone(), at(10, 15, 2));

        assert_eq!(bot.run_cycle().await.unwrap(), 1);
        assert_eq!(bot.last_run("BTC/USDT"), Some(at(10, 15, 2)));

        assert_eq!(bot.run_cycle().await.unwrap(), 0);
        assert_eq!(mock.count("fetch_ohlcv"), 1);
        assert_eq!(mock.count("create_limit_order"), 1);
    }

    #[tokio::test]
    async fn test_run_cycle_skips_unaligned_symbols() {
        let mock = Arc::new(MockCallbacks::new());
        let bot = bot(mock.clone(), at(10, 16, 0));

        assert_eq!(bot.run_cycle().await.unwrap(), 0);
        assert_eq!(mock.count("fetch_ohlcv"), 0);
        assert_eq!(mock.count("get_strategy_params"), 1);
    }

    #[tokio::test]
    async fn test_failed_pass_is_not_marked() {
        let mock = Arc::new(MockCallbacks::new());
        mock.fail("run_backtest", "Engine unavailable");
        let bot = bot(mock.clone(), at(10, 15, 0));

        assert_eq!(bot.run_cycle().await.unwrap(), 0);
        assert_eq!(bot.last_run("BTC/USDT"), None);
        assert_eq!(mock.count("parse_signal"), 0);
    }

    #[tokio::test]
    async fn test_failing_symbol_does_not_block_others() {
        let mock = Arc::new(MockCallbacks::new());
        mock.set_strategy_params(vec![
            StrategyParams::new("ohlcv_15m", "ETH/USDT"),
            StrategyParams::new("ohlcv_15m", "BTC/USDT"),
        ]);
        mock.fail_ohlcv_for("ETH/USDT");
        let bot = bot(mock.clone(), at(10, 15, 0));

        assert_eq!(bot.run_cycle().await.unwrap(), 1);
        assert_eq!(bot.last_run("ETH/USDT"), None);
        assert!(bot.last_run("BTC/USDT").is_some());
    }

    #[tokio::test]
    async fn test_run_cycle_fails_without_strategies() {
        let mock = Arc::new(MockCallbacks::new());
        mock.fail("get_strategy_params", "Discovery offline");
        let bot = bot(mock, at(10, 15, 0));

        let err = bot.run_cycle().await.unwrap_err();
        assert_eq!(err.to_string(), "get_strategy_params failed: Discovery offline");
    }

    #[tokio::test]
    async fn test_run_cycle_rejects_two_strategies_on_one_symbol() {
        let mock = Arc::new(MockCallbacks::new());
        mock.set_strategy_params(vec![
            StrategyParams::new("ohlcv_15m", "BTC/USDT"),
            StrategyParams::new("ohlcv_5m", "BTC/USDT"),
        ]);
        let bot = bot(mock.clone(), at(10, 15, 0));

        let err = bot.run_cycle().await.unwrap_err();
        assert!(matches!(err, BotError::Config(_)));
        assert!(err.to_string().contains("BTC/USDT"));
        assert_eq!(mock.count("fetch_ohlcv"), 0);
        assert_eq!(bot.last_run("BTC/USDT"), None);
    }

    #[test]
    fn test_new_rejects_unusable_loop_interval() {
        for interval in [-1.0, 0.0, f64::NAN, f64::INFINITY] {
            let config = BotConfig {
                loop_interval_sec: interval,
                ..BotConfig::default()
            };
            let result = TradingBot::new(Arc::new(MockCallbacks::new()), config);
            assert!(matches!(result, Err(BotError::Config(_))), "interval {}", interval);
        }
    }

    #[tokio::test]
    async fn test_execute_step_uses_fresh_proxy_each_call() {
        let mock = Arc::new(MockCallbacks::new());
        let bot = bot(mock.clone(), at(10, 15, 0));
        let params = StrategyParams::new("ohlcv_15m", "BTC/USDT");
        let curr = SignalState::new(vec![SignalAction::cancel_all_orders("BTC/USDT")], false);

        bot.execute_step(&params, &curr, &SignalState::empty())
            .await
            .unwrap();
        bot.execute_step(&params, &curr, &SignalState::empty())
            .await
            .unwrap();

        assert_eq!(mock.count("cancel_all_orders"), 2);
    }

    #[tokio::test]
    async fn test_stop_ends_run_loop() {
        let mock = Arc::new(MockCallbacks::new());
        let bot = Arc::new(bot(mock, at(10, 16, 30)));

        let runner = {
            let bot = bot.clone();
            tokio::spawn(async move { bot.run().await })
        };

        while !bot.is_running() {
            tokio::task::yield_now().await;
        }
        bot.stop();

        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("run loop did not stop")
            .unwrap();
        assert!(!bot.is_running());
    }
}
