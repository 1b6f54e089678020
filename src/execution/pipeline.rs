// Check -> size -> execute for one symbol's signal pair
use crate::callbacks::ExchangeCallbacks;
use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::execution::executor::{ActionExecutor, ActionOutcome};
use crate::execution::runtime_checks::{
    should_trigger_orphan_check, EntryDecision, MinOrderCheck, RuntimeChecks,
};
use crate::strategy::{SignalState, StrategyParams};

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The current signal carried nothing to do
    NoActions,
    /// Entries were dropped and nothing else remained
    EntriesSkipped { reason: String },
    /// Actions ran; `entry_skip` is set when entries were dropped first
    Executed {
        outcomes: Vec<ActionOutcome>,
        entry_skip: Option<String>,
    },
}

/// Price used for sizing when the entry carries none
async fn reference_price<C>(callbacks: &C, params: &StrategyParams) -> Result<f64>
where
    C: ExchangeCallbacks + ?Sized,
{
    let tickers = callbacks
        .fetch_tickers(&params.context(), Some(&params.symbol))
        .await
        .map_err(|e| BotError::exchange("fetch_tickers", e))?;

    tickers
        .tickers
        .get(&params.symbol)
        .and_then(|ticker| ticker.reference_price())
        .filter(|price| *price > 0.0)
        .ok_or_else(|| BotError::InvalidTickerPrice(params.symbol.clone()))
}

/// Run one signal through the runtime checks and the executor.
///
/// `callbacks` should be the pass's `ScopedCallbacks` so repeated position
/// lookups and cancels collapse. When the signal both closes and re-enters
/// (a reversal), the duplicate-entry gate is bypassed: the existing position
/// is about to be closed by the signal itself.
pub async fn execute_signal<C>(
    callbacks: &C,
    config: &BotConfig,
    params: &StrategyParams,
    curr: &SignalState,
    prev: &SignalState,
) -> Result<StepOutcome>
where
    C: ExchangeCallbacks + ?Sized,
{
    if curr.actions.is_empty() {
        tracing::debug!(symbol = %params.symbol, "No actions in current signal");
        return Ok(StepOutcome::NoActions);
    }

    let checks = RuntimeChecks::new(callbacks);

    if should_trigger_orphan_check(curr, prev) {
        checks.orphan_order_check(params).await?;
    }

    let mut actions = curr.actions.clone();
    let mut calculated_amount = None;
    let mut entry_skip = None;

    if let Some(entry) = curr.first_entry() {
        let side = entry.side.ok_or_else(|| BotError::MissingField {
            action: entry.action_type.clone(),
            field: "side",
        })?;

        let mut skip = None;

        if !curr.has_close_position() {
            if let EntryDecision::Skip { reason } =
                checks.duplicate_entry_check(params, side).await?
            {
                skip = Some(reason);
            }
        }

        if skip.is_none() {
            let entry_price = match entry.price {
                Some(price) if price > 0.0 => price,
                _ => reference_price(callbacks, params).await?,
            };

            let amount = checks.calculate_order_amount(params, entry_price).await?;
            match checks.min_order_check(params, amount).await? {
                MinOrderCheck::Pass => calculated_amount = Some(amount),
                MinOrderCheck::Fail { amount, min_amount } => {
                    skip = Some(format!(
                        "amount {} below minimum {}",
                        amount, min_amount
                    ));
                }
            }
        }

        if let Some(reason) = skip {
            actions = curr.without_entries();
            if actions.is_empty() {
                tracing::info!(symbol = %params.symbol, reason = %reason, "Entry skipped, nothing left to execute");
                return Ok(StepOutcome::EntriesSkipped { reason });
            }
            tracing::info!(
                symbol = %params.symbol,
                reason = %reason,
                remaining = actions.len(),
                "Entry skipped, executing remaining actions"
            );
            entry_skip = Some(reason);
        }
    }

    let outcomes = ActionExecutor::new(callbacks, config.entry_order_type)
        .execute_actions(params, &actions, calculated_amount)
        .await?;

    Ok(StepOutcome::Executed {
        outcomes,
        entry_skip,
    })
}
