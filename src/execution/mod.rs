// Signal execution: scoped proxy, runtime checks, action executor
pub mod executor;
pub mod pipeline;
pub mod proxy;
pub mod runtime_checks;

pub use executor::{new_client_order_id, ActionExecutor, ActionOutcome, ActionStatus};
pub use pipeline::{execute_signal, StepOutcome};
pub use proxy::ScopedCallbacks;
pub use runtime_checks::{
    quantize_amount, should_trigger_orphan_check, EntryDecision, MinOrderCheck, RuntimeChecks,
};
