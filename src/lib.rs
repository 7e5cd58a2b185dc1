//! Fiado (tab) ledger core.
//!
//! Staff register consumption debts against customers, collect cash against
//! outstanding balances, and manage a small dish catalog. The heart of the
//! crate is [`settlement::settle_payment`]: one tendered amount distributed
//! across a debtor's outstanding debts, oldest first, with exact integer-cent
//! accounting and a per-step durability report when a write-back dies midway.
//!
//! Callers pass identities (debtor, collector) explicitly into every
//! operation; there is no ambient session state in this crate.

use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod catalog;
pub mod customers;
pub mod db;
pub mod debts;
pub mod error;
pub mod models;
pub mod money;
pub mod reports;
pub mod settlement;
pub mod store;

pub use db::DbState;
pub use error::{LedgerError, SettlementReport, StepReport, StoreError};
pub use models::{
    Customer, DateRange, Debt, Dish, NewCustomer, NewDebt, NewDish, NewPayment, Payment,
    PaymentKind,
};
pub use money::Cents;
pub use reports::PeriodTotals;
pub use settlement::{settle_payment, Settlement, SettlementLine};
pub use store::LedgerStore;

/// Initialize structured logging (console + daily rolling file).
///
/// Call once at process start. The appender guard is leaked on purpose:
/// logs flush for the lifetime of the process.
pub fn init_logging(log_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fiado_ledger=debug"));

    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "ledger");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the process — dropping it
    // flushes logs. We leak it intentionally since logging runs until exit.
    std::mem::forget(_guard);

    info!("fiado-ledger v{} logging initialized", env!("CARGO_PKG_VERSION"));
}
