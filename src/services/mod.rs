// Service modules
pub mod balance_service;
pub mod entry_store;
pub mod expiration_sweeper;
pub mod ledger_service;
pub mod spend_engine;

pub use balance_service::BalanceService;
pub use entry_store::BonusEntryStore;
pub use expiration_sweeper::ExpirationSweeper;
pub use ledger_service::LedgerService;
pub use spend_engine::SpendEngine;
