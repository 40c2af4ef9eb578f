// Request/Response models
pub mod bonus_entry_ext; // Extension methods for entity::bonus_entries
pub mod ledger;
