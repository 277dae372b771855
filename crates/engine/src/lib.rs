pub mod calculator;
pub mod ledger;
pub mod presets;

pub use calculator::{Calculator, Remaining};
pub use ledger::{CapacityLedger, CategoryUtilization, LedgerSnapshot, Release};
pub use presets::Preset;
