//! Configuration ingestion
//!
//! Four sources feed the scheduler:
//!
//! | Source | Format | Owner | Required when set |
//! |--------|--------|-------|-------------------|
//! | custom config | nested JSON ([`modern`]) | custom | yes |
//! | built-in config | nested JSON ([`modern`]) | built-in | no |
//! | switch file | `name:on/off` lines ([`legacy`]) | - | yes |
//! | license allow-list | comma/newline list ([`license`]) | - | no |
//!
//! Switch maps are merged per fusion type with first-write-wins precedence:
//! legacy, then custom, then built-in. Priorities come from the custom file
//! first and the built-in file fills gaps.

pub mod legacy;
pub mod license;
pub mod loader;
pub mod modern;
pub mod node;
pub mod switch_map;
pub mod tables;

pub use legacy::parse_legacy;
pub use license::LicenseAllowList;
pub use loader::{ConfigSources, FusionConfig, LoadKey, LoadOutcome, ResolvedPath};
pub use modern::{parse_modern, ModernConfig};
pub use node::ConfigNode;
pub use switch_map::{SwitchLookup, SwitchMap, WILDCARD};
pub use tables::{ExceptionalSet, FusionTables, PriorityEntry, PriorityTable, TableInputs};
