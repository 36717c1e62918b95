//! Priority bands and the per-fusion-type execution order
//!
//! Lower priority runs earlier. Every priority lies in the band selected by
//! the owner type and level of its pass, and values are unique within one
//! fusion type, so [`PriorityRegistry::order_for`] is a total order.

mod band;
mod registry;

pub use band::{band_of, bands, PriorityBand};
pub use registry::PriorityRegistry;
