pub mod visit;

pub use visit::{
    normalize_country, CounterRow, DedupRecord, DeviceClass, DeviceTotals, Dimension,
    VisitTotals, TOTAL_KEY, UNKNOWN_COUNTRY,
};
