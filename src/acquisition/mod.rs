//! Energy data acquisition
//!
//! File loading (CSV / JSON / text) and the resample-and-fill preparation
//! that turns raw machine logs into a gap-free `SignalTable`.

pub mod loader;
pub mod preprocess;

pub use loader::{load_signal, load_signal_auto, parse_timestamp, DataFormat, LoadError, LoadOptions};
pub use preprocess::{
    data_info, preprocess, resample, validate_data, DataInfo, DataValidation, PreprocessError,
};
