//! On-disk artifacts: canonical feature CSVs and JSON datasets/summaries.

mod feature_csv;

pub use feature_csv::{
    read_features_file, write_features, write_features_file, write_json, FEATURE_HEADER,
};
