//! Report execution and data set bookkeeping.

pub mod data_set;
mod report;
pub use data_set::{
    create_data_set, ensure_data_set_tables, get_data_set, release_data_set, DataSet, DataSetTable,
    ReleaseOutcome,
};
pub use report::{Report, ReportService, RowHook};
