//! Output accounting (C2) and process supervision (C3), §4.2–§4.3.

pub mod accountant;
pub mod supervisor;

pub use accountant::AccountingLimits;
pub use accountant::Accountant;
pub use accountant::Truncation;
pub use accountant::TruncationKind;
pub use supervisor::Outcome;
pub use supervisor::PrecheckError;
pub use supervisor::SupervisedRun;
pub use supervisor::precheck;
pub use supervisor::run;
