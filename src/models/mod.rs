pub mod issue;
pub mod result;
pub mod status;

pub use issue::{Issue, Location, Severity};
pub use result::{
    CaseOutcome, RunSummary, SuiteSummary, TestCase, TestFailure, TestSuite, demangle_test_name,
};
pub use status::{OutputLine, ProcessResult, ProcessStatus};
