use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use std::path::Path;

use crate::runner::TestReport;
use crate::{TbError, TbResult};

pub(crate) fn create_junit_xml(report: &TestReport, suite: &str, path: &Path) -> TbResult<()> {
    let mut test_cases = Vec::new();

    for t in &report.outcomes {
        let tc = match &t.result {
            Ok(()) => TestCaseBuilder::success(&t.name, Duration::seconds_f64(t.time_secs)),
            Err(e) => TestCaseBuilder::failure(
                &t.name,
                Duration::seconds_f64(t.time_secs),
                "failure",
                &e.to_string(),
            ),
        }
        .build();
        test_cases.push(tc);
    }

    let test_suite = TestSuiteBuilder::new(suite)
        .add_testcases(test_cases)
        .build();
    let report = ReportBuilder::new().add_testsuite(test_suite).build();
    let file = std::fs::File::create(path)?;
    report
        .write_xml(file)
        .map_err(|e| TbError::Report(format!("{:?}", e)))
}
