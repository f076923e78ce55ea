//! The Reporter: assembles the xUnit-style XML report `spec.md` §6
//! describes, on top of `quick-junit` — the same crate `nextest-runner`
//! uses for its own JUnit output.
//!
//! Counters (`errors`, `tests`, `time`) are recomputed at `finalize()` from
//! the accumulated children, never tracked incrementally, so a partially
//! built report is never internally inconsistent.

use std::time::Duration;

use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};

/// One finished test's outcome, as observed by the Runner Engine.
pub struct TestOutcome {
    pub suite_name: String,
    pub test_name: String,
    pub duration: Duration,
    /// `None` on success; `Some(message)` when the test errored (timeout,
    /// retry exhaustion, or a terminal `Errored`/`Failed` LoadTest state).
    pub error: Option<String>,
}

/// Accumulates [`TestOutcome`]s per suite and renders the final XML.
#[derive(Default)]
pub struct Reporter {
    suites: std::collections::BTreeMap<String, Vec<TestOutcome>>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: TestOutcome) {
        self.suites
            .entry(outcome.suite_name.clone())
            .or_default()
            .push(outcome);
    }

    /// Build the final `quick_junit::Report`. Counters are derived here,
    /// not threaded through incrementally.
    pub fn finalize(self, report_name: &str) -> Report {
        let mut report = Report::new(report_name);
        for (suite_name, outcomes) in self.suites {
            let mut suite = TestSuite::new(suite_name);
            for outcome in outcomes {
                let status = match &outcome.error {
                    None => TestCaseStatus::success(),
                    Some(message) => {
                        let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
                        status.set_message(message.clone());
                        status
                    }
                };
                let mut case = TestCase::new(outcome.test_name, status);
                case.set_time(outcome.duration);
                suite.add_test_case(case);
            }
            report.add_test_suite(suite);
        }
        report
    }

    /// Whether any recorded outcome is an error — drives the Runner's
    /// non-zero exit code per `spec.md` §6.
    pub fn has_errors(&self) -> bool {
        self.suites
            .values()
            .flatten()
            .any(|outcome| outcome.error.is_some())
    }
}

/// Render a [`Report`] to XML, splitting per suite when `split` is true
/// (one file per suite, named `<base>-<suite>.xml`), otherwise one file
/// at `base_path`.
pub fn write_report(
    report: &Report,
    base_path: &std::path::Path,
    split: bool,
) -> std::io::Result<()> {
    if !split {
        let xml = report
            .to_string()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        return std::fs::write(base_path, xml);
    }
    for suite in &report.test_suites {
        let mut per_suite = Report::new(report.name.clone());
        per_suite.add_test_suite(suite.clone());
        let xml = per_suite
            .to_string()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        let stem = base_path.file_stem().unwrap_or_default().to_string_lossy();
        let ext = base_path.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_else(|| "xml".to_string());
        let suite_path = base_path.with_file_name(format!("{stem}-{}.{ext}", suite.name));
        std::fs::write(suite_path, xml)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_recomputes_test_count() {
        let mut reporter = Reporter::new();
        reporter.record(TestOutcome {
            suite_name: "suite-a".to_string(),
            test_name: "test-1".to_string(),
            duration: Duration::from_secs(1),
            error: None,
        });
        reporter.record(TestOutcome {
            suite_name: "suite-a".to_string(),
            test_name: "test-2".to_string(),
            duration: Duration::from_secs(2),
            error: Some("timed out".to_string()),
        });
        let report = reporter.finalize("run-1");
        assert_eq!(report.test_suites.len(), 1);
        assert_eq!(report.test_suites[0].tests, 2);
        assert_eq!(report.test_suites[0].errors, 1);
    }

    #[test]
    fn test_has_errors_true_when_any_outcome_errored() {
        let mut reporter = Reporter::new();
        reporter.record(TestOutcome {
            suite_name: "s".to_string(),
            test_name: "t".to_string(),
            duration: Duration::from_secs(1),
            error: Some("boom".to_string()),
        });
        assert!(reporter.has_errors());
    }

    #[test]
    fn test_has_errors_false_when_all_succeed() {
        let mut reporter = Reporter::new();
        reporter.record(TestOutcome {
            suite_name: "s".to_string(),
            test_name: "t".to_string(),
            duration: Duration::from_secs(1),
            error: None,
        });
        assert!(!reporter.has_errors());
    }

    #[test]
    fn test_empty_reporter_produces_empty_report() {
        let reporter = Reporter::new();
        let report = reporter.finalize("run-1");
        assert!(report.test_suites.is_empty());
    }

    #[test]
    fn test_multiple_suites_kept_separate() {
        let mut reporter = Reporter::new();
        reporter.record(TestOutcome {
            suite_name: "suite-a".to_string(),
            test_name: "t".to_string(),
            duration: Duration::from_secs(1),
            error: None,
        });
        reporter.record(TestOutcome {
            suite_name: "suite-b".to_string(),
            test_name: "t".to_string(),
            duration: Duration::from_secs(1),
            error: None,
        });
        let report = reporter.finalize("run-1");
        assert_eq!(report.test_suites.len(), 2);
    }
}
