//! Scored result of a recovery run

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Success rate reached the procedure's threshold
    Success,
    /// Some steps succeeded, not enough for the threshold
    Partial,
    /// No step succeeded
    Failed,
    /// Dry run, nothing executed
    Planned,
}

impl Verdict {
    pub fn classify(rate_percent: u8, threshold_percent: u8, succeeded: usize) -> Self {
        if succeeded == 0 {
            Self::Failed
        } else if rate_percent >= threshold_percent {
            Self::Success
        } else {
            Self::Partial
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Planned => "planned",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub name: String,
    pub verification: bool,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryOutcome {
    pub failure_class: String,
    pub mechanism: String,
    pub steps_total: usize,
    pub steps_succeeded: usize,
    pub success_rate_percent: u8,
    pub threshold_percent: u8,
    pub verdict: Verdict,
    pub steps: Vec<StepResult>,
    /// An interrupt stopped the run before its last step
    pub interrupted: bool,
    pub dry_run: bool,
}

impl RecoveryOutcome {
    pub fn from_steps(
        failure_class: &str,
        mechanism: &str,
        threshold_percent: u8,
        steps: Vec<StepResult>,
        interrupted: bool,
    ) -> Self {
        let steps_total = steps.len();
        let steps_succeeded = steps.iter().filter(|s| s.succeeded).count();
        let success_rate_percent = success_rate(steps_succeeded, steps_total);
        Self {
            failure_class: failure_class.to_string(),
            mechanism: mechanism.to_string(),
            steps_total,
            steps_succeeded,
            success_rate_percent,
            threshold_percent,
            verdict: Verdict::classify(success_rate_percent, threshold_percent, steps_succeeded),
            steps,
            interrupted,
            dry_run: false,
        }
    }

    pub fn planned(
        failure_class: &str,
        mechanism: &str,
        threshold_percent: u8,
        steps: Vec<StepResult>,
    ) -> Self {
        Self {
            failure_class: failure_class.to_string(),
            mechanism: mechanism.to_string(),
            steps_total: steps.len(),
            steps_succeeded: 0,
            success_rate_percent: 0,
            threshold_percent,
            verdict: Verdict::Planned,
            steps,
            interrupted: false,
            dry_run: true,
        }
    }

    /// The single recovery-log line for this outcome.
    pub fn log_line(&self) -> String {
        format!(
            "{} via {}: {}/{} steps ({}%, threshold {}%) -> {}{}",
            self.failure_class,
            self.mechanism,
            self.steps_succeeded,
            self.steps_total,
            self.success_rate_percent,
            self.threshold_percent,
            self.verdict,
            if self.interrupted { " (interrupted)" } else { "" }
        )
    }
}

/// `succeeded * 100 / total`, integer division; zero steps rate 0.
pub fn success_rate(succeeded: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from(succeeded.min(total) * 100 / total).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(4, 5, 80, Verdict::Success)]
    #[case(3, 5, 80, Verdict::Partial)]
    #[case(5, 5, 80, Verdict::Success)]
    #[case(0, 5, 80, Verdict::Failed)]
    #[case(2, 3, 66, Verdict::Success)]
    #[case(1, 3, 66, Verdict::Partial)]
    #[case(3, 4, 75, Verdict::Success)]
    #[case(7, 10, 70, Verdict::Success)]
    fn verdict_follows_threshold(
        #[case] succeeded: usize,
        #[case] total: usize,
        #[case] threshold: u8,
        #[case] expected: Verdict,
    ) {
        let rate = success_rate(succeeded, total);
        assert_eq!(Verdict::classify(rate, threshold, succeeded), expected);
    }

    #[test]
    fn rate_uses_integer_division() {
        assert_eq!(success_rate(2, 3), 66);
        assert_eq!(success_rate(1, 3), 33);
        assert_eq!(success_rate(0, 0), 0);
    }

    #[test]
    fn log_line_is_single_line_summary() {
        let steps = vec![
            StepResult {
                name: "restart".into(),
                verification: false,
                succeeded: true,
                detail: None,
            },
            StepResult {
                name: "verify".into(),
                verification: true,
                succeeded: false,
                detail: Some("inactive".into()),
            },
        ];
        let outcome =
            RecoveryOutcome::from_steps("service-start", "service restart", 80, steps, false);
        assert_eq!(
            outcome.log_line(),
            "service-start via service restart: 1/2 steps (50%, threshold 80%) -> partial"
        );
    }
}
