use serde::{Deserialize, Serialize};

/// Lab result codes, including the quick-test variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabTestResult {
    Pending,
    Negative,
    Positive,
    Invalid,
    Redeemed,
    QuickPending,
    QuickNegative,
    QuickPositive,
    QuickInvalid,
    QuickRedeemed,
}

impl LabTestResult {
    pub fn code(&self) -> i32 {
        match self {
            LabTestResult::Pending => 0,
            LabTestResult::Negative => 1,
            LabTestResult::Positive => 2,
            LabTestResult::Invalid => 3,
            LabTestResult::Redeemed => 4,
            LabTestResult::QuickPending => 5,
            LabTestResult::QuickNegative => 6,
            LabTestResult::QuickPositive => 7,
            LabTestResult::QuickInvalid => 8,
            LabTestResult::QuickRedeemed => 9,
        }
    }

    /// Only a positive result, standard or quick-test, authorizes TAN
    /// issuance.
    pub fn is_positive(code: i32) -> bool {
        code == LabTestResult::Positive.code() || code == LabTestResult::QuickPositive.code()
    }
}

/// Wire model of a COVID test result, as returned by the result server and
/// forwarded to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_result: i32,
    #[serde(default)]
    pub sc: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_padding: Option<String>,
}

impl TestResult {
    pub fn new(test_result: i32) -> Self {
        Self {
            test_result,
            sc: 0,
            lab_id: None,
            response_padding: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positivity_covers_both_variants() {
        assert!(LabTestResult::is_positive(2));
        assert!(LabTestResult::is_positive(7));
        assert!(!LabTestResult::is_positive(0));
        assert!(!LabTestResult::is_positive(1));
        assert!(!LabTestResult::is_positive(6));
    }
}
