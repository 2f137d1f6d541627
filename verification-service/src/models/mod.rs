pub mod session;
pub mod tan;
pub mod test_result;

pub use session::{AppSession, SessionSourceOfTrust};
pub use tan::{TanSourceOfTrust, TanType, TeleTanType, VerificationTan};
pub use test_result::{LabTestResult, TestResult};
