pub mod cleanup;
pub mod fake_delay;
pub mod hashing;
pub mod jwt;
pub mod result_server;
pub mod session;
pub mod tan;

pub use fake_delay::{DelayClass, FakeDelayService};
pub use jwt::{AuthorizationRole, JwtService};
pub use result_server::{MockTestResultClient, TestResultClient, TestResultServerClient};
pub use session::SessionService;
pub use tan::{RedeemedTan, TanService};
