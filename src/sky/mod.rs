//! SKY-facing core: token lifecycle, request relay, and the asynchronous
//! query-job protocol.

pub mod query;
pub mod relay;
pub mod token;

pub use query::{JobStatus, QueryJob, QueryJobRunner};
pub use relay::{RelayBody, RelayResponse, SkyRelay};
pub use token::{AccessToken, TokenBroker};
