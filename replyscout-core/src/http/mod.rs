mod client;
mod error;
mod resolver;
mod retry;
mod transport;

pub use client::{RequestSpec, ResilientClient};
pub use error::{HttpError, HttpResult, NetworkErrorKind};
pub use resolver::{HostResolver, SystemResolver};
pub use retry::{parse_retry_after, RetryPolicy};
pub use transport::{HttpResponse, HttpTransport, PreparedRequest, ReqwestTransport};
