use serde::Serialize;

/// The class an error belongs to, which decides how it is surfaced to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input; never retried.
    Validation,
    /// Caller may not act on the resource.
    Authorization,
    /// Subscription is not active; clients redirect to payment.
    Subscription,
    NotFound,
    /// Monthly usage cap would be exceeded.
    Capacity,
    /// The resource is in the wrong lifecycle state for the request.
    Conflict,
    /// An upstream AI service failed.
    External,
    Internal,
}
