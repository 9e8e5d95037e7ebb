/// Router Module Index
///
/// Routes are split by access tier so the gate is applied per router
/// (as a layer) rather than remembered per handler.

/// No token required.
pub mod public;

/// Valid token required; handlers additionally enforce self-scope.
pub mod authenticated;

/// Valid token and a stored `admin` role required.
pub mod admin;
