//! Namespace constants for the built-in collectors.
//! Namespaces are alphanumeric; attribute keys are `<namespace>_<local_name>`.

// Primary collectors
pub const ROSTER_NAMESPACE: &str = "roster";
pub const STORED_NAMESPACE: &str = "stored";

// Local attribute names produced by the roster
pub const ROSTER_FIRST_NAME: &str = "firstname";
pub const ROSTER_LAST_NAME: &str = "lastname";
pub const ROSTER_EMAIL: &str = "email";

/// Reliability assigned to facts taken from the authoritative roster.
pub const ROSTER_RELIABILITY: f64 = 1.0;
