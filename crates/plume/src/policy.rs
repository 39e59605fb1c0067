//! Which failures abort an operation and which degrade it.
//!
//! Every place that may swallow an error goes through [`FailurePolicy::apply`],
//! so the fatal/degrade boundary is readable in one table.

use std::fmt::Display;

/// Operations whose failures are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Profile hydration after login/restore
    ProfileLoad,
    /// Resolving one mention handle while publishing
    MentionResolution,
    /// Best-effort registration call after login
    Registration,
    /// SDK revocation during logout
    Revocation,
    /// Resolving the PDS of the current identity
    PdsResolution,
    /// Resolving a reply parent's fingerprint
    ReplyResolution,
    /// `createRecord`
    RecordCreation,
    /// `uploadBlob`
    BlobUpload,
}

/// What to do when an operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Abort the surrounding operation
    Fatal,
    /// Log and continue with a fallback
    Degrade,
}

/// The failure policy table.
pub struct FailurePolicy;

impl FailurePolicy {
    /// Disposition for `op`.
    pub const fn disposition(op: Operation) -> Disposition {
        match op {
            Operation::ProfileLoad
            | Operation::MentionResolution
            | Operation::Registration
            | Operation::Revocation => Disposition::Degrade,
            Operation::PdsResolution
            | Operation::ReplyResolution
            | Operation::RecordCreation
            | Operation::BlobUpload => Disposition::Fatal,
        }
    }

    /// Apply the policy to a result.
    ///
    /// `Ok(Some(v))` on success, `Ok(None)` for a degraded failure (logged at
    /// `warn`), `Err(e)` for a fatal one.
    pub fn apply<T, E: Display>(op: Operation, result: Result<T, E>) -> Result<Option<T>, E> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) => match Self::disposition(op) {
                Disposition::Degrade => {
                    tracing::warn!(operation = ?op, error = %e, "degraded");
                    Ok(None)
                }
                Disposition::Fatal => Err(e),
            },
        }
    }

    /// Apply the policy to an operation the caller cannot continue without.
    ///
    /// Only fatal operations belong here; a degradable one would have nothing
    /// to fall back to.
    pub fn require<T, E: Display>(op: Operation, result: Result<T, E>) -> Result<T, E> {
        debug_assert_eq!(
            Self::disposition(op),
            Disposition::Fatal,
            "{op:?} is degradable and needs a fallback"
        );
        result.inspect_err(|e| tracing::debug!(operation = ?op, error = %e, "fatal"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrade_swallows_fatal_propagates() {
        let r: Result<Option<u8>, &str> =
            FailurePolicy::apply(Operation::MentionResolution, Err("boom"));
        assert_eq!(r, Ok(None));
        let r: Result<Option<u8>, &str> =
            FailurePolicy::apply(Operation::RecordCreation, Err("boom"));
        assert_eq!(r, Err("boom"));
    }

    #[test]
    fn publishing_steps_are_fatal() {
        for op in [
            Operation::PdsResolution,
            Operation::ReplyResolution,
            Operation::RecordCreation,
            Operation::BlobUpload,
        ] {
            assert_eq!(FailurePolicy::require(op, Err::<u8, _>("x")), Err("x"));
            assert_eq!(FailurePolicy::require(op, Ok::<_, &str>(7)), Ok(7));
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "needs a fallback")]
    fn degradable_operations_cannot_be_required() {
        let _ = FailurePolicy::require(Operation::ProfileLoad, Err::<u8, _>("x"));
    }
}
