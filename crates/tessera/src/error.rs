//! Error types for tracked objects and event dispatch.
//!
//! [`DomainError`] covers everything raised synchronously by the mutation
//! engine (validation, business rules, misuse of the history API).
//! [`DispatchError`] is returned by the async dispatch operations when one or
//! more publishes fail.

use crate::event::DomainEvent;

/// Result alias used throughout the crate.
pub type Result<T, E = DomainError> = std::result::Result<T, E>;

/// Broad classification of a [`DomainError`].
///
/// Lets callers tell "the data is wrong" apart from "the API was used wrong"
/// without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A field validator or business rule rejected the current state.
    Validation,
    /// The history or subscription API was used incorrectly.
    Usage,
}

/// Errors raised by entities, aggregates and value objects.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DomainError {
    /// A field validator rejected the value stored in `field`.
    ///
    /// `received` describes the kind of value found (for example
    /// `ArrayOf<Unit>` or `string`) and `expected` is the validator name.
    #[error("validation failed: {message} (field={field} instance={instance})")]
    Validation {
        instance: String,
        field: String,
        message: String,
        received: String,
        expected: String,
        value: serde_json::Value,
    },

    /// A whole-object business rule failed.
    #[error("business rule violated: {message}")]
    Rule { message: String },

    /// History APIs were used on an object constructed without tracking.
    #[error("history is not enabled for {instance}")]
    HistoryDisabled { instance: String },

    /// A subscription handler was registered under an unusable key.
    #[error("invalid subscriber for '{key}' on {instance}: {reason}")]
    InvalidSubscriber {
        instance: String,
        key: String,
        reason: String,
    },

    /// A subscribed key had traces but no initial or no current value.
    #[error(
        "cannot resolve '{key}' on {instance} (initial present: {has_initial}, current present: {has_current})"
    )]
    UnresolvedPath {
        instance: String,
        key: String,
        has_initial: bool,
        has_current: bool,
    },

    /// A write or collection operation addressed something of the wrong shape.
    #[error("path '{path}' on {instance} does not lead to {expected}")]
    InvalidPath {
        instance: String,
        path: String,
        expected: &'static str,
    },

    /// The field cannot be written through the mutation interceptor.
    #[error("field '{field}' on {instance} is immutable")]
    ImmutableField { instance: String, field: String },

    /// A value object was constructed with an entity inside it.
    #[error("value object {tag} cannot contain entities")]
    EntityInsideValue { tag: String },
}

impl DomainError {
    /// Build a [`DomainError::Rule`] from a message.
    pub fn rule(message: impl Into<String>) -> Self {
        Self::Rule {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } | Self::Rule { .. } | Self::EntityInsideValue { .. } => {
                ErrorCategory::Validation
            }
            Self::HistoryDisabled { .. }
            | Self::InvalidSubscriber { .. }
            | Self::UnresolvedPath { .. }
            | Self::InvalidPath { .. }
            | Self::ImmutableField { .. } => ErrorCategory::Usage,
        }
    }

    /// Field path carried by validation errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } | Self::ImmutableField { field, .. } => Some(field),
            Self::InvalidPath { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// One event whose publish failed during dispatch.
///
/// The event has already been removed from its queue; it is handed back so
/// the caller can decide whether to queue it again.
#[derive(Debug)]
pub struct PublishFailure {
    pub event: DomainEvent,
    pub error: anyhow::Error,
}

/// Error returned by `dispatch` / `dispatch_all` when any publish fails.
#[derive(Debug, thiserror::Error)]
#[error("{} of {attempted} event publish(es) failed for {aggregate}", failures.len())]
pub struct DispatchError {
    /// Hash code of the aggregate dispatch was called on.
    pub aggregate: String,
    /// Number of events handed to the publisher.
    pub attempted: usize,
    /// The events that failed, each with its publisher error.
    pub failures: Vec<PublishFailure>,
}

impl DispatchError {
    /// Names of the failed events, in dispatch order.
    pub fn failed_event_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.event.name()).collect()
    }

    /// Take the failed events back out of the error.
    pub fn into_events(self) -> Vec<DomainEvent> {
        self.failures.into_iter().map(|f| f.event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_mentions_field_and_instance() {
        let err = DomainError::Validation {
            instance: "User".into(),
            field: "email".into(),
            message: "invalid email".into(),
            received: "string".into(),
            expected: "isEmail".into(),
            value: serde_json::json!("nope"),
        };
        assert_eq!(
            err.to_string(),
            "validation failed: invalid email (field=email instance=User)"
        );
        assert_eq!(err.field(), Some("email"));
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn usage_errors_are_categorized() {
        let err = DomainError::HistoryDisabled {
            instance: "[Entity@User]:u-1".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Usage);
        assert_eq!(err.to_string(), "history is not enabled for [Entity@User]:u-1");

        let err = DomainError::UnresolvedPath {
            instance: "Lead".into(),
            key: "proposals".into(),
            has_initial: false,
            has_current: true,
        };
        assert_eq!(err.category(), ErrorCategory::Usage);
        assert!(err.to_string().contains("initial present: false"));
    }

    #[test]
    fn rule_constructor_builds_rule_variant() {
        let err = DomainError::rule("lead needs a proposal");
        assert!(matches!(err, DomainError::Rule { .. }));
        assert_eq!(err.to_string(), "business rule violated: lead needs a proposal");
    }

    // Errors must cross task boundaries in async publishers.
    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<DomainError>();
            assert_send_sync::<DispatchError>();
        }
    };
}
