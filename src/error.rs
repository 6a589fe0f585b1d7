// src/error.rs
//! Unified error handling for the dynamics engine
//!
//! Every fallible operation in the crate returns [`DynamicsResult`]. Errors carry an
//! [`ErrorContext`] naming the component and operation that raised them, plus the source
//! location: [`DynamicsErrorBuilder`] records its caller, the
//! [`error_context!`](crate::error_context) macro the line it expands on.
//!
//! Out-of-range activations are *not* errors: they are clamped and reported through
//! `tracing` and the engine metrics.

use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;

/// Unified error type for the dynamics engine
#[derive(Debug, Clone, Error)]
pub enum DynamicsError {
    /// Mismatched shapes, invalid scales or call arguments, frozen-group updates
    #[error("[CONFIG] Configuration error in {component}: {reason}")]
    Configuration {
        /// Component that rejected the configuration
        component: String,
        /// Human readable reason
        reason: String,
        /// Where the error was raised
        context: ErrorContext,
    },

    /// Numeric breakdown that would poison the caller's carried state
    #[error("[NUMERIC] Degenerate {quantity}: {reason}")]
    NumericDegeneracy {
        /// Name of the offending quantity (e.g. `inertia[1]`, `matrix_exponential`)
        quantity: String,
        /// Offending value when a single scalar is to blame
        value: Option<f64>,
        /// Human readable reason
        reason: String,
        /// Where the error was raised
        context: ErrorContext,
    },

    /// Array shape errors surfaced by ndarray
    #[error("[SHAPE] {reason}")]
    Shape {
        /// Human readable reason
        reason: String,
        /// Where the error was raised
        context: ErrorContext,
    },
}

/// Error context for debugging and analysis
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    pub thread_id: Option<String>,
    pub component: String,
    pub operation: String,
    pub file: Option<&'static str>,
    pub line: Option<u32>,
    pub additional_info: HashMap<String, String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            timestamp: SystemTime::now(),
            thread_id: std::thread::current().name().map(|s| s.to_string()),
            component: component.to_string(),
            operation: operation.to_string(),
            file: None,
            line: None,
            additional_info: HashMap::new(),
        }
    }

    /// Create error context with file and line information
    pub fn with_location(component: &str, operation: &str, file: &'static str, line: u32) -> Self {
        let mut context = Self::new(component, operation);
        context.file = Some(file);
        context.line = Some(line);
        context
    }

    /// Add additional information to the context
    pub fn add_info<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }
}

/// Macro for creating error context with file and line info
#[macro_export]
macro_rules! error_context {
    ($component:expr, $operation:expr) => {
        $crate::error::ErrorContext::with_location($component, $operation, file!(), line!())
    };
}

impl DynamicsError {
    /// Context attached to this error
    pub fn context(&self) -> &ErrorContext {
        match self {
            DynamicsError::Configuration { context, .. }
            | DynamicsError::NumericDegeneracy { context, .. }
            | DynamicsError::Shape { context, .. } => context,
        }
    }

    /// True for errors the control loop must treat as a fault in the model itself
    pub fn is_numeric(&self) -> bool {
        matches!(self, DynamicsError::NumericDegeneracy { .. })
    }
}

impl From<ndarray::ShapeError> for DynamicsError {
    fn from(err: ndarray::ShapeError) -> Self {
        DynamicsError::Shape {
            reason: err.to_string(),
            context: error_context!("ndarray", "reshape"),
        }
    }
}

/// Result type alias for dynamics operations
pub type DynamicsResult<T> = Result<T, DynamicsError>;

/// Error builder for convenient error construction
pub struct DynamicsErrorBuilder {
    component: String,
    operation: String,
}

impl DynamicsErrorBuilder {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Context at the caller's source location
    #[track_caller]
    fn context(&self) -> ErrorContext {
        let location = std::panic::Location::caller();
        ErrorContext::with_location(&self.component, &self.operation, location.file(), location.line())
    }

    #[track_caller]
    pub fn configuration(self, reason: impl Into<String>) -> DynamicsError {
        let context = self.context();
        DynamicsError::Configuration {
            component: self.component,
            reason: reason.into(),
            context,
        }
    }

    /// Length mismatch between two collections that must agree
    #[track_caller]
    pub fn length_mismatch(self, what: &str, expected: usize, actual: usize) -> DynamicsError {
        let reason = format!("{} has length {}, expected {}", what, actual, expected);
        let context = self
            .context()
            .add_info("expected", expected.to_string())
            .add_info("actual", actual.to_string());
        DynamicsError::Configuration {
            component: self.component,
            reason,
            context,
        }
    }

    #[track_caller]
    pub fn degenerate(self, quantity: impl Into<String>, reason: impl Into<String>) -> DynamicsError {
        DynamicsError::NumericDegeneracy {
            quantity: quantity.into(),
            value: None,
            reason: reason.into(),
            context: self.context(),
        }
    }

    #[track_caller]
    pub fn degenerate_value(
        self,
        quantity: impl Into<String>,
        value: f64,
        reason: impl Into<String>,
    ) -> DynamicsError {
        DynamicsError::NumericDegeneracy {
            quantity: quantity.into(),
            value: Some(value),
            reason: reason.into(),
            context: self.context().add_info("value", value.to_string()),
        }
    }
}
