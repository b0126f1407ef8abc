//! QoI errors
//!
//! None of these errors are recovered locally: they propagate to the assembly
//! driver, which aborts the current pass.

use crate::ElementId;
use thiserror::Error;

/// QoI result type
pub type QoiResult<T> = Result<T, QoiError>;

#[derive(Error, Debug)]
pub enum QoiError {
    /// Invalid inputs detected before any geometry work
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Ray/mesh intersection failure
    #[error("geometry error: {message}")]
    Geometry {
        message: String,
        element: Option<ElementId>,
    },

    /// Degenerate element geometry or failed inverse map
    #[error("numerical error in element {element}: {message}")]
    Numerical { element: ElementId, message: String },

    /// Operation not provided by the bound field function
    #[error("unsupported operation: {operation} for {function}")]
    UnsupportedOperation {
        operation: &'static str,
        function: String,
    },

    /// Evaluation requested before `init`
    #[error("QoI \"{0}\" evaluated before init")]
    Uninitialized(String),

    /// Failure attributed to a given QoI, and element when known
    #[error("QoI \"{qoi}\"{}: {source}", .element.map(|e| format!(" on element {}", e)).unwrap_or_default())]
    Assembly {
        qoi: String,
        element: Option<ElementId>,
        #[source]
        source: Box<QoiError>,
    },
}

impl QoiError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn geometry(message: impl Into<String>) -> Self {
        Self::Geometry {
            message: message.into(),
            element: None,
        }
    }

    pub fn geometry_at(element: ElementId, message: impl Into<String>) -> Self {
        Self::Geometry {
            message: message.into(),
            element: Some(element),
        }
    }

    pub fn numerical(element: ElementId, message: impl Into<String>) -> Self {
        Self::Numerical {
            element,
            message: message.into(),
        }
    }

    pub fn unsupported(operation: &'static str, function: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation,
            function: function.into(),
        }
    }

    /// Attaches the originating QoI name, and element, to the error
    ///
    /// An error already attributed to a QoI is returned unchanged so the
    /// innermost name is the one reported.
    pub fn in_qoi(self, qoi: &str, element: Option<ElementId>) -> Self {
        match self {
            Self::Assembly { .. } => self,
            err => Self::Assembly {
                qoi: qoi.to_string(),
                element,
                source: Box::new(err),
            },
        }
    }

    /// The underlying error, without the QoI attribution
    pub fn root(&self) -> &QoiError {
        match self {
            Self::Assembly { source, .. } => source.root(),
            err => err,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), Self::Configuration(_))
    }
    pub fn is_geometry(&self) -> bool {
        matches!(self.root(), Self::Geometry { .. })
    }
    pub fn is_numerical(&self) -> bool {
        matches!(self.root(), Self::Numerical { .. })
    }
    pub fn is_unsupported(&self) -> bool {
        matches!(self.root(), Self::UnsupportedOperation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribution_keeps_root() {
        let err = QoiError::geometry("ray origin outside the domain").in_qoi("los", Some(3));
        assert!(err.is_geometry());
        assert_eq!(
            err.to_string(),
            "QoI \"los\" on element 3: geometry error: ray origin outside the domain"
        );
    }

    #[test]
    fn innermost_attribution_wins() {
        let err = QoiError::numerical(7, "singular Jacobian")
            .in_qoi("inner", Some(7))
            .in_qoi("composite", None);
        match err {
            QoiError::Assembly { qoi, element, .. } => {
                assert_eq!(qoi, "inner");
                assert_eq!(element, Some(7));
            }
            _ => panic!("expected an attributed error"),
        }
    }
}
