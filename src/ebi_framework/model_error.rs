///
/// Errors that make an alignment request impossible to start.
/// Raised through `anyhow`; use `downcast_ref::<ModelError>()` to inspect.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The net violates a structural invariant (dangling arc, non-positive weight, bad guard, ...)
    InvalidNet(String),
    /// A marking references a place that does not exist
    InvalidMarking(String),
    /// A cost function produced a negative cost, or the invisible cost is zero
    InvalidCost(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::InvalidNet(message) => write!(f, "invalid net: {}", message),
            ModelError::InvalidMarking(message) => write!(f, "invalid marking: {}", message),
            ModelError::InvalidCost(message) => write!(f, "invalid cost: {}", message),
        }
    }
}

impl std::error::Error for ModelError {}

#[cfg(test)]
mod tests {
    use super::ModelError;

    #[test]
    fn downcast_through_anyhow() {
        let error: anyhow::Error = ModelError::InvalidCost("invisible cost 0".to_string()).into();
        let error = error.context("preparing alignment");
        assert_eq!(
            error.downcast_ref::<ModelError>(),
            Some(&ModelError::InvalidCost("invisible cost 0".to_string()))
        );
        assert_eq!(
            error.root_cause().to_string(),
            "invalid cost: invisible cost 0"
        );
    }
}
