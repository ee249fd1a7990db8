use thiserror::Error;

/// Failures of the feature, training and prediction pipeline.
#[derive(Debug, Error)]
pub enum PredictorError {
    /// Train or test partition came out empty after the chronological split
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("model not trained yet")]
    ModelNotTrained,

    /// Declared feature name with no matching column; excluded, never fatal
    #[error("unknown feature '{0}'")]
    FeatureMismatch(String),

    #[error("training failed: {0}")]
    TrainingFailed(String),

    #[error("unknown team '{name}'{}", suggestion_hint(.suggestion))]
    UnknownEntity {
        name: String,
        suggestion: Option<String>,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(", did you mean '{}'?", s))
        .unwrap_or_default()
}

pub type PredictorResult<T> = std::result::Result<T, PredictorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_entity_message_includes_suggestion() {
        let err = PredictorError::UnknownEntity {
            name: "Arsenl".to_string(),
            suggestion: Some("Arsenal".to_string()),
        };
        assert_eq!(err.to_string(), "unknown team 'Arsenl', did you mean 'Arsenal'?");

        let err = PredictorError::UnknownEntity {
            name: "Nowhere FC".to_string(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "unknown team 'Nowhere FC'");
    }
}
