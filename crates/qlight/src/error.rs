// error.rs — fatal compile errors

use thiserror::Error;

/// Conditions that abort a compile. Degenerate input and unmappable samples
/// are counted in the session statistics instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LightError {
    #[error("{what} exceeded limit of {limit}")]
    CapacityExceeded { what: &'static str, limit: usize },

    #[error("Invalid lightstyle ({style}) on entity {entity}")]
    InvalidLightStyle { entity: usize, style: i32 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LightError {
    pub fn capacity(what: &'static str, limit: usize) -> Self {
        LightError::CapacityExceeded { what, limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = LightError::capacity("MAX_TW_VERTS", 24);
        assert_eq!(e.to_string(), "MAX_TW_VERTS exceeded limit of 24");
        let e = LightError::InvalidLightStyle { entity: 3, style: 300 };
        assert!(e.to_string().contains("entity 3"));
    }
}
