use std::collections::BTreeMap;

/// First locally detected definition failure. Recorded by the handle before any
/// remote call and sticky afterwards: later configuration calls leave the
/// definition untouched and the next lifecycle call surfaces this same error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub(crate) fn non_empty_str(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(format!("'{field}' cannot be empty")));
    }
    Ok(())
}

pub(crate) fn non_empty_list<T>(field: &str, values: &[T]) -> Result<(), ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::new(format!("'{field}' cannot be empty")));
    }
    Ok(())
}

pub(crate) fn non_empty_map<K, V>(
    field: &str,
    map: &BTreeMap<K, V>,
) -> Result<(), ValidationError> {
    if map.is_empty() {
        return Err(ValidationError::new(format!("'{field}' cannot be empty")));
    }
    Ok(())
}

pub(crate) fn in_range(field: &str, value: i64, min: i64, max: i64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::new(format!(
            "'{field}' must be in range [{min}, {max}]"
        )));
    }
    Ok(())
}
