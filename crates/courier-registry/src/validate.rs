//! Argument validation against a descriptor's parameter schema.

use courier_core::{CoreError, CoreResult, JsonMap};

use crate::descriptor::MethodDescriptor;

/// Validate `arguments` against `descriptor`.
///
/// Checks that every required field is present, every supplied field matches
/// its declared type, and no unknown fields are present. Returns the
/// normalized argument mapping (currently the supplied fields, in schema
/// order) for the backend call.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArguments`] describing the first mismatch.
pub fn validate_arguments(
    descriptor: &MethodDescriptor,
    arguments: &JsonMap,
) -> CoreResult<JsonMap> {
    for key in arguments.keys() {
        if !descriptor.params.iter().any(|p| p.name == key) {
            return Err(CoreError::InvalidArguments {
                reason: format!("unknown field '{key}' for operation '{}'", descriptor.name),
            });
        }
    }

    let mut normalized = JsonMap::new();
    for param in descriptor.params {
        match arguments.get(param.name) {
            Some(value) => {
                if !param.kind.matches(value) {
                    return Err(CoreError::InvalidArguments {
                        reason: format!(
                            "field '{}' must be of type {}",
                            param.name,
                            param.kind.schema_type()
                        ),
                    });
                }
                normalized.insert(param.name.to_string(), value.clone());
            },
            None if param.required => {
                return Err(CoreError::InvalidArguments {
                    reason: format!("missing required field '{}'", param.name),
                });
            },
            None => {},
        }
    }

    Ok(normalized)
}
