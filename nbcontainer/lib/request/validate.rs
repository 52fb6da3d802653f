//! Request validation.
//!
//! Checks run in a fixed order and the first failing check decides the message sent back to the
//! client. Later checks may assume earlier ones passed, e.g. type checks refer to variables by a
//! name that is already known to be valid.

use std::collections::{BTreeSet, HashSet};

use serde_json::{Map, Value};
use thiserror::Error;

use super::{ContainerizationRequest, Variable, VariableType};
use crate::kernel::is_valid_kernel_name;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Kernels must carry this prefix to be containerized.
pub const CONTAINERIZED_PREFIX: &str = "containerized_";

/// The fields every request must carry.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "notebook_path",
    "kernel_name",
    "variables",
    "container_name",
    "container_description",
    "repository_name",
];

/// The most variables a notebook may declare.
pub const MAX_VARIABLES: usize = 50;

/// The longest allowed name, in characters.
pub const MAX_NAME_LENGTH: usize = 256;

/// The longest allowed description, in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A request was rejected. The message is meant for the end user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// The request fields with their JSON types checked but their contents not yet validated.
struct RawRequest {
    notebook_path: String,
    kernel_name: String,
    repository_name: String,
    container_name: Option<String>,
    container_description: Option<String>,
    variables: Vec<RawVariable>,
}

struct RawVariable {
    name: Option<String>,
    variable_type: Option<String>,
    description: Option<String>,
}

type Check = fn(&RawRequest) -> Option<String>;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses and validates a request message as received over the wire.
pub fn parse_request(message: &str) -> Result<ContainerizationRequest, ValidationError> {
    let value = serde_json::from_str::<Value>(message)
        .map_err(|_| ValidationError("The request is not valid JSON.".to_string()))?;
    validate_request(&value)
}

/// Validates a decoded request.
///
/// ## Examples
///
/// ```
/// use nbcontainer::request::validate_request;
/// use serde_json::json;
///
/// let err = validate_request(&json!({ "kernel_name": "containerized_python3" })).unwrap_err();
/// assert_eq!(
///     err.to_string(),
///     "The following fields were not specified: container_description, container_name, \
///      notebook_path, repository_name, variables."
/// );
/// ```
pub fn validate_request(value: &Value) -> Result<ContainerizationRequest, ValidationError> {
    let empty = Map::new();
    let object = value.as_object().unwrap_or(&empty);

    if let Some(message) = missing_fields_message(object) {
        return Err(ValidationError(message));
    }

    let raw = RawRequest::from_object(object)?;

    const CHECKS: [Check; 8] = [
        invalid_kernel_name_message,
        unusable_kernel_name_message,
        bad_container_name_message,
        bad_container_description_message,
        too_many_variables_message,
        invalid_variable_name_message,
        invalid_variable_type_message,
        invalid_variable_description_message,
    ];

    if let Some(message) = CHECKS.iter().find_map(|check| check(&raw)) {
        return Err(ValidationError(message));
    }

    Ok(raw.into_request())
}

fn missing_fields_message(object: &Map<String, Value>) -> Option<String> {
    let missing: BTreeSet<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect();

    if missing.is_empty() {
        return None;
    }

    Some(format!(
        "The following fields were not specified: {}.",
        missing.into_iter().collect::<Vec<_>>().join(", ")
    ))
}

fn invalid_kernel_name_message(raw: &RawRequest) -> Option<String> {
    let prefix = raw.kernel_name.get(..CONTAINERIZED_PREFIX.len());
    match prefix {
        Some(prefix) if prefix.eq_ignore_ascii_case(CONTAINERIZED_PREFIX) => None,
        _ => Some(format!(
            "Only kernels beginning with \"{}\" may be containerized.",
            CONTAINERIZED_PREFIX.trim_matches('_')
        )),
    }
}

fn unusable_kernel_name_message(raw: &RawRequest) -> Option<String> {
    let kernel = raw.kernel_name.get(CONTAINERIZED_PREFIX.len()..).unwrap_or_default();
    (!is_valid_kernel_name(kernel)).then(|| {
        "Kernel names may only contain letters, digits, periods, underscores and hyphens."
            .to_string()
    })
}

fn bad_container_name_message(raw: &RawRequest) -> Option<String> {
    missing_or_too_long(
        "The container name",
        raw.container_name.as_deref(),
        true,
        MAX_NAME_LENGTH,
    )
}

fn bad_container_description_message(raw: &RawRequest) -> Option<String> {
    missing_or_too_long(
        "The container description",
        raw.container_description.as_deref(),
        false,
        MAX_DESCRIPTION_LENGTH,
    )
}

fn too_many_variables_message(raw: &RawRequest) -> Option<String> {
    (raw.variables.len() > MAX_VARIABLES)
        .then(|| format!("You may only specify at most {MAX_VARIABLES} variables."))
}

fn invalid_variable_name_message(raw: &RawRequest) -> Option<String> {
    let mut names = Vec::with_capacity(raw.variables.len());
    for variable in &raw.variables {
        let name = match variable.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Some(
                    "All variables must have a name that's at least one character long."
                        .to_string(),
                )
            }
        };

        let prefix = format!("The variable name {name}");
        if let Some(message) = missing_or_too_long(&prefix, Some(name), false, MAX_NAME_LENGTH) {
            return Some(message);
        }
        names.push(name);
    }

    let unique: HashSet<&str> = names.iter().copied().collect();
    if unique.len() < names.len() {
        return Some("Each variable must have a name that's different from the others.".to_string());
    }

    let invalid: BTreeSet<&str> = names
        .into_iter()
        .filter(|name| !is_identifier(name))
        .collect();
    if !invalid.is_empty() {
        return Some(format!(
            "The following names are not valid python identifiers: {}.",
            invalid.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }

    None
}

fn invalid_variable_type_message(raw: &RawRequest) -> Option<String> {
    raw.variables.iter().find_map(|variable| {
        let known = variable
            .variable_type
            .as_deref()
            .and_then(VariableType::from_name)
            .is_some();
        (!known).then(|| {
            format!(
                "The variable {} has an invalid type.",
                variable.name.as_deref().unwrap_or_default()
            )
        })
    })
}

fn invalid_variable_description_message(raw: &RawRequest) -> Option<String> {
    raw.variables.iter().find_map(|variable| {
        let prefix = format!(
            "The variable {}'s description",
            variable.name.as_deref().unwrap_or_default()
        );
        missing_or_too_long(
            &prefix,
            variable.description.as_deref(),
            false,
            MAX_DESCRIPTION_LENGTH,
        )
    })
}

fn missing_or_too_long(
    prefix: &str,
    value: Option<&str>,
    required: bool,
    max_length: usize,
) -> Option<String> {
    match value {
        None | Some("") if required => Some(format!("{prefix} must be defined.")),
        Some(value) if value.chars().count() > max_length => Some(format!(
            "{prefix} is longer than the {max_length} character maximum."
        )),
        _ => None,
    }
}

/// Whether `name` is usable as a Python identifier.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {
            chars.all(|c| c == '_' || c.is_alphanumeric())
        }
        _ => false,
    }
}

fn invalid_value(field: &str) -> ValidationError {
    ValidationError(format!("The field {field} has an invalid value."))
}

fn required_string(object: &Map<String, Value>, field: &str) -> Result<String, ValidationError> {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid_value(field))
}

fn optional_string(
    object: &Map<String, Value>,
    field: &str,
) -> Result<Option<String>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(invalid_value(field)),
    }
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RawRequest {
    fn from_object(object: &Map<String, Value>) -> Result<Self, ValidationError> {
        let variables = match object.get("variables") {
            Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(RawVariable::from_value)
                .collect::<Result<_, _>>()?,
            _ => return Err(invalid_value("variables")),
        };

        Ok(Self {
            notebook_path: required_string(object, "notebook_path")?,
            kernel_name: required_string(object, "kernel_name")?,
            repository_name: required_string(object, "repository_name")?,
            container_name: optional_string(object, "container_name")?,
            container_description: optional_string(object, "container_description")?,
            variables,
        })
    }

    fn into_request(self) -> ContainerizationRequest {
        let variables = self
            .variables
            .into_iter()
            .filter_map(|variable| {
                Some(Variable {
                    name: variable.name?,
                    variable_type: VariableType::from_name(variable.variable_type.as_deref()?)?,
                    description: variable.description.filter(|d| !d.is_empty()),
                })
            })
            .collect();

        ContainerizationRequest {
            notebook_path: self.notebook_path,
            kernel_name: self.kernel_name,
            repository_name: self.repository_name,
            container_name: self.container_name.unwrap_or_default(),
            container_description: self.container_description.filter(|d| !d.is_empty()),
            variables,
        }
    }
}

impl RawVariable {
    fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let object = value.as_object().ok_or_else(|| invalid_value("variables"))?;
        Ok(Self {
            name: optional_string(object, "name")?,
            variable_type: optional_string(object, "type")?,
            description: optional_string(object, "description")?,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
