use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    request::{ContainerizationRequest, VariableType},
    NbContainerResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Annotation key holding the annotation schema version.
pub const SCHEMA_VERSION_KEY: &str = "@schema_version";

/// Annotation key holding the container display name.
pub const CONTAINER_NAME_KEY: &str = "@iota_container_name";

/// Annotation key holding the container description.
pub const CONTAINER_DESCRIPTION_KEY: &str = "@iota_container_description";

/// The annotation schema version.
pub const ANNOTATION_SCHEMA_VERSION: &str = "1.0.0";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Manifest annotations, keyed by annotation name.
pub type Annotations = BTreeMap<String, String>;

#[derive(Serialize)]
struct VariableAnnotation<'a> {
    #[serde(rename = "type")]
    variable_type: VariableType,
    description: Option<&'a str>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds the annotations published with the image.
///
/// Besides the container metadata keys, every variable gets a key of its own whose value is a
/// JSON object `{"type": ..., "description": ...}`, with a null description when none was given.
pub fn manifest_annotations(request: &ContainerizationRequest) -> NbContainerResult<Annotations> {
    let mut annotations = Annotations::new();
    annotations.insert(
        SCHEMA_VERSION_KEY.to_string(),
        ANNOTATION_SCHEMA_VERSION.to_string(),
    );
    annotations.insert(
        CONTAINER_NAME_KEY.to_string(),
        request.get_container_name().clone(),
    );
    annotations.insert(
        CONTAINER_DESCRIPTION_KEY.to_string(),
        request.get_container_description().clone().unwrap_or_default(),
    );

    for variable in request.get_variables() {
        let value = VariableAnnotation {
            variable_type: *variable.get_variable_type(),
            description: variable.get_description().as_deref(),
        };
        annotations.insert(variable.get_name().clone(), serde_json::to_string(&value)?);
    }

    Ok(annotations)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
