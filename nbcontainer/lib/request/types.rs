use getset::Getters;
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A validated request to containerize a notebook and publish it.
#[derive(Debug, Clone, PartialEq, Serialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ContainerizationRequest {
    /// The notebook path, relative to the notebook root.
    pub(super) notebook_path: String,

    /// The kernel the notebook runs on, including its `containerized_` prefix.
    pub(super) kernel_name: String,

    /// The destination repository.
    pub(super) repository_name: String,

    /// The display name of the container.
    pub(super) container_name: String,

    /// The description of the container, if any.
    pub(super) container_description: Option<String>,

    /// The notebook's input variables, in declaration order.
    pub(super) variables: Vec<Variable>,
}

/// A named, typed notebook input.
#[derive(Debug, Clone, PartialEq, Serialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Variable {
    /// The variable name, a valid identifier.
    pub(super) name: String,

    /// The kind of value the variable holds.
    #[serde(rename = "type")]
    pub(super) variable_type: VariableType,

    /// The variable description, if any.
    pub(super) description: Option<String>,
}

/// The kinds of values a notebook variable may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableType {
    /// A string.
    String,

    /// A floating point number.
    Double,

    /// A reference to an output file location.
    OutputFileUri,

    /// A reference to a dataset content version.
    DatasetContentVersionId,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VariableType {
    /// The wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Double => "double",
            Self::OutputFileUri => "outputFileUri",
            Self::DatasetContentVersionId => "datasetContentVersionId",
        }
    }

    /// Looks a type up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "double" => Some(Self::Double),
            "outputFileUri" => Some(Self::OutputFileUri),
            "datasetContentVersionId" => Some(Self::DatasetContentVersionId),
            _ => None,
        }
    }
}

impl ContainerizationRequest {
    /// The kernel name without its `containerized_` prefix, matched case-insensitively.
    pub fn unprefixed_kernel_name(&self) -> &str {
        strip_prefix_ignore_case(&self.kernel_name, super::CONTAINERIZED_PREFIX)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

pub(crate) fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> &'a str {
    match value.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &value[prefix.len()..],
        _ => value,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
