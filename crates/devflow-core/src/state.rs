use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DevflowError;

/// Status values written into the `*_status` fields.
pub mod status {
    pub const APPROVED: &str = "Approved";
    pub const NEEDS_REVISION: &str = "Needs Revision";
    pub const NEEDS_SECURITY_FIXES: &str = "Needs Security Fixes";
    pub const PENDING_USER_APPROVAL: &str = "Pending User Approval";
    pub const FIXED: &str = "Fixed";
    pub const PASSED: &str = "Passed";
    pub const FAILED: &str = "Failed";
    pub const READY_FOR_DEPLOYMENT: &str = "Ready for Deployment";
    pub const DEPLOYED: &str = "Deployed";
}

/// A payload with no JSON shape. Rendered through `Display` when persisted.
pub trait OpaqueValue: fmt::Display + fmt::Debug + Send + Sync {}

impl<T: fmt::Display + fmt::Debug + Send + Sync> OpaqueValue for T {}

/// Value stored in the extension map of a [`WorkflowState`].
#[derive(Clone)]
pub enum FieldValue {
    Json(serde_json::Value),
    Opaque(Arc<dyn OpaqueValue>),
}

impl FieldValue {
    pub fn opaque(value: impl OpaqueValue + 'static) -> Self {
        Self::Opaque(Arc::new(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Json(v) => v.as_str(),
            Self::Opaque(_) => None,
        }
    }

    /// JSON form of the value; opaque payloads become their display string.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Opaque(v) => serde_json::Value::String(v.to_string()),
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Opaque(v) => f.debug_tuple("Opaque").field(v).finish(),
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.to_json() == other.to_json()
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Json(v) => v.serialize(serializer),
            Self::Opaque(v) => serializer.serialize_str(&v.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::Json)
    }
}

/// The accumulating project record threaded through every step.
///
/// Every field is optional: steps must treat absence as "not produced yet".
/// Fields the record does not name live in `extensions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Structured JSON document when the reply parsed, raw text otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_requirements_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_stories: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_documents: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_review_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_review_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_review_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_review_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_review_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_review_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_fixed_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_cases: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_review_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_review_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_test_cases: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_results: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_fixed_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_plan: Option<String>,
    /// Fields outside the named set.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, FieldValue>,
}

impl WorkflowState {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: Some(project_name.into()),
            ..Self::default()
        }
    }

    /// Set the free-form requirements text the pipeline starts from.
    pub fn with_requirements_input(mut self, input: impl Into<String>) -> Self {
        self.raw_requirements_input = Some(input.into());
        self
    }

    fn text_slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        let slot = match name {
            "project_name" => &mut self.project_name,
            "raw_requirements_input" => &mut self.raw_requirements_input,
            "user_stories" => &mut self.user_stories,
            "review_feedback" => &mut self.review_feedback,
            "review_status" => &mut self.review_status,
            "design_documents" => &mut self.design_documents,
            "design_review_feedback" => &mut self.design_review_feedback,
            "design_review_status" => &mut self.design_review_status,
            "code" => &mut self.code,
            "code_review_feedback" => &mut self.code_review_feedback,
            "code_review_status" => &mut self.code_review_status,
            "fixed_code" => &mut self.fixed_code,
            "security_review_feedback" => &mut self.security_review_feedback,
            "security_review_status" => &mut self.security_review_status,
            "security_fixed_code" => &mut self.security_fixed_code,
            "test_cases" => &mut self.test_cases,
            "test_review_feedback" => &mut self.test_review_feedback,
            "test_review_status" => &mut self.test_review_status,
            "fixed_test_cases" => &mut self.fixed_test_cases,
            "qa_results" => &mut self.qa_results,
            "qa_status" => &mut self.qa_status,
            "qa_fixed_code" => &mut self.qa_fixed_code,
            "deployment_plan" => &mut self.deployment_plan,
            "deployment_status" => &mut self.deployment_status,
            "monitoring_plan" => &mut self.monitoring_plan,
            "maintenance_plan" => &mut self.maintenance_plan,
            _ => return None,
        };
        Some(slot)
    }

    /// Read a textual field by name. Named fields first, then extensions.
    ///
    /// `requirements` is only returned when it holds raw text.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        let value = match name {
            "project_name" => &self.project_name,
            "raw_requirements_input" => &self.raw_requirements_input,
            "user_stories" => &self.user_stories,
            "review_feedback" => &self.review_feedback,
            "review_status" => &self.review_status,
            "design_documents" => &self.design_documents,
            "design_review_feedback" => &self.design_review_feedback,
            "design_review_status" => &self.design_review_status,
            "code" => &self.code,
            "code_review_feedback" => &self.code_review_feedback,
            "code_review_status" => &self.code_review_status,
            "fixed_code" => &self.fixed_code,
            "security_review_feedback" => &self.security_review_feedback,
            "security_review_status" => &self.security_review_status,
            "security_fixed_code" => &self.security_fixed_code,
            "test_cases" => &self.test_cases,
            "test_review_feedback" => &self.test_review_feedback,
            "test_review_status" => &self.test_review_status,
            "fixed_test_cases" => &self.fixed_test_cases,
            "qa_results" => &self.qa_results,
            "qa_status" => &self.qa_status,
            "qa_fixed_code" => &self.qa_fixed_code,
            "deployment_plan" => &self.deployment_plan,
            "deployment_status" => &self.deployment_status,
            "monitoring_plan" => &self.monitoring_plan,
            "maintenance_plan" => &self.maintenance_plan,
            "requirements" => return self.requirements.as_ref().and_then(|v| v.as_str()),
            other => return self.extensions.get(other).and_then(|v| v.as_str()),
        };
        value.as_deref()
    }

    /// Write a textual field by name; unknown names go to `extensions`.
    pub fn set_field_str(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if name == "requirements" {
            self.requirements = Some(serde_json::Value::String(value));
            return;
        }
        match self.text_slot(name) {
            Some(slot) => *slot = Some(value),
            None => {
                self.extensions.insert(
                    name.to_string(),
                    FieldValue::Json(serde_json::Value::String(value)),
                );
            }
        }
    }

    /// Clear a textual field by name.
    pub fn clear_field(&mut self, name: &str) {
        match name {
            "requirements" => self.requirements = None,
            "monitoring_data" => self.monitoring_data = None,
            other => match self.text_slot(other) {
                Some(slot) => *slot = None,
                None => {
                    self.extensions.remove(other);
                }
            },
        }
    }

    pub fn extension(&self, name: &str) -> Option<&FieldValue> {
        self.extensions.get(name)
    }

    /// Store an arbitrary value by name.
    ///
    /// Names of record fields are written to the field itself, so a field
    /// never appears twice when serialized. Text fields only take strings.
    pub fn set_extension(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> crate::error::Result<()> {
        let name = name.into();
        let value = value.into();
        let is_text_field = self.text_slot(&name).is_some();
        match (name.as_str(), value) {
            ("requirements", FieldValue::Json(v)) => self.requirements = Some(v),
            ("monitoring_data", FieldValue::Json(v)) => self.monitoring_data = Some(v),
            ("requirements" | "monitoring_data", FieldValue::Opaque(_)) => {
                return Err(DevflowError::Validation(format!(
                    "field '{}' only holds JSON values",
                    name
                )));
            }
            (field, value) if is_text_field => match value.as_str() {
                Some(text) => {
                    let text = text.to_string();
                    self.set_field_str(field, text);
                }
                None => {
                    return Err(DevflowError::Validation(format!(
                        "field '{}' only holds text",
                        field
                    )));
                }
            },
            (_, value) => {
                self.extensions.insert(name, value);
            }
        }
        Ok(())
    }

    /// Requirements rendered as prompt text (pretty JSON for documents).
    pub fn requirements_text(&self) -> Option<String> {
        match self.requirements.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())),
        }
    }
}
