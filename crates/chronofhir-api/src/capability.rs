use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityStatement {
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub fhir_version: String,
    pub format: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rest: Vec<CapabilityStatementRest>,
}

impl CapabilityStatement {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityStatementRest {
    pub mode: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub resource: Vec<CapabilityStatementRestResource>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub interaction: Vec<ResourceInteraction>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub operation: Vec<CapabilityStatementRestOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityStatementRestOperation {
    /// Operation name without the `$` prefix
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityStatementRestResource {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub interaction: Vec<ResourceInteraction>,
    /// `versioned` for stores that keep every version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning: Option<String>,
    pub read_history: bool,
    pub update_create: bool,
    pub conditional_create: bool,
    pub conditional_update: bool,
    /// `not-supported` | `single` | `multiple`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditional_delete: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub search_param: Vec<SearchParam>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub operation: Vec<CapabilityStatementRestOperation>,
}

impl CapabilityStatementRestResource {
    /// A versioned resource supporting the full interaction set.
    pub fn versioned(type_name: impl Into<String>) -> Self {
        Self {
            type_: type_name.into(),
            interaction: [
                "read",
                "vread",
                "update",
                "delete",
                "history-instance",
                "history-type",
                "create",
                "search-type",
            ]
            .iter()
            .map(|code| ResourceInteraction {
                code: (*code).to_string(),
            })
            .collect(),
            versioning: Some("versioned".to_string()),
            read_history: true,
            update_create: true,
            conditional_create: true,
            conditional_update: true,
            conditional_delete: Some("multiple".to_string()),
            search_param: Vec::new(),
            operation: Vec::new(),
        }
    }

    pub fn with_search_params(mut self, params: Vec<SearchParam>) -> Self {
        self.search_param = params;
        self
    }

    pub fn with_operation(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.operation.push(CapabilityStatementRestOperation {
            name: name.into(),
            definition: definition.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceInteraction {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchParam {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl SearchParam {
    pub fn id() -> Self {
        Self {
            name: "_id".to_string(),
            type_: "token".to_string(),
            documentation: Some("Logical id of the resource".to_string()),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CapabilityStatementBuilder {
    status: Option<String>,
    kind: Option<String>,
    date: Option<String>,
    fhir_version: String,
    formats: Vec<String>,
    resources: Vec<CapabilityStatementRestResource>,
    system_interactions: Vec<ResourceInteraction>,
    system_operations: Vec<CapabilityStatementRestOperation>,
}

impl CapabilityStatementBuilder {
    pub fn new_json_r4() -> Self {
        Self {
            status: Some("active".to_string()),
            kind: Some("instance".to_string()),
            date: None,
            fhir_version: "4.0.1".to_string(),
            formats: vec!["application/fhir+json".to_string()],
            resources: Vec::new(),
            system_interactions: Vec::new(),
            system_operations: Vec::new(),
        }
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn fhir_version(mut self, version: impl Into<String>) -> Self {
        self.fhir_version = version.into();
        self
    }

    pub fn add_resource(mut self, resource: CapabilityStatementRestResource) -> Self {
        self.resources.push(resource);
        self
    }

    /// System-level interaction such as `batch` or `history-system`.
    pub fn add_system_interaction(mut self, code: impl Into<String>) -> Self {
        self.system_interactions
            .push(ResourceInteraction { code: code.into() });
        self
    }

    /// Operation invocable at the server base.
    pub fn add_system_operation(
        mut self,
        name: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        self.system_operations.push(CapabilityStatementRestOperation {
            name: name.into(),
            definition: definition.into(),
        });
        self
    }

    pub fn build(self) -> CapabilityStatement {
        let mut format = self.formats;
        if format.is_empty() {
            format.push("application/fhir+json".to_string());
        }
        CapabilityStatement {
            resource_type: "CapabilityStatement".to_string(),
            status: self.status,
            date: self.date,
            kind: self.kind,
            fhir_version: self.fhir_version,
            format,
            rest: vec![CapabilityStatementRest {
                mode: "server".to_string(),
                resource: self.resources,
                interaction: self.system_interactions,
                operation: self.system_operations,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_capability_statement_with_resources() {
        let cs = CapabilityStatementBuilder::new_json_r4()
            .add_resource(
                CapabilityStatementRestResource::versioned("Patient")
                    .with_search_params(vec![SearchParam::id()])
                    .with_operation("instance-count", "urn:chronofhir:operation:instance-count"),
            )
            .add_system_interaction("batch")
            .add_system_interaction("history-system")
            .add_system_operation("ping", "urn:chronofhir:operation:ping")
            .build();

        let j = cs.to_value();
        assert_eq!(j["resourceType"], "CapabilityStatement");
        assert_eq!(j["fhirVersion"], "4.0.1");
        assert_eq!(j["format"][0], "application/fhir+json");
        assert_eq!(j["rest"][0]["mode"], "server");

        let patient = &j["rest"][0]["resource"][0];
        assert_eq!(patient["type"], "Patient");
        assert_eq!(patient["versioning"], "versioned");
        assert_eq!(patient["readHistory"], true);
        assert_eq!(patient["conditionalDelete"], "multiple");
        assert_eq!(patient["searchParam"][0]["name"], "_id");
        assert_eq!(patient["operation"][0]["name"], "instance-count");
        let interactions = patient["interaction"].as_array().unwrap();
        assert!(interactions.iter().any(|v| v["code"] == "vread"));
        assert!(interactions.iter().any(|v| v["code"] == "history-type"));

        let system = j["rest"][0]["interaction"].as_array().unwrap();
        assert_eq!(system.len(), 2);
        assert_eq!(j["rest"][0]["operation"][0]["name"], "ping");
    }
}
