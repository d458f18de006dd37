//! Protocol dispatcher.
//!
//! The transport decodes a request into a [`ProtocolRequest`] plus a
//! [`RequestContext`]; [`Dispatcher::handle`] routes it to the right
//! repository and always answers with a [`ProtocolResponse`]. Failures
//! become an OperationOutcome body with the error kind exposed for status
//! mapping. The dispatcher keeps no state between requests.

use std::fmt;
use std::sync::Arc;

use chronofhir_api::{
    ApiError, ApiResult, Bundle, ErrorKind, OperationOutcome, StatusCategory, join_url,
};
use chronofhir_core::{PreferReturn, RequestContext, Resource, SummaryMode, validate_id};
use serde_json::{Value, json};
use tracing::Instrument;

use crate::repository::{BundleOptions, DeleteOutcome, WriteOptions, WriteOutcome};
use crate::system::{DynRepository, SystemFacade};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interaction {
    /// Read, or vread when a version is given
    Read,
    /// POST on a type
    Create,
    /// PUT on an instance, or conditional PUT on a type
    Update,
    /// Delete of an instance, or conditional delete on a type
    Delete,
    Search,
    /// Instance, type or system history depending on what is addressed
    History,
    Operation,
    Batch,
    Capabilities,
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Search => "search",
            Self::History => "history",
            Self::Operation => "operation",
            Self::Batch => "batch",
            Self::Capabilities => "capabilities",
        };
        f.write_str(s)
    }
}

/// A decoded request. Conditional filters travel in the
/// [`RequestContext`]; `params` carries search, history and operation
/// query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolRequest {
    pub interaction: Interaction,
    pub resource_type: Option<String>,
    pub id: Option<String>,
    pub version: Option<String>,
    pub operation: Option<String>,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ProtocolRequest {
    fn new(interaction: Interaction) -> Self {
        Self {
            interaction,
            resource_type: None,
            id: None,
            version: None,
            operation: None,
            params: Vec::new(),
            body: None,
        }
    }

    fn on_type(interaction: Interaction, resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            ..Self::new(interaction)
        }
    }

    fn on_instance(
        interaction: Interaction,
        resource_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::on_type(interaction, resource_type)
        }
    }

    pub fn read(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::on_instance(Interaction::Read, resource_type, id)
    }

    pub fn vread(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            version: Some(version.into()),
            ..Self::read(resource_type, id)
        }
    }

    pub fn create(resource_type: impl Into<String>, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::on_type(Interaction::Create, resource_type)
        }
    }

    pub fn update(resource_type: impl Into<String>, id: impl Into<String>, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::on_instance(Interaction::Update, resource_type, id)
        }
    }

    /// PUT on a type; the filter comes from [`RequestContext::conditional`].
    pub fn conditional_update(resource_type: impl Into<String>, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::on_type(Interaction::Update, resource_type)
        }
    }

    pub fn delete(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::on_instance(Interaction::Delete, resource_type, id)
    }

    /// DELETE on a type; the filter comes from [`RequestContext::conditional`].
    pub fn conditional_delete(resource_type: impl Into<String>) -> Self {
        Self::on_type(Interaction::Delete, resource_type)
    }

    pub fn search(resource_type: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            params,
            ..Self::on_type(Interaction::Search, resource_type)
        }
    }

    pub fn type_history(resource_type: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            params,
            ..Self::on_type(Interaction::History, resource_type)
        }
    }

    pub fn instance_history(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        params: Vec<(String, String)>,
    ) -> Self {
        Self {
            params,
            ..Self::on_instance(Interaction::History, resource_type, id)
        }
    }

    pub fn system_history(params: Vec<(String, String)>) -> Self {
        Self {
            params,
            ..Self::new(Interaction::History)
        }
    }

    /// `Type/$name` or, with an id, `Type/id/$name`.
    pub fn operation(
        resource_type: impl Into<String>,
        id: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            operation: Some(name.into()),
            ..Self::on_type(Interaction::Operation, resource_type)
        }
    }

    /// `$name` at the server base.
    pub fn system_operation(name: impl Into<String>) -> Self {
        Self {
            operation: Some(name.into()),
            ..Self::new(Interaction::Operation)
        }
    }

    pub fn batch(bundle: Value) -> Self {
        Self {
            body: Some(bundle),
            ..Self::new(Interaction::Batch)
        }
    }

    pub fn capabilities() -> Self {
        Self::new(Interaction::Capabilities)
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolBody {
    Resource(Value),
    Bundle(Bundle),
    Outcome(OperationOutcome),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolResponse {
    pub status: StatusCategory,
    pub body: ProtocolBody,
    /// Set on failures, for the transport's status mapping.
    pub error_kind: Option<ErrorKind>,
    pub location: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// `Prefer: return=minimal`: the transport drops the body but keeps
    /// the headers.
    pub suppress_body: bool,
    pub resource_base: String,
    pub summary: SummaryMode,
}

impl ProtocolResponse {
    fn new(status: StatusCategory, body: ProtocolBody) -> Self {
        Self {
            status,
            body,
            error_kind: None,
            location: None,
            etag: None,
            last_modified: None,
            suppress_body: false,
            resource_base: String::new(),
            summary: SummaryMode::False,
        }
    }

    pub(crate) fn ok(body: ProtocolBody) -> Self {
        Self::new(StatusCategory::Ok, body)
    }

    pub fn from_error(err: &ApiError) -> Self {
        Self {
            error_kind: Some(err.kind()),
            ..Self::new(err.status(), ProtocolBody::Outcome(err.to_operation_outcome()))
        }
    }

    fn with_version_headers(mut self, resource: &Resource) -> Self {
        self.etag = Some(resource.version_id.etag());
        self.last_modified = Some(resource.last_updated.to_string());
        self
    }

    /// Stamps base address and summary mode; bundles keep the mode they
    /// were rendered under.
    pub(crate) fn stamped(mut self, base: &str, summary: SummaryMode) -> Self {
        self.resource_base = base.to_string();
        self.summary = match &self.body {
            ProtocolBody::Bundle(b) => b.summary.unwrap_or(summary),
            _ => summary,
        };
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn resource(&self) -> Option<&Value> {
        match &self.body {
            ProtocolBody::Resource(v) => Some(v),
            _ => None,
        }
    }

    pub fn bundle(&self) -> Option<&Bundle> {
        match &self.body {
            ProtocolBody::Bundle(b) => Some(b),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<&OperationOutcome> {
        match &self.body {
            ProtocolBody::Outcome(o) => Some(o),
            _ => None,
        }
    }

    /// The body as JSON, ignoring `suppress_body`.
    pub fn body_json(&self) -> Option<Value> {
        match &self.body {
            ProtocolBody::Resource(v) => Some(v.clone()),
            ProtocolBody::Bundle(b) => Some(b.to_value()),
            ProtocolBody::Outcome(o) => Some(o.to_value()),
            ProtocolBody::Empty => None,
        }
    }

    /// The body the transport should send.
    pub fn to_json(&self) -> Option<Value> {
        if self.suppress_body {
            return None;
        }
        self.body_json()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    facade: Arc<SystemFacade>,
    default_count: usize,
    max_count: usize,
}

impl Dispatcher {
    pub const DEFAULT_COUNT: usize = 50;
    pub const MAX_COUNT: usize = 500;

    pub fn new(facade: Arc<SystemFacade>) -> Self {
        Self {
            facade,
            default_count: Self::DEFAULT_COUNT,
            max_count: Self::MAX_COUNT,
        }
    }

    pub fn with_page_limits(mut self, default_count: usize, max_count: usize) -> Self {
        self.default_count = default_count;
        self.max_count = max_count;
        self
    }

    pub fn facade(&self) -> &SystemFacade {
        &self.facade
    }

    /// Handles one request. Never fails: errors come back as a response
    /// carrying an OperationOutcome and the error kind.
    pub async fn handle(&self, request: ProtocolRequest, ctx: &RequestContext) -> ProtocolResponse {
        let span = tracing::info_span!(
            "request",
            correlation_id = %ctx.correlation_id(),
            interaction = %request.interaction,
            resource_type = request.resource_type.as_deref().unwrap_or("-"),
            id = request.id.as_deref().unwrap_or("-"),
        );

        async move {
            let result = match request.interaction {
                Interaction::Batch => self.process_batch(request.body, ctx).await,
                _ => self.execute(request, ctx).await,
            };
            match result {
                Ok(response) => response,
                Err(err) => {
                    log_failure(&err);
                    ProtocolResponse::from_error(&err).stamped(ctx.base_uri(), ctx.summary())
                }
            }
        }
        .instrument(span)
        .await
    }

    fn bundle_options(&self, ctx: &RequestContext) -> BundleOptions {
        let page_size = ctx.page_size().unwrap_or(self.default_count);
        BundleOptions::new(ctx.base_uri(), page_size, self.max_count).with_summary(ctx.summary())
    }

    fn repository(&self, request: &ProtocolRequest) -> ApiResult<DynRepository> {
        let rt = request.resource_type.as_deref().ok_or_else(|| {
            ApiError::bad_request(format!("{} requires a resource type", request.interaction))
        })?;
        self.facade.repository(rt)
    }

    /// Runs a single, non-batch request.
    pub(crate) async fn execute(
        &self,
        request: ProtocolRequest,
        ctx: &RequestContext,
    ) -> ApiResult<ProtocolResponse> {
        if let Some(id) = request.id.as_deref() {
            validate_id(id).map_err(|e| ApiError::bad_request(format!("invalid id '{id}': {e}")))?;
        }
        let summary = ctx.summary();
        let opts = self.bundle_options(ctx);

        let response = match request.interaction {
            Interaction::Capabilities => {
                ProtocolResponse::ok(ProtocolBody::Resource(self.facade.capabilities().to_value()))
            }
            Interaction::Batch => {
                return Err(ApiError::bad_request(
                    "a batch cannot be nested inside another batch",
                ));
            }
            Interaction::History if request.resource_type.is_none() => {
                let bundle = self.facade.system_history(&request.params, &opts).await?;
                ProtocolResponse::ok(ProtocolBody::Bundle(bundle))
            }
            Interaction::History => {
                let repo = self.repository(&request)?;
                let bundle = match request.id.as_deref() {
                    Some(id) => repo.instance_history(id, &request.params, &opts).await?,
                    None => repo.type_history(&request.params, &opts).await?,
                };
                ProtocolResponse::ok(ProtocolBody::Bundle(bundle))
            }
            Interaction::Search => {
                let repo = self.repository(&request)?;
                let bundle = repo.search(&request.params, &opts).await?;
                ProtocolResponse::ok(ProtocolBody::Bundle(bundle))
            }
            Interaction::Read => {
                let repo = self.repository(&request)?;
                let id = required_id(&request)?;
                let resource = repo.get(id, request.version.as_deref(), summary).await?;
                ProtocolResponse::ok(ProtocolBody::Resource(resource.to_json()))
                    .with_version_headers(&resource)
            }
            Interaction::Create => {
                let repo = self.repository(&request)?;
                let body = required_body(request.body)?;
                let options = WriteOptions {
                    if_none_exist: non_empty(ctx.conditional()),
                    ..WriteOptions::create_only()
                };
                write_response(repo.create(body, options).await?, ctx)
            }
            Interaction::Update => {
                let repo = self.repository(&request)?;
                let mut body = required_body(request.body)?;
                let options = match request.id.as_deref() {
                    Some(id) => {
                        align_body_id(&mut body, id)?;
                        WriteOptions::default()
                    }
                    None => WriteOptions {
                        if_match: Some(non_empty(ctx.conditional()).ok_or_else(|| {
                            ApiError::bad_request("conditional update requires search parameters")
                        })?),
                        ..WriteOptions::default()
                    },
                };
                write_response(repo.create(body, options).await?, ctx)
            }
            Interaction::Delete => {
                let repo = self.repository(&request)?;
                let outcome = match request.id.as_deref() {
                    Some(id) => repo.delete(Some(id), None).await?,
                    None => repo.delete(None, Some(ctx.conditional())).await?,
                };
                delete_response(outcome)
            }
            Interaction::Operation => {
                let name = request
                    .operation
                    .as_deref()
                    .ok_or_else(|| ApiError::bad_request("operation name is missing"))?;
                let params = match request.body {
                    Some(body) => body,
                    None => parameters_from_query(&request.params),
                };
                let result = match request.resource_type.as_deref() {
                    None if request.id.is_some() => {
                        return Err(ApiError::bad_request(
                            "an instance operation requires a resource type",
                        ));
                    }
                    None => self.facade.perform_operation(name, &params, summary).await?,
                    Some(rt) => {
                        self.facade
                            .repository(rt)?
                            .perform_operation(name, &params, summary, request.id.as_deref())
                            .await?
                    }
                };
                ProtocolResponse::ok(ProtocolBody::Resource(result))
            }
        };

        Ok(response.stamped(ctx.base_uri(), summary))
    }
}

fn required_id(request: &ProtocolRequest) -> ApiResult<&str> {
    request
        .id
        .as_deref()
        .ok_or_else(|| ApiError::bad_request(format!("{} requires an id", request.interaction)))
}

fn required_body(body: Option<Value>) -> ApiResult<Value> {
    body.ok_or_else(|| ApiError::bad_request("request body is missing"))
}

fn non_empty(params: &[(String, String)]) -> Option<Vec<(String, String)>> {
    (!params.is_empty()).then(|| params.to_vec())
}

/// The addressed id wins; a different id in the body is an error.
fn align_body_id(body: &mut Value, id: &str) -> ApiResult<()> {
    let Some(obj) = body.as_object_mut() else {
        return Err(ApiError::bad_request("resource body must be a JSON object"));
    };
    match obj.get("id").and_then(Value::as_str) {
        Some(body_id) if !body_id.is_empty() && body_id != id => Err(ApiError::bad_request(
            format!("resource id '{body_id}' does not match the addressed id '{id}'"),
        )),
        _ => {
            obj.insert("id".into(), json!(id));
            Ok(())
        }
    }
}

fn write_response(outcome: WriteOutcome, ctx: &RequestContext) -> ProtocolResponse {
    let WriteOutcome {
        resource,
        created,
        written,
    } = outcome;
    let status = if created {
        StatusCategory::Created
    } else {
        StatusCategory::Ok
    };
    let body = match ctx.prefer() {
        PreferReturn::OperationOutcome => {
            let action = match (written, created) {
                (false, _) => "matched an existing resource",
                (true, true) => "created",
                (true, false) => "updated",
            };
            ProtocolBody::Outcome(OperationOutcome::information(format!(
                "{} {action} at version {}",
                resource.reference(),
                resource.version_id
            )))
        }
        PreferReturn::Representation | PreferReturn::Minimal => {
            ProtocolBody::Resource(resource.to_json())
        }
    };
    ProtocolResponse {
        location: Some(join_url(ctx.base_uri(), &resource.versioned_reference())),
        suppress_body: ctx.prefer() == PreferReturn::Minimal,
        ..ProtocolResponse::new(status, body).with_version_headers(&resource)
    }
}

fn delete_response(outcome: DeleteOutcome) -> ProtocolResponse {
    let response = ProtocolResponse::new(StatusCategory::NoContent, ProtocolBody::Empty);
    match outcome {
        DeleteOutcome::Deleted { tombstones } => match tombstones.last() {
            Some(last) => ProtocolResponse {
                etag: Some(last.version_id.etag()),
                ..response
            },
            None => response,
        },
        DeleteOutcome::NoOp => response,
    }
}

/// Query parameters as a `Parameters` resource, for operations invoked
/// without a body.
fn parameters_from_query(params: &[(String, String)]) -> Value {
    let parameter: Vec<Value> = params
        .iter()
        .map(|(name, value)| json!({"name": name, "valueString": value}))
        .collect();
    json!({"resourceType": "Parameters", "parameter": parameter})
}

pub(crate) fn log_failure(err: &ApiError) {
    if err.is_client_error() {
        tracing::warn!(kind = %err.kind(), error = %err.message(), "request failed");
    } else {
        tracing::error!(kind = %err.kind(), error = %err.message(), "request failed");
    }
}
