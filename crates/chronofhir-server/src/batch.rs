//! Batch bundles.
//!
//! Every entry becomes an independent [`ProtocolRequest`] run through the
//! dispatcher in input order. A failing entry produces an error entry in
//! the response and never stops its siblings.

use chronofhir_api::{
    ApiError, ApiResult, Bundle, BundleEntry, BundleEntryResponse, BundleType, StatusCategory,
};
use chronofhir_core::RequestContext;
use chronofhir_search::parse_query;
use serde_json::Value;

use crate::dispatcher::{Dispatcher, ProtocolBody, ProtocolRequest, ProtocolResponse, log_failure};

type Params = Vec<(String, String)>;

impl Dispatcher {
    pub(crate) async fn process_batch(
        &self,
        body: Option<Value>,
        ctx: &RequestContext,
    ) -> ApiResult<ProtocolResponse> {
        let body = body.ok_or_else(|| ApiError::bad_request("batch requires a Bundle body"))?;
        if body.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
            return Err(ApiError::bad_request("batch body must be a Bundle"));
        }
        let bundle: Bundle = serde_json::from_value(body)
            .map_err(|e| ApiError::bad_request(format!("malformed Bundle: {e}")))?;

        match bundle.bundle_type {
            BundleType::Batch => {}
            BundleType::Transaction => {
                return Err(ApiError::not_implemented(
                    "transaction bundles are not supported; submit a batch instead",
                ));
            }
            other => {
                return Err(ApiError::bad_request(format!(
                    "expected a batch Bundle, got type '{}'",
                    serde_json::to_value(other)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default()
                )));
            }
        }

        let total = bundle.entry.len();
        let mut entries = Vec::with_capacity(total);
        for (index, entry) in bundle.entry.into_iter().enumerate() {
            let result = match entry_request(entry, ctx.base_uri()) {
                Ok((request, conditional)) => {
                    let entry_ctx = ctx.for_batch_entry(index, conditional);
                    self.execute(request, &entry_ctx).await
                }
                Err(err) => Err(err),
            };
            let response_entry = match result {
                Ok(response) => success_entry(response),
                Err(err) => {
                    log_failure(&err);
                    error_entry(&err)
                }
            };
            entries.push(response_entry);
        }

        let failed = entries
            .iter()
            .filter(|e| e.response.as_ref().is_some_and(|r| !r.status.starts_with('2')))
            .count();
        tracing::debug!(entries = total, failed, "batch processed");

        let bundle = Bundle::batch_response(entries).annotated(ctx.base_uri(), ctx.summary());
        Ok(ProtocolResponse::ok(ProtocolBody::Bundle(bundle)).stamped(ctx.base_uri(), ctx.summary()))
    }
}

/// Decodes one batch entry into a request and its conditional filter.
fn entry_request(entry: BundleEntry, base: &str) -> ApiResult<(ProtocolRequest, Params)> {
    let request = entry
        .request
        .ok_or_else(|| ApiError::bad_request("batch entry has no request"))?;

    let url = request.url.trim();
    let url = url.strip_prefix(base).unwrap_or(url);
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let params = parse_query(query);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let unsupported = || {
        ApiError::bad_request(format!(
            "unsupported batch request: {} {}",
            request.method, request.url
        ))
    };

    let method = request.method.to_ascii_uppercase();
    let mut conditional = Vec::new();
    let parsed = match (method.as_str(), segments.as_slice()) {
        ("GET", ["metadata"]) => ProtocolRequest::capabilities(),
        ("GET", ["_history"]) => ProtocolRequest::system_history(params),
        ("GET", [op]) if op.starts_with('$') => {
            ProtocolRequest::system_operation(*op).with_params(params)
        }
        ("GET", [rt, "_history"]) => ProtocolRequest::type_history(*rt, params),
        ("GET", [rt, op]) if op.starts_with('$') => {
            ProtocolRequest::operation(*rt, None, *op).with_params(params)
        }
        ("GET", [rt]) => ProtocolRequest::search(*rt, params),
        ("GET", [rt, id]) => ProtocolRequest::read(*rt, *id),
        ("GET", [rt, id, "_history"]) => ProtocolRequest::instance_history(*rt, *id, params),
        ("GET", [rt, id, "_history", vid]) => ProtocolRequest::vread(*rt, *id, *vid),
        ("GET", [rt, id, op]) if op.starts_with('$') => {
            ProtocolRequest::operation(*rt, Some(id.to_string()), *op).with_params(params)
        }
        ("POST", [op]) if op.starts_with('$') => ProtocolRequest {
            body: entry.resource,
            ..ProtocolRequest::system_operation(*op).with_params(params)
        },
        ("POST", [rt]) => {
            if let Some(filter) = request.if_none_exist.as_deref() {
                conditional = parse_query(filter);
            }
            ProtocolRequest {
                body: entry.resource,
                ..ProtocolRequest::create(*rt, Value::Null)
            }
        }
        ("POST", [rt, op]) if op.starts_with('$') => ProtocolRequest {
            body: entry.resource,
            ..ProtocolRequest::operation(*rt, None, *op).with_params(params)
        },
        ("POST", [rt, id, op]) if op.starts_with('$') => ProtocolRequest {
            body: entry.resource,
            ..ProtocolRequest::operation(*rt, Some(id.to_string()), *op).with_params(params)
        },
        ("PUT", [rt, id]) => ProtocolRequest {
            body: entry.resource,
            ..ProtocolRequest::update(*rt, *id, Value::Null)
        },
        ("PUT", [rt]) => {
            conditional = params;
            ProtocolRequest {
                body: entry.resource,
                ..ProtocolRequest::conditional_update(*rt, Value::Null)
            }
        }
        ("DELETE", [rt, id]) => ProtocolRequest::delete(*rt, *id),
        ("DELETE", [rt]) => {
            conditional = params;
            ProtocolRequest::conditional_delete(*rt)
        }
        _ => return Err(unsupported()),
    };
    Ok((parsed, conditional))
}

fn success_entry(response: ProtocolResponse) -> BundleEntry {
    let ProtocolResponse {
        status,
        body,
        location,
        etag,
        last_modified,
        suppress_body,
        ..
    } = response;

    let mut out = BundleEntryResponse {
        status: status.to_string(),
        location,
        etag,
        last_modified,
        outcome: None,
    };
    let resource = match body {
        _ if suppress_body => None,
        ProtocolBody::Resource(v) => Some(v),
        ProtocolBody::Bundle(b) => Some(b.to_value()),
        ProtocolBody::Outcome(o) => {
            out.outcome = Some(o.to_value());
            None
        }
        ProtocolBody::Empty => None,
    };
    BundleEntry {
        resource,
        response: Some(out),
        ..Default::default()
    }
}

fn error_entry(err: &ApiError) -> BundleEntry {
    let status: StatusCategory = err.status();
    BundleEntry {
        response: Some(BundleEntryResponse {
            status: status.to_string(),
            outcome: Some(err.to_operation_outcome().to_value()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
