//! HTTP work units: multipart uploads that create resources, and the deletes that undo them.
use crate::assessment::PayloadSizeResult;
use crate::cleanup::{CleanupCoordinator, CleanupReport, Deleter};
use crate::workload::WorkUnit;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use stampede_core::{CleanupError, Completion, InvocationError};
use std::time::{Duration, Instant};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

const ITERATION_PLACEHOLDER: &str = "{i}";
const DEFAULT_ID_POINTER: &str = "/data/id";

/// Shared per-run HTTP context.
#[derive(Clone, Debug, Default)]
pub struct HttpContext {
    pub token: Option<String>,
}

impl HttpContext {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

/// File body attached to every upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    /// File name; `{i}` is replaced with the iteration index.
    pub file_name: String,
    pub content_type: String,
}

impl Payload {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            content_type: content_type.into(),
        }
    }

    /// Synthetic body of exactly `size` bytes.
    pub fn filled(size: usize, file_name: impl Into<String>, content_type: impl Into<String>) -> Self {
        let bytes = (0..size).map(|i| (i % 251) as u8).collect();
        Self::new(bytes, file_name, content_type)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Posts a multipart form per iteration and reports the id of the created resource.
///
/// A response counts as successful when it is 2xx and its JSON body does not carry
/// `"success": false`. The created id is read through `id_pointer` (default `/data/id`).
#[derive(Clone, Debug)]
pub struct MultipartUpload {
    client: Client,
    url: String,
    fields: Vec<(String, String)>,
    file_field: String,
    payload: Payload,
    id_pointer: String,
}

impl MultipartUpload {
    pub fn new(client: Client, url: impl Into<String>, file_field: impl Into<String>, payload: Payload) -> Self {
        Self {
            client,
            url: url.into(),
            fields: vec![],
            file_field: file_field.into(),
            payload,
            id_pointer: DEFAULT_ID_POINTER.to_string(),
        }
    }

    /// Adds a text field; `{i}` in the value is replaced with the iteration index.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn id_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.id_pointer = pointer.into();
        self
    }

    pub fn with_payload(&self, payload: Payload) -> Self {
        Self {
            payload,
            ..self.clone()
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    fn form(&self, iteration: u64) -> Result<Form, InvocationError> {
        let i = iteration.to_string();
        let form = self
            .fields
            .iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.replace(ITERATION_PLACEHOLDER, &i))
            });

        let part = Part::bytes(self.payload.bytes.clone())
            .file_name(self.payload.file_name.replace(ITERATION_PLACEHOLDER, &i))
            .mime_str(&self.payload.content_type)
            .map_err(InvocationError::transport)?;

        Ok(form.part(self.file_field.clone(), part))
    }
}

impl WorkUnit for MultipartUpload {
    type Context = HttpContext;

    async fn invoke(&self, iteration: u64, ctx: &HttpContext) -> Result<Completion, InvocationError> {
        let form = self.form(iteration)?;
        let res = ctx
            .authorize(self.client.post(&self.url).multipart(form))
            .send()
            .await
            .map_err(InvocationError::transport)?;

        let body = read_body(res).await?;
        created_from_body(&body, &self.id_pointer)
    }
}

async fn read_body(res: Response) -> Result<Value, InvocationError> {
    let status = res.status();
    if !status.is_success() {
        return Err(InvocationError::Status(status.as_u16()));
    }

    let text = res.text().await.map_err(InvocationError::transport)?;
    Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
}

fn created_from_body(body: &Value, id_pointer: &str) -> Result<Completion, InvocationError> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let msg = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Request rejected");
        return Err(InvocationError::rejected(msg));
    }

    let id = match body.pointer(id_pointer) {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };

    Ok(Completion {
        created_resource_id: id,
    })
}

/// Deletes created resources with `DELETE {base_url}/{id}`. Any 2xx counts as deleted.
#[derive(Clone, Debug)]
pub struct HttpDeleter {
    client: Client,
    base_url: String,
    context: HttpContext,
}

impl HttpDeleter {
    pub fn new(client: Client, base_url: impl Into<String>, context: HttpContext) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            context,
        }
    }
}

impl Deleter for HttpDeleter {
    async fn delete(&self, id: &str) -> Result<(), CleanupError> {
        let url = format!("{}/{}", self.base_url, id);
        let res = self
            .context
            .authorize(self.client.delete(url))
            .send()
            .await
            .map_err(CleanupError::transport)?;

        if res.status().is_success() {
            Ok(())
        } else {
            Err(CleanupError::Status(res.status().as_u16()))
        }
    }
}

/// Outcome of [`payload_sweep`]: one row per payload size plus the combined cleanup.
#[derive(Clone, Debug, PartialEq)]
pub struct PayloadSweep {
    pub results: Vec<PayloadSizeResult>,
    pub cleanup: CleanupReport,
}

/// Uploads each payload `runs` times in sequence and reports mean time and throughput per size.
///
/// Each upload is bounded by `timeout`; an expired upload counts as failed. Everything created
/// for one size is cleaned up before moving on to the next.
#[instrument(name = "payload_sweep", skip_all, fields(sizes = payloads.len(), runs = runs))]
pub async fn payload_sweep<D: Deleter>(
    upload: &MultipartUpload,
    ctx: &HttpContext,
    payloads: &[(String, Payload)],
    runs: usize,
    timeout: Duration,
    deleter: &D,
) -> PayloadSweep {
    let resources = CleanupCoordinator::new();
    let mut sweep = PayloadSweep {
        results: Vec::with_capacity(payloads.len()),
        cleanup: CleanupReport::default(),
    };

    for (description, payload) in payloads {
        let upload = upload.with_payload(payload.clone());
        let mut times = vec![];
        let mut failed = 0;

        for i in 0..runs {
            let start = Instant::now();
            let outcome = match tokio::time::timeout(timeout, upload.invoke(i as u64, ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(InvocationError::Timeout(timeout)),
            };

            match outcome {
                Ok(completion) => {
                    times.push(start.elapsed());
                    if let Some(id) = completion.created_resource_id {
                        resources.track(&id);
                    }
                }
                Err(err) => {
                    warn!("{description} upload failed: {err}");
                    failed += 1;
                }
            }
        }

        sweep.cleanup.absorb(resources.cleanup(deleter).await);

        let mean = (!times.is_empty())
            .then(|| times.iter().sum::<Duration>() / times.len() as u32);

        sweep.results.push(PayloadSizeResult {
            description: description.clone(),
            size_bytes: payload.len(),
            succeeded: times.len(),
            failed,
            mean,
        });
    }

    sweep
}
