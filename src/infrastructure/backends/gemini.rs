#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::frame_decoder::Frame;
use super::frame_decoder::FrameDecoder;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::BackendRequest;
use crate::domain::models::Content;
use crate::domain::models::CredentialStore;
use crate::domain::models::EventStream;
use crate::domain::models::StreamEvent;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolDeclaration;
use crate::domain::models::TransportError;

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet<'a> {
    function_declarations: &'a [ToolDeclaration],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    system_instruction: SystemInstruction<'a>,
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

impl<'a> CompletionRequest<'a> {
    fn new(request: &'a BackendRequest) -> CompletionRequest<'a> {
        let mut tools = vec![];
        if !request.tools.is_empty() {
            tools.push(ToolSet {
                function_declarations: &request.tools,
            });
        }

        return CompletionRequest {
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: &request.system_instruction,
                }],
            },
            contents: &request.contents,
            tools,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    function_call: Option<ToolCall>,
}

#[derive(Default, Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Default, Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<Value>,
}

/// Turns one decoded record into stream events. Records that fail to decode
/// are logged and skipped so the rest of the stream still gets through.
fn decode_payload(payload: &str) -> Vec<StreamEvent> {
    let res = match serde_json::from_str::<GenerateContentResponse>(payload) {
        Ok(res) => res,
        Err(err) => {
            tracing::warn!(error = ?err, payload, "Skipping undecodable Gemini record");
            return vec![];
        }
    };

    if let Some(error) = res.error {
        tracing::warn!(error = ?error, "Gemini reported an error mid-stream");
    }

    let Some(candidate) = res.candidates.into_iter().next() else {
        return vec![];
    };
    if let Some(reason) = &candidate.finish_reason {
        tracing::debug!(reason = reason.as_str(), "Gemini finished candidate");
    }

    return candidate
        .content
        .map(|content| return content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| {
            if let Some(call) = part.function_call {
                return Some(StreamEvent::ToolCall(call));
            }
            return part
                .text
                .filter(|text| return !text.is_empty())
                .map(StreamEvent::Text);
        })
        .collect();
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: FrameDecoder,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn push_frames(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            match frame {
                Frame::Payload(payload) => self.pending.extend(decode_payload(&payload)),
                Frame::Done => self.finish(),
            }
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.pending.push_back(StreamEvent::Done);
            self.finished = true;
        }
    }
}

/// Lazily decodes a streamed response body into events. Nothing is read from
/// the body until the returned stream is polled.
pub fn decode_events<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: FrameDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    return EventStream::new(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.feed(chunk.as_ref());
                    state.push_frames(frames);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err.into()), state));
                }
                None => {
                    let frames = state.decoder.finish();
                    state.push_frames(frames);
                    state.finish();
                }
            }
        }
    }));
}

pub struct Gemini {
    url: String,
    model: String,
    timeout: String,
    credentials: Arc<dyn CredentialStore>,
    client: reqwest::Client,
}

impl Gemini {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Gemini {
        return Gemini {
            url: Config::get(ConfigKey::GeminiURL),
            model: Config::get(ConfigKey::Model),
            timeout: Config::get(ConfigKey::HealthCheckTimeout),
            credentials,
            client: reqwest::Client::new(),
        };
    }

    fn model_name(&self) -> &str {
        return self.model.trim_start_matches("models/");
    }

    async fn api_key(&self) -> Result<String> {
        match self.credentials.get().await? {
            Some(key) if !key.trim().is_empty() => return Ok(key),
            _ => return Err(TransportError::MissingCredential.into()),
        }
    }
}

#[async_trait]
impl Backend for Gemini {
    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.url.is_empty() {
            bail!("Gemini URL is not defined");
        }
        let key = self.api_key().await?;

        let url = format!(
            "{url}/v1beta/models/{model}?key={key}",
            url = self.url,
            model = self.model_name(),
        );

        let res = self
            .client
            .get(&url)
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .send()
            .await
            .map_err(|err| return err.without_url());

        let res = match res {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(error = ?err, "Gemini is not reachable");
                bail!("Gemini is not reachable");
            }
        };

        let status = res.status().as_u16();
        if status >= 400 {
            tracing::error!(status = status, "Gemini health check failed");
            return Err(TransportError::Status(status).into());
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn stream(&self, request: BackendRequest) -> Result<EventStream> {
        let key = self.api_key().await?;
        let body = CompletionRequest::new(&request);

        tracing::debug!(
            contents = request.contents.len(),
            tools = request.tools.len(),
            "Sending Gemini request"
        );

        let res = self
            .client
            .post(format!(
                "{url}/v1beta/models/{model}:streamGenerateContent?alt=sse&key={key}",
                url = self.url,
                model = self.model_name(),
            ))
            .json(&body)
            .send()
            .await
            .map_err(|err| return err.without_url())?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let details = res.text().await.unwrap_or_default();
            tracing::error!(
                status = status,
                details = details.as_str(),
                "Failed to make completion request to Gemini"
            );
            return Err(TransportError::Status(status).into());
        }

        return Ok(decode_events(
            res.bytes_stream()
                .map(|chunk| return chunk.map_err(|err| return err.without_url())),
        ));
    }
}
