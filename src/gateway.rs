use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::metrics::{UPSTREAM_FAILURES, UPSTREAM_LATENCY};
use crate::models::{Batch, CurationResult};

pub const SYSTEM_INSTRUCTION: &str = "You are an expert social media editor. Analyze the provided images and select the single best one for an engaging social post. Return ONLY a JSON object: { \"recommendedIndex\": number, \"caption\": \"string\", \"vibe\": \"string\" }.";

const API_KEY_HEADER: &str = "x-goog-api-key";

pub const USER_INSTRUCTION: &str = "Analyze these images and select exactly one, the single best for an engaging social post. Reply with the JSON object only, with fields recommendedIndex (zero-based index of the chosen image), caption and vibe.";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct GeminiGateway {
    client: reqwest::Client,
    config: GeminiConfig,
}

// Request wire format

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: SystemInstruction<'a>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

// Response wire format, only the path to the first text part

#[derive(Deserialize, Default)]
#[serde(default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

fn build_request(batch: &Batch) -> GenerateContentRequest<'_> {
    let mut parts: Vec<Part<'_>> = batch
        .images
        .iter()
        .map(|img| Part::Inline {
            inline_data: InlineData {
                mime_type: &img.mime_type,
                data: &img.base64,
            },
        })
        .collect();
    parts.push(Part::Text { text: USER_INSTRUCTION });

    GenerateContentRequest {
        contents: vec![Content { role: "user", parts }],
        system_instruction: SystemInstruction {
            parts: vec![Part::Text { text: SYSTEM_INSTRUCTION }],
        },
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
        },
    }
}

impl GeminiGateway {
    pub fn new(config: GeminiConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    // Key travels in a header so it never shows up in a url
    fn endpoint(&self) -> Result<Url, GatewayError> {
        let raw = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        Url::parse(&raw).map_err(|e| GatewayError::Upstream {
            status: None,
            body: format!("invalid Gemini endpoint: {e}"),
        })
    }

    /// Ask the model to pick the best image of the batch.
    ///
    /// No retries: the caller already spent a rate-limit slot on this request.
    pub async fn recommend(&self, batch: &Batch) -> Result<CurationResult, GatewayError> {
        let result = self.call(batch).await;
        if let Err(e) = &result {
            UPSTREAM_FAILURES.inc();
            warn!(error = %e, "Gemini call failed");
        }
        result
    }

    async fn call(&self, batch: &Batch) -> Result<CurationResult, GatewayError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(GatewayError::Config)?;
        let url = self.endpoint()?;

        let start = Instant::now();
        let res = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(&build_request(batch))
            .send()
            .await;
        let res = match res {
            Ok(res) => res,
            Err(e) => {
                UPSTREAM_LATENCY.observe(start.elapsed().as_secs_f64());
                return Err(e.into());
            }
        };

        let status = res.status();
        // timeouts while reading the body are upstream failures, not bad shapes
        let body = res.bytes().await;
        UPSTREAM_LATENCY.observe(start.elapsed().as_secs_f64());
        let body = body?;

        if !status.is_success() {
            return Err(GatewayError::Upstream {
                status: Some(status.as_u16()),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let payload: GenerateContentResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::ResponseShape(format!("undecodable body: {e}")))?;

        let text = first_text(payload)?;
        debug!(chars = text.len(), "Gemini replied");
        decode_result(&text, batch.len())
    }
}

fn first_text(payload: GenerateContentResponse) -> Result<String, GatewayError> {
    payload
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::ResponseShape("Gemini returned no text".into()))
}

// Decode the model's text into a result, then enforce 0 <= index < len
pub fn decode_result(text: &str, batch_len: usize) -> Result<CurationResult, GatewayError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| GatewayError::ResponseShape(format!("not JSON: {e}")))?;

    let missing = || {
        GatewayError::ResponseShape("missing recommendedIndex, caption, or vibe".into())
    };

    let index = value.get("recommendedIndex").filter(|v| v.is_number()).ok_or_else(missing)?;
    let caption = value.get("caption").and_then(Value::as_str).ok_or_else(missing)?;
    let vibe = value.get("vibe").and_then(Value::as_str).ok_or_else(missing)?;

    let recommended_index = match classify_index(index, batch_len) {
        IndexClass::Valid(i) => i,
        IndexClass::OutOfRange => {
            return Err(GatewayError::IndexOutOfRange {
                index: index.to_string(),
                len: batch_len,
            });
        }
        IndexClass::NotInteger => {
            return Err(GatewayError::ResponseShape(format!(
                "recommendedIndex {index} is not an integer"
            )));
        }
    };

    Ok(CurationResult {
        recommended_index,
        caption: caption.to_string(),
        vibe: vibe.to_string(),
    })
}

enum IndexClass {
    Valid(usize),
    OutOfRange,
    NotInteger,
}

// 2 and 2.0 are integers, 1.5 is not; any integer outside 0..len is out of range
fn classify_index(value: &Value, batch_len: usize) -> IndexClass {
    if let Some(u) = value.as_u64() {
        return match usize::try_from(u) {
            Ok(i) if i < batch_len => IndexClass::Valid(i),
            _ => IndexClass::OutOfRange,
        };
    }
    if value.as_i64().is_some() {
        // as_u64 failed, so it is negative
        return IndexClass::OutOfRange;
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => {
            if f >= 0.0 && f < batch_len as f64 {
                IndexClass::Valid(f as usize)
            } else {
                IndexClass::OutOfRange
            }
        }
        _ => IndexClass::NotInteger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageItem;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn batch(n: usize) -> Batch {
        Batch {
            images: (0..n)
                .map(|i| ImageItem {
                    base64: format!("ZGF0YQ{i}"),
                    mime_type: if i % 2 == 0 { "image/jpeg" } else { "image/png" }.into(),
                })
                .collect(),
        }
    }

    fn gemini_reply(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    fn gateway(server: &MockServer, api_key: Option<&str>) -> GeminiGateway {
        GeminiGateway::new(GeminiConfig {
            api_key: api_key.map(str::to_string),
            base_url: format!("{}/v1beta", server.uri()),
            model: "gemini-2.5-flash".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn request_has_one_part_per_image_then_instruction() {
        let b = batch(3);
        let body = serde_json::to_value(build_request(&b)).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "ZGF0YQ1");
        assert_eq!(parts[3]["text"], USER_INSTRUCTION);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], SYSTEM_INSTRUCTION);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn decodes_valid_result() {
        let r = decode_result(r#"{"recommendedIndex": 2, "caption": "Golden hour", "vibe": "warm"}"#, 3)
            .unwrap();
        assert_eq!(r.recommended_index, 2);
        assert_eq!(r.caption, "Golden hour");
        assert_eq!(r.vibe, "warm");
    }

    #[test]
    fn index_equal_to_len_is_an_error_not_clamped() {
        let err = decode_result(r#"{"recommendedIndex": 3, "caption": "c", "vibe": "v"}"#, 3).unwrap_err();
        match err {
            GatewayError::IndexOutOfRange { index, len } => {
                assert_eq!(index, "3");
                assert_eq!(len, 3);
            }
            other => panic!("expected out of range, got {other:?}"),
        }
    }

    #[test]
    fn negative_index_is_out_of_range() {
        let err = decode_result(r#"{"recommendedIndex": -1, "caption": "c", "vibe": "v"}"#, 3).unwrap_err();
        assert!(matches!(err, GatewayError::IndexOutOfRange { ref index, .. } if index == "-1"));
    }

    #[test]
    fn huge_integral_indices_are_out_of_range_with_original_value() {
        let err = decode_result(
            r#"{"recommendedIndex": 18446744073709551615, "caption": "c", "vibe": "v"}"#,
            3,
        )
        .unwrap_err();
        assert!(
            matches!(err, GatewayError::IndexOutOfRange { ref index, .. } if index == "18446744073709551615")
        );

        let err = decode_result(r#"{"recommendedIndex": 1e20, "caption": "c", "vibe": "v"}"#, 3)
            .unwrap_err();
        assert!(matches!(err, GatewayError::IndexOutOfRange { .. }), "got {err:?}");
    }

    #[test]
    fn shape_errors() {
        for text in [
            "not json at all",
            r#"{"caption": "c", "vibe": "v"}"#,
            r#"{"recommendedIndex": "1", "caption": "c", "vibe": "v"}"#,
            r#"{"recommendedIndex": 1, "caption": 5, "vibe": "v"}"#,
            r#"{"recommendedIndex": 1, "caption": "c"}"#,
            r#"{"recommendedIndex": 1.5, "caption": "c", "vibe": "v"}"#,
        ] {
            let err = decode_result(text, 3).unwrap_err();
            assert!(matches!(err, GatewayError::ResponseShape(_)), "{text} gave {err:?}");
        }
    }

    #[test]
    fn whole_float_index_is_accepted() {
        let r = decode_result(r#"{"recommendedIndex": 1.0, "caption": "c", "vibe": "v"}"#, 2).unwrap();
        assert_eq!(r.recommended_index, 1);
    }

    #[tokio::test]
    async fn recommend_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "secret"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply(
                "  {\"recommendedIndex\": 1, \"caption\": \"Beach day\", \"vibe\": \"sunny\"}\n",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let result = gateway(&server, Some("secret")).recommend(&batch(3)).await.unwrap();
        assert_eq!(
            result,
            CurationResult {
                recommended_index: 1,
                caption: "Beach day".into(),
                vibe: "sunny".into(),
            }
        );
    }

    #[tokio::test]
    async fn missing_api_key_is_config_error_without_calling_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = gateway(&server, None).recommend(&batch(2)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Config));
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exhausted"))
            .expect(1)
            .mount(&server)
            .await;

        let err = gateway(&server, Some("k")).recommend(&batch(2)).await.unwrap_err();
        match err {
            GatewayError::Upstream { status, body } => {
                assert_eq!(status, Some(429));
                assert_eq!(body, "quota exhausted");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_candidates_is_shape_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = gateway(&server, Some("k")).recommend(&batch(2)).await.unwrap_err();
        assert!(matches!(err, GatewayError::ResponseShape(_)));
    }

    #[tokio::test]
    async fn timeout_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(gemini_reply("{}"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let gw = GeminiGateway::new(GeminiConfig {
            api_key: Some("k".into()),
            base_url: server.uri(),
            model: "m".into(),
            timeout: Duration::from_millis(50),
        })
        .unwrap();
        let err = gw.recommend(&batch(2)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: None, .. }));
    }

    #[tokio::test]
    async fn non_json_reply_does_not_leak_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = gateway(&server, Some("SUPERSECRET")).recommend(&batch(2)).await.unwrap_err();
        assert!(matches!(err, GatewayError::ResponseShape(_)));
        assert!(!err.to_string().contains("SUPERSECRET"), "{err}");
    }

    #[tokio::test]
    async fn stalled_body_is_upstream_timeout() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64 * 1024];
            let _ = socket.read(&mut buf).await;
            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"candi";
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let gw = GeminiGateway::new(GeminiConfig {
            api_key: Some("k".into()),
            base_url: format!("http://{addr}"),
            model: "m".into(),
            timeout: Duration::from_millis(300),
        })
        .unwrap();
        let err = gw.recommend(&batch(2)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: None, .. }), "got {err:?}");
    }
}
