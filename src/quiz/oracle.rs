use std::time::Duration;

use async_trait::async_trait;
use chatgpt::client::ChatGPT;
use chatgpt::types::CompletionResponse;
use serde_json::Value;
use thiserror::Error;

use crate::quiz::{GameMode, RawQuestion, BATCH_SIZE};

/// Why a batch of questions could not be obtained.
///
/// Both kinds end the same way for the player (the Error screen with a retry
/// button); the split only matters for the logs.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("network error: {0}")]
    Network(String),

    #[error("schema error: {0}")]
    Schema(String),
}

impl OracleError {
    pub fn kind(&self) -> &'static str {
        match self {
            OracleError::Network(_) => "network",
            OracleError::Schema(_) => "schema",
        }
    }
}

/// Something that produces a batch of questions for a mode.
#[async_trait]
pub trait QuestionOracle: Send + Sync {
    async fn request_questions(&self, mode: GameMode) -> Result<Vec<RawQuestion>, OracleError>;
}

/// Validates a decoded response body.
///
/// Accepts a bare array, or an object whose single key holds the array (unwrapped
/// once). Anything else, an empty batch included, is a schema error.
pub fn parse_batch(body: Value) -> Result<Vec<RawQuestion>, OracleError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
            Some((_, Value::Array(items))) => items,
            Some((key, _)) => {
                return Err(OracleError::Schema(format!(
                    "field '{}' does not hold an array",
                    key
                )))
            }
            None => return Err(OracleError::Schema("empty object".to_string())),
        },
        Value::Object(map) => {
            return Err(OracleError::Schema(format!(
                "expected an array, got an object with {} keys",
                map.len()
            )))
        }
        other => {
            return Err(OracleError::Schema(format!(
                "expected an array, got {}",
                json_kind(&other)
            )))
        }
    };

    if items.is_empty() {
        return Err(OracleError::Schema("no questions in batch".to_string()));
    }

    items
        .into_iter()
        .take(BATCH_SIZE)
        .enumerate()
        .map(|(i, item)| parse_question(i, item))
        .collect()
}

/// Same as `parse_batch` but starting from model output, which may arrive
/// wrapped in a Markdown code fence.
pub fn parse_batch_text(text: &str) -> Result<Vec<RawQuestion>, OracleError> {
    let body: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| OracleError::Schema(format!("response is not JSON: {}", e)))?;
    parse_batch(body)
}

fn parse_question(index: usize, item: Value) -> Result<RawQuestion, OracleError> {
    let raw: RawQuestion = serde_json::from_value(item)
        .map_err(|e| OracleError::Schema(format!("question #{}: {}", index + 1, e)))?;

    // Buttons echo back trimmed text, so stored texts must already be trimmed.
    let raw = RawQuestion {
        question: raw.question.trim().to_string(),
        options: raw.options.iter().map(|o| o.trim().to_string()).collect(),
        answer: raw.answer.trim().to_string(),
        hint: raw.hint.trim().to_string(),
    };

    let invalid = |reason: &str| OracleError::Schema(format!("question #{}: {}", index + 1, reason));

    if raw.question.is_empty() {
        return Err(invalid("empty 'question'"));
    }
    if raw.answer.is_empty() {
        return Err(invalid("empty 'answer'"));
    }
    if raw.hint.is_empty() {
        return Err(invalid("empty 'hint'"));
    }
    if raw.options.len() != 3 {
        return Err(invalid(&format!(
            "expected 3 distractors, got {}",
            raw.options.len()
        )));
    }
    if raw.options.iter().any(|o| o.is_empty()) {
        return Err(invalid("empty option"));
    }
    if raw.options.iter().any(|o| *o == raw.answer) {
        return Err(invalid("answer listed among the distractors"));
    }
    if raw.options[0] == raw.options[1]
        || raw.options[0] == raw.options[2]
        || raw.options[1] == raw.options[2]
    {
        return Err(invalid("duplicate distractors"));
    }

    Ok(raw)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The instructions given to the model for each mode.
pub fn prompt_for(mode: GameMode) -> String {
    let task = match mode {
        GameMode::CharToSound => format!(
            "請為一個「{}」的注音符號學習遊戲出 {} 道選擇題。
每一題包含：
1. question：一個常見的繁體中文字。
2. answer：這個字正確的注音符號（含聲調）。
3. hint：一個用到這個字的簡單詞語。
4. options：三個發音相近但錯誤的注音符號。
錯誤選項要有迷惑性。",
            mode.tag(),
            BATCH_SIZE
        ),
        GameMode::SoundToChar => format!(
            "請為一個「{}」的注音符號學習遊戲出 {} 道選擇題。
每一題包含：
1. question：一組注音符號（含聲調）。
2. answer：這個讀音對應的正確繁體中文字。
3. hint：關於這個字的簡短提示或解釋。
4. options：三個讀音相近或字形相似的錯誤中文字。
錯誤選項要有迷惑性。",
            mode.tag(),
            BATCH_SIZE
        ),
    };

    format!(
        "{}
只回傳 JSON 陣列，不要任何其他文字。格式：
[{{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\"], \"answer\": \"...\", \"hint\": \"...\"}}]
options 裡不可以包含 answer。",
        task
    )
}

/// Asks ChatGPT for the questions directly.
pub struct ChatGptOracle {
    chat_gpt: ChatGPT,
}

impl ChatGptOracle {
    pub fn new(chat_gpt: ChatGPT) -> Self {
        Self { chat_gpt }
    }
}

#[async_trait]
impl QuestionOracle for ChatGptOracle {
    async fn request_questions(&self, mode: GameMode) -> Result<Vec<RawQuestion>, OracleError> {
        log::debug!("Requesting {} questions from ChatGPT for mode {}", BATCH_SIZE, mode);

        let response: CompletionResponse = self
            .chat_gpt
            .send_message(prompt_for(mode))
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;
        let content = response.message().clone().content;

        log::trace!("Completion: {:?}", content);

        parse_batch_text(&content)
    }
}

/// Talks to a question service that takes `{"mode": "<tag>"}` and answers with
/// the batch as JSON.
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOracle {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Network(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl QuestionOracle for HttpOracle {
    async fn request_questions(&self, mode: GameMode) -> Result<Vec<RawQuestion>, OracleError> {
        log::debug!("POST {} mode={}", self.endpoint, mode);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "mode": mode }))
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Network(format!("{}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| OracleError::Schema(format!("response is not JSON: {}", e)))?;
        parse_batch(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(n: usize) -> Value {
        json!({
            "question": format!("字{}", n),
            "options": ["ㄅㄚ", "ㄆㄚ", "ㄇㄚ"],
            "answer": "ㄈㄚ",
            "hint": "提示",
        })
    }

    fn items(count: usize) -> Vec<Value> {
        (0..count).map(item).collect()
    }

    #[test]
    fn bare_array_is_accepted() {
        let batch = parse_batch(Value::Array(items(5))).unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[0].question, "字0");
        assert_eq!(batch[0].options.len(), 3);
    }

    #[test]
    fn single_key_wrapper_is_unwrapped_once() {
        let batch = parse_batch(json!({ "data": items(5) })).unwrap();
        assert_eq!(batch.len(), 5);
    }

    #[test]
    fn nested_wrapper_is_rejected() {
        let err = parse_batch(json!({ "outer": { "data": items(5) } })).unwrap_err();
        assert!(matches!(err, OracleError::Schema(_)));
    }

    #[test]
    fn object_with_two_keys_is_rejected() {
        let err = parse_batch(json!({ "data": items(5), "meta": 1 })).unwrap_err();
        assert!(matches!(err, OracleError::Schema(_)));
    }

    #[test]
    fn scalar_body_is_rejected() {
        assert!(matches!(parse_batch(json!("oops")), Err(OracleError::Schema(_))));
        assert!(matches!(parse_batch(Value::Null), Err(OracleError::Schema(_))));
    }

    #[test]
    fn empty_batch_is_a_schema_error() {
        assert!(matches!(parse_batch(json!([])), Err(OracleError::Schema(_))));
        assert!(matches!(parse_batch(json!({ "questions": [] })), Err(OracleError::Schema(_))));
    }

    #[test]
    fn short_batch_is_kept_as_is() {
        assert_eq!(parse_batch(Value::Array(items(2))).unwrap().len(), 2);
    }

    #[test]
    fn long_batch_is_truncated() {
        assert_eq!(parse_batch(Value::Array(items(8))).unwrap().len(), BATCH_SIZE);
    }

    #[test]
    fn missing_field_is_rejected() {
        let body = json!([{ "question": "山", "options": ["a", "b", "c"], "answer": "d" }]);
        assert!(matches!(parse_batch(body), Err(OracleError::Schema(_))));
    }

    #[test]
    fn wrong_distractor_count_is_rejected() {
        let body = json!([{ "question": "山", "options": ["a", "b"], "answer": "d", "hint": "h" }]);
        assert!(matches!(parse_batch(body), Err(OracleError::Schema(_))));
    }

    #[test]
    fn blank_text_is_rejected() {
        let body = json!([{ "question": "山", "options": ["a", "b", "c"], "answer": "d", "hint": "  " }]);
        assert!(matches!(parse_batch(body), Err(OracleError::Schema(_))));
    }

    #[test]
    fn answer_among_distractors_is_rejected() {
        let body = json!([{ "question": "山", "options": ["a", "b", "d"], "answer": "d", "hint": "h" }]);
        assert!(matches!(parse_batch(body), Err(OracleError::Schema(_))));
    }

    #[test]
    fn duplicate_distractors_are_rejected() {
        let body = json!([{ "question": "山", "options": ["a", "a", "c"], "answer": "d", "hint": "h" }]);
        assert!(matches!(parse_batch(body), Err(OracleError::Schema(_))));
    }

    #[test]
    fn padded_texts_are_trimmed() {
        let body = json!([{
            "question": " 山 ",
            "options": [" ㄕㄤ", "ㄙㄢ\n", "ㄕㄢˇ"],
            "answer": "ㄕㄢ ",
            "hint": "\t高山",
        }]);
        let batch = parse_batch(body).unwrap();
        assert_eq!(batch[0].question, "山");
        assert_eq!(batch[0].options, vec!["ㄕㄤ", "ㄙㄢ", "ㄕㄢˇ"]);
        assert_eq!(batch[0].answer, "ㄕㄢ");
        assert_eq!(batch[0].hint, "高山");
    }

    #[test]
    fn distractors_equal_after_trimming_are_rejected() {
        let body = json!([{ "question": "八", "options": ["ㄅㄚ", "ㄅㄚ ", "ㄆㄚ"], "answer": "ㄇㄚ", "hint": "h" }]);
        assert!(matches!(parse_batch(body), Err(OracleError::Schema(_))));

        let body = json!([{ "question": "八", "options": ["ㄅㄚ", "ㄆㄚ", " ㄇㄚ"], "answer": "ㄇㄚ", "hint": "h" }]);
        assert!(matches!(parse_batch(body), Err(OracleError::Schema(_))));
    }

    #[test]
    fn fenced_model_output_is_parsed() {
        let text = format!("```json\n{}\n```", Value::Array(items(3)));
        assert_eq!(parse_batch_text(&text).unwrap().len(), 3);
    }

    #[test]
    fn plain_model_output_is_parsed() {
        let text = Value::Array(items(1)).to_string();
        assert_eq!(parse_batch_text(&text).unwrap().len(), 1);
    }

    #[test]
    fn prose_output_is_a_schema_error() {
        let err = parse_batch_text("Sure! Here are your questions.").unwrap_err();
        assert_eq!(err.kind(), "schema");
    }

    #[test]
    fn prompts_mention_mode_and_batch_size() {
        for mode in GameMode::ALL {
            let prompt = prompt_for(mode);
            assert!(prompt.contains(mode.tag()));
            assert!(prompt.contains(&BATCH_SIZE.to_string()));
        }
    }

    /// Answers exactly one HTTP request with a canned response and hands back
    /// the request body it received.
    async fn serve_once(
        status: &'static str,
        body: impl Into<String>,
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let body = body.into();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/questions", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 1024];
            let request_body = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                received.extend_from_slice(&chunk[..n]);
                if let Some(body) = request_body(&received) {
                    break body;
                }
                if n == 0 {
                    break String::new();
                }
            };

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request_body
        });

        (endpoint, server)
    }

    /// The body of a complete request in `buf`, or `None` if more bytes are due.
    fn request_body(buf: &[u8]) -> Option<String> {
        let header_end = buf.windows(4).position(|w| w == b"\r\n\r\n")?;
        let headers = String::from_utf8_lossy(&buf[..header_end]);
        let length = headers
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let body = &buf[header_end + 4..];
        (body.len() >= length).then(|| String::from_utf8_lossy(&body[..length]).into_owned())
    }

    fn http_oracle(endpoint: String) -> HttpOracle {
        HttpOracle::new(endpoint, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn http_oracle_posts_the_mode_tag() {
        let batch = Value::Array(items(2)).to_string();
        let (endpoint, server) = serve_once("200 OK", format!("{{\"questions\": {}}}", batch)).await;

        let questions = http_oracle(endpoint)
            .request_questions(GameMode::CharToSound)
            .await
            .unwrap();
        assert_eq!(questions.len(), 2);

        let sent: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent, json!({ "mode": "看字選音" }));
    }

    #[tokio::test]
    async fn http_error_status_is_a_network_error() {
        let (endpoint, server) =
            serve_once("503 Service Unavailable", r#"{"message":"down"}"#).await;

        let err = http_oracle(endpoint)
            .request_questions(GameMode::SoundToChar)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Network(ref msg) if msg.contains("503")), "{:?}", err);

        let sent: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent, json!({ "mode": "看音選字" }));
    }

    #[tokio::test]
    async fn http_body_that_is_not_json_is_a_schema_error() {
        let (endpoint, _server) = serve_once("200 OK", "<html>oops</html>").await;

        let err = http_oracle(endpoint)
            .request_questions(GameMode::CharToSound)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Schema(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn http_empty_batch_is_a_schema_error() {
        let (endpoint, _server) = serve_once("200 OK", "[]").await;

        let err = http_oracle(endpoint)
            .request_questions(GameMode::CharToSound)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Schema(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn unreachable_service_is_a_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/questions", listener.local_addr().unwrap());
        drop(listener);

        let err = http_oracle(endpoint)
            .request_questions(GameMode::CharToSound)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "network");
    }
}
