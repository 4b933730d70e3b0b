use super::*;
use crate::llm::types::ImageSource;

// =============================================================================
// build_request
// =============================================================================

#[test]
fn request_places_image_as_inline_data() {
    let messages = vec![Message::user_blocks(vec![
        ContentBlock::Text { text: "read my palm".into() },
        ContentBlock::Image { source: ImageSource::base64("image/jpeg", "AAAA") },
    ])];
    let json = serde_json::to_value(build_request(400, "", &messages)).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": "read my palm" },
                    { "inline_data": { "mime_type": "image/jpeg", "data": "AAAA" } }
                ]
            }],
            "generationConfig": { "maxOutputTokens": 400 }
        })
    );
}

#[test]
fn request_includes_system_instruction_when_present() {
    let messages = vec![Message { role: "user".into(), content: Content::Text("hi".into()) }];
    let json = serde_json::to_value(build_request(10, "be kind", &messages)).unwrap();
    assert_eq!(json["systemInstruction"], serde_json::json!({ "parts": [{ "text": "be kind" }] }));
}

#[test]
fn assistant_role_maps_to_model() {
    let messages = vec![Message { role: "assistant".into(), content: Content::Text("earlier".into()) }];
    let json = serde_json::to_value(build_request(10, "", &messages)).unwrap();
    assert_eq!(json["contents"][0]["role"], "model");
}

// =============================================================================
// parse_response
// =============================================================================

#[test]
fn parse_text_candidate() {
    let json = serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": "🔮 Your heart line " }, { "text": "glows." }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 300, "candidatesTokenCount": 250 },
        "modelVersion": "gemini-1.5-flash-002"
    })
    .to_string();
    let resp = parse_response(&json, "gemini-1.5-flash").unwrap();
    assert_eq!(resp.text(), "🔮 Your heart line glows.");
    assert_eq!(resp.model, "gemini-1.5-flash-002");
    assert_eq!(resp.stop_reason, "end_turn");
    assert_eq!(resp.input_tokens, 300);
    assert_eq!(resp.output_tokens, 250);
}

#[test]
fn parse_without_candidates_is_empty() {
    let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } }).to_string();
    let resp = parse_response(&json, "gemini-1.5-flash").unwrap();
    assert!(resp.content.is_empty());
    assert_eq!(resp.model, "gemini-1.5-flash");
}

#[test]
fn parse_safety_finish_is_refusal() {
    let json = serde_json::json!({ "candidates": [{ "finishReason": "SAFETY" }] }).to_string();
    let resp = parse_response(&json, "m").unwrap();
    assert!(resp.content.is_empty());
    assert_eq!(resp.stop_reason, "refusal");
}

#[test]
fn parse_skips_thought_parts() {
    let json = serde_json::json!({
        "candidates": [{
            "content": { "parts": [{ "text": "thinking...", "thought": true }, { "text": "answer" }] },
            "finishReason": "STOP"
        }]
    })
    .to_string();
    assert_eq!(parse_response(&json, "m").unwrap().text(), "answer");
}

#[test]
fn parse_max_tokens_finish() {
    let json = serde_json::json!({
        "candidates": [{ "content": { "parts": [{ "text": "cut" }] }, "finishReason": "MAX_TOKENS" }]
    })
    .to_string();
    assert_eq!(parse_response(&json, "m").unwrap().stop_reason, "max_tokens");
}

#[test]
fn parse_invalid_json() {
    assert!(matches!(parse_response("nope", "m"), Err(LlmError::ApiParse(_))));
    assert!(matches!(parse_response("[]", "m"), Err(LlmError::ApiParse(_))));
}
