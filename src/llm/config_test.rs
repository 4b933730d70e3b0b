use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_to_gemini_flash_with_its_key_var() {
    let cfg = LlmConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "secret")])).unwrap();
    assert_eq!(cfg.model, "gemini-1.5-flash");
    assert_eq!(cfg.api_key, "secret");
    assert_eq!(cfg.base_url, DEFAULT_GEMINI_BASE_URL);
    assert_eq!(
        cfg.timeouts,
        LlmTimeouts { request_secs: DEFAULT_LLM_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_LLM_CONNECT_TIMEOUT_SECS }
    );
}

#[test]
fn missing_key_names_the_default_var() {
    let err = LlmConfig::from_lookup(lookup_from(&[])).unwrap_err();
    assert!(matches!(err, LlmError::MissingApiKey { ref var } if var == "GEMINI_API_KEY"));
}

#[test]
fn blank_key_counts_as_missing() {
    let err = LlmConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "  ")])).unwrap_err();
    assert!(matches!(err, LlmError::MissingApiKey { .. }));
}

#[test]
fn explicit_key_var_is_honoured() {
    let cfg = LlmConfig::from_lookup(lookup_from(&[("LLM_API_KEY_ENV", "TEST_KEY"), ("TEST_KEY", "g-key")])).unwrap();
    assert_eq!(cfg.api_key, "g-key");
}

#[test]
fn parses_overrides() {
    let cfg = LlmConfig::from_lookup(lookup_from(&[
        ("GEMINI_API_KEY", "k"),
        ("LLM_MODEL", "gemini-2.0-flash"),
        ("LLM_GEMINI_BASE_URL", "https://example.test/v1beta/"),
        ("LLM_REQUEST_TIMEOUT_SECS", "42"),
        ("LLM_CONNECT_TIMEOUT_SECS", "7"),
    ]))
    .unwrap();
    assert_eq!(cfg.model, "gemini-2.0-flash");
    assert_eq!(cfg.base_url, "https://example.test/v1beta");
    assert_eq!(cfg.timeouts, LlmTimeouts { request_secs: 42, connect_secs: 7 });
}

#[test]
fn blank_model_falls_back_to_default() {
    let cfg = LlmConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "k"), ("LLM_MODEL", " ")])).unwrap();
    assert_eq!(cfg.model, DEFAULT_GEMINI_MODEL);
}

#[test]
fn invalid_timeout_falls_back_to_default() {
    let cfg = LlmConfig::from_lookup(lookup_from(&[
        ("GEMINI_API_KEY", "k"),
        ("LLM_REQUEST_TIMEOUT_SECS", "soon"),
    ]))
    .unwrap();
    assert_eq!(cfg.timeouts.request_secs, DEFAULT_LLM_REQUEST_TIMEOUT_SECS);
}
