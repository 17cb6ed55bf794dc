//! Document pipeline scenarios: detection, caching, and speech markup.

mod common;

use std::sync::Arc;

use common::{settings_with_local, spawn_fake_server, test_settings, Script};
use tts_core::{text, CancelToken, ProviderId, TextRequest, VoiceRef};
use tts_document::{DocumentFormat, EmotionProfile, SsmlPlatform};
use tts_engine::{Destination, DocumentOptions, TtsEngine};

fn engine_in(dir: &std::path::Path) -> TtsEngine {
    TtsEngine::new(Arc::new(test_settings(dir)))
}

#[test]
fn test_markdown_to_azure_ssml() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let options = DocumentOptions {
        ssml_platform: SsmlPlatform::Azure,
        emotion_profile: EmotionProfile::Technical,
        ..DocumentOptions::default()
    };
    let ssml = engine
        .process_document("# Intro\n\nHello **world**", &options)
        .unwrap();

    assert!(ssml.starts_with("<speak "));
    assert!(ssml.ends_with("</speak>"));
    assert_eq!(ssml.matches("<speak").count(), 1);
    assert!(ssml.contains("mstts:express-as"));
    assert!(ssml.contains("<emphasis"));
    assert_eq!(
        text::normalize_whitespace(&text::strip_ssml_tags(&ssml)),
        "Intro Hello world"
    );
}

#[test]
fn test_generic_platform_yields_plain_text() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let out = engine
        .process_document("# Title\n\nBody text", &DocumentOptions::default())
        .unwrap();
    assert!(!out.contains('<'));
    assert!(out.contains("Title"));
    assert!(out.contains("Body text"));
}

#[test]
fn test_html_and_json_are_converted() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let html = engine
        .process_document(
            "<html><body><h1>Doc</h1><p>From <b>html</b></p></body></html>",
            &DocumentOptions::default(),
        )
        .unwrap();
    assert!(html.contains("Doc"));
    assert!(html.contains("html"));

    let json = engine
        .process_document(
            r#"{"title": "Spec", "steps": ["one", "two"]}"#,
            &DocumentOptions::default(),
        )
        .unwrap();
    assert!(json.contains("Spec"));
    assert!(json.contains("one"));
}

#[test]
fn test_repeat_parse_is_byte_identical_and_cached() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    let options = DocumentOptions {
        ssml_platform: SsmlPlatform::Google,
        emotion_profile: EmotionProfile::Auto,
        ..DocumentOptions::default()
    };
    let content = "# Cached\n\nSome **content** here\n\n- a\n- b";

    let first = engine.process_document(content, &options).unwrap();
    let cache_dir = dir.path().join("doc-cache");
    let entries = std::fs::read_dir(&cache_dir).unwrap().count();
    assert_eq!(entries, 1, "one cache entry after first parse");

    let second = engine.process_document(content, &options).unwrap();
    assert_eq!(first, second, "cache hit must be indistinguishable");
}

#[test]
fn test_explicit_format_overrides_detection() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    // Force markdown handling of something that would detect as HTML.
    let options = DocumentOptions {
        format: Some(DocumentFormat::Markdown),
        ..DocumentOptions::default()
    };
    let out = engine
        .process_document("<p>literal</p>", &options)
        .unwrap();
    assert!(out.contains("literal"));
}

#[test]
fn test_clear_document_cache() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    engine
        .process_document("# X\n\ncontent", &DocumentOptions::default())
        .unwrap();
    let removed = engine.clear_document_cache().unwrap();
    assert_eq!(removed, 1);
    assert_eq!(engine.clear_document_cache().unwrap(), 0);
}

#[tokio::test]
async fn test_document_synthesis_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, task) = spawn_fake_server(vec![Script::Audio(vec![b"RIFFdoc".to_vec()])]).await;
    let engine = TtsEngine::new(settings_with_local(dir.path(), addr));

    let mut request = TextRequest::new("");
    request.voice = VoiceRef::Named {
        provider: Some(ProviderId::Local),
        voice: "default".into(),
    };
    request.format = tts_core::AudioFormat::Wav;

    let target = dir.path().join("doc.wav");
    let out = engine
        .synthesize_document(
            "# Hello\n\nDocument body",
            &DocumentOptions::default(),
            request,
            Destination::File(target.clone()),
            &CancelToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(out, Some(target.clone()));
    assert_eq!(std::fs::read(&target).unwrap(), b"RIFFdoc");

    // The synthesized text is the pipeline's plain rendering.
    let received = task.await.unwrap();
    assert!(received[0].contains("Hello"));
    assert!(received[0].contains("Document body"));
}

#[tokio::test]
async fn test_empty_document_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let request = TextRequest::new("");
    let err = engine
        .synthesize_document(
            "   \n\n  ",
            &DocumentOptions::default(),
            request,
            Destination::File(dir.path().join("never.mp3")),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, tts_core::TtsError::BadOption { .. }));
}
