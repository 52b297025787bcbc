use super::*;

fn body(content: &str, title: Option<&str>) -> PostMessageBody {
    PostMessageBody { conversation_id: None, content: content.into(), title: title.map(Into::into) }
}

#[test]
fn explicit_title_is_kept() {
    let b = body("hello there", Some("  Trip planning  "));
    assert_eq!(derive_title(&b, "hello there"), "Trip planning");
}

#[test]
fn blank_title_falls_back_to_content() {
    let b = body("what is the capital of France?", Some("   "));
    assert_eq!(derive_title(&b, "what is the capital of France?"), "what is the capital of France?");
}

#[test]
fn derived_title_is_truncated() {
    let long = "x".repeat(200);
    let b = body(&long, None);
    assert_eq!(derive_title(&b, &long).chars().count(), DERIVED_TITLE_CHARS);
}

#[test]
fn body_accepts_missing_optional_fields() {
    let parsed: PostMessageBody = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
    assert!(parsed.conversation_id.is_none());
    assert!(parsed.title.is_none());
    assert_eq!(parsed.content, "hi");
}
