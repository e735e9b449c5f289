//! Response model: properties, chunk streaming and error rendering

use std::io::Cursor;

use phasekit::io::{Charset, Chunk, ChunkBuffer, OutputStream, Stream, Streamable};
use phasekit::property::{PropertyError, ASSET, ENCODING, HEADER, MIME_TYPE, TITLE};
use phasekit::response::{AccessDenied, Response, WithProperties};

#[test]
fn single_valued_properties_overwrite_and_multi_valued_accumulate() {
    let content = Response::ok_content("x")
        .with(&TITLE, "first".to_string())
        .with(&TITLE, "second".to_string())
        .with(&ASSET, "a.css".to_string())
        .with(&ASSET, "b.js".to_string());
    assert_eq!(content.title(), Some("second"));
    assert_eq!(content.assets().collect::<Vec<_>>(), vec!["a.css", "b.js"]);

    let content = content.without(&ASSET);
    assert_eq!(content.assets().count(), 0);
}

#[test]
fn missing_property_type_is_rejected_whatever_the_value() {
    let err = Response::ok()
        .try_with::<String>(None, Some("x".to_string()))
        .unwrap_err();
    assert!(matches!(err, PropertyError::NullPropertyType));
    assert!(Response::ok().try_with::<String>(None, None).is_err());

    let status = Response::ok()
        .try_with(Some(&MIME_TYPE), Some("text/plain".to_string()))
        .unwrap()
        .try_with(Some(&MIME_TYPE), None)
        .unwrap();
    assert!(!status.properties().contains(&MIME_TYPE));
}

#[test]
fn properties_precede_body_chunks() {
    let content = Response::ok_content("hello ")
        .with_mime_type("text/plain")
        .with_header("X-A", ["1", "2"]);
    let mut sink = ChunkBuffer::new();
    content.streamable().send(&mut sink).unwrap();

    let kinds: Vec<&str> = sink
        .chunks()
        .iter()
        .map(|c| match c {
            Chunk::Property(p) => p.key().name(),
            Chunk::Text(_) => "text",
            Chunk::Bytes(_) => "bytes",
        })
        .collect();
    assert_eq!(kinds, vec!["mime-type", "header", "text"]);
    assert_eq!(sink.text(), "hello ");
    assert!(sink.is_closed());
    assert_eq!(sink.error(), None);
    if let Chunk::Property(p) = &sink.chunks()[1] {
        let header = p.value_of(&HEADER).unwrap();
        assert_eq!(header.values, vec!["1".to_string(), "2".to_string()]);
    }
}

#[test]
fn status_without_body_closes_after_properties() {
    let mut sink = ChunkBuffer::new();
    Response::not_found()
        .with_charset(Charset::Utf8)
        .streamable()
        .send(&mut sink)
        .unwrap();
    assert_eq!(sink.chunks().len(), 1);
    assert!(sink.chunks().iter().all(|c| !c.is_data()));
    assert!(sink.is_closed());
}

#[test]
fn byte_payload_survives_streaming_unchanged() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();
    let body = Response::ok_body(Streamable::from_reader(Cursor::new(payload.clone())));
    let mut out = Vec::new();
    {
        let mut stream = OutputStream::new(Charset::Utf8, &mut out);
        body.streamable().send(&mut stream).unwrap();
    }
    assert_eq!(out, payload);
}

#[test]
fn properties_are_handed_over_when_content_is_built() {
    let status = Response::status(201).with(&TITLE, "t".to_string());
    let content = status.content("x").with(&TITLE, "changed".to_string());
    assert_eq!(content.code(), 201);
    assert_eq!(content.title(), Some("changed"));
    assert_eq!(content.properties().value(&ENCODING), None);
}

#[test]
fn verbose_error_renders_cause_with_500() {
    let error = Response::error(anyhow::anyhow!("disk <full>").context("saving post"));
    match error.as_status(true) {
        Response::Content(content) => {
            assert_eq!(content.code(), 500);
            let mut sink = ChunkBuffer::new();
            content.streamable().send(&mut sink).unwrap();
            let html = sink.text();
            assert!(html.contains("saving post"));
            assert!(html.contains("disk &lt;full&gt;"));
        }
        other => panic!("unexpected {}", other.kind()),
    }
    let terse = error.as_status(false);
    assert_eq!(terse.code(), Some(500));
    assert!(matches!(terse, Response::Status(_)));
}

#[test]
fn forbidden_faults_map_to_403() {
    let verbose = Response::forbidden(anyhow::anyhow!("no")).as_status(true);
    assert_eq!(verbose.code(), Some(403));
    assert_eq!(
        Response::error(AccessDenied("admin only".into())).as_status(false).code(),
        Some(403)
    );
}

#[test]
fn cause_wins_over_message_when_both_are_present() {
    let error = Response::forbidden_with("<b>message</b>", anyhow::anyhow!("the cause"));
    let Response::Content(content) = error.as_status(true) else {
        panic!("verbose rendering is content");
    };
    let mut sink = ChunkBuffer::new();
    content.streamable().send(&mut sink).unwrap();
    let html = sink.text();
    assert!(html.contains("the cause"));
    assert!(!html.contains("&lt;b&gt;message"));
}

#[test]
fn message_only_error_is_escaped() {
    let Response::Content(content) = Response::error_message("a < b").as_status(true) else {
        panic!("verbose rendering is content");
    };
    let mut sink = ChunkBuffer::new();
    content.streamable().send(&mut sink).unwrap();
    assert!(sink.text().contains("<p>a &lt; b</p>"));
}

#[test]
fn closed_sink_rejects_further_chunks() {
    let mut sink = ChunkBuffer::new();
    sink.close(None);
    assert!(sink.provide(Chunk::text("late")).is_err());
}
