// tests/line_protocol.rs

use bollettino_host::protocol::{
    LineProtocolChannel, Message, WorkerEvent, completed_count, decode_line,
};
use proptest::prelude::*;
use serde_json::json;

const TRANSCRIPT: &str = concat!(
    r#"{"type":"excel-file-selected","payload":"C:\\dati\\bollettini.xlsx"}"#,
    "\n",
    r#"{"type":"main_status","payload":"Accesso al portale…"}"#,
    "\r\n",
    "\n",
    "DevTools listening on ws://127.0.0.1:9222\n",
    r#"{"type":"global_progress","payload":42.5}"#,
    "\n",
    r#"{"type":"captcha_required","payload":"iVBORw0KGgo="}"#,
    "\n",
    r#"{"type":"finished","payload":"Completed 12 items"}"#,
    "\n",
);

fn decode_whole(text: &str) -> Vec<Message> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| decode_line(line).ok())
        .collect()
}

fn decode_chunked(bytes: &[u8], cuts: &[usize]) -> Vec<Message> {
    let mut channel = LineProtocolChannel::new();
    let mut messages = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        messages.extend(channel.feed(&bytes[start..cut]));
        start = cut;
    }
    messages.extend(channel.feed(&bytes[start..]));
    messages.extend(channel.finish());
    messages
}

proptest! {
    #[test]
    fn chunking_never_changes_the_decoded_messages(
        mut cuts in proptest::collection::vec(0..TRANSCRIPT.len(), 0..12)
    ) {
        cuts.sort_unstable();
        cuts.dedup();
        let bytes = TRANSCRIPT.as_bytes();

        prop_assert_eq!(decode_chunked(bytes, &cuts), decode_whole(TRANSCRIPT));
    }
}

#[test]
fn one_byte_at_a_time() {
    let bytes = TRANSCRIPT.as_bytes();
    let cuts: Vec<usize> = (1..bytes.len()).collect();
    let messages = decode_chunked(bytes, &cuts);

    assert_eq!(messages.len(), 5);
    assert_eq!(
        messages[1].event(),
        WorkerEvent::MainStatus("Accesso al portale…".into())
    );
    assert_eq!(completed_count(&messages[4].payload), Some(12));
}

#[test]
fn zero_count_is_exactly_one_message() {
    let mut channel = LineProtocolChannel::new();
    let messages = channel.feed(b"{\"type\":\"causali_count\",\"payload\":{\"count\":0}}\n");

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].event(), WorkerEvent::CausaliCount(0));
    assert_eq!(channel.dropped(), 0);
}

#[test]
fn split_status_line_then_finished() {
    let mut channel = LineProtocolChannel::new();
    let mut messages = channel.feed(br#"{"type":"main_status","pay"#);
    messages.extend(channel.feed(b"load\":\"Working\"}\n{\"type\":\"finished\",\"payload\":3}\n"));

    assert_eq!(
        messages,
        vec![
            Message::new("main_status", "Working"),
            Message::new("finished", json!(3)),
        ]
    );
}
