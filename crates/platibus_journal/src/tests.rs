use platibus_message::{Headers, Message};

use crate::entry::{JournalCategory, JournalFilter};
use crate::journal::MessageJournal;
use crate::position::JournalPosition;

fn test_db() -> (tempfile::TempDir, sled::Db) {
    let dir = tempfile::tempdir().expect("create tempdir");
    let db = sled::open(dir.path()).expect("open sled db");
    (dir, db)
}

fn message(id: &str, topic: Option<&str>) -> Message {
    let mut headers = Headers::new();
    headers.set_message_id(id);
    if let Some(topic) = topic {
        headers.set_topic(topic);
    }
    Message::new(headers, format!("content-{id}"))
}

/// 8 Sent, 16 Received, 8 Published; topics Foo:4, Bar:4, Baz:8, none:16.
fn fill_mixed(journal: &MessageJournal) {
    for i in 0..32u32 {
        let category = match i {
            0..=7 => JournalCategory::Sent,
            8..=23 => JournalCategory::Received,
            _ => JournalCategory::Published,
        };
        let topic = match i {
            0..=3 => Some("Foo"),
            4..=7 => Some("Bar"),
            8..=15 => Some("Baz"),
            _ => None,
        };
        journal
            .append(&message(&format!("m-{i}"), topic), category)
            .unwrap();
    }
}

#[test]
fn positions_are_strictly_monotonic() {
    let (_dir, db) = test_db();
    let journal = MessageJournal::open(&db).unwrap();

    let mut last = None;
    for i in 0..10 {
        let pos = journal
            .append(&message(&format!("m-{i}"), None), JournalCategory::Sent)
            .unwrap();
        if let Some(prev) = last {
            assert!(pos > prev);
        }
        last = Some(pos);
    }
}

#[test]
fn position_token_round_trips() {
    let (_dir, db) = test_db();
    let journal = MessageJournal::open(&db).unwrap();
    let pos = journal
        .append(&message("m-1", None), JournalCategory::Sent)
        .unwrap();

    let token = pos.to_string();
    let parsed: JournalPosition = token.parse().unwrap();
    assert_eq!(parsed, pos);
}

#[test]
fn read_returns_entries_in_order_from_beginning() {
    let (_dir, db) = test_db();
    let journal = MessageJournal::open(&db).unwrap();
    for i in 0..5 {
        journal
            .append(&message(&format!("m-{i}"), None), JournalCategory::Sent)
            .unwrap();
    }

    let start = journal.beginning().unwrap();
    let page = journal.read(start, 10, &JournalFilter::default()).unwrap();
    assert_eq!(page.entries.len(), 5);
    assert!(page.end_of_journal);
    let ids: Vec<_> = page
        .entries
        .iter()
        .map(|e| e.message.headers().message_id().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["m-0", "m-1", "m-2", "m-3", "m-4"]);
}

#[test]
fn filtered_paging_across_two_pages() {
    let (_dir, db) = test_db();
    let journal = MessageJournal::open(&db).unwrap();
    fill_mixed(&journal);

    let filter = JournalFilter::categories([JournalCategory::Received]);
    let start = journal.beginning().unwrap();

    let first = journal.read(start, 10, &filter).unwrap();
    assert_eq!(first.entries.len(), 10);
    assert!(!first.end_of_journal);

    let second = journal.read(first.next, 10, &filter).unwrap();
    assert_eq!(second.entries.len(), 6);
    assert!(second.end_of_journal);

    for entry in first.entries.iter().chain(second.entries.iter()) {
        assert_eq!(entry.category, JournalCategory::Received);
    }
}

#[test]
fn reads_are_repeatable() {
    let (_dir, db) = test_db();
    let journal = MessageJournal::open(&db).unwrap();
    fill_mixed(&journal);

    let filter = JournalFilter::categories([JournalCategory::Received]);
    let start = journal.beginning().unwrap();

    let a = journal.read(start, 10, &filter).unwrap();
    let b = journal.read(start, 10, &filter).unwrap();

    let ids = |r: &crate::journal::JournalReadResult| {
        r.entries
            .iter()
            .map(|e| (e.position, e.message.headers().message_id().unwrap().to_string()))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&a), ids(&b));
    assert_eq!(a.next, b.next);
}

#[test]
fn combined_filters_are_conjunctive() {
    let (_dir, db) = test_db();
    let journal = MessageJournal::open(&db).unwrap();
    fill_mixed(&journal);

    let mut filter = JournalFilter::categories([JournalCategory::Received]);
    filter.topics.insert("Baz".to_string());

    let start = journal.beginning().unwrap();
    let page = journal.read(start, 32, &filter).unwrap();
    assert_eq!(page.entries.len(), 8);
    for entry in &page.entries {
        assert_eq!(entry.category, JournalCategory::Received);
        assert_eq!(entry.message.headers().topic(), Some("Baz"));
    }
}

#[test]
fn topic_filter_excludes_untopiced_entries() {
    let (_dir, db) = test_db();
    let journal = MessageJournal::open(&db).unwrap();
    fill_mixed(&journal);

    let filter = JournalFilter::topics(["Foo".to_string(), "Bar".to_string()]);
    let page = journal
        .read(journal.beginning().unwrap(), 32, &filter)
        .unwrap();
    assert_eq!(page.entries.len(), 8);
}

#[test]
fn positions_continue_after_reopen() {
    let (_dir, db) = test_db();
    let last = {
        let journal = MessageJournal::open(&db).unwrap();
        let mut last = None;
        for i in 0..3 {
            last = Some(
                journal
                    .append(&message(&format!("m-{i}"), None), JournalCategory::Sent)
                    .unwrap(),
            );
        }
        last.unwrap()
    };

    let reopened = MessageJournal::open(&db).unwrap();
    let pos = reopened
        .append(&message("m-after", None), JournalCategory::Sent)
        .unwrap();
    assert!(pos > last);

    let page = reopened
        .read(reopened.beginning().unwrap(), 10, &JournalFilter::default())
        .unwrap();
    assert_eq!(page.entries.len(), 4);
}

#[test]
fn journaled_message_round_trips_headers_and_content() {
    let (_dir, db) = test_db();
    let journal = MessageJournal::open(&db).unwrap();

    let mut headers = Headers::new();
    headers.set_message_id("m-1");
    headers.set_topic("Foo");
    headers.set("Note", "line one\nline two");
    let message = Message::new(headers.clone(), "payload bytes");
    journal.append(&message, JournalCategory::Published).unwrap();

    let page = journal
        .read(journal.beginning().unwrap(), 1, &JournalFilter::default())
        .unwrap();
    let entry = &page.entries[0];
    assert_eq!(entry.message.headers(), &headers);
    assert_eq!(entry.message.content().as_ref(), b"payload bytes");
}
