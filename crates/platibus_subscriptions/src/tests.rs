use std::time::Duration;

use url::Url;

use crate::registry::SubscriptionTrackingService;

fn test_db() -> (tempfile::TempDir, sled::Db) {
    let dir = tempfile::tempdir().expect("create tempdir");
    let db = sled::open(dir.path()).expect("open sled db");
    (dir, db)
}

fn uri(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[test]
fn add_then_get_returns_subscriber() {
    let (_dir, db) = test_db();
    let registry = SubscriptionTrackingService::open(&db).unwrap();
    let sub = uri("http://a.example:8080/");

    registry
        .add_subscription("events", &sub, Duration::from_secs(60))
        .unwrap();

    assert_eq!(registry.get_subscribers("events"), vec![sub]);
    assert!(registry.get_subscribers("other").is_empty());
}

#[test]
fn remove_deletes_the_pair() {
    let (_dir, db) = test_db();
    let registry = SubscriptionTrackingService::open(&db).unwrap();
    let a = uri("http://a.example:8080/");
    let b = uri("http://b.example:8080/");

    registry.add_subscription("events", &a, Duration::ZERO).unwrap();
    registry.add_subscription("events", &b, Duration::ZERO).unwrap();
    registry.remove_subscription("events", &a).unwrap();

    assert_eq!(registry.get_subscribers("events"), vec![b]);
}

#[test]
fn zero_ttl_never_expires() {
    let (_dir, db) = test_db();
    let registry = SubscriptionTrackingService::open(&db).unwrap();
    let sub = uri("http://a.example:8080/");

    registry.add_subscription("events", &sub, Duration::ZERO).unwrap();
    assert_eq!(registry.get_subscribers("events"), vec![sub.clone()]);

    let listed = registry.subscriptions();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].expires.is_none());
}

#[test]
fn expired_rows_are_filtered_on_read() {
    let (_dir, db) = test_db();
    let registry = SubscriptionTrackingService::open(&db).unwrap();
    let sub = uri("http://a.example:8080/");

    registry
        .add_subscription("events", &sub, Duration::from_millis(20))
        .unwrap();
    assert_eq!(registry.get_subscribers("events").len(), 1);

    std::thread::sleep(Duration::from_millis(40));
    assert!(registry.get_subscribers("events").is_empty());
    assert!(registry.topics().is_empty());
}

#[test]
fn re_add_refreshes_expiry() {
    let (_dir, db) = test_db();
    let registry = SubscriptionTrackingService::open(&db).unwrap();
    let sub = uri("http://a.example:8080/");

    registry
        .add_subscription("events", &sub, Duration::from_millis(20))
        .unwrap();
    registry
        .add_subscription("events", &sub, Duration::from_secs(60))
        .unwrap();

    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(registry.get_subscribers("events").len(), 1);
    // Still a single row for the pair, not a duplicate
    assert_eq!(registry.subscriptions().len(), 1);
}

#[test]
fn cache_is_rebuilt_on_reopen() {
    let (_dir, db) = test_db();
    let a = uri("http://a.example:8080/");
    let b = uri("http://b.example:8080/");

    {
        let registry = SubscriptionTrackingService::open(&db).unwrap();
        registry.add_subscription("events", &a, Duration::ZERO).unwrap();
        registry.add_subscription("events", &b, Duration::ZERO).unwrap();
        registry.add_subscription("alerts", &a, Duration::ZERO).unwrap();
    }

    let reopened = SubscriptionTrackingService::open(&db).unwrap();
    let mut subs = reopened.get_subscribers("events");
    subs.sort_by(|x, y| x.as_str().cmp(y.as_str()));
    assert_eq!(subs, vec![a.clone(), b]);
    assert_eq!(reopened.topics(), vec!["alerts", "events"]);
}

#[test]
fn concurrent_mutations_on_distinct_topics() {
    let (_dir, db) = test_db();
    let registry = std::sync::Arc::new(SubscriptionTrackingService::open(&db).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let registry = std::sync::Arc::clone(&registry);
            std::thread::spawn(move || {
                let topic = format!("topic-{i}");
                for j in 0..25 {
                    let sub = uri(&format!("http://subscriber-{j}.example:8080/"));
                    registry.add_subscription(&topic, &sub, Duration::ZERO).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..4 {
        assert_eq!(registry.get_subscribers(&format!("topic-{i}")).len(), 25);
    }
}

#[test]
fn most_recent_add_wins_over_earlier_expiry() {
    let (_dir, db) = test_db();
    let registry = SubscriptionTrackingService::open(&db).unwrap();
    let sub = uri("http://a.example:8080/");

    // Expired add followed by a live re-add: the live one governs.
    registry
        .add_subscription("events", &sub, Duration::from_millis(1))
        .unwrap();
    std::thread::sleep(Duration::from_millis(10));
    registry
        .add_subscription("events", &sub, Duration::from_secs(60))
        .unwrap();

    assert_eq!(registry.get_subscribers("events"), vec![sub]);
}
