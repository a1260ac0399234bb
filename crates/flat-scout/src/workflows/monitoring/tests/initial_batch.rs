use std::sync::Arc;

use super::common::*;
use crate::workflows::monitoring::domain::Source;
use crate::workflows::monitoring::repository::DeliveryTracker;
use crate::workflows::monitoring::sources::ListingSource;

fn tolerant_filter(count: u32) -> crate::workflows::monitoring::UserFilter {
    let mut filter = filter();
    filter.tolerance_percent = 10;
    filter.initial_listings_count = count;
    filter
}

fn near(source: Source, listing_id: u64) -> crate::workflows::monitoring::Listing {
    let mut listing = listing(source, listing_id);
    listing.price = 104_000;
    listing
}

#[tokio::test]
async fn strict_matches_come_before_approximate_ones() {
    let store = Arc::new(CountingStore::with_filters([tolerant_filter(3)]));
    let notifier = Arc::new(RecordingNotifier::default());
    let service = build_service(
        store.clone(),
        notifier.clone(),
        sources(vec![
            (
                Source::Cian,
                vec![near(Source::Cian, 1), listing(Source::Cian, 2)],
            ),
            (
                Source::Avito,
                vec![near(Source::Avito, 3), listing(Source::Avito, 4)],
            ),
        ]),
    );

    let sent = service
        .send_initial_listings(&tolerant_filter(3))
        .await
        .expect("batch succeeds");

    assert_eq!(sent, 3);
    assert_eq!(
        notifier.delivered_keys(),
        vec![
            listing(Source::Cian, 2).key(),
            listing(Source::Avito, 4).key(),
            listing(Source::Cian, 1).key(),
        ]
    );
    let delivered = notifier.delivered();
    assert!(delivered[0].deviations.is_none());
    assert!(delivered[2].deviations.is_some());
    assert!(store.is_seen(listing(Source::Cian, 1).key(), USER).expect("lookup"));
    assert!(!store.is_seen(listing(Source::Avito, 3).key(), USER).expect("lookup"));
}

#[tokio::test]
async fn zero_count_is_a_no_op() {
    let store = Arc::new(CountingStore::with_filters([tolerant_filter(0)]));
    let notifier = Arc::new(RecordingNotifier::default());
    let source = Arc::new(ScriptedSource::new(
        Source::Cian,
        vec![listing(Source::Cian, 1)],
    ));
    let service = build_service(
        store.clone(),
        notifier.clone(),
        vec![source.clone() as Arc<dyn ListingSource>],
    );

    let sent = service
        .send_initial_listings(&tolerant_filter(0))
        .await
        .expect("batch succeeds");

    assert_eq!(sent, 0);
    assert!(source.pages_requested().is_empty());
    assert!(notifier.delivered().is_empty());
    assert!(notifier.empty_notifications().is_empty());
}

#[tokio::test]
async fn fetches_a_single_page() {
    let store = Arc::new(CountingStore::with_filters([filter()]));
    let notifier = Arc::new(RecordingNotifier::default());
    let source = Arc::new(ScriptedSource::new(
        Source::YandexRealty,
        vec![listing(Source::YandexRealty, 1)],
    ));
    let service = build_service(
        store,
        notifier,
        vec![source.clone() as Arc<dyn ListingSource>],
    );

    service
        .send_initial_listings(&filter())
        .await
        .expect("batch succeeds");

    assert_eq!(source.pages_requested(), vec![1]);
}

#[tokio::test]
async fn nothing_from_sources_sends_the_empty_notification() {
    let store = Arc::new(CountingStore::with_filters([filter()]));
    let notifier = Arc::new(RecordingNotifier::default());
    let service = build_service(store.clone(), notifier.clone(), sources(vec![]));

    let sent = service
        .send_initial_listings(&filter())
        .await
        .expect("batch succeeds");

    assert_eq!(sent, 0);
    assert_eq!(notifier.empty_notifications(), vec![USER]);
    assert_eq!(store.empty_marks(), 1);
}

#[tokio::test]
async fn all_matches_already_seen_suppresses_the_empty_notification() {
    let store = Arc::new(CountingStore::with_filters([filter()]));
    let notifier = Arc::new(RecordingNotifier::default());
    let known = listing(Source::Cian, 1);
    store.mark_seen(known.key(), USER).expect("seed");
    let mut rejected = listing(Source::Cian, 2);
    rejected.rooms = 4;
    let service = build_service(
        store.clone(),
        notifier.clone(),
        sources(vec![(Source::Cian, vec![known, rejected])]),
    );

    let sent = service
        .send_initial_listings(&filter())
        .await
        .expect("batch succeeds");

    assert_eq!(sent, 0);
    assert!(notifier.delivered().is_empty());
    assert!(notifier.empty_notifications().is_empty());
    assert_eq!(store.empty_marks(), 0);
}

#[tokio::test]
async fn unseen_match_is_sent_without_empty_notification() {
    let store = Arc::new(CountingStore::with_filters([filter()]));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut rejected = listing(Source::Avito, 2);
    rejected.price = 400_000;
    let service = build_service(
        store.clone(),
        notifier.clone(),
        sources(vec![(
            Source::Avito,
            vec![rejected, listing(Source::Avito, 3)],
        )]),
    );

    let sent = service
        .send_initial_listings(&filter())
        .await
        .expect("batch succeeds");

    assert_eq!(sent, 1);
    assert!(notifier.empty_notifications().is_empty());
    assert_eq!(store.empty_marks(), 0);
}

#[tokio::test]
async fn failed_deliveries_are_not_counted_or_marked() {
    let store = Arc::new(CountingStore::with_filters([filter()]));
    let notifier = Arc::new(RecordingNotifier::default());
    let broken = listing(Source::Cian, 1);
    notifier.fail_for(broken.key());
    let service = build_service(
        store.clone(),
        notifier.clone(),
        sources(vec![(Source::Cian, vec![broken.clone(), listing(Source::Cian, 2)])]),
    );

    let sent = service
        .send_initial_listings(&filter())
        .await
        .expect("batch succeeds");

    assert_eq!(sent, 1);
    assert!(!store.is_seen(broken.key(), USER).expect("lookup"));
    assert_eq!(store.seen_marks(), 1);
}
