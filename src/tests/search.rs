use crate::engine::testing::FakeBackend;
use crate::semantic::ranker::SimilarityRanker;
use crate::semantic::{AlbumId, AlbumScope, EncodeOptions, PhotoId, RecordStore, SearchError};

use super::support::{create_service, encoders, FakePhotoSource, TestService, DIMS};

async fn indexed_service(photos: FakePhotoSource, albums: &[&str]) -> TestService {
    let test = create_service(photos);
    for album in albums {
        test.service
            .encode_album(AlbumId::from(*album), None, EncodeOptions::default())
            .await
            .unwrap()
            .wait()
            .await;
    }
    test
}

#[tokio::test]
async fn test_search_returns_top_k_by_score() {
    let test = indexed_service(FakePhotoSource::new().with_album("a", 5), &["a"]).await;
    let service = &test.service;

    let results = service
        .search("dog on a beach", &AlbumScope::All, Some(3), None)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    // same order as scoring every stored vector by hand
    let query = encoders(FakeBackend::new(DIMS))
        .text()
        .encode_text("dog on a beach")
        .await
        .unwrap();
    let ranker = SimilarityRanker::new(query.as_slice());
    let mut expected: Vec<(PhotoId, f32)> = service
        .store()
        .all()
        .iter()
        .map(|r| (r.photo_id.clone(), ranker.score(r.vector.as_slice())))
        .collect();
    expected.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    for (result, (photo_id, score)) in results.iter().zip(expected.iter()) {
        assert_eq!(&result.photo_id, photo_id);
        assert!((result.score - score).abs() < 1e-6);
        assert_eq!(result.album_id, AlbumId::from("a"));
    }
}

#[tokio::test]
async fn test_search_scope_and_threshold() {
    let test = indexed_service(
        FakePhotoSource::new()
            .with_album("a", 3)
            .with_album("b", 2)
            .with_album("c", 2),
        &["a", "b"],
    )
    .await;
    let service = &test.service;

    let only_b = service
        .search(
            "sunset",
            &AlbumScope::Albums(vec![AlbumId::from("b")]),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(only_b.len(), 2);
    assert!(only_b.iter().all(|r| r.album_id == AlbumId::from("b")));

    // an album with nothing indexed is an empty result, not an error
    let only_c = service
        .search(
            "sunset",
            &AlbumScope::Albums(vec![AlbumId::from("c")]),
            None,
            None,
        )
        .await
        .unwrap();
    assert!(only_c.is_empty());

    let all = service
        .search("sunset", &AlbumScope::All, None, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 5);

    let cutoff = all[2].score;
    let above = service
        .search("sunset", &AlbumScope::All, None, Some(cutoff))
        .await
        .unwrap();
    assert!(above.len() >= 3);
    assert!(above.iter().all(|r| r.score >= cutoff));
}

#[tokio::test]
async fn test_search_rejects_empty_query() {
    let test = indexed_service(FakePhotoSource::new().with_album("a", 1), &["a"]).await;
    let result = test.service.search("   ", &AlbumScope::All, None, None).await;
    assert!(matches!(result, Err(SearchError::EmptyQuery)));
}

#[tokio::test]
async fn test_search_by_photo_finds_duplicate() {
    let test = indexed_service(
        FakePhotoSource::new()
            .with_album("a", 5)
            .with_copy("a/4.jpg", "a/1.jpg"),
        &["a"],
    )
    .await;

    let results = test
        .service
        .search_by_photo(&PhotoId::from("a/1.jpg"), &AlbumScope::All, Some(2))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].photo_id, PhotoId::from("a/4.jpg"));
    assert!(results[0].score > 0.999);
    assert!(results.iter().all(|r| r.photo_id != PhotoId::from("a/1.jpg")));
}

#[tokio::test]
async fn test_search_by_unindexed_photo() {
    let test = indexed_service(FakePhotoSource::new().with_album("a", 2), &[]).await;
    let result = test
        .service
        .search_by_photo(&PhotoId::from("a/1.jpg"), &AlbumScope::All, None)
        .await;
    assert!(matches!(result, Err(SearchError::PhotoNotIndexed(_))));
}

#[tokio::test]
async fn test_album_state() {
    let test = indexed_service(
        FakePhotoSource::new()
            .with_album("a", 4)
            .with_album("b", 2),
        &["a"],
    )
    .await;
    let service = &test.service;

    let a = service.album_state(&AlbumId::from("a")).await.unwrap();
    assert_eq!((a.total_photos, a.indexed, a.searchable), (4, 4, true));

    let b = service.album_state(&AlbumId::from("b")).await.unwrap();
    assert_eq!((b.total_photos, b.indexed, b.searchable), (2, 0, false));

    let states = service.album_states().await.unwrap();
    assert_eq!(states, vec![a, b]);
}

#[tokio::test]
async fn test_remove_photo() {
    let test = indexed_service(FakePhotoSource::new().with_album("a", 3), &["a"]).await;
    let service = &test.service;
    let photo = PhotoId::from("a/2.jpg");

    assert!(service.remove_photo(&photo).await.unwrap());
    assert!(!service.remove_photo(&photo).await.unwrap());
    assert!(!service.store().contains(&photo));

    let state = service.album_state(&AlbumId::from("a")).await.unwrap();
    assert_eq!(state.indexed, 2);

    let results = service
        .search("anything", &AlbumScope::All, None, None)
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.photo_id != photo));
}

#[tokio::test]
async fn test_warm_up_loads_models_once() {
    let test = create_service(FakePhotoSource::new());
    test.service.warm_up().await.unwrap();
    test.service.warm_up().await.unwrap();
    assert_eq!(test.backend.load_count(), 2);
}
