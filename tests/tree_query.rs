use chrono::NaiveDate;
use placement_engine::application::services::{PlacementFinder, TreeQueryService};
use placement_engine::domain::distributor::{DistributorProfile, Role};
use placement_engine::domain::position::Coordinate;
use placement_engine::domain::{DistributorId, PlacementError};
use placement_engine::infrastructure::memory::{
    InMemoryChangeAudit, InMemoryDirectory, InMemorySlotStore,
};
use placement_engine::shared::EngineConfig;
use std::sync::Arc;

fn c(level: u32, position: u64) -> Coordinate {
    Coordinate::new(level, position).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn profile(id: DistributorId, sponsor: Option<DistributorId>, renewal: NaiveDate) -> DistributorProfile {
    DistributorProfile {
        id,
        login: format!("user{}", id),
        display_name: format!("User {}", id),
        role: Role::Distributor,
        renewal_date: Some(renewal),
        personal_sponsor_id: sponsor,
    }
}

struct Fixture {
    finder: PlacementFinder<InMemorySlotStore, InMemoryChangeAudit>,
    query: TreeQueryService<InMemorySlotStore, InMemoryDirectory>,
}

/// Root 1; 2 and 3 recruited by 1; 4 recruited by 3 but spilled under 2
async fn fixture() -> Fixture {
    let slots = Arc::new(InMemorySlotStore::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let config = EngineConfig::default();
    let finder = PlacementFinder::new(slots.clone(), Arc::new(InMemoryChangeAudit::new()), config.clone());
    let query = TreeQueryService::new(slots, directory.clone(), config)
        .with_reference_date(date(2026, 6, 1));

    directory.insert(profile(1, None, date(2027, 1, 1))).unwrap();
    directory.insert(profile(2, Some(1), date(2026, 6, 1))).unwrap();
    directory.insert(profile(3, Some(1), date(2026, 5, 31))).unwrap();
    directory.insert(profile(4, Some(3), date(2026, 12, 31))).unwrap();

    finder.place_at(1, Coordinate::ROOT).await.unwrap();
    finder.place(2, 1, None).await.unwrap();
    finder.place(3, 1, None).await.unwrap();
    finder.place(4, 1, Some(c(2, 1))).await.unwrap();

    Fixture { finder, query }
}

#[tokio::test]
async fn test_subtree_annotations() {
    let fx = fixture().await;
    let nodes = fx.query.subtree(1, Coordinate::ROOT, Some(2)).await.unwrap();

    let coords: Vec<_> = nodes.iter().map(|n| n.coordinate).collect();
    assert_eq!(coords, vec![Coordinate::ROOT, c(1, 1), c(1, 2), c(2, 1)]);

    let info = |i: usize| nodes[i].occupant.as_ref().unwrap();
    assert!(info(0).active);
    assert!(!info(0).personally_sponsored);

    // Renewal on the reference date still counts as active
    assert!(info(1).active);
    assert!(info(1).personally_sponsored);

    assert!(!info(2).active);
    assert!(info(2).personally_sponsored);

    // Placed under 2 but recruited by 3
    assert_eq!(info(3).login, "user4");
    assert!(!info(3).personally_sponsored);
}

#[tokio::test]
async fn test_recruiter_sees_spillover_flag() {
    let fx = fixture().await;
    fx.finder.move_position(4, c(2, 3), "align with recruiter").await.unwrap();

    let nodes = fx.query.subtree(3, c(1, 2), None).await.unwrap();
    assert_eq!(nodes.len(), 2);
    let moved = nodes[1].occupant.as_ref().unwrap();
    assert_eq!(nodes[1].coordinate, c(2, 3));
    assert!(moved.personally_sponsored);
}

#[tokio::test]
async fn test_subtree_includes_vacated_rows() {
    let fx = fixture().await;
    fx.finder.vacate(c(2, 1), "").await.unwrap();

    let nodes = fx.query.subtree(2, c(1, 1), None).await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[1].coordinate, c(2, 1));
    assert_eq!(nodes[1].occupant_id, None);
    assert!(nodes[1].occupant.is_none());
}

#[tokio::test]
async fn test_subtree_lookups_by_id_and_login() {
    let fx = fixture().await;

    let by_id = fx.query.subtree_by_distributor_id(1, 2, Some(1)).await.unwrap();
    let by_login = fx.query.subtree_by_login(1, "user2", Some(1)).await.unwrap();
    assert_eq!(by_id, by_login);
    assert_eq!(by_id[0].occupant_id, Some(2));

    assert!(matches!(
        fx.query.subtree_by_login(1, "nobody", None).await,
        Err(PlacementError::NotFound(_))
    ));
    // 3 may not look at 2's subtree, whichever way it is addressed
    assert!(matches!(
        fx.query.subtree_by_login(3, "user2", None).await,
        Err(PlacementError::AccessDenied(_))
    ));
}

#[tokio::test]
async fn test_path_and_top_slot() {
    let fx = fixture().await;

    let path = fx.query.path_from_sponsor(2, c(2, 1)).await.unwrap();
    let ids: Vec<_> = path.iter().map(|n| n.occupant_id).collect();
    assert_eq!(ids, vec![Some(2), Some(4)]);

    let own = fx.query.path_from_sponsor(2, c(1, 1)).await.unwrap();
    assert_eq!(own.len(), 1);

    let top = fx.query.top_slot().await.unwrap();
    assert_eq!(top.coordinate, Coordinate::ROOT);
    assert_eq!(top.occupant, Some(1));
}

#[tokio::test]
async fn test_unplaced_sponsor_is_not_found() {
    let fx = fixture().await;
    let err = fx.query.subtree(99, Coordinate::ROOT, None).await.unwrap_err();
    assert!(matches!(err, PlacementError::NotFound(_)));
    assert_eq!(err.status_code(), 404);
}
