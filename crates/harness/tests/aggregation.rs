use std::error::Error;
use std::sync::Arc;

use stylebook_core::{
    canonical::CANONICAL_SYSTEM_STYLES,
    catalog::Catalog,
    ids::{StyleId, UserId},
    overlay::OverlayField,
};
use stylebook_engine::{CatalogAggregator, EngineConfig, OverlayRepository};
use stylebook_harness::fixtures::{POEM, community_style, private_style, seed_poem, seed_style};
use stylebook_harness::{ScriptedStore, StoreOp, TestSession, init_tracing};
use stylebook_storage::{CatalogStore, OverlayUpdate};

type TestResult = Result<(), Box<dyn Error>>;

fn store_with_poem() -> Result<Arc<ScriptedStore>, Box<dyn Error>> {
    init_tracing();
    let store = ScriptedStore::seeded()?;
    seed_poem(store.backing())?;
    Ok(Arc::new(store))
}

fn aggregator(store: &Arc<ScriptedStore>, batch_size: usize) -> CatalogAggregator {
    let shared: Arc<dyn CatalogStore> = store.clone();
    CatalogAggregator::new(shared, batch_size)
}

/// Writes straight to the backing store, as another device would.
async fn overlay_edit(store: &ScriptedStore, user: &str, field: OverlayField, id: &str) -> TestResult {
    let update = OverlayUpdate::new().union(field, StyleId::new(id));
    store.backing().update_overlay(&UserId::new(user), &update).await?;
    Ok(())
}

// ============================================================================
// Anonymous and fallback catalogs
// ============================================================================

#[tokio::test]
async fn anonymous_catalog_holds_only_system_styles() -> TestResult {
    let store = store_with_poem()?;
    let catalog = aggregator(&store, 30).build_catalog(None).await;

    let ids: Vec<&str> = catalog.iter().map(|e| e.id().as_str()).collect();
    assert_eq!(ids, CANONICAL_SYSTEM_STYLES);
    assert!(catalog.iter().all(|e| e.style.is_system()));
    assert_eq!(store.count(StoreOp::GetUser), 0);
    Ok(())
}

#[tokio::test]
async fn read_failure_serves_fallback_styles() -> TestResult {
    let store = store_with_poem()?;
    store.fail_reads(true);

    let catalog = aggregator(&store, 30).build_catalog(None).await;
    assert_eq!(catalog, Catalog::fallback());
    assert_eq!(catalog.len(), 4);
    assert!(catalog.iter().all(|e| e.variants.is_empty() && !e.has_variants));

    let signed_in = aggregator(&store, 30)
        .build_catalog(Some(&UserId::new("alice")))
        .await;
    assert_eq!(signed_in, Catalog::fallback());
    Ok(())
}

#[tokio::test]
async fn login_during_outage_is_not_an_error() -> TestResult {
    let store = store_with_poem()?;
    store.fail_reads(true);
    let session = TestSession::signed_in(Arc::clone(&store), "alice").await?;
    assert_eq!(session.engine.catalog(), Catalog::fallback());
    assert!(session.engine.overlay().is_some_and(|o| o.added_styles.is_empty()));
    Ok(())
}

// ============================================================================
// Merge rules
// ============================================================================

#[tokio::test]
async fn sources_merge_without_duplicates() -> TestResult {
    let store = store_with_poem()?;
    seed_style(store.backing(), private_style("diary", "alice", 1_700_000_100))?;
    overlay_edit(&store, "alice", OverlayField::Added, POEM).await?;
    // A system id in addedStyles comes back from both reads.
    overlay_edit(&store, "alice", OverlayField::Added, "casual").await?;

    let catalog = aggregator(&store, 30)
        .build_catalog(Some(&UserId::new("alice")))
        .await;
    let ids: Vec<&str> = catalog.iter().map(|e| e.id().as_str()).collect();
    assert_eq!(
        ids,
        vec!["professional", "casual", "academic", "creative", "poem", "diary"]
    );
    let casual = catalog.find(&StyleId::new("casual")).ok_or("casual missing")?;
    assert!(casual.style.is_system());
    Ok(())
}

#[tokio::test]
async fn hidden_wins_over_added() -> TestResult {
    let store = store_with_poem()?;
    overlay_edit(&store, "alice", OverlayField::Added, POEM).await?;
    overlay_edit(&store, "alice", OverlayField::Hidden, POEM).await?;
    overlay_edit(&store, "alice", OverlayField::Hidden, "academic").await?;

    let catalog = aggregator(&store, 30)
        .build_catalog(Some(&UserId::new("alice")))
        .await;
    assert!(!catalog.contains(&StyleId::new(POEM)));
    assert!(!catalog.contains(&StyleId::new("academic")));
    assert_eq!(catalog.len(), 3);
    Ok(())
}

#[tokio::test]
async fn private_styles_are_visible_to_their_owner_only() -> TestResult {
    let store = store_with_poem()?;
    seed_style(store.backing(), private_style("diary", "alice", 1_700_000_100))?;
    seed_style(store.backing(), private_style("ledger", "carol", 1_700_000_200))?;

    let agg = aggregator(&store, 30);
    let alice = agg.build_catalog(Some(&UserId::new("alice"))).await;
    let carol = agg.build_catalog(Some(&UserId::new("carol"))).await;

    assert!(alice.contains(&StyleId::new("diary")));
    assert!(!alice.contains(&StyleId::new("ledger")));
    assert!(carol.contains(&StyleId::new("ledger")));
    assert!(!carol.contains(&StyleId::new("diary")));
    assert_eq!(alice.private_for(&UserId::new("alice")).count(), 1);
    Ok(())
}

#[tokio::test]
async fn non_system_styles_sort_by_usage_then_recency() -> TestResult {
    let store = store_with_poem()?;
    for style in [
        community_style("limerick", "bob", 7, 1_700_000_300),
        community_style("ballad", "bob", 7, 1_700_000_900),
        community_style("memo", "bob", 500, 1_600_000_000),
    ] {
        let id = style.id.clone();
        seed_style(store.backing(), style)?;
        overlay_edit(&store, "alice", OverlayField::Added, id.as_str()).await?;
    }
    overlay_edit(&store, "alice", OverlayField::Added, POEM).await?;

    let catalog = aggregator(&store, 30)
        .build_catalog(Some(&UserId::new("alice")))
        .await;
    let community: Vec<&str> = catalog.community().map(|e| e.id().as_str()).collect();
    assert_eq!(community, vec!["memo", "poem", "ballad", "limerick"]);
    assert_eq!(catalog.system().count(), 4);
    Ok(())
}

// ============================================================================
// Variants
// ============================================================================

#[tokio::test]
async fn variants_are_read_in_batches() -> TestResult {
    let store = store_with_poem()?;
    seed_style(store.backing(), private_style("diary", "alice", 1_700_000_100))?;
    overlay_edit(&store, "alice", OverlayField::Added, POEM).await?;

    let catalog = aggregator(&store, 2)
        .build_catalog(Some(&UserId::new("alice")))
        .await;
    assert_eq!(catalog.len(), 6);
    // Six styles at two ids per read.
    assert_eq!(store.count(StoreOp::GetVariants), 3);

    let poem = catalog.find(&StyleId::new(POEM)).ok_or("poem missing")?;
    assert!(poem.has_variants);
    let names: Vec<String> = poem
        .variants_with_default()
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(names, vec!["Default", "Haiku", "Sonnet"]);
    Ok(())
}

#[tokio::test]
async fn default_batch_size_reads_variants_once() -> TestResult {
    let store = store_with_poem()?;
    let session = TestSession::signed_in(Arc::clone(&store), "alice").await?;
    assert_eq!(session.engine.config(), &EngineConfig::default());
    assert_eq!(store.count(StoreOp::GetVariants), 1);
    Ok(())
}

// ============================================================================
// Overlay repository and library
// ============================================================================

#[tokio::test]
async fn overlay_removal_is_idempotent() -> TestResult {
    let store = store_with_poem()?;
    let shared: Arc<dyn CatalogStore> = store.clone();
    let overlays = OverlayRepository::new(shared);
    let alice = UserId::new("alice");
    let poem = StyleId::new(POEM);

    overlays.add_to_overlay(&alice, OverlayField::Added, &poem).await?;
    overlays.remove_from_overlay(&alice, OverlayField::Added, &poem).await?;
    let once = overlays.get(&alice).await?;
    overlays.remove_from_overlay(&alice, OverlayField::Added, &poem).await?;
    let twice = overlays.get(&alice).await?;

    assert_eq!(once, twice);
    assert!(twice.added_styles.is_empty());
    Ok(())
}

#[tokio::test]
async fn library_lists_community_styles_by_popularity() -> TestResult {
    let store = store_with_poem()?;
    seed_style(store.backing(), community_style("memo", "carol", 900, 1_600_000_000))?;
    seed_style(store.backing(), private_style("diary", "alice", 1_700_000_100))?;

    let session = TestSession::signed_in(Arc::clone(&store), "alice").await?;
    let library = session.engine.browse_library().await?;
    let ids: Vec<&str> = library.iter().map(|e| e.id().as_str()).collect();
    assert_eq!(ids, vec!["memo", "poem"]);
    assert_eq!(session.engine.library(), library);
    Ok(())
}

#[tokio::test]
async fn library_read_failure_is_reported() -> TestResult {
    let store = store_with_poem()?;
    let session = TestSession::signed_in(Arc::clone(&store), "alice").await?;
    store.fail_reads(true);
    let err = session.engine.browse_library().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(session.engine.library().is_empty());
    Ok(())
}
