//! Store-driven expiration: listener notification, statistics, and batch
//! isolation.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use common::{DEPLOYMENT, Event, TestNode, cookie, request_with};
use tessera::store::{Batch, Batcher, InMemorySessionStore};
use tessera::{AttributeValue, DistributableSessionManager, ManagerConfig};
use tessera_types::DestroyedReason;

fn short_lived(timeout: Duration) -> TestNode {
    TestNode::start_with(ManagerConfig::new().with_default_session_timeout(timeout))
}

#[test]
fn test_expired_session_notifies_listeners() -> Result<()> {
    let node = short_lived(Duration::from_secs(1));
    let id = node.create_committed(&[("a", "1")]);
    node.events.clear();

    let purged = node
        .store
        .purge_expired_at(Utc::now() + TimeDelta::seconds(5));
    assert_eq!(purged, 1);
    assert!(!node.store.contains(&id));

    assert_eq!(node.events.events(), vec![
        Event::Destroyed(id.clone(), DestroyedReason::Timeout),
        Event::Removed(id, "a".to_string()),
    ]);

    let stats = node.manager.statistics().snapshot();
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.ended, 1);
    assert_eq!(stats.active, 0);
    assert!(stats.max_lifetime >= Duration::from_secs(4));
    assert_eq!(node.store.open_batches(), 0);
    Ok(())
}

#[test]
fn test_expiration_leaves_caller_batch_bound() -> Result<()> {
    let node = short_lived(Duration::from_secs(1));
    node.create_committed(&[]);

    let outer = node.store.create_batch()?;
    let outer_id = outer.id();

    assert_eq!(
        node.store
            .purge_expired_at(Utc::now() + TimeDelta::seconds(5)),
        1
    );

    let bound = node.store.suspend_batch().expect("outer batch still bound");
    assert_eq!(bound.id(), outer_id);
    node.store.resume_batch(bound);

    outer.close()?;
    assert_eq!(node.store.open_batches(), 0);
    Ok(())
}

#[test]
fn test_expired_session_stays_gone_after_request_commits() -> Result<()> {
    let node = short_lived(Duration::from_secs(1));
    let id = node.create_committed(&[]);

    let mut ctx = request_with(&id);
    let handle = node.manager.get_session(&mut ctx, cookie())?.unwrap();
    handle.set_attribute("k", Some(AttributeValue::from("v")))?;

    let purged = node
        .store
        .purge_expired_at(Utc::now() + TimeDelta::seconds(10));
    assert_eq!(purged, 1);
    ctx.complete();

    assert!(!node.store.contains(&id));
    assert_eq!(node.store.open_batches(), 0);
    assert_eq!(node.events.events(), vec![
        Event::Created(id.clone()),
        Event::Added(id.clone(), "k".to_string()),
        Event::Destroyed(id.clone(), DestroyedReason::Timeout),
    ]);

    let mut ctx = request_with(&id);
    assert!(node.manager.get_session(&mut ctx, cookie())?.is_none());
    Ok(())
}

#[test]
fn test_expirations_reach_only_the_owning_manager() -> Result<()> {
    let a = short_lived(Duration::from_secs(1));
    let b = short_lived(Duration::from_secs(1));
    let id_a = a.create_committed(&[]);
    let id_b = b.create_committed(&[]);
    a.events.clear();
    b.events.clear();

    assert_eq!(a.store.purge_expired_at(Utc::now() + TimeDelta::seconds(5)), 1);

    assert_eq!(a.events.events(), vec![Event::Destroyed(
        id_a,
        DestroyedReason::Timeout
    )]);
    assert!(b.events.events().is_empty());
    assert_eq!(a.manager.statistics().expired(), 1);
    assert_eq!(b.manager.statistics().expired(), 0);
    assert_eq!(b.manager.statistics().active(), 1);
    assert!(b.store.contains(&id_b));
    Ok(())
}

#[test]
fn test_zero_timeout_never_expires() -> Result<()> {
    let node = TestNode::start();
    let id = node.create_committed(&[]);

    let mut ctx = request_with(&id);
    let handle = node.manager.get_session(&mut ctx, cookie())?.unwrap();
    handle.set_max_inactive_interval(Duration::ZERO)?;
    ctx.complete();

    let purged = node
        .store
        .purge_expired_at(Utc::now() + TimeDelta::days(365));
    assert_eq!(purged, 0);
    assert!(node.store.contains(&id));
    assert!(
        node.events
            .events()
            .iter()
            .all(|e| !matches!(e, Event::Destroyed(..)))
    );
    Ok(())
}

#[test]
fn test_expired_session_is_not_found() -> Result<()> {
    let node = short_lived(Duration::from_millis(30));
    let id = node.create_committed(&[]);
    thread::sleep(Duration::from_millis(80));

    let mut ctx = request_with(&id);
    assert!(node.manager.get_session(&mut ctx, cookie())?.is_none());
    Ok(())
}

#[test]
fn test_sweeper_expires_idle_sessions() -> Result<()> {
    let node = short_lived(Duration::from_millis(50));
    let id = node.create_committed(&[("a", "1")]);
    let sweeper = node.store.spawn_sweeper(Duration::from_millis(20))?;

    let deadline = Instant::now() + Duration::from_secs(5);
    let expected = Event::Destroyed(id.clone(), DestroyedReason::Timeout);
    while !node.events.events().contains(&expected) {
        assert!(Instant::now() < deadline, "sweeper never expired {id}");
        thread::sleep(Duration::from_millis(10));
    }
    sweeper.stop();

    assert!(!node.store.contains(&id));
    assert_eq!(node.manager.statistics().expired(), 1);
    Ok(())
}

#[test]
fn test_expiration_after_manager_dropped() -> Result<()> {
    common::init_tracing();
    let store = InMemorySessionStore::new();
    {
        let config = ManagerConfig::new().with_default_session_timeout(Duration::from_secs(1));
        let manager = DistributableSessionManager::new(DEPLOYMENT, Arc::new(store.clone()), config);
        manager.start()?;
        let mut ctx = tessera::RequestContext::new();
        manager.create_session(&mut ctx, Some(cookie()))?;
        ctx.complete();
    }

    // The store still holds the session; nobody is left to notify.
    assert_eq!(store.session_count(), 1);
    assert_eq!(store.purge_expired_at(Utc::now() + TimeDelta::hours(1)), 1);
    assert_eq!(store.session_count(), 0);
    Ok(())
}
