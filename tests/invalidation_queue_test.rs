use anyhow::Result;
use async_trait::async_trait;
use cached_instances::app::poll::{poll_registry, Choice, PollStore, USER_COUNT_KEY};
use cached_instances::domain::model::Native;
use cached_instances::{
    CacheBackend, CacheError, CacheSettings, FieldValue, InstanceCache, Invalidation,
    InvalidationQueue, MemoryCache, ModelCache, ObjectSpec, Pk, QueueSettings, UpdateTask,
};
use std::sync::Arc;
use std::time::Duration;

const FIXTURE: &str = r#"
{
  "users": [
    { "id": 1, "username": "alice", "date_joined": "2014-09-22T08:52:00Z" },
    { "id": 2, "username": "bob", "date_joined": "2014-09-23T10:15:30Z" }
  ],
  "groups": [
    { "id": 1, "name": "Voters", "users": [1, 2] }
  ],
  "questions": [
    { "id": 1, "question_text": "What's up?", "pub_date": "2014-09-22T08:52:00Z" }
  ],
  "choices": [
    { "id": 1, "question": 1, "choice_text": "Not much", "voters": [] }
  ]
}
"#;

fn setup() -> Result<(Arc<PollStore>, Arc<MemoryCache>, Arc<InstanceCache>)> {
    let store = Arc::new(PollStore::from_json_str(FIXTURE)?);
    let backend = Arc::new(MemoryCache::default());
    let settings = CacheSettings::default();
    let registry = poll_registry(Arc::clone(&store), &settings.versions);
    let cache = InstanceCache::new(backend.clone(), registry, settings)?;
    Ok((store, backend, Arc::new(cache)))
}

fn votes_of(instance: &cached_instances::domain::fields::CachedInstance) -> Vec<Pk> {
    match &instance["votes"] {
        FieldValue::PkList(votes) => votes.pks.clone(),
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn test_vote_cascades_to_voters() -> Result<()> {
    let (store, backend, cache) = setup()?;
    cache
        .get_instances(
            vec![
                ObjectSpec::new("User", 1),
                ObjectSpec::new("User", 2),
                ObjectSpec::new("Question", 1),
            ],
            None,
        )
        .await?;

    let (queue, handle) = InvalidationQueue::start(Arc::clone(&cache), QueueSettings::default());

    store.add_vote(1, 1).await;
    store.add_vote(1, 2).await;
    queue.notify_write("Choice", 1).await?;

    tokio::time::timeout(Duration::from_secs(5), queue.wait_idle()).await?;

    let stats = queue.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    // choice, question, two voters
    assert_eq!(stats.updates, 4);

    for pk in [1, 2] {
        let entry = cache
            .get_instance("User", &Pk::Int(pk), None)
            .await?
            .expect("voter stays cached");
        assert_eq!(votes_of(&entry.instance), vec![Pk::Int(1)]);
    }
    assert!(!backend.contains_key("drfc_default_Question_1"));

    queue.shutdown(handle).await?;
    Ok(())
}

#[tokio::test]
async fn test_group_change_refreshes_only_cached_users() -> Result<()> {
    let (_store, backend, cache) = setup()?;
    cache.get_instance("User", &Pk::Int(1), None).await?;

    let (queue, handle) = InvalidationQueue::start(Arc::clone(&cache), QueueSettings::default());
    queue.enqueue(UpdateTask::new("Group", 1)).await?;
    tokio::time::timeout(Duration::from_secs(5), queue.wait_idle()).await?;

    assert!(backend.contains_key("drfc_default_User_1"));
    assert!(!backend.contains_key("drfc_default_User_2"));
    assert_eq!(queue.stats().updates, 3);

    queue.shutdown(handle).await?;
    Ok(())
}

#[tokio::test]
async fn test_many_tasks_converge() -> Result<()> {
    let (store, backend, cache) = setup()?;
    cache.get_instance("User", &Pk::Int(1), None).await?;

    let (queue, handle) = InvalidationQueue::start(
        Arc::clone(&cache),
        QueueSettings {
            capacity: 2,
            workers: 2,
        },
    );

    for id in 10..20 {
        store
            .save_choice(Choice {
                id,
                question: 1,
                choice_text: format!("Choice {}", id),
                voters: vec![1],
            })
            .await;
    }
    for id in 10..20 {
        queue.notify_write("Choice", id).await?;
    }
    tokio::time::timeout(Duration::from_secs(5), queue.wait_idle()).await?;

    let stats = queue.stats();
    assert_eq!(stats.completed + stats.failed, 10);
    assert_eq!(stats.failed, 0);

    let raw = backend
        .get("drfc_default_User_1")
        .await?
        .expect("user 1 cached");
    let entry = cache.get_instance("User", &Pk::Int(1), None).await?;
    let votes = votes_of(&entry.expect("user 1 cached").instance);
    assert_eq!(votes, (10..20).map(Pk::Int).collect::<Vec<_>>());
    assert!(raw.contains("votes:PKList"));

    queue.shutdown(handle).await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_root_is_counted() -> Result<()> {
    let (_store, _backend, cache) = setup()?;
    let (queue, handle) = InvalidationQueue::start(cache, QueueSettings::default());

    queue.notify_write("Foo", 1).await?;
    tokio::time::timeout(Duration::from_secs(5), queue.wait_idle()).await?;
    assert_eq!(queue.stats().failed, 1);
    assert_eq!(queue.stats().completed, 0);

    queue.shutdown(handle).await?;
    Ok(())
}

#[tokio::test]
async fn test_enqueue_after_shutdown_is_rejected() -> Result<()> {
    let (_store, backend, cache) = setup()?;
    let (queue, handle) = InvalidationQueue::start(cache, QueueSettings::default());
    queue.shutdown(handle).await?;

    let err = queue.notify_write("User", 1).await.unwrap_err();
    assert!(matches!(err, CacheError::QueueClosed));
    assert_eq!(queue.stats().pending, 0);
    assert!(!backend.contains_key("drfc_default_User_1"));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_drains_queued_work() -> Result<()> {
    let (_store, backend, cache) = setup()?;
    backend.set(USER_COUNT_KEY, "2".to_string()).await?;

    let (queue, handle) = InvalidationQueue::start(cache, QueueSettings::default());
    queue.enqueue(UpdateTask::new("User", 2)).await?;
    queue.shutdown(handle).await?;

    assert!(backend.contains_key("drfc_default_User_2"));
    assert!(!backend.contains_key(USER_COUNT_KEY));
    assert_eq!(queue.stats().completed, 1);
    Ok(())
}

struct Exploding;

#[async_trait]
impl ModelCache for Exploding {
    type Object = i64;

    async fn load(&self, _pk: &Pk) -> cached_instances::Result<Option<i64>> {
        panic!("loader blew up");
    }

    fn serialize(&self, _object: &i64) -> cached_instances::Result<Option<Native>> {
        Ok(None)
    }

    async fn invalidate(&self, _object: &i64) -> cached_instances::Result<Vec<Invalidation>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_panicking_handler_does_not_stall_queue() -> Result<()> {
    let (store, _backend, _cache) = setup()?;
    let settings = CacheSettings::default();
    let mut registry = poll_registry(store, &settings.versions);
    registry.register("Exploding", "default", Exploding);
    let cache = Arc::new(InstanceCache::new(
        Arc::new(MemoryCache::default()),
        registry,
        settings,
    )?);

    let (queue, handle) = InvalidationQueue::start(cache, QueueSettings::default());
    queue.notify_write("Exploding", 1).await?;
    queue.notify_write("User", 1).await?;
    tokio::time::timeout(Duration::from_secs(5), queue.wait_idle()).await?;

    let stats = queue.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);

    queue.shutdown(handle).await?;
    Ok(())
}
