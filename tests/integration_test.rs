use std::sync::Arc;
use std::time::Duration;

use tryon_gateway::config::AppConfig;
use tryon_gateway::models::job::{JobMetadata, JobStatus};
use tryon_gateway::services::{clients::ClientRegistry, job_store::JobStore};
use tryon_gateway::store::{KvStore, RedisStore};

fn redis() -> Arc<dyn KvStore> {
    let config = AppConfig::from_env().expect("Failed to load config");
    let url = config.redis_url.expect("REDIS_URL must be set");
    Arc::new(RedisStore::new(&url).expect("Failed to initialize Redis client"))
}

/// Integration test: job lifecycle against a live Redis
///
/// Run with: REDIS_URL=redis://127.0.0.1:6379 cargo test --test integration_test -- --ignored
#[tokio::test]
#[ignore]
async fn test_job_lifecycle_on_redis() {
    let kv = redis();
    kv.ping().await.expect("Redis ping failed");

    let jobs = JobStore::new(Arc::clone(&kv), Duration::from_secs(30));
    let job_id = format!("job_it_{}", uuid::Uuid::new_v4().simple());

    let created = jobs
        .create_job(&job_id, JobMetadata::default())
        .await
        .expect("create_job failed");
    assert_eq!(created.status, JobStatus::Queued);

    jobs.mark_processing(&job_id).await.expect("mark_processing failed");
    jobs.mark_done(&job_id, "https://v3.fal.media/files/it.png")
        .await
        .expect("mark_done failed");

    let done = jobs.get_job(&job_id).await.unwrap().expect("job vanished");
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(done.image_url.as_deref(), Some("https://v3.fal.media/files/it.png"));

    kv.delete(&format!("job:{job_id}")).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_capped_history_and_registry_on_redis() {
    let kv = redis();
    let key = format!("metrics:it_{}", uuid::Uuid::new_v4().simple());
    for i in 0..5 {
        kv.push_capped(&key, &i.to_string(), 3).await.unwrap();
    }
    assert_eq!(kv.list(&key).await.unwrap(), vec!["2", "3", "4"]);
    assert!(kv.delete(&key).await.unwrap());

    let registry = ClientRegistry::new(Arc::clone(&kv));
    let client = registry.register("Integration", None).await.unwrap();
    assert_eq!(registry.get(&client.api_key).await.unwrap(), Some(client.clone()));
    assert!(registry.delete(&client.api_key).await.unwrap());
}
