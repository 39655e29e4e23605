//! End-to-end reconciliation against an in-memory Cloudflare account

mod common;

use cfccm_cloudflare::ResourceClient;
use cfccm_common::AnnotationKeys;
use cfccm_load_balancer::{ingress_status, LoadBalancerProvider, LoadBalancers};
use common::{node, service, FakeCloudflare};

const HOST: &str = "shop.example.com";

fn provider(fake: &FakeCloudflare) -> LoadBalancers {
    LoadBalancers::new(fake.api(), AnnotationKeys::default())
}

// =============================================================================
// Ensure
// =============================================================================

#[tokio::test]
async fn story_first_ensure_builds_the_whole_chain() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(Some(HOST), &[]);
    let nodes = [node("n1", Some("203.0.113.10")), node("n2", Some("203.0.113.11"))];

    let status = lbs.ensure_load_balancer(&svc, &nodes).await.unwrap();

    assert_eq!(status, ingress_status(HOST));
    assert_eq!(
        fake.mutations(),
        ["create_monitor", "create_pool", "create_load_balancer"]
    );

    let monitor = &fake.monitors()[0];
    let pool = &fake.pools()[0];
    let lb = &fake.load_balancers()[0];
    assert_eq!(monitor.description, "shop.example.com-monitor");
    assert_eq!(pool.name, "shop.example.com-pool");
    assert_eq!(pool.monitor.as_deref(), Some(monitor.id.as_str()));
    assert_eq!(pool.origins.len(), 2);
    assert_eq!(lb.name, HOST);
    assert_eq!(lb.fallback_pool, pool.id);
    assert_eq!(lb.default_pools, vec![pool.id.clone()]);
}

#[tokio::test]
async fn story_repeated_ensure_only_rewrites_the_pool() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(Some(HOST), &[]);
    let nodes = [node("n1", Some("203.0.113.10"))];

    lbs.ensure_load_balancer(&svc, &nodes).await.unwrap();
    let pools_before = fake.pools();
    fake.reset_calls();

    lbs.ensure_load_balancer(&svc, &nodes).await.unwrap();

    assert_eq!(fake.mutations(), ["update_pool"]);
    assert_eq!(fake.monitors().len(), 1);
    assert_eq!(fake.load_balancers().len(), 1);
    // Same nodes, byte-identical pool
    assert_eq!(fake.pools(), pools_before);
}

#[tokio::test]
async fn story_nodes_without_external_ip_are_left_out() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(Some(HOST), &[]);
    let nodes = [
        node("public", Some("203.0.113.10")),
        node("private", None),
    ];

    lbs.ensure_load_balancer(&svc, &nodes).await.unwrap();

    let origins = &fake.pools()[0].origins;
    assert_eq!(origins.len(), 1);
    assert_eq!(origins[0].address, "203.0.113.10");
}

#[tokio::test]
async fn story_hostname_is_sanitized_for_resource_names() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(Some("my shop!.example.com"), &[]);

    let status = lbs.ensure_load_balancer(&svc, &[]).await.unwrap();

    assert_eq!(fake.load_balancers()[0].name, "my_shop_.example.com");
    assert_eq!(fake.pools()[0].name, "my_shop_.example.com-pool");
    assert_eq!(fake.monitors()[0].description, "my_shop_.example.com-monitor");
    // Status keeps the hostname as annotated
    assert_eq!(status, ingress_status("my shop!.example.com"));
}

#[tokio::test]
async fn story_annotations_shape_the_monitor() {
    let keys = AnnotationKeys::default();
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(
        Some(HOST),
        &[
            (keys.monitor_type(), "https".to_string()),
            (keys.monitor_path(), "/healthz".to_string()),
            (keys.monitor_allow_insecure(), "true".to_string()),
        ],
    );

    lbs.ensure_load_balancer(&svc, &[]).await.unwrap();

    let monitor = &fake.monitors()[0];
    assert_eq!(monitor.type_, "https");
    assert_eq!(monitor.path.as_deref(), Some("/healthz"));
    assert!(monitor.allow_insecure);
    assert_eq!(monitor.port, Some(80));
}

// =============================================================================
// Partial failure
// =============================================================================

#[tokio::test]
async fn story_failed_load_balancer_create_is_finished_next_time() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(Some(HOST), &[]);
    let nodes = [node("n1", Some("203.0.113.10"))];

    fake.fail_on("create_load_balancer");
    let err = lbs.ensure_load_balancer(&svc, &nodes).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(fake.monitors().len(), 1);
    assert_eq!(fake.pools().len(), 1);
    assert!(fake.load_balancers().is_empty());

    fake.clear_failure();
    fake.reset_calls();
    lbs.ensure_load_balancer(&svc, &nodes).await.unwrap();

    assert_eq!(fake.mutations(), ["update_pool", "create_load_balancer"]);
    assert_eq!(fake.monitors().len(), 1);
    assert_eq!(fake.pools().len(), 1);
}

#[tokio::test]
async fn story_monitor_failure_creates_nothing_downstream() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);

    fake.fail_on("create_monitor");
    lbs.ensure_load_balancer(&service(Some(HOST), &[]), &[])
        .await
        .unwrap_err();

    assert!(fake.is_empty());
    assert!(!fake.calls().iter().any(|c| c.contains("pool")));
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn story_node_churn_replaces_origins() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(Some(HOST), &[]);

    lbs.ensure_load_balancer(&svc, &[node("n1", Some("203.0.113.10"))])
        .await
        .unwrap();
    fake.reset_calls();

    lbs.update_load_balancer(
        &svc,
        &[node("n2", Some("203.0.113.20")), node("n3", Some("203.0.113.30"))],
    )
    .await
    .unwrap();

    assert_eq!(fake.mutations(), ["update_pool"]);
    let addresses: Vec<_> = fake.pools()[0]
        .origins
        .iter()
        .map(|o| o.address.clone())
        .collect();
    assert_eq!(addresses, ["203.0.113.20", "203.0.113.30"]);
}

#[tokio::test]
async fn story_update_before_ensure_creates_no_pool() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);

    let err = lbs
        .update_load_balancer(&service(Some(HOST), &[]), &[node("n1", Some("203.0.113.10"))])
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(fake.pools().is_empty());
    assert!(fake.load_balancers().is_empty());
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn story_delete_unwinds_in_reverse_order() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(Some(HOST), &[]);
    lbs.ensure_load_balancer(&svc, &[node("n1", Some("203.0.113.10"))])
        .await
        .unwrap();
    fake.reset_calls();

    lbs.ensure_load_balancer_deleted(&svc).await.unwrap();

    assert_eq!(
        fake.mutations(),
        ["delete_load_balancer", "delete_pool", "delete_monitor"]
    );
    assert!(fake.is_empty());
}

#[tokio::test]
async fn story_delete_is_idempotent() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(Some(HOST), &[]);
    lbs.ensure_load_balancer(&svc, &[]).await.unwrap();

    lbs.ensure_load_balancer_deleted(&svc).await.unwrap();
    lbs.ensure_load_balancer_deleted(&svc).await.unwrap();

    assert!(fake.is_empty());
}

#[tokio::test]
async fn story_failed_pool_delete_keeps_monitor() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(Some(HOST), &[]);
    lbs.ensure_load_balancer(&svc, &[]).await.unwrap();

    fake.fail_on("delete_pool");
    lbs.ensure_load_balancer_deleted(&svc).await.unwrap_err();

    assert!(fake.load_balancers().is_empty());
    assert_eq!(fake.pools().len(), 1);
    assert_eq!(fake.monitors().len(), 1);

    fake.clear_failure();
    lbs.ensure_load_balancer_deleted(&svc).await.unwrap();
    assert!(fake.is_empty());
}

// =============================================================================
// Not managed
// =============================================================================

#[tokio::test]
async fn story_service_without_hostname_is_ignored() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(None, &[]);
    let nodes = [node("n1", Some("203.0.113.10"))];

    assert_eq!(lbs.get_load_balancer(&svc).await.unwrap(), None);
    assert_eq!(lbs.get_load_balancer_name(&svc), "");
    lbs.ensure_load_balancer(&svc, &nodes).await.unwrap();
    lbs.update_load_balancer(&svc, &nodes).await.unwrap();
    lbs.ensure_load_balancer_deleted(&svc).await.unwrap();

    assert!(fake.calls().is_empty());
}

// =============================================================================
// Lookup
// =============================================================================

#[tokio::test]
async fn story_get_reports_existing_load_balancer() {
    let fake = FakeCloudflare::new();
    let lbs = provider(&fake);
    let svc = service(Some(HOST), &[]);

    assert_eq!(lbs.get_load_balancer(&svc).await.unwrap(), None);
    lbs.ensure_load_balancer(&svc, &[]).await.unwrap();

    assert_eq!(
        lbs.get_load_balancer(&svc).await.unwrap(),
        Some(ingress_status(HOST))
    );
    assert_eq!(lbs.get_load_balancer_name(&svc), HOST);
}

#[tokio::test]
async fn story_created_monitor_round_trips_by_name() {
    let fake = FakeCloudflare::new();
    let resources = ResourceClient::new(fake.api());
    let monitor = cfccm_load_balancer::build_monitor(
        "rt.example.com-monitor",
        &cfccm_common::MonitorSpec::default(),
    );

    let created = resources.create_monitor(&monitor).await.unwrap();
    let fetched = resources
        .get_monitor("rt.example.com-monitor")
        .await
        .unwrap();

    assert!(!fetched.id.is_empty());
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.description, monitor.description);
    assert_eq!(fetched.path, monitor.path);
    assert_eq!(fetched.type_, monitor.type_);
}

#[tokio::test]
async fn story_account_probe_uses_configured_id() {
    let fake = FakeCloudflare::new();
    let resources = ResourceClient::new(fake.api());

    resources.verify_account(common::ACCOUNT_ID).await.unwrap();
    assert!(resources.verify_account("someone-else").await.is_err());
}
