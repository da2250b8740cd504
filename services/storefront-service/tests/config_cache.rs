use std::sync::Arc;
use std::time::Duration;

use common_auth::Principal;
use storefront_service::models::{ContactInfo, Plan, Tenant, TenantConfig, Theme, ThemeColors};
use storefront_service::{CacheSettings, ConfigCache, ConfigError, InMemoryCache, InMemoryOrderStore, InMemoryTenantStore};
use storefront_service::models::OrderStatus;

fn config(name: &str, plan: Plan) -> TenantConfig {
    TenantConfig {
        name: name.to_string(),
        logo: None,
        plan,
        multi_theme: false,
        default_theme: Theme::Light,
        theme_colors: ThemeColors {
            primary: "#d62828".into(),
            primary2: "#f77f00".into(),
            secondary: "#003049".into(),
            secondary2: "#fcbf49".into(),
        },
        features: serde_json::json!({ "reviews": true }),
        contact_info: ContactInfo::default(),
    }
}

async fn setup() -> (ConfigCache, InMemoryTenantStore, InMemoryCache) {
    let store = InMemoryTenantStore::new();
    store.insert("pizzaco", config("Pizza Co", Plan::Base)).await;
    let cache = InMemoryCache::new();
    let configs = ConfigCache::new(Arc::new(store.clone()), Arc::new(cache.clone()), CacheSettings::default());
    (configs, store, cache)
}

#[tokio::test]
async fn second_read_is_served_from_cache() {
    let (configs, store, cache) = setup().await;
    assert_eq!(configs.get("pizzaco").await.unwrap().name, "Pizza Co");
    assert_eq!(configs.get("pizzaco").await.unwrap().name, "Pizza Co");
    assert_eq!(store.read_count().await, 1);
    assert!(cache.raw("tenant_config:pizzaco").await.is_some());
}

#[tokio::test]
async fn update_after_cached_read_is_visible_immediately() {
    let (configs, _store, cache) = setup().await;
    let admin = Principal::tenant_admin(1, "pizzaco");

    configs.get("pizzaco").await.unwrap();
    configs.update(&admin, "pizzaco", config("Pizza Co Deluxe", Plan::Pro)).await.unwrap();
    assert!(cache.raw("tenant_config:pizzaco").await.is_none());

    let fresh = configs.get("pizzaco").await.unwrap();
    assert_eq!(fresh.name, "Pizza Co Deluxe");
    assert_eq!(fresh.plan, Plan::Pro);
}

#[tokio::test]
async fn failed_store_write_keeps_cached_value() {
    let (configs, store, cache) = setup().await;
    let admin = Principal::tenant_admin(1, "pizzaco");

    configs.get("pizzaco").await.unwrap();
    store.set_fail_writes(true).await;
    let err = configs.update(&admin, "pizzaco", config("Broken", Plan::Vip)).await;
    assert!(matches!(err, Err(ConfigError::Store(_))));
    assert!(cache.raw("tenant_config:pizzaco").await.is_some());
    assert_eq!(configs.get("pizzaco").await.unwrap().name, "Pizza Co");
}

#[tokio::test]
async fn undecodable_entry_falls_back_to_store() {
    let (configs, store, cache) = setup().await;
    cache.put_raw("tenant_config:pizzaco", "{not json", Duration::from_secs(60)).await;

    assert_eq!(configs.get("pizzaco").await.unwrap().name, "Pizza Co");
    assert_eq!(store.read_count().await, 1);
    let repaired = cache.raw("tenant_config:pizzaco").await.unwrap();
    assert!(repaired.contains("Pizza Co"));
}

#[tokio::test]
async fn unavailable_cache_still_serves_and_updates() {
    let (configs, store, cache) = setup().await;
    cache.set_available(false);
    let admin = Principal::tenant_admin(1, "pizzaco");

    assert_eq!(configs.get("pizzaco").await.unwrap().name, "Pizza Co");
    configs.update(&admin, "pizzaco", config("Pizza Co 2", Plan::Base)).await.unwrap();
    assert_eq!(configs.get("pizzaco").await.unwrap().name, "Pizza Co 2");
    assert_eq!(store.read_count().await, 2);
}

#[tokio::test]
async fn unknown_tenant_is_not_found_and_not_cached() {
    let (configs, _store, cache) = setup().await;
    assert!(matches!(configs.get("nope").await, Err(ConfigError::NotFound(_))));
    assert!(cache.raw("tenant_config:nope").await.is_none());
}

#[tokio::test]
async fn admin_of_other_tenant_cannot_update() {
    let (configs, _store, _cache) = setup().await;
    let other = Principal::tenant_admin(2, "burgerhaus");
    let err = configs.update(&other, "pizzaco", config("Hijack", Plan::Vip)).await;
    assert!(matches!(err, Err(ConfigError::Forbidden(_))));
    assert_eq!(configs.get("pizzaco").await.unwrap().name, "Pizza Co");
}

#[tokio::test]
async fn super_admin_manages_tenants() {
    let orders = InMemoryOrderStore::new();
    orders.insert_order(1, 7, "pizzaco", OrderStatus::Active, 10.0).await;
    let store = InMemoryTenantStore::with_orders(orders);
    store.insert("pizzaco", config("Pizza Co", Plan::Base)).await;
    let cache = InMemoryCache::new();
    let configs = ConfigCache::new(Arc::new(store.clone()), Arc::new(cache.clone()), CacheSettings::default());
    let root = Principal::super_admin(1);

    let created = configs
        .create_tenant(&root, Tenant { name: "burgerhaus".into(), config: config("Burger Haus", Plan::Pro) })
        .await
        .unwrap();
    assert_eq!(created.name, "burgerhaus");
    assert_eq!(configs.list_tenants(&root).await.unwrap().len(), 2);

    let dup = configs
        .create_tenant(&root, Tenant { name: "burgerhaus".into(), config: config("Again", Plan::Base) })
        .await;
    assert!(matches!(dup, Err(ConfigError::TenantExists(_))));

    let reserved = configs
        .create_tenant(&root, Tenant { name: "orders".into(), config: config("Orders", Plan::Base) })
        .await;
    assert!(matches!(reserved, Err(ConfigError::InvalidName)));

    configs.get("burgerhaus").await.unwrap();
    configs.delete_tenant(&root, "burgerhaus").await.unwrap();
    assert!(cache.raw("tenant_config:burgerhaus").await.is_none());
    assert!(matches!(configs.get("burgerhaus").await, Err(ConfigError::NotFound(_))));

    assert!(matches!(
        configs.delete_tenant(&root, "pizzaco").await,
        Err(ConfigError::TenantHasOrders(_))
    ));

    let admin = Principal::tenant_admin(1, "pizzaco");
    assert!(matches!(configs.list_tenants(&admin).await, Err(ConfigError::Forbidden(_))));
}
