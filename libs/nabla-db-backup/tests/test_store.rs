//! Document store against a live PostgreSQL (`NABLA_TEST_DATABASE_URL`).

mod support;

use nabla_db_backup::models::{Backup, BACKUP_SCHEMA, USER_SCHEMA};
use nabla_query::{csv_export, Collection, Paginator, QueryFilter, RawQueryOptions};
use serde_json::json;
use support::{with_test_store, TestStore};

async fn seed(t: &TestStore) -> anyhow::Result<()> {
    t.store
        .insert(
            &USER_SCHEMA,
            json!({"_id": "u1", "name": "Alice Smith", "email": "Alice@X.com", "password": "pw"}),
        )
        .await?;
    for i in 0..25 {
        t.store
            .insert(
                &BACKUP_SCHEMA,
                json!({
                    "_id": format!("b{i:02}"),
                    "file": format!("dump-{i:02}.gz"),
                    "db": if i % 2 == 0 { "shop" } else { "crm" },
                    "user": "u1",
                    "ip": format!(" 10.0.0.{i} "),
                    "dbSize": 1000 + i,
                    "createdAt": format!("2024-01-01T00:00:{i:02}.000000Z")
                }),
            )
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn pages_count_and_window() -> anyhow::Result<()> {
    with_test_store(|t| {
        Box::pin(async move {
            seed(t).await?;
            let backups = Paginator::new(t.store.collection(&BACKUP_SCHEMA));

            let page = backups
                .search(None, &RawQueryOptions::default().limit(10i64).page(3i64))
                .await?;
            assert_eq!(page.total_results, 25);
            assert_eq!(page.total_pages, 3);
            assert_eq!(page.results.len(), 5);
            assert_eq!(page.results[0]["_id"], "b20");

            let far = backups
                .search(None, &RawQueryOptions::default().page("99999999999999999999"))
                .await?;
            assert!(far.results.is_empty());
            assert_eq!(far.total_results, 25);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn search_is_case_insensitive_regex_over_searchable_fields() -> anyhow::Result<()> {
    with_test_store(|t| {
        Box::pin(async move {
            seed(t).await?;
            let backups = Paginator::new(t.store.collection(&BACKUP_SCHEMA));

            let page = backups
                .search(Some("SHOP"), &RawQueryOptions::default().limit(100i64))
                .await?;
            assert_eq!(page.total_results, 13);

            // Stored ip was trimmed
            let page = backups
                .search(Some("^10\\.0\\.0\\.7$"), &RawQueryOptions::default())
                .await?;
            assert_eq!(page.total_results, 1);
            assert_eq!(page.results[0]["ip"], "10.0.0.7");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn sorts_numbers_numerically_and_populates_users() -> anyhow::Result<()> {
    with_test_store(|t| {
        Box::pin(async move {
            seed(t).await?;
            let backups = Paginator::new(t.store.collection(&BACKUP_SCHEMA));

            let page = backups
                .search(
                    Some("crm"),
                    &RawQueryOptions::default()
                        .sort_by("dbSize:desc")
                        .populate("user")
                        .limit(3i64),
                )
                .await?;
            let sizes: Vec<u64> = page
                .results
                .iter()
                .filter_map(|doc| doc["dbSize"].as_u64())
                .collect();
            assert_eq!(sizes, vec![1023, 1021, 1019]);

            let typed = page.try_map(serde_json::from_value::<Backup>)?;
            let user = typed.results[0]
                .user
                .as_ref()
                .and_then(|u| u.document())
                .expect("populated user");
            assert_eq!(user.email, "alice@x.com");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn base_filter_and_csv_export() -> anyhow::Result<()> {
    with_test_store(|t| {
        Box::pin(async move {
            seed(t).await?;
            let collection = t.store.collection(&BACKUP_SCHEMA);

            let mut base = serde_json::Map::new();
            base.insert("db".to_string(), json!("crm"));
            base.insert("status".to_string(), json!(""));
            let page = Paginator::new(collection.clone())
                .paginate(&base, &RawQueryOptions::default(), Some("dump-1"))
                .await?;
            // dump-11, 13, 15, 17, 19
            assert_eq!(page.total_results, 5);

            let mut out = Vec::new();
            let rows = csv_export::export_collection(
                &collection,
                QueryFilter::all().with_equals("db", json!("shop")),
                &mut out,
            )
            .await?;
            assert_eq!(rows, 13);
            let text = String::from_utf8(out)?;
            assert!(text.starts_with("_id,ip,file,db,user,"));
            assert_eq!(text.lines().count(), 14);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn insert_replaces_same_id() -> anyhow::Result<()> {
    with_test_store(|t| {
        Box::pin(async move {
            seed(t).await?;
            t.store
                .insert(
                    &BACKUP_SCHEMA,
                    json!({"_id": "b00", "file": "again.gz", "db": "shop", "user": "u1", "ip": "x"}),
                )
                .await?;
            let collection = t.store.collection(&BACKUP_SCHEMA);
            let count = collection
                .count_documents(&nabla_query::CountQuery {
                    filter: QueryFilter::all(),
                })
                .await?;
            assert_eq!(count, 25);
            assert!(t.store.delete(&BACKUP_SCHEMA, "b00").await?);
            Ok(())
        })
    })
    .await
}
