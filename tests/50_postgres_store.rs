use anyhow::{Context, Result};
use serde_json::json;

use formbase_api::registry::Registry;
use formbase_api::schema::{Document, JoinPipeline};
use formbase_api::store::{DocumentStore, PgDocumentStore};
use formbase_api::types::RecordId;

/// Pool for `DATABASE_URL`, or None when no database is configured
async fn connect() -> Result<Option<sqlx::PgPool>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set; skipping postgres store tests");
        return Ok(None);
    };
    let pool = sqlx::PgPool::connect(&url)
        .await
        .context("failed to connect to DATABASE_URL")?;
    Ok(Some(pool))
}

#[tokio::test]
async fn postgres_store_writes_and_joins() -> Result<()> {
    let Some(pool) = connect().await? else {
        return Ok(());
    };

    // Fresh tables per run so parallel or repeated runs never share rows
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let employees = format!("it_emp_{}", suffix);
    let departments = format!("it_dept_{}", suffix);
    let registry = Registry::from_yaml_str(&format!(
        r#"
collections:
  - name: {employees}
    fields:
      - {{ label: Name, key: name, type: text, required: true }}
      - {{ label: Department, key: department, type: join, join: "{departments};department" }}
  - name: {departments}
    fields:
      - {{ label: Department, key: department, type: text }}
"#
    ))?;

    let store = PgDocumentStore::from_pool(pool.clone());
    store.prepare(&registry).await?;
    store.health_check().await?;

    let outcome = exercise(&store, &registry, &employees, &departments).await;

    for table in [&employees, &departments] {
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table))
            .execute(&pool)
            .await?;
    }
    outcome
}

async fn exercise(store: &PgDocumentStore, registry: &Registry, employees: &str, departments: &str) -> Result<()> {
    let emp = registry.get(employees).context("employees collection")?;
    let dept = registry.get(departments).context("departments collection")?;
    let pipeline = JoinPipeline::for_collection(emp);

    let tech = store
        .insert(departments, &Document::shape(&json!({ "department": "Tech" }), dept)?)
        .await?;
    assert!(tech.acknowledged);
    let tech_id = json!(tech.inserted_id.to_string());

    let body = json!({ "name": "Ada", "department": tech.inserted_id.to_string(), "salary": 1 });
    let ada = store.insert(employees, &Document::shape(&body, emp)?).await?;

    let records = store.aggregate(employees, pipeline.single(ada.inserted_id)).await?;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record["_id"], json!(ada.inserted_id.to_string()));
    assert_eq!(record["name"], "Ada");
    assert!(record.get("salary").is_none());
    assert_eq!(record["department"], tech_id);
    assert_eq!(record["departmentDetails"]["department"], "Tech");
    assert_eq!(record["departmentDetails"]["_id"], tech_id);

    // Merge update: a real change counts as modified, repeating it does not
    let rename = Document::shape(&json!({ "name": "Ada Lovelace" }), emp)?;
    let result = store.update(employees, ada.inserted_id, &rename).await?;
    assert_eq!((result.matched_count, result.modified_count), (1, 1));
    let result = store.update(employees, ada.inserted_id, &rename).await?;
    assert_eq!((result.matched_count, result.modified_count), (1, 0));
    let result = store.update(employees, RecordId::new(), &rename).await?;
    assert_eq!((result.matched_count, result.modified_count), (0, 0));

    let records = store.aggregate(employees, pipeline.single(ada.inserted_id)).await?;
    assert_eq!(records[0]["name"], "Ada Lovelace");
    assert_eq!(records[0]["department"], tech_id);

    // Dangling join: the read succeeds and the details key is absent
    assert_eq!(store.delete(departments, tech.inserted_id).await?.deleted_count, 1);
    let records = store.aggregate(employees, pipeline.list()).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["department"], tech_id);
    assert!(records[0].get("departmentDetails").is_none());

    assert_eq!(store.delete(employees, ada.inserted_id).await?.deleted_count, 1);
    assert_eq!(store.delete(employees, ada.inserted_id).await?.deleted_count, 0);
    assert!(store.aggregate(employees, pipeline.list()).await?.is_empty());
    Ok(())
}
