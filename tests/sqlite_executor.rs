#![cfg(feature = "sqlite")]

use std::sync::{Arc, Mutex};

use sql_executor::prelude::*;
use tempfile::TempDir;

fn fresh_db() -> Result<(TempDir, SqlExecutor), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("executor.db");
    let executor = SqlExecutor::new(
        format!("Data Source={}", path.display()),
        BackendKind::Sqlite,
    );
    Ok((dir, executor))
}

async fn users_table(executor: &SqlExecutor) -> Result<(), SqlExecutorError> {
    executor
        .execute_non_query(
            "create table users (id integer primary key, name text, score real, active integer)",
        )
        .await?;
    executor
        .execute_non_query(
            Command::text("insert into users (id, name, score, active) values (@id, @name, @score, @active)")
                .param("@id", 1)
                .param("@name", "ada")
                .param("@score", 9.5)
                .param("@active", true),
        )
        .await?;
    executor
        .execute_non_query(
            Command::text("insert into users (id, name, score, active) values (?, ?, ?, ?)")
                .param("id", 2)
                .param("name", "grace")
                .param("score", RowValues::Null)
                .param("active", false),
        )
        .await?;
    Ok(())
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(String, String)>>);

impl FailureSink for Recorder {
    fn record_failure(&self, message: &str, component: &str) {
        self.0
            .lock()
            .unwrap()
            .push((message.to_string(), component.to_string()));
    }
}

#[tokio::test]
async fn non_query_returns_changed_rows() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;
    users_table(&executor).await?;

    let changed = executor
        .execute_non_query(Command::text("update users set active = 1 where id >= :min").param("min", 1))
        .await?;
    assert_eq!(changed, 2);

    let changed = executor
        .execute_non_query(Command::text("delete from users where id = ?1").param("id", 99))
        .await?;
    assert_eq!(changed, 0);
    Ok(())
}

#[tokio::test]
async fn non_query_runs_every_statement_in_the_text() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;

    let changed = executor
        .execute_non_query(
            "create table a (x integer); insert into a values (1); insert into a values (2), (3);",
        )
        .await?;
    assert_eq!(changed, 3);
    assert_eq!(executor.get_scalar_string("select count(*) from a").await?, "3");

    let changed = executor
        .execute_non_query("update a set x = x + 1 where x > 1; create index a_x on a (x); delete from a where x = 1")
        .await?;
    assert_eq!(changed, 3);
    assert_eq!(executor.get_scalar_string("select sum(x) from a").await?, "7");
    Ok(())
}

#[tokio::test]
async fn scalars_round_trip_primitive_values() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;
    users_table(&executor).await?;

    let name = executor
        .get_scalar(Command::text("select name from users where id = $id").param("$id", 1))
        .await?;
    assert_eq!(name, Some(RowValues::Text("ada".to_string())));

    let id = executor
        .get_scalar(Command::text("select id from users where name = :name").param("name", "grace"))
        .await?;
    assert_eq!(id, Some(RowValues::Int(2)));

    let count = executor.get_scalar_string("select count(*) from users").await?;
    assert_eq!(count, "2");
    Ok(())
}

#[tokio::test]
async fn absent_and_null_scalars() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;
    users_table(&executor).await?;

    let none = executor
        .get_scalar("select name from users where id = 42")
        .await?;
    assert_eq!(none, None);

    let null = executor
        .get_scalar("select score from users where id = 2")
        .await?;
    assert_eq!(null, Some(RowValues::Null));

    assert_eq!(
        executor
            .get_scalar_string("select name from users where id = 42")
            .await?,
        ""
    );
    assert_eq!(
        executor
            .get_scalar_string("select score from users where id = 2")
            .await?,
        ""
    );
    Ok(())
}

#[tokio::test]
async fn tables_and_first_rows() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;
    users_table(&executor).await?;

    let table = executor
        .get_table("select id, name, score, active from users order by id")
        .await?;
    assert_eq!(table.len(), 2);
    assert_eq!(
        table.get_column_names().map(|c| c.as_slice().to_vec()),
        Some(vec![
            "id".to_string(),
            "name".to_string(),
            "score".to_string(),
            "active".to_string()
        ])
    );
    let ada = &table.results[0];
    assert_eq!(ada.get("NAME"), Some(&RowValues::Text("ada".into())));
    assert_eq!(ada.get("score").and_then(RowValues::as_float), Some(9.5));
    assert_eq!(ada.get("active"), Some(&RowValues::Int(1)));

    let first = executor
        .get_first_row(Command::text("select name from users where id = @id").param("@id", 2))
        .await?;
    assert_eq!(
        first.and_then(|row| row.get("name").cloned()),
        Some(RowValues::Text("grace".into()))
    );

    let missing = executor
        .get_first_row("select name from users where id = 7")
        .await?;
    assert!(missing.is_none());

    let empty = executor.get_table("select * from users where 0").await?;
    assert!(empty.is_empty());
    Ok(())
}

#[tokio::test]
async fn row_sets_keep_one_table_per_query() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;
    users_table(&executor).await?;

    let set = executor
        .get_row_set(
            Command::text(
                "select id from users order by id; \
                 update users set score = 1.0 where id = :id; \
                 select count(*) as n from users where score is not null",
            )
            .param("id", 2),
        )
        .await?;
    assert_eq!(set.len(), 2);
    assert_eq!(set.table(0).map(ResultSet::len), Some(2));
    assert_eq!(
        set.table(1)
            .and_then(ResultSet::first)
            .and_then(|row| row.get("n").cloned()),
        Some(RowValues::Int(2))
    );
    Ok(())
}

#[tokio::test]
async fn cursor_streams_and_releases_the_connection() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;
    users_table(&executor).await?;

    let mut cursor = executor
        .execute_reader("select id, name from users order by id")
        .await?;
    assert_eq!(cursor.columns(), ["id", "name"]);
    let first = cursor.next().await?.expect("first row");
    assert_eq!(first.get("id"), Some(&RowValues::Int(1)));
    cursor.close().await;

    // the cursor's connection is gone, so writers are not blocked by its read
    let changed = executor.execute_non_query("delete from users").await?;
    assert_eq!(changed, 2);

    let mut cursor = executor.execute_reader("select id from users").await?;
    assert!(cursor.next().await?.is_none());
    assert!(cursor.is_closed());
    Ok(())
}

#[tokio::test]
async fn cursor_collects_remaining_rows() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;
    users_table(&executor).await?;

    let cursor = executor
        .execute_reader("select name from users order by id")
        .await?;
    let table = cursor.collect().await?;
    let names: Vec<String> = table
        .results
        .iter()
        .filter_map(|row| row.get("name").map(ToString::to_string))
        .collect();
    assert_eq!(names, ["ada", "grace"]);
    Ok(())
}

#[tokio::test]
async fn missing_parameters_are_binding_errors() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;
    users_table(&executor).await?;

    let err = executor
        .get_scalar(Command::text("select name from users where id = :id").param("other", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlExecutorError::ParameterError(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn failures_reach_the_sink_with_text_and_values() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;
    let recorder = Arc::new(Recorder::default());
    let executor = executor.with_failure_sink(recorder.clone());

    let err = executor
        .execute_non_query(Command::text("insert into nowhere values (:v)").param("v", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlExecutorError::SqliteError(_)), "{err:?}");

    let seen = recorder.0.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (message, component) = &seen[0];
    assert_eq!(component, "sql_executor");
    assert!(message.contains("nowhere"), "{message}");
    assert!(message.contains("CommandText: insert into nowhere values (:v)"), "{message}");
    assert!(message.contains("Params: v = 5"), "{message}");
    Ok(())
}

#[tokio::test]
async fn procedures_are_not_available_on_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, executor) = fresh_db()?;
    let err = executor
        .execute_procedure("refresh_totals", [("@since", 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlExecutorError::Unimplemented(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn config_builds_a_working_executor() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.db");
    let json = serde_json::json!({
        "connection_string": path.display().to_string(),
        "backend": "SQLite",
        "timeout_secs": 5,
    })
    .to_string();

    let executor = ExecutorConfig::from_json(&json)?.build();
    assert_eq!(executor.kind(), BackendKind::Sqlite);
    executor.execute_non_query("create table t (a integer)").await?;
    assert_eq!(executor.get_scalar_string("select count(*) from t").await?, "0");
    executor.close();
    Ok(())
}

#[tokio::test]
async fn fail_if_missing_refuses_to_create() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("absent.db");
    let executor = SqlExecutor::new(
        format!("Data Source={};FailIfMissing=True", path.display()),
        BackendKind::Sqlite,
    );
    assert!(executor.get_scalar("select 1").await.is_err());
    assert!(!path.exists());
    Ok(())
}
