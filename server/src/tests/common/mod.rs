use std::env;

use chrono::Utc;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::{db_core::prelude::*, error::is_unique_violation};

pub async fn setup_conn() -> DatabaseConnection {
    dotenvy::dotenv().ok();
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    Database::connect(db_options)
        .await
        .expect("Database connection failed")
}

pub async fn ensure_account(conn: &DatabaseConnection, account_id: &str) {
    let insert = Account::insert(account::ActiveModel {
        id: ActiveValue::Set(account_id.to_string()),
        provider_kind: ActiveValue::Set(ProviderKind::OauthProvider),
        email_address: ActiveValue::Set(format!("{account_id}@example.com")),
        created_at: ActiveValue::Set(Utc::now().into()),
    })
    .exec(conn)
    .await;

    match insert {
        Ok(_) => {}
        Err(ref e) if is_unique_violation(e) => {}
        Err(e) => panic!("could not seed account: {e:?}"),
    }
}

pub fn extraction_response(
    summary: &str,
    has_action_items: bool,
    questions: Vec<serde_json::Value>,
) -> serde_json::Value {
    serde_json::json!({
        "summary": summary,
        "main_topic": "test",
        "sentiment": "neutral",
        "has_action_items": has_action_items,
        "tasks": [],
        "decisions": [],
        "questions": questions,
    })
}
