use crate::{db_core::prelude::*, error::AppResult};

pub struct AccountCtrl;

impl AccountCtrl {
    pub async fn get(
        conn: &DatabaseConnection,
        account_id: &str,
    ) -> AppResult<Option<account::Model>> {
        Ok(Account::find_by_id(account_id).one(conn).await?)
    }

    pub async fn list(conn: &DatabaseConnection) -> AppResult<Vec<account::Model>> {
        Ok(Account::find().all(conn).await?)
    }
}
