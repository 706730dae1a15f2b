pub use entity::prelude::*;
pub use entity::sea_orm_active_enums::*;
pub use entity::{
    account, domain_preference, event, extracted_decision, extracted_question, extracted_task,
    processed_email, review_queue_item, scan_state, sender_preference, subscription,
};
pub use sea_orm::{
    entity::*, query::*, ActiveValue, DatabaseConnection, DbErr, FromQueryResult, PaginatorTrait,
};
