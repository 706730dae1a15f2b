use chrono::Utc;

use crate::{
    db_core::prelude::*,
    error::{is_unique_violation, AppError, AppResult},
    server_config::cfg,
};

/// Optimistic-concurrency retry budget for preference-row read-modify-write.
const MAX_CAS_ATTEMPTS: u32 = 3;

/// Snapshot of the mutable statistics on a preference row. The feedback
/// tracker transforms one of these; the Ctrl owns getting it in and out of
/// the store atomically.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PrefStats {
    pub emails_seen: i32,
    pub replies: i32,
    pub archives: i32,
    pub deletes: i32,
    pub stars: i32,
    pub reply_rate: f32,
    pub archive_rate: f32,
    pub delete_rate: f32,
    pub inferred_importance: f32,
}

pub struct PreferenceCtrl;

impl PreferenceCtrl {
    pub async fn get_sender(
        conn: &DatabaseConnection,
        account_id: &str,
        sender_email: &str,
    ) -> AppResult<Option<sender_preference::Model>> {
        Ok(SenderPreference::find()
            .filter(sender_preference::Column::AccountId.eq(account_id))
            .filter(sender_preference::Column::SenderEmail.eq(sender_email))
            .one(conn)
            .await?)
    }

    pub async fn get_domain(
        conn: &DatabaseConnection,
        account_id: &str,
        domain: &str,
    ) -> AppResult<Option<domain_preference::Model>> {
        Ok(DomainPreference::find()
            .filter(domain_preference::Column::AccountId.eq(account_id))
            .filter(domain_preference::Column::Domain.eq(domain))
            .one(conn)
            .await?)
    }

    /// Read-modify-write of a sender row under compare-and-swap on
    /// `last_updated`. Rows are created on first observation; a lost race
    /// retries, and exhausting the budget surfaces a conflict for the
    /// caller to retry.
    pub async fn apply_sender(
        conn: &DatabaseConnection,
        account_id: &str,
        sender_email: &str,
        apply: impl Fn(PrefStats) -> PrefStats,
    ) -> AppResult<sender_preference::Model> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            match Self::get_sender(conn, account_id, sender_email).await? {
                None => {
                    let stats = apply(PrefStats::default());
                    let insert = SenderPreference::insert(sender_preference::ActiveModel {
                        id: ActiveValue::NotSet,
                        account_id: ActiveValue::Set(account_id.to_string()),
                        sender_email: ActiveValue::Set(sender_email.to_string()),
                        emails_seen: ActiveValue::Set(stats.emails_seen),
                        replies: ActiveValue::Set(stats.replies),
                        archives: ActiveValue::Set(stats.archives),
                        deletes: ActiveValue::Set(stats.deletes),
                        stars: ActiveValue::Set(stats.stars),
                        reply_rate: ActiveValue::Set(stats.reply_rate),
                        archive_rate: ActiveValue::Set(stats.archive_rate),
                        delete_rate: ActiveValue::Set(stats.delete_rate),
                        inferred_importance: ActiveValue::Set(stats.inferred_importance),
                        confidence_base: ActiveValue::Set(cfg.history.sender_confidence_base),
                        last_updated: ActiveValue::Set(Utc::now().into()),
                    })
                    .exec_with_returning(conn)
                    .await;

                    match insert {
                        Ok(model) => return Ok(model),
                        // Lost the creation race; loop and update instead.
                        Err(err) if is_unique_violation(&err) => continue,
                        Err(err) => return Err(err.into()),
                    }
                }
                Some(row) => {
                    let stats = apply(sender_stats(&row));
                    let result = SenderPreference::update_many()
                        .set(sender_preference::ActiveModel {
                            emails_seen: ActiveValue::Set(stats.emails_seen),
                            replies: ActiveValue::Set(stats.replies),
                            archives: ActiveValue::Set(stats.archives),
                            deletes: ActiveValue::Set(stats.deletes),
                            stars: ActiveValue::Set(stats.stars),
                            reply_rate: ActiveValue::Set(stats.reply_rate),
                            archive_rate: ActiveValue::Set(stats.archive_rate),
                            delete_rate: ActiveValue::Set(stats.delete_rate),
                            inferred_importance: ActiveValue::Set(stats.inferred_importance),
                            last_updated: ActiveValue::Set(Utc::now().into()),
                            ..Default::default()
                        })
                        .filter(sender_preference::Column::Id.eq(row.id))
                        .filter(sender_preference::Column::LastUpdated.eq(row.last_updated))
                        .exec(conn)
                        .await?;

                    if result.rows_affected == 1 {
                        return Self::get_sender(conn, account_id, sender_email)
                            .await?
                            .ok_or_else(|| {
                                AppError::Conflict("sender preference row vanished".to_string())
                            });
                    }
                }
            }
        }

        Err(AppError::Conflict(format!(
            "concurrent updates to sender preference {account_id}/{sender_email}"
        )))
    }

    /// Domain-row twin of [`Self::apply_sender`].
    pub async fn apply_domain(
        conn: &DatabaseConnection,
        account_id: &str,
        domain: &str,
        apply: impl Fn(PrefStats) -> PrefStats,
    ) -> AppResult<domain_preference::Model> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            match Self::get_domain(conn, account_id, domain).await? {
                None => {
                    let stats = apply(PrefStats::default());
                    let insert = DomainPreference::insert(domain_preference::ActiveModel {
                        id: ActiveValue::NotSet,
                        account_id: ActiveValue::Set(account_id.to_string()),
                        domain: ActiveValue::Set(domain.to_string()),
                        emails_seen: ActiveValue::Set(stats.emails_seen),
                        replies: ActiveValue::Set(stats.replies),
                        archives: ActiveValue::Set(stats.archives),
                        deletes: ActiveValue::Set(stats.deletes),
                        stars: ActiveValue::Set(stats.stars),
                        reply_rate: ActiveValue::Set(stats.reply_rate),
                        archive_rate: ActiveValue::Set(stats.archive_rate),
                        delete_rate: ActiveValue::Set(stats.delete_rate),
                        inferred_importance: ActiveValue::Set(stats.inferred_importance),
                        confidence_base: ActiveValue::Set(cfg.history.domain_confidence_base),
                        last_updated: ActiveValue::Set(Utc::now().into()),
                    })
                    .exec_with_returning(conn)
                    .await;

                    match insert {
                        Ok(model) => return Ok(model),
                        Err(err) if is_unique_violation(&err) => continue,
                        Err(err) => return Err(err.into()),
                    }
                }
                Some(row) => {
                    let stats = apply(domain_stats(&row));
                    let result = DomainPreference::update_many()
                        .set(domain_preference::ActiveModel {
                            emails_seen: ActiveValue::Set(stats.emails_seen),
                            replies: ActiveValue::Set(stats.replies),
                            archives: ActiveValue::Set(stats.archives),
                            deletes: ActiveValue::Set(stats.deletes),
                            stars: ActiveValue::Set(stats.stars),
                            reply_rate: ActiveValue::Set(stats.reply_rate),
                            archive_rate: ActiveValue::Set(stats.archive_rate),
                            delete_rate: ActiveValue::Set(stats.delete_rate),
                            inferred_importance: ActiveValue::Set(stats.inferred_importance),
                            last_updated: ActiveValue::Set(Utc::now().into()),
                            ..Default::default()
                        })
                        .filter(domain_preference::Column::Id.eq(row.id))
                        .filter(domain_preference::Column::LastUpdated.eq(row.last_updated))
                        .exec(conn)
                        .await?;

                    if result.rows_affected == 1 {
                        return Self::get_domain(conn, account_id, domain)
                            .await?
                            .ok_or_else(|| {
                                AppError::Conflict("domain preference row vanished".to_string())
                            });
                    }
                }
            }
        }

        Err(AppError::Conflict(format!(
            "concurrent updates to domain preference {account_id}/{domain}"
        )))
    }
}

pub fn sender_stats(row: &sender_preference::Model) -> PrefStats {
    PrefStats {
        emails_seen: row.emails_seen,
        replies: row.replies,
        archives: row.archives,
        deletes: row.deletes,
        stars: row.stars,
        reply_rate: row.reply_rate,
        archive_rate: row.archive_rate,
        delete_rate: row.delete_rate,
        inferred_importance: row.inferred_importance,
    }
}

pub fn domain_stats(row: &domain_preference::Model) -> PrefStats {
    PrefStats {
        emails_seen: row.emails_seen,
        replies: row.replies,
        archives: row.archives,
        deletes: row.deletes,
        stars: row.stars,
        reply_rate: row.reply_rate,
        archive_rate: row.archive_rate,
        delete_rate: row.delete_rate,
        inferred_importance: row.inferred_importance,
    }
}
