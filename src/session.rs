use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
};

use crate::entities::{active_workout, workout};
use crate::error::AppError;

/// Per-session pointer to the workout being edited. This is the request layer's
/// state; the workflow in [`crate::app::Logbook`] never touches it.
pub struct Session {
    db: DatabaseConnection,
    session_id: String,
}

impl Session {
    pub fn new(db: DatabaseConnection, session_id: String) -> Self {
        Self { db, session_id }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// The session's active workout id. A pointer to a workout that no longer
    /// exists is dropped and reported as `None`.
    pub async fn active_workout(&self) -> Result<Option<i64>, AppError> {
        let Some(state) = active_workout::Entity::find()
            .filter(active_workout::Column::SessionId.eq(self.session_id.as_str()))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        let exists = workout::Entity::find_by_id(state.workout_id)
            .one(&self.db)
            .await?
            .is_some();
        if !exists {
            tracing::warn!(
                session_id = %self.session_id,
                workout_id = state.workout_id,
                "dropping stale active workout"
            );
            self.clear().await?;
            return Ok(None);
        }
        Ok(Some(state.workout_id))
    }

    pub async fn set_active_workout(&self, workout_id: i64) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        active_workout::Entity::delete_many()
            .filter(active_workout::Column::SessionId.eq(self.session_id.as_str()))
            .exec(&txn)
            .await?;
        let active = active_workout::ActiveModel {
            session_id: Set(self.session_id.clone()),
            workout_id: Set(workout_id),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        active_workout::Entity::insert(active).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        active_workout::Entity::delete_many()
            .filter(active_workout::Column::SessionId.eq(self.session_id.as_str()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Drops every session's pointer to the given workouts.
    pub async fn forget_workouts(&self, workout_ids: &[i64]) -> Result<u64, AppError> {
        if workout_ids.is_empty() {
            return Ok(0);
        }
        let result = active_workout::Entity::delete_many()
            .filter(active_workout::Column::WorkoutId.is_in(workout_ids.to_vec()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Logbook;
    use crate::db;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Logbook, Session, Session) {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("gymlog.db");
        let db = db::connect(&db_path).await.expect("connect db");
        db::ensure_schema(&db).await.expect("ensure schema");
        let phone = Session::new(db.clone(), "phone".to_string());
        let laptop = Session::new(db.clone(), "laptop".to_string());
        (dir, Logbook::new(db), phone, laptop)
    }

    #[tokio::test]
    async fn active_workout_is_scoped_to_session() {
        let (_dir, logbook, phone, laptop) = setup().await;
        let user = logbook.add_user("sam").await.expect("user");
        let draft = logbook
            .start_workout(user.id, None, None)
            .await
            .expect("start");

        phone.set_active_workout(draft.id).await.expect("set");
        assert_eq!(phone.active_workout().await.expect("phone"), Some(draft.id));
        assert_eq!(laptop.active_workout().await.expect("laptop"), None);

        phone.clear().await.expect("clear");
        assert_eq!(phone.active_workout().await.expect("phone"), None);
    }

    #[tokio::test]
    async fn stale_active_workout_is_dropped() {
        let (_dir, logbook, phone, _laptop) = setup().await;
        let user = logbook.add_user("sam").await.expect("user");
        let draft = logbook
            .start_workout(user.id, None, None)
            .await
            .expect("start");
        phone.set_active_workout(draft.id).await.expect("set");

        logbook.discard_draft(draft.id).await.expect("discard");
        assert_eq!(phone.active_workout().await.expect("active"), None);
        let rows = active_workout::Entity::find()
            .all(logbook.connection())
            .await
            .expect("rows");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn forget_workouts_clears_all_sessions() {
        let (_dir, logbook, phone, laptop) = setup().await;
        let user = logbook.add_user("sam").await.expect("user");
        let draft = logbook
            .start_workout(user.id, None, None)
            .await
            .expect("start");
        phone.set_active_workout(draft.id).await.expect("phone");
        laptop.set_active_workout(draft.id).await.expect("laptop");

        let cleared = phone.forget_workouts(&[draft.id]).await.expect("forget");
        assert_eq!(cleared, 2);
        assert_eq!(laptop.active_workout().await.expect("laptop"), None);
    }
}
