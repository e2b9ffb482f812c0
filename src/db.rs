use std::fs::{self, File, OpenOptions};
use std::path::Path;

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{
    active_workout, exercise_definition, exercise_instance, gym_set, user, workout,
};
use crate::error::AppError;

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Exclusive lock file next to the database, held for the whole command.
pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::InvalidInput(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    tracing::debug!(url = %sqlite_url, "connecting to workout store");
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut user_stmt = schema.create_table_from_entity(user::Entity);
    user_stmt.if_not_exists();
    db.execute(builder.build(&user_stmt)).await?;

    let mut definition_stmt = schema.create_table_from_entity(exercise_definition::Entity);
    definition_stmt.if_not_exists();
    db.execute(builder.build(&definition_stmt)).await?;

    let mut workout_stmt = schema.create_table_from_entity(workout::Entity);
    workout_stmt.if_not_exists();
    db.execute(builder.build(&workout_stmt)).await?;

    let mut exercise_stmt = schema.create_table_from_entity(exercise_instance::Entity);
    exercise_stmt.if_not_exists();
    db.execute(builder.build(&exercise_stmt)).await?;

    let mut set_stmt = schema.create_table_from_entity(gym_set::Entity);
    set_stmt.if_not_exists();
    db.execute(builder.build(&set_stmt)).await?;

    let mut active_stmt = schema.create_table_from_entity(active_workout::Entity);
    active_stmt.if_not_exists();
    db.execute(builder.build(&active_stmt)).await?;

    let mut workout_user_index = Index::create()
        .name("idx_workouts_user_performed")
        .table(workout::Entity)
        .col(workout::Column::UserId)
        .col(workout::Column::PerformedAt)
        .to_owned();
    workout_user_index.if_not_exists();
    db.execute(builder.build(&workout_user_index)).await?;

    let mut workout_original_index = Index::create()
        .name("idx_workouts_original")
        .table(workout::Entity)
        .col(workout::Column::OriginalWorkoutId)
        .to_owned();
    workout_original_index.if_not_exists();
    db.execute(builder.build(&workout_original_index)).await?;

    // Not unique: reordering rewrites sort numbers one row at a time and may
    // pass through a transient duplicate before the transaction commits.
    let mut exercise_order_index = Index::create()
        .name("idx_exercises_workout_order")
        .table(exercise_instance::Entity)
        .col(exercise_instance::Column::WorkoutId)
        .col(exercise_instance::Column::SortNumber)
        .to_owned();
    exercise_order_index.if_not_exists();
    db.execute(builder.build(&exercise_order_index)).await?;

    let mut exercise_group_index = Index::create()
        .name("idx_exercises_workout_group")
        .table(exercise_instance::Entity)
        .col(exercise_instance::Column::WorkoutId)
        .col(exercise_instance::Column::SupersetGroupId)
        .to_owned();
    exercise_group_index.if_not_exists();
    db.execute(builder.build(&exercise_group_index)).await?;

    let mut set_order_index = Index::create()
        .name("idx_sets_exercise_number")
        .table(gym_set::Entity)
        .col(gym_set::Column::ExerciseInstanceId)
        .col(gym_set::Column::SetNumber)
        .to_owned();
    set_order_index.if_not_exists();
    db.execute(builder.build(&set_order_index)).await?;

    let mut active_session_index = Index::create()
        .name("idx_active_workout_session")
        .table(active_workout::Entity)
        .col(active_workout::Column::SessionId)
        .unique()
        .to_owned();
    active_session_index.if_not_exists();
    db.execute(builder.build(&active_session_index)).await?;

    Ok(())
}
