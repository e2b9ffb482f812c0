use sea_orm::entity::prelude::*;

/// Session-layer pointer to the workout a session is currently editing.
///
/// No foreign key to `workouts`: drafts are deleted without regard to the
/// sessions pointing at them, and the session layer drops stale rows on read.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "active_workouts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub session_id: String,
    pub workout_id: i64,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
