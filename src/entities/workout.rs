use sea_orm::entity::prelude::*;
use serde::Serialize;

use super::{exercise_instance, user};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "workouts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub name: String,
    pub notes: Option<String>,
    pub status: String,
    /// Set only on drafts cloned from an existing workout. Lookup only, never
    /// ownership.
    pub original_workout_id: Option<i64>,
    pub performed_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    User,
    ExerciseInstance,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::User => Entity::belongs_to(user::Entity)
                .from(Column::UserId)
                .to(user::Column::Id)
                .into(),
            Self::ExerciseInstance => Entity::has_many(exercise_instance::Entity).into(),
        }
    }
}

impl Related<user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<exercise_instance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExerciseInstance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
