use sea_orm::entity::prelude::*;
use serde::Serialize;

use super::{exercise_definition, gym_set, workout};

/// One exercise's occurrence inside a workout.
///
/// The three `superset_*` columns back [`crate::model::Superset`]; read them
/// through [`Model::superset`] rather than directly.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "exercise_instances")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub workout_id: i64,
    pub exercise_definition_id: i64,
    pub sort_number: i32,
    pub superset_partner_id: Option<i64>,
    pub superset_group_id: Option<String>,
    pub superset_order: Option<i32>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Workout,
    ExerciseDefinition,
    GymSet,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Workout => Entity::belongs_to(workout::Entity)
                .from(Column::WorkoutId)
                .to(workout::Column::Id)
                .into(),
            Self::ExerciseDefinition => Entity::belongs_to(exercise_definition::Entity)
                .from(Column::ExerciseDefinitionId)
                .to(exercise_definition::Column::Id)
                .into(),
            Self::GymSet => Entity::has_many(gym_set::Entity).into(),
        }
    }
}

impl Related<workout::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Workout.def()
    }
}

impl Related<exercise_definition::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExerciseDefinition.def()
    }
}

impl Related<gym_set::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GymSet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn superset(&self) -> crate::model::Superset {
        crate::model::Superset::from_columns(
            self.superset_partner_id,
            self.superset_group_id.as_deref(),
            self.superset_order,
        )
    }
}
