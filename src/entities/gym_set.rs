use sea_orm::entity::prelude::*;
use serde::Serialize;

use super::exercise_instance;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "gym_sets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub exercise_instance_id: i64,
    pub set_number: i32,
    pub reps: i32,
    pub weight_kg: f64,
    pub set_type: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    ExerciseInstance,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::ExerciseInstance => Entity::belongs_to(exercise_instance::Entity)
                .from(Column::ExerciseInstanceId)
                .to(exercise_instance::Column::Id)
                .into(),
        }
    }
}

impl Related<exercise_instance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExerciseInstance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
