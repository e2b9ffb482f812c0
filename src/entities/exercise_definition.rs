use sea_orm::entity::prelude::*;
use serde::Serialize;

use super::exercise_instance;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "exercise_definitions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub description: Option<String>,
    pub target_muscle_group: Option<String>,
    pub equipment: Option<String>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    ExerciseInstance,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::ExerciseInstance => Entity::has_many(exercise_instance::Entity).into(),
        }
    }
}

impl Related<exercise_instance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExerciseInstance.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
