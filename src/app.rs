use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;

use crate::entities::{exercise_definition, exercise_instance, gym_set, user, workout};
use crate::error::AppError;
use crate::model::{
    DefinitionInput, SetChanges, SetInput, Superset, WorkoutChanges, WorkoutStatus,
};

pub const DEFAULT_WORKOUT_NAME: &str = "Gym Workout";
pub const DEFAULT_WORKOUT_KIND: &str = "gym_workout";

/// The workout store and the draft/finalize workflow on top of it.
///
/// Every mutating operation runs inside a single transaction. The logbook
/// holds no session state: callers pass workout ids in and persist the ids it
/// returns.
pub struct Logbook {
    db: DatabaseConnection,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExerciseDetail {
    pub exercise: exercise_instance::Model,
    pub definition: exercise_definition::Model,
    pub sets: Vec<gym_set::Model>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WorkoutDetail {
    pub workout: workout::Model,
    pub exercises: Vec<ExerciseDetail>,
}

/// What `open_for_edit` handed back for editing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EditTarget {
    /// The workout already was a draft and is edited directly.
    Draft(i64),
    /// An active workout was cloned; edits go to `draft_id`.
    Copy { draft_id: i64, original_id: i64 },
}

impl EditTarget {
    pub fn draft_id(&self) -> i64 {
        match self {
            Self::Draft(id) => *id,
            Self::Copy { draft_id, .. } => *draft_id,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiscardOutcome {
    Discarded { original_workout_id: Option<i64> },
    AlreadyGone,
}

#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub workout: workout::Model,
    pub set: gym_set::Model,
}

struct WorkoutTree {
    workout: workout::Model,
    exercises: Vec<exercise_instance::Model>,
    sets: HashMap<i64, Vec<gym_set::Model>>,
}

impl Logbook {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn add_user(&self, username: &str) -> Result<user::Model, AppError> {
        ensure_non_empty("username", username)?;
        let username = username.trim();
        let existing = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::InvalidInput(format!(
                "username '{username}' is already taken"
            )));
        }
        let active = user::ActiveModel {
            username: Set(username.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let insert = user::Entity::insert(active).exec(&self.db).await?;
        self.get_user(insert.last_insert_id).await
    }

    pub async fn get_user(&self, id: i64) -> Result<user::Model, AppError> {
        user::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user id {id}")))
    }

    pub async fn find_user(&self, username: &str) -> Result<user::Model, AppError> {
        user::Entity::find()
            .filter(user::Column::Username.eq(username.trim()))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user '{}'", username.trim())))
    }

    pub async fn add_definition(
        &self,
        input: DefinitionInput,
    ) -> Result<exercise_definition::Model, AppError> {
        ensure_non_empty("exercise name", &input.name)?;
        let name = input.name.trim().to_string();
        let existing = exercise_definition::Entity::find()
            .filter(exercise_definition::Column::Name.eq(name.as_str()))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::InvalidInput(format!(
                "exercise '{name}' already exists"
            )));
        }
        let active = exercise_definition::ActiveModel {
            name: Set(name),
            description: Set(input.description),
            target_muscle_group: Set(input.target_muscle_group),
            equipment: Set(input.equipment),
            video_url: Set(input.video_url),
            image_url: Set(input.image_url),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let insert = exercise_definition::Entity::insert(active)
            .exec(&self.db)
            .await?;
        self.get_definition(insert.last_insert_id).await
    }

    pub async fn get_definition(&self, id: i64) -> Result<exercise_definition::Model, AppError> {
        exercise_definition::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("exercise definition id {id}")))
    }

    pub async fn list_definitions(&self) -> Result<Vec<exercise_definition::Model>, AppError> {
        Ok(exercise_definition::Entity::find()
            .order_by_asc(exercise_definition::Column::Name)
            .order_by_asc(exercise_definition::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get_workout(&self, id: i64) -> Result<workout::Model, AppError> {
        workout_with_conn(&self.db, id).await
    }

    pub async fn list_workouts(
        &self,
        user_id: i64,
        status: Option<WorkoutStatus>,
    ) -> Result<Vec<workout::Model>, AppError> {
        let mut select = workout::Entity::find().filter(workout::Column::UserId.eq(user_id));
        if let Some(status) = status {
            select = select.filter(workout::Column::Status.eq(status.as_str()));
        }
        Ok(select
            .order_by_desc(workout::Column::PerformedAt)
            .order_by_desc(workout::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Loads a workout with its exercises, their definitions and sets from a
    /// single snapshot.
    pub async fn get_workout_detail(&self, id: i64) -> Result<WorkoutDetail, AppError> {
        let txn = self.db.begin().await?;
        let result = workout_detail_with_conn(&txn, id).await;
        finalize_transaction(txn, result).await
    }

    /// Creates a brand-new empty draft. A draft named by `replacing` is
    /// discarded in the same transaction.
    pub async fn start_workout(
        &self,
        user_id: i64,
        name: Option<String>,
        replacing: Option<i64>,
    ) -> Result<workout::Model, AppError> {
        let name = match name {
            Some(name) => {
                ensure_non_empty("workout name", &name)?;
                name.trim().to_string()
            }
            None => DEFAULT_WORKOUT_NAME.to_string(),
        };

        let txn = self.db.begin().await?;
        let result: Result<workout::Model, AppError> = async {
            if user::Entity::find_by_id(user_id).one(&txn).await?.is_none() {
                return Err(AppError::NotFound(format!("user id {user_id}")));
            }

            if let Some(previous_id) = replacing {
                match workout::Entity::find_by_id(previous_id).one(&txn).await? {
                    Some(previous) if previous.status == WorkoutStatus::Draft.as_str() => {
                        delete_tree_with_conn(&txn, previous_id).await?;
                        tracing::info!(workout_id = previous_id, "discarded replaced draft");
                    }
                    Some(_) => {
                        tracing::warn!(
                            workout_id = previous_id,
                            "replaced workout is not a draft; leaving it in place"
                        );
                    }
                    None => {}
                }
            }

            let now = Utc::now();
            let active = workout::ActiveModel {
                user_id: Set(user_id),
                kind: Set(DEFAULT_WORKOUT_KIND.to_string()),
                name: Set(name),
                notes: Set(None),
                status: Set(WorkoutStatus::Draft.as_str().to_string()),
                original_workout_id: Set(None),
                performed_at: Set(now),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = workout::Entity::insert(active).exec(&txn).await?;
            workout_with_conn(&txn, insert.last_insert_id).await
        }
        .await;

        let created = finalize_transaction(txn, result).await?;
        tracing::info!(workout_id = created.id, user_id, "started draft workout");
        Ok(created)
    }

    /// Drafts are edited in place. An active workout resumes its pending copy
    /// when there is one and is cloned otherwise.
    pub async fn open_for_edit(&self, workout_id: i64) -> Result<EditTarget, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<EditTarget, AppError> = async {
            let workout = workout_with_conn(&txn, workout_id).await?;
            match WorkoutStatus::parse(&workout.status)? {
                WorkoutStatus::Draft => Ok(EditTarget::Draft(workout.id)),
                WorkoutStatus::Active => {
                    let draft_id = match pending_copy_with_conn(&txn, workout.id).await? {
                        Some(draft) => {
                            tracing::info!(
                                original_id = workout.id,
                                draft_id = draft.id,
                                "resuming pending draft copy"
                            );
                            draft.id
                        }
                        None => {
                            let draft_id = copy_tree_with_conn(&txn, workout.id).await?;
                            tracing::info!(
                                original_id = workout.id,
                                draft_id,
                                "created draft copy"
                            );
                            draft_id
                        }
                    };
                    Ok(EditTarget::Copy {
                        draft_id,
                        original_id: workout.id,
                    })
                }
                WorkoutStatus::Archived => Err(AppError::InvalidInput(format!(
                    "workout id {workout_id} is archived and cannot be edited"
                ))),
            }
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Deep-copies a workout into a new draft that points back at it. The
    /// copy never references exercise rows of the source.
    pub async fn create_draft_copy(&self, original_id: i64) -> Result<i64, AppError> {
        let txn = self.db.begin().await?;
        let result = copy_tree_with_conn(&txn, original_id).await;
        let draft_id = finalize_transaction(txn, result).await?;
        tracing::info!(original_id, draft_id, "created draft copy");
        Ok(draft_id)
    }

    /// Commits a draft. A copy is absorbed into its original (returns the
    /// original id); a brand-new draft becomes active (returns its own id).
    /// `notes` of `None` keeps the draft's current notes.
    pub async fn finalize_draft(
        &self,
        draft_id: i64,
        notes: Option<String>,
    ) -> Result<i64, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<i64, AppError> = async {
            let draft = workout_with_conn(&txn, draft_id).await?;
            if draft.status != WorkoutStatus::Draft.as_str() {
                return Err(AppError::InvalidInput(format!(
                    "workout id {draft_id} is {} and cannot be finalized",
                    draft.status
                )));
            }
            let notes = match notes {
                Some(text) => normalize_notes(text),
                None => draft.notes.clone(),
            };
            let now = Utc::now();

            let Some(original_id) = draft.original_workout_id else {
                let mut active: workout::ActiveModel = draft.into();
                active.status = Set(WorkoutStatus::Active.as_str().to_string());
                active.notes = Set(notes);
                active.updated_at = Set(now);
                active.update(&txn).await?;
                return Ok(draft_id);
            };

            let original = workout::Entity::find_by_id(original_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "original workout id {original_id} of draft id {draft_id}"
                    ))
                })?;

            let replaced: Vec<i64> = exercise_instance::Entity::find()
                .filter(exercise_instance::Column::WorkoutId.eq(original_id))
                .all(&txn)
                .await?
                .into_iter()
                .map(|exercise| exercise.id)
                .collect();
            if !replaced.is_empty() {
                gym_set::Entity::delete_many()
                    .filter(gym_set::Column::ExerciseInstanceId.is_in(replaced.clone()))
                    .exec(&txn)
                    .await?;
                exercise_instance::Entity::delete_many()
                    .filter(exercise_instance::Column::WorkoutId.eq(original_id))
                    .exec(&txn)
                    .await?;
            }

            let moved = exercise_instance::Entity::update_many()
                .col_expr(exercise_instance::Column::WorkoutId, Expr::value(original_id))
                .col_expr(exercise_instance::Column::UpdatedAt, Expr::value(now))
                .filter(exercise_instance::Column::WorkoutId.eq(draft_id))
                .exec(&txn)
                .await?;

            // The original may itself have been a draft when it was copied.
            let mut active: workout::ActiveModel = original.into();
            active.status = Set(WorkoutStatus::Active.as_str().to_string());
            active.name = Set(draft.name.clone());
            active.notes = Set(notes);
            active.updated_at = Set(now);
            active.update(&txn).await?;

            workout::Entity::delete_by_id(draft_id).exec(&txn).await?;
            tracing::debug!(
                draft_id,
                original_id,
                replaced = replaced.len(),
                moved = moved.rows_affected,
                "transferred draft exercises"
            );
            Ok(original_id)
        }
        .await;

        let final_id = finalize_transaction(txn, result).await?;
        tracing::info!(draft_id, final_id, "finalized draft");
        Ok(final_id)
    }

    /// Drops a draft and everything under it. The original of a copy is left
    /// untouched. A missing id counts as already discarded.
    pub async fn discard_draft(&self, draft_id: i64) -> Result<DiscardOutcome, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<DiscardOutcome, AppError> = async {
            let Some(draft) = workout::Entity::find_by_id(draft_id).one(&txn).await? else {
                return Ok(DiscardOutcome::AlreadyGone);
            };
            if draft.status != WorkoutStatus::Draft.as_str() {
                return Err(AppError::InvalidInput(format!(
                    "workout id {draft_id} is {} and cannot be discarded",
                    draft.status
                )));
            }
            delete_tree_with_conn(&txn, draft_id).await?;
            Ok(DiscardOutcome::Discarded {
                original_workout_id: draft.original_workout_id,
            })
        }
        .await;

        let outcome = finalize_transaction(txn, result).await?;
        match outcome {
            DiscardOutcome::AlreadyGone => {
                tracing::warn!(draft_id, "draft already discarded");
            }
            DiscardOutcome::Discarded {
                original_workout_id,
            } => {
                tracing::info!(draft_id, ?original_workout_id, "discarded draft");
            }
        }
        Ok(outcome)
    }

    /// Permanently removes a workout subtree together with any pending draft
    /// copies of it. Returns the ids of the removed drafts.
    pub async fn delete_workout(&self, id: i64) -> Result<Vec<i64>, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<Vec<i64>, AppError> = async {
            let drafts: Vec<i64> = workout::Entity::find()
                .filter(workout::Column::OriginalWorkoutId.eq(id))
                .all(&txn)
                .await?
                .into_iter()
                .map(|draft| draft.id)
                .collect();
            for draft_id in &drafts {
                delete_tree_with_conn(&txn, *draft_id).await?;
            }
            if !delete_tree_with_conn(&txn, id).await? {
                return Err(AppError::NotFound(format!("workout id {id}")));
            }
            Ok(drafts)
        }
        .await;

        let drafts = finalize_transaction(txn, result).await?;
        tracing::info!(workout_id = id, drafts = drafts.len(), "deleted workout");
        Ok(drafts)
    }

    /// Name and notes may change on a workout of any status.
    pub async fn update_workout_details(
        &self,
        id: i64,
        changes: WorkoutChanges,
    ) -> Result<workout::Model, AppError> {
        if let Some(name) = changes.name.as_deref() {
            ensure_non_empty("workout name", name)?;
        }
        let mut active = workout::ActiveModel {
            id: Set(id),
            ..Default::default()
        };
        if let Some(name) = changes.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(notes) = changes.notes {
            active.notes = Set(normalize_notes(notes));
        }
        active.updated_at = Set(Utc::now());

        match active.update(&self.db).await {
            Ok(model) => Ok(model),
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Err(AppError::NotFound(format!("workout id {id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Inserts an exercise at the end, or right after sort number `after`
    /// (0 puts it first), shifting later exercises down.
    pub async fn add_exercise(
        &self,
        workout_id: i64,
        definition_id: i64,
        after: Option<i32>,
    ) -> Result<exercise_instance::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<exercise_instance::Model, AppError> = async {
            require_draft_with_conn(&txn, workout_id).await?;
            if exercise_definition::Entity::find_by_id(definition_id)
                .one(&txn)
                .await?
                .is_none()
            {
                return Err(AppError::NotFound(format!(
                    "exercise definition id {definition_id}"
                )));
            }

            let count = exercises_for_workout_with_conn(&txn, workout_id).await?.len() as i32;
            let sort_number = match after {
                Some(after) => {
                    let after = after.clamp(0, count);
                    exercise_instance::Entity::update_many()
                        .col_expr(
                            exercise_instance::Column::SortNumber,
                            Expr::col(exercise_instance::Column::SortNumber).add(1),
                        )
                        .filter(exercise_instance::Column::WorkoutId.eq(workout_id))
                        .filter(exercise_instance::Column::SortNumber.gt(after))
                        .exec(&txn)
                        .await?;
                    after + 1
                }
                None => count + 1,
            };

            let now = Utc::now();
            let active = exercise_instance::ActiveModel {
                workout_id: Set(workout_id),
                exercise_definition_id: Set(definition_id),
                sort_number: Set(sort_number),
                superset_partner_id: Set(None),
                superset_group_id: Set(None),
                superset_order: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = exercise_instance::Entity::insert(active).exec(&txn).await?;
            exercise_with_conn(&txn, insert.last_insert_id).await
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Moves an exercise to 1-based position `to`, clamped to the workout.
    pub async fn move_exercise(
        &self,
        id: i64,
        to: usize,
    ) -> Result<Vec<exercise_instance::Model>, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<Vec<exercise_instance::Model>, AppError> = async {
            let target = exercise_with_conn(&txn, id).await?;
            require_draft_with_conn(&txn, target.workout_id).await?;
            let mut exercises = exercises_for_workout_with_conn(&txn, target.workout_id).await?;

            let current_index = exercises
                .iter()
                .position(|exercise| exercise.id == id)
                .ok_or_else(|| AppError::NotFound(format!("exercise id {id}")))?;
            let mut desired_index = to.saturating_sub(1);
            if desired_index >= exercises.len() {
                desired_index = exercises.len().saturating_sub(1);
            }

            let moving = exercises.remove(current_index);
            if desired_index >= exercises.len() {
                exercises.push(moving);
            } else {
                exercises.insert(desired_index, moving);
            }
            renumber_exercises_with_conn(&txn, &mut exercises).await?;
            Ok(exercises)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Removes an exercise and its sets. Exercises partnered with it become
    /// standalone, and a group left with a single member is dissolved.
    pub async fn remove_exercise(&self, id: i64) -> Result<Vec<exercise_instance::Model>, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<Vec<exercise_instance::Model>, AppError> = async {
            let exercise = exercise_with_conn(&txn, id).await?;
            require_draft_with_conn(&txn, exercise.workout_id).await?;

            let promoted = exercise_instance::Entity::update_many()
                .col_expr(
                    exercise_instance::Column::SupersetPartnerId,
                    Expr::value(Option::<i64>::None),
                )
                .filter(exercise_instance::Column::SupersetPartnerId.eq(id))
                .exec(&txn)
                .await?;
            if promoted.rows_affected > 0 {
                tracing::debug!(
                    exercise_id = id,
                    promoted = promoted.rows_affected,
                    "promoted superset partners to standalone"
                );
            }

            gym_set::Entity::delete_many()
                .filter(gym_set::Column::ExerciseInstanceId.eq(id))
                .exec(&txn)
                .await?;
            exercise_instance::Entity::delete_by_id(id).exec(&txn).await?;

            if let Some(group_id) = exercise.superset().group_id() {
                dissolve_singleton_group_with_conn(&txn, exercise.workout_id, group_id).await?;
            }

            let mut remaining = exercises_for_workout_with_conn(&txn, exercise.workout_id).await?;
            renumber_exercises_with_conn(&txn, &mut remaining).await?;
            Ok(remaining)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Links `id` to `partner_id` of the same workout, leaving any group it
    /// was in.
    pub async fn link_superset_partner(
        &self,
        id: i64,
        partner_id: i64,
    ) -> Result<exercise_instance::Model, AppError> {
        if id == partner_id {
            return Err(AppError::InvalidInput(format!(
                "exercise id {id} cannot be its own superset partner"
            )));
        }
        let txn = self.db.begin().await?;
        let result: Result<exercise_instance::Model, AppError> = async {
            let exercise = exercise_with_conn(&txn, id).await?;
            let partner = exercise_with_conn(&txn, partner_id).await?;
            if partner.workout_id != exercise.workout_id {
                return Err(AppError::ConsistencyViolation(format!(
                    "exercise id {partner_id} belongs to workout id {}, not workout id {}",
                    partner.workout_id, exercise.workout_id
                )));
            }
            require_draft_with_conn(&txn, exercise.workout_id).await?;

            let mut planned = exercises_for_workout_with_conn(&txn, exercise.workout_id).await?;
            for candidate in planned.iter_mut() {
                if candidate.id == id {
                    candidate.superset_partner_id = Some(partner_id);
                    candidate.superset_group_id = None;
                    candidate.superset_order = None;
                }
            }
            validate_superset_links(&planned)?;

            let previous_group = exercise.superset().group_id().map(str::to_string);
            let updated =
                write_superset_with_conn(&txn, exercise, Superset::Partner(partner_id)).await?;
            if let Some(group_id) = previous_group {
                dissolve_singleton_group_with_conn(&txn, updated.workout_id, &group_id).await?;
            }
            Ok(updated)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Appends an exercise to a named group at the next free order.
    pub async fn join_superset_group(
        &self,
        id: i64,
        group_id: &str,
    ) -> Result<exercise_instance::Model, AppError> {
        ensure_non_empty("superset group", group_id)?;
        let group_id = group_id.trim();
        let txn = self.db.begin().await?;
        let result: Result<exercise_instance::Model, AppError> = async {
            let exercise = exercise_with_conn(&txn, id).await?;
            require_draft_with_conn(&txn, exercise.workout_id).await?;
            let previous = exercise.superset();
            if previous.group_id() == Some(group_id) {
                return Ok(exercise);
            }

            let order = next_superset_order_with_conn(&txn, exercise.workout_id, group_id).await?;
            let updated = write_superset_with_conn(
                &txn,
                exercise,
                Superset::Group {
                    group_id: group_id.to_string(),
                    order,
                },
            )
            .await?;
            if let Some(old_group) = previous.group_id() {
                dissolve_singleton_group_with_conn(&txn, updated.workout_id, old_group).await?;
            }
            Ok(updated)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn clear_superset(&self, id: i64) -> Result<exercise_instance::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<exercise_instance::Model, AppError> = async {
            let exercise = exercise_with_conn(&txn, id).await?;
            require_draft_with_conn(&txn, exercise.workout_id).await?;
            let previous = exercise.superset();
            if previous.is_none() {
                return Ok(exercise);
            }
            let updated = write_superset_with_conn(&txn, exercise, Superset::None).await?;
            if let Some(group_id) = previous.group_id() {
                dissolve_singleton_group_with_conn(&txn, updated.workout_id, group_id).await?;
            }
            Ok(updated)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn superset_group(
        &self,
        workout_id: i64,
        group_id: &str,
    ) -> Result<Vec<exercise_instance::Model>, AppError> {
        workout_with_conn(&self.db, workout_id).await?;
        superset_group_with_conn(&self.db, workout_id, group_id).await
    }

    /// Max order in the group plus one, or 0 for an empty group.
    pub async fn next_superset_order(
        &self,
        workout_id: i64,
        group_id: &str,
    ) -> Result<i32, AppError> {
        next_superset_order_with_conn(&self.db, workout_id, group_id).await
    }

    pub async fn add_set(
        &self,
        exercise_id: i64,
        input: SetInput,
    ) -> Result<gym_set::Model, AppError> {
        validate_reps(input.reps)?;
        validate_weight(input.weight_kg)?;
        let txn = self.db.begin().await?;
        let result: Result<gym_set::Model, AppError> = async {
            let exercise = exercise_with_conn(&txn, exercise_id).await?;
            require_draft_with_conn(&txn, exercise.workout_id).await?;
            let next_number = sets_for_exercise_with_conn(&txn, exercise_id)
                .await?
                .iter()
                .map(|set| set.set_number)
                .max()
                .unwrap_or(0)
                + 1;
            let now = Utc::now();
            let active = gym_set::ActiveModel {
                exercise_instance_id: Set(exercise_id),
                set_number: Set(next_number),
                reps: Set(input.reps),
                weight_kg: Set(input.weight_kg),
                set_type: Set(normalize_set_type(input.set_type)),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = gym_set::Entity::insert(active).exec(&txn).await?;
            set_with_conn(&txn, insert.last_insert_id).await
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn update_set(
        &self,
        id: i64,
        changes: SetChanges,
    ) -> Result<gym_set::Model, AppError> {
        if let Some(reps) = changes.reps {
            validate_reps(reps)?;
        }
        if let Some(weight) = changes.weight_kg {
            validate_weight(weight)?;
        }
        let txn = self.db.begin().await?;
        let result: Result<gym_set::Model, AppError> = async {
            let set = set_with_conn(&txn, id).await?;
            let exercise = exercise_with_conn(&txn, set.exercise_instance_id).await?;
            require_draft_with_conn(&txn, exercise.workout_id).await?;

            let mut active: gym_set::ActiveModel = set.into();
            if let Some(reps) = changes.reps {
                active.reps = Set(reps);
            }
            if let Some(weight) = changes.weight_kg {
                active.weight_kg = Set(weight);
            }
            if let Some(set_type) = changes.set_type {
                active.set_type = Set(normalize_set_type(Some(set_type)));
            }
            active.updated_at = Set(Utc::now());
            Ok(active.update(&txn).await?)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Deletes a set and renumbers the rest of its exercise from 1.
    pub async fn remove_set(&self, id: i64) -> Result<Vec<gym_set::Model>, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<Vec<gym_set::Model>, AppError> = async {
            let set = set_with_conn(&txn, id).await?;
            let exercise = exercise_with_conn(&txn, set.exercise_instance_id).await?;
            require_draft_with_conn(&txn, exercise.workout_id).await?;
            gym_set::Entity::delete_by_id(id).exec(&txn).await?;

            let mut remaining = sets_for_exercise_with_conn(&txn, exercise.id).await?;
            let now = Utc::now();
            for (idx, set_model) in remaining.iter_mut().enumerate() {
                let desired = (idx + 1) as i32;
                if set_model.set_number != desired {
                    let mut active: gym_set::ActiveModel = set_model.clone().into();
                    active.set_number = Set(desired);
                    active.updated_at = Set(now);
                    active.update(&txn).await?;
                    set_model.set_number = desired;
                    set_model.updated_at = now;
                }
            }
            Ok(remaining)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Sets a user performed for one exercise definition across finished
    /// workouts, newest workout first.
    pub async fn exercise_history(
        &self,
        user_id: i64,
        definition_id: i64,
    ) -> Result<Vec<HistoryEntry>, AppError> {
        let workouts = workout::Entity::find()
            .filter(workout::Column::UserId.eq(user_id))
            .filter(workout::Column::Status.eq(WorkoutStatus::Active.as_str()))
            .order_by_desc(workout::Column::PerformedAt)
            .order_by_desc(workout::Column::Id)
            .all(&self.db)
            .await?;
        if workouts.is_empty() {
            return Ok(Vec::new());
        }
        let workout_ids: Vec<i64> = workouts.iter().map(|workout| workout.id).collect();
        let exercises = exercise_instance::Entity::find()
            .filter(exercise_instance::Column::WorkoutId.is_in(workout_ids))
            .filter(exercise_instance::Column::ExerciseDefinitionId.eq(definition_id))
            .order_by_asc(exercise_instance::Column::SortNumber)
            .all(&self.db)
            .await?;
        let exercise_ids: Vec<i64> = exercises.iter().map(|exercise| exercise.id).collect();
        let mut sets = sets_for_exercises_with_conn(&self.db, &exercise_ids).await?;

        let mut exercises_by_workout: HashMap<i64, Vec<i64>> = HashMap::new();
        for exercise in &exercises {
            exercises_by_workout
                .entry(exercise.workout_id)
                .or_default()
                .push(exercise.id);
        }

        let mut history = Vec::new();
        for workout in workouts {
            let Some(ids) = exercises_by_workout.get(&workout.id) else {
                continue;
            };
            for exercise_id in ids {
                for set in sets.remove(exercise_id).unwrap_or_default() {
                    history.push(HistoryEntry {
                        workout: workout.clone(),
                        set,
                    });
                }
            }
        }
        Ok(history)
    }
}

/// Two-pass deep copy of a workout into a new draft. Pass one inserts
/// exercises and sets while recording old id -> new id; pass two rewrites
/// partner links through that map.
async fn copy_tree_with_conn<C: ConnectionTrait>(
    db: &C,
    original_id: i64,
) -> Result<i64, AppError> {
    let source = workout_tree_with_conn(db, original_id).await?;
    if let Some(id) = find_partner_cycle(&source.exercises) {
        return Err(AppError::ConsistencyViolation(format!(
            "superset links of workout id {original_id} form a cycle at exercise id {id}"
        )));
    }

    let now = Utc::now();
    let shell = workout::ActiveModel {
        user_id: Set(source.workout.user_id),
        kind: Set(source.workout.kind.clone()),
        name: Set(source.workout.name.clone()),
        notes: Set(source.workout.notes.clone()),
        status: Set(WorkoutStatus::Draft.as_str().to_string()),
        original_workout_id: Set(Some(source.workout.id)),
        performed_at: Set(source.workout.performed_at),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let draft_id = workout::Entity::insert(shell)
        .exec(db)
        .await?
        .last_insert_id;

    let mut id_map: HashMap<i64, i64> = HashMap::with_capacity(source.exercises.len());
    for exercise in &source.exercises {
        let (_, group_id, order) = match exercise.superset() {
            link @ Superset::Group { .. } => link.into_columns(),
            _ => (None, None, None),
        };
        let copy = exercise_instance::ActiveModel {
            workout_id: Set(draft_id),
            exercise_definition_id: Set(exercise.exercise_definition_id),
            sort_number: Set(exercise.sort_number),
            superset_partner_id: Set(None),
            superset_group_id: Set(group_id),
            superset_order: Set(order),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let new_id = exercise_instance::Entity::insert(copy)
            .exec(db)
            .await?
            .last_insert_id;
        id_map.insert(exercise.id, new_id);

        for set in source.sets.get(&exercise.id).into_iter().flatten() {
            let copy = gym_set::ActiveModel {
                exercise_instance_id: Set(new_id),
                set_number: Set(set.set_number),
                reps: Set(set.reps),
                weight_kg: Set(set.weight_kg),
                set_type: Set(set.set_type.clone()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            gym_set::Entity::insert(copy).exec(db).await?;
        }
    }

    for exercise in &source.exercises {
        let Some(partner_id) = exercise.superset().partner_id() else {
            continue;
        };
        let new_id = id_map.get(&exercise.id).copied().ok_or_else(|| {
            AppError::ConsistencyViolation(format!(
                "exercise id {} missing from copy of workout id {original_id}",
                exercise.id
            ))
        })?;
        let new_partner_id = id_map.get(&partner_id).copied().ok_or_else(|| {
            AppError::ConsistencyViolation(format!(
                "exercise id {} links to exercise id {partner_id} outside workout id {original_id}",
                exercise.id
            ))
        })?;
        let mut active = exercise_instance::ActiveModel {
            id: Set(new_id),
            ..Default::default()
        };
        active.superset_partner_id = Set(Some(new_partner_id));
        active.update(db).await?;
        tracing::debug!(
            from = exercise.id,
            to = new_id,
            partner = new_partner_id,
            "remapped superset partner"
        );
    }

    Ok(draft_id)
}

async fn pending_copy_with_conn<C: ConnectionTrait>(
    db: &C,
    original_id: i64,
) -> Result<Option<workout::Model>, AppError> {
    Ok(workout::Entity::find()
        .filter(workout::Column::OriginalWorkoutId.eq(original_id))
        .filter(workout::Column::Status.eq(WorkoutStatus::Draft.as_str()))
        .order_by_desc(workout::Column::UpdatedAt)
        .order_by_desc(workout::Column::Id)
        .one(db)
        .await?)
}

async fn workout_with_conn<C: ConnectionTrait>(db: &C, id: i64) -> Result<workout::Model, AppError> {
    workout::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("workout id {id}")))
}

async fn require_draft_with_conn<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<workout::Model, AppError> {
    let workout = workout_with_conn(db, id).await?;
    if workout.status != WorkoutStatus::Draft.as_str() {
        return Err(AppError::InvalidInput(format!(
            "workout id {id} is {}; open it for editing first",
            workout.status
        )));
    }
    Ok(workout)
}

async fn exercise_with_conn<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<exercise_instance::Model, AppError> {
    exercise_instance::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("exercise id {id}")))
}

async fn set_with_conn<C: ConnectionTrait>(db: &C, id: i64) -> Result<gym_set::Model, AppError> {
    gym_set::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("set id {id}")))
}

async fn exercises_for_workout_with_conn<C: ConnectionTrait>(
    db: &C,
    workout_id: i64,
) -> Result<Vec<exercise_instance::Model>, AppError> {
    Ok(exercise_instance::Entity::find()
        .filter(exercise_instance::Column::WorkoutId.eq(workout_id))
        .order_by_asc(exercise_instance::Column::SortNumber)
        .order_by_asc(exercise_instance::Column::Id)
        .all(db)
        .await?)
}

async fn sets_for_exercise_with_conn<C: ConnectionTrait>(
    db: &C,
    exercise_id: i64,
) -> Result<Vec<gym_set::Model>, AppError> {
    Ok(gym_set::Entity::find()
        .filter(gym_set::Column::ExerciseInstanceId.eq(exercise_id))
        .order_by_asc(gym_set::Column::SetNumber)
        .order_by_asc(gym_set::Column::Id)
        .all(db)
        .await?)
}

async fn sets_for_exercises_with_conn<C: ConnectionTrait>(
    db: &C,
    exercise_ids: &[i64],
) -> Result<HashMap<i64, Vec<gym_set::Model>>, AppError> {
    let mut grouped: HashMap<i64, Vec<gym_set::Model>> = HashMap::new();
    if exercise_ids.is_empty() {
        return Ok(grouped);
    }
    let sets = gym_set::Entity::find()
        .filter(gym_set::Column::ExerciseInstanceId.is_in(exercise_ids.to_vec()))
        .order_by_asc(gym_set::Column::ExerciseInstanceId)
        .order_by_asc(gym_set::Column::SetNumber)
        .order_by_asc(gym_set::Column::Id)
        .all(db)
        .await?;
    for set in sets {
        grouped.entry(set.exercise_instance_id).or_default().push(set);
    }
    Ok(grouped)
}

async fn workout_tree_with_conn<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<WorkoutTree, AppError> {
    let workout = workout_with_conn(db, id).await?;
    let exercises = exercises_for_workout_with_conn(db, id).await?;
    let exercise_ids: Vec<i64> = exercises.iter().map(|exercise| exercise.id).collect();
    let sets = sets_for_exercises_with_conn(db, &exercise_ids).await?;
    Ok(WorkoutTree {
        workout,
        exercises,
        sets,
    })
}

async fn workout_detail_with_conn<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<WorkoutDetail, AppError> {
    let WorkoutTree {
        workout,
        exercises,
        mut sets,
    } = workout_tree_with_conn(db, id).await?;

    let definition_ids: Vec<i64> = exercises
        .iter()
        .map(|exercise| exercise.exercise_definition_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let definitions: HashMap<i64, exercise_definition::Model> = if definition_ids.is_empty() {
        HashMap::new()
    } else {
        exercise_definition::Entity::find()
            .filter(exercise_definition::Column::Id.is_in(definition_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|definition| (definition.id, definition))
            .collect()
    };

    let mut details = Vec::with_capacity(exercises.len());
    for exercise in exercises {
        let definition = definitions
            .get(&exercise.exercise_definition_id)
            .cloned()
            .ok_or_else(|| {
                AppError::ConsistencyViolation(format!(
                    "exercise id {} references missing definition id {}",
                    exercise.id, exercise.exercise_definition_id
                ))
            })?;
        let exercise_sets = sets.remove(&exercise.id).unwrap_or_default();
        details.push(ExerciseDetail {
            exercise,
            definition,
            sets: exercise_sets,
        });
    }
    Ok(WorkoutDetail {
        workout,
        exercises: details,
    })
}

/// Deletes a workout's sets, then its exercises, then the workout row. The
/// store does not cascade. Returns whether the workout row existed.
async fn delete_tree_with_conn<C: ConnectionTrait>(db: &C, id: i64) -> Result<bool, AppError> {
    let exercise_ids: Vec<i64> = exercises_for_workout_with_conn(db, id)
        .await?
        .into_iter()
        .map(|exercise| exercise.id)
        .collect();
    if !exercise_ids.is_empty() {
        gym_set::Entity::delete_many()
            .filter(gym_set::Column::ExerciseInstanceId.is_in(exercise_ids))
            .exec(db)
            .await?;
        exercise_instance::Entity::delete_many()
            .filter(exercise_instance::Column::WorkoutId.eq(id))
            .exec(db)
            .await?;
    }
    let result = workout::Entity::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}

async fn renumber_exercises_with_conn<C: ConnectionTrait>(
    db: &C,
    exercises: &mut [exercise_instance::Model],
) -> Result<(), AppError> {
    let now = Utc::now();
    for (idx, exercise) in exercises.iter_mut().enumerate() {
        let desired = (idx + 1) as i32;
        if exercise.sort_number != desired {
            let mut active: exercise_instance::ActiveModel = exercise.clone().into();
            active.sort_number = Set(desired);
            active.updated_at = Set(now);
            active.update(db).await?;
            exercise.sort_number = desired;
            exercise.updated_at = now;
        }
    }
    Ok(())
}

async fn superset_group_with_conn<C: ConnectionTrait>(
    db: &C,
    workout_id: i64,
    group_id: &str,
) -> Result<Vec<exercise_instance::Model>, AppError> {
    Ok(exercise_instance::Entity::find()
        .filter(exercise_instance::Column::WorkoutId.eq(workout_id))
        .filter(exercise_instance::Column::SupersetGroupId.eq(group_id))
        .order_by_asc(exercise_instance::Column::SupersetOrder)
        .order_by_asc(exercise_instance::Column::Id)
        .all(db)
        .await?)
}

async fn next_superset_order_with_conn<C: ConnectionTrait>(
    db: &C,
    workout_id: i64,
    group_id: &str,
) -> Result<i32, AppError> {
    let members = superset_group_with_conn(db, workout_id, group_id).await?;
    Ok(members
        .iter()
        .filter_map(|member| member.superset_order)
        .max()
        .map_or(0, |max| max + 1))
}

async fn write_superset_with_conn<C: ConnectionTrait>(
    db: &C,
    exercise: exercise_instance::Model,
    superset: Superset,
) -> Result<exercise_instance::Model, AppError> {
    let (partner_id, group_id, order) = superset.into_columns();
    let mut active: exercise_instance::ActiveModel = exercise.into();
    active.superset_partner_id = Set(partner_id);
    active.superset_group_id = Set(group_id);
    active.superset_order = Set(order);
    active.updated_at = Set(Utc::now());
    Ok(active.update(db).await?)
}

// A group with one member left is not a superset anymore.
async fn dissolve_singleton_group_with_conn<C: ConnectionTrait>(
    db: &C,
    workout_id: i64,
    group_id: &str,
) -> Result<(), AppError> {
    let mut members = superset_group_with_conn(db, workout_id, group_id).await?;
    if members.len() == 1 {
        if let Some(last) = members.pop() {
            write_superset_with_conn(db, last, Superset::None).await?;
        }
    }
    Ok(())
}

/// Checks that every partner link of one workout's exercises stays inside
/// that workout and that no chain of links loops back on itself.
fn validate_superset_links(exercises: &[exercise_instance::Model]) -> Result<(), AppError> {
    let ids: HashSet<i64> = exercises.iter().map(|exercise| exercise.id).collect();
    for exercise in exercises {
        let Some(partner_id) = exercise.superset().partner_id() else {
            continue;
        };
        if !ids.contains(&partner_id) {
            return Err(AppError::ConsistencyViolation(format!(
                "exercise id {} links to exercise id {partner_id} outside workout id {}",
                exercise.id, exercise.workout_id
            )));
        }
    }
    if let Some(id) = find_partner_cycle(exercises) {
        return Err(AppError::ConsistencyViolation(format!(
            "superset link would form a cycle at exercise id {id}"
        )));
    }
    Ok(())
}

fn find_partner_cycle(exercises: &[exercise_instance::Model]) -> Option<i64> {
    let links: HashMap<i64, Option<i64>> = exercises
        .iter()
        .map(|exercise| (exercise.id, exercise.superset().partner_id()))
        .collect();
    for exercise in exercises {
        let mut seen = HashSet::new();
        let mut current = Some(exercise.id);
        while let Some(id) = current {
            if !seen.insert(id) {
                return Some(id);
            }
            current = links.get(&id).copied().flatten();
        }
    }
    None
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

fn normalize_notes(notes: String) -> Option<String> {
    let trimmed = notes.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_set_type(set_type: Option<String>) -> Option<String> {
    set_type.and_then(normalize_notes)
}

fn validate_reps(reps: i32) -> Result<(), AppError> {
    if reps < 0 {
        return Err(AppError::InvalidInput(format!("reps cannot be negative: {reps}")));
    }
    Ok(())
}

fn validate_weight(weight: f64) -> Result<(), AppError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(AppError::InvalidInput(format!("invalid weight: {weight}")));
    }
    Ok(())
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}
