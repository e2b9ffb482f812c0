use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::app::{ExerciseDetail, HistoryEntry, WorkoutDetail};
use crate::entities::{exercise_definition, exercise_instance, workout};
use crate::model::Superset;

fn has_text(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_weight(weight_kg: f64) -> String {
    if weight_kg.fract() == 0.0 {
        format!("{weight_kg:.0}kg")
    } else {
        format!("{weight_kg}kg")
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BlockKind {
    Single,
    /// Exercises chained together by partner links.
    Partnered,
    Group(String),
}

/// Exercises rendered together: a standalone exercise or one superset.
#[derive(Clone, Debug)]
pub struct ExerciseBlock<'a> {
    pub kind: BlockKind,
    pub exercises: Vec<&'a ExerciseDetail>,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum BlockKey {
    Chain(i64),
    Group(String),
}

/// Groups a workout's exercises into render blocks in sort order.
///
/// A block appears where its first member sits. Partner chains are keyed by
/// the exercise at the end of the chain; a chain ending in a group member
/// joins that group. Group members are ordered by their group order.
pub fn group_into_blocks(exercises: &[ExerciseDetail]) -> Vec<ExerciseBlock<'_>> {
    let mut sorted: Vec<&ExerciseDetail> = exercises.iter().collect();
    sorted.sort_by_key(|detail| (detail.exercise.sort_number, detail.exercise.id));

    let by_id: HashMap<i64, &exercise_instance::Model> = exercises
        .iter()
        .map(|detail| (detail.exercise.id, &detail.exercise))
        .collect();

    let mut blocks: Vec<(BlockKey, Vec<&ExerciseDetail>)> = Vec::new();
    let mut positions: HashMap<BlockKey, usize> = HashMap::new();
    for detail in sorted {
        let key = block_key(&detail.exercise, &by_id);
        match positions.get(&key) {
            Some(idx) => blocks[*idx].1.push(detail),
            None => {
                positions.insert(key.clone(), blocks.len());
                blocks.push((key, vec![detail]));
            }
        }
    }

    blocks
        .into_iter()
        .map(|(key, mut members)| {
            let kind = match key {
                BlockKey::Group(group_id) => {
                    members.sort_by_key(|detail| {
                        (
                            detail.exercise.superset_order.unwrap_or(i32::MAX),
                            detail.exercise.sort_number,
                        )
                    });
                    BlockKind::Group(group_id)
                }
                BlockKey::Chain(_) if members.len() > 1 => BlockKind::Partnered,
                BlockKey::Chain(_) => BlockKind::Single,
            };
            ExerciseBlock {
                kind,
                exercises: members,
            }
        })
        .collect()
}

fn block_key(
    exercise: &exercise_instance::Model,
    by_id: &HashMap<i64, &exercise_instance::Model>,
) -> BlockKey {
    let mut current = exercise;
    let mut seen = HashSet::new();
    loop {
        match current.superset() {
            Superset::Group { group_id, .. } => return BlockKey::Group(group_id),
            Superset::Partner(partner_id) if seen.insert(current.id) => {
                match by_id.get(&partner_id) {
                    Some(next) => current = *next,
                    None => return BlockKey::Chain(current.id),
                }
            }
            _ => return BlockKey::Chain(current.id),
        }
    }
}

pub fn format_workout_summary(workout: &workout::Model) -> String {
    let mut line = format!(
        "- [{}] {} (workout id {}, {})",
        workout.status,
        workout.name,
        workout.id,
        format_datetime(workout.performed_at)
    );
    if let Some(original_id) = workout.original_workout_id {
        line.push_str(&format!(" editing workout {original_id}"));
    }
    line
}

pub fn format_workout_detail(detail: &WorkoutDetail) -> String {
    let workout = &detail.workout;
    let mut output = String::new();
    output.push_str(&format!("Workout ID: {}\n", workout.id));
    output.push_str(&format!("Name: {}\n", workout.name));
    output.push_str(&format!("Status: {}\n", workout.status));
    if let Some(original_id) = workout.original_workout_id {
        output.push_str(&format!("Draft Of: {original_id}\n"));
    }
    if has_text(&workout.notes) {
        output.push_str(&format!(
            "Notes: {}\n",
            workout.notes.as_deref().unwrap_or("")
        ));
    }
    output.push_str(&format!(
        "Performed: {}\n",
        format_datetime(workout.performed_at)
    ));
    output.push_str(&format!("Updated: {}\n", format_datetime(workout.updated_at)));
    output.push('\n');
    if detail.exercises.is_empty() {
        output.push_str("Exercises: (none)");
        return output;
    }
    output.push_str("Exercises:\n");
    for block in group_into_blocks(&detail.exercises) {
        let indent = match &block.kind {
            BlockKind::Single => "",
            BlockKind::Partnered => {
                output.push_str("- Superset:\n");
                "  "
            }
            BlockKind::Group(group_id) => {
                output.push_str(&format!("- Superset '{group_id}':\n"));
                "  "
            }
        };
        for item in block.exercises {
            output.push_str(&format_exercise_line(indent, item));
        }
    }
    output.trim_end().to_string()
}

fn format_exercise_line(indent: &str, item: &ExerciseDetail) -> String {
    let mut output = format!(
        "{indent}- #{} {} (exercise id {})\n",
        item.exercise.sort_number, item.definition.name, item.exercise.id
    );
    if item.sets.is_empty() {
        output.push_str(&format!("{indent}  (no sets)\n"));
    }
    for set in &item.sets {
        let tag = set
            .set_type
            .as_deref()
            .map(|kind| format!(" [{kind}]"))
            .unwrap_or_default();
        output.push_str(&format!(
            "{indent}  {}. {} x {}{} (set id {})\n",
            set.set_number,
            set.reps,
            format_weight(set.weight_kg),
            tag,
            set.id
        ));
    }
    output
}

pub fn format_definition(definition: &exercise_definition::Model) -> String {
    let mut line = format!("- {} (definition id {})", definition.name, definition.id);
    if has_text(&definition.target_muscle_group) {
        line.push_str(&format!(
            " [{}]",
            definition.target_muscle_group.as_deref().unwrap_or("")
        ));
    }
    if has_text(&definition.equipment) {
        line.push_str(&format!(
            " ({})",
            definition.equipment.as_deref().unwrap_or("")
        ));
    }
    line
}

pub fn format_history(entries: &[HistoryEntry]) -> String {
    let mut output = String::new();
    let mut last_workout = None;
    for entry in entries {
        if last_workout != Some(entry.workout.id) {
            output.push_str(&format!(
                "{} {} (workout id {})\n",
                format_datetime(entry.workout.performed_at),
                entry.workout.name,
                entry.workout.id
            ));
            last_workout = Some(entry.workout.id);
        }
        output.push_str(&format!(
            "  {}. {} x {}\n",
            entry.set.set_number,
            entry.set.reps,
            format_weight(entry.set.weight_kg)
        ));
    }
    output.trim_end().to_string()
}
