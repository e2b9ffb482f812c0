mod cli;

use clap::Parser;
use tracing::Level;

use gymlog::app::{DiscardOutcome, EditTarget, Logbook};
use gymlog::config::Config;
use gymlog::db;
use gymlog::entities::workout;
use gymlog::error::AppError;
use gymlog::model::{DefinitionInput, SetChanges, SetInput, WorkoutChanges, WorkoutStatus};
use gymlog::session::Session;
use gymlog::util::{
    format_datetime, format_definition, format_history, format_weight, format_workout_detail,
    format_workout_summary,
};

use crate::cli::{
    Cli, Command, DefinitionAdd, DefinitionCommand, ExerciseAdd, ExerciseCommand, ExerciseGroup,
    ExerciseHistory, ExerciseMove, ExercisePartner, ExerciseRemove, ExerciseSuperset,
    ExerciseUnlink, SetAdd, SetCommand, SetRemove, SetUpdate, UserCommand, WorkoutCommand,
    WorkoutDiscard, WorkoutEdit, WorkoutFinish, WorkoutList, WorkoutRemove, WorkoutRename,
    WorkoutShow, WorkoutStart,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let Cli {
        db: db_path,
        session_id,
        verbose,
        command,
    } = Cli::parse();
    let config = Config::resolve(db_path, session_id, verbose)?;
    init_logging(config.verbose);

    db::ensure_parent_dir(&config.db_path)?;
    let mut lock = db::open_lock(&config.db_path)?;
    let _guard = lock.write()?;

    let db = db::connect(&config.db_path).await?;
    db::ensure_schema(&db).await?;
    let session = Session::new(db.clone(), config.session_id.clone());
    let logbook = Logbook::new(db);
    tracing::debug!(session_id = session.id(), "running command");

    match command {
        Command::User(command) => handle_user(&logbook, command).await,
        Command::Definition(command) => handle_definition(&logbook, command).await,
        Command::Workout(command) => handle_workout(&logbook, &session, command).await,
        Command::Exercise(command) => handle_exercise(&logbook, &session, command).await,
        Command::Set(command) => handle_set(&logbook, command).await,
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn handle_user(logbook: &Logbook, command: UserCommand) -> Result<(), AppError> {
    match command {
        UserCommand::Add(args) => {
            let user = logbook.add_user(&args.username).await?;
            println!("Created user ID: {}: {}", user.id, user.username);
        }
        UserCommand::Show(args) => {
            let user = logbook.find_user(&args.username).await?;
            println!("User ID: {}: {}", user.id, user.username);
            println!("Created: {}", format_datetime(user.created_at));
        }
    }
    Ok(())
}

async fn handle_definition(
    logbook: &Logbook,
    command: DefinitionCommand,
) -> Result<(), AppError> {
    match command {
        DefinitionCommand::Add(args) => handle_definition_add(logbook, args).await,
        DefinitionCommand::List => {
            let definitions = logbook.list_definitions().await?;
            if definitions.is_empty() {
                println!("No exercise definitions.");
            }
            for definition in &definitions {
                println!("{}", format_definition(definition));
            }
            Ok(())
        }
    }
}

async fn handle_definition_add(logbook: &Logbook, args: DefinitionAdd) -> Result<(), AppError> {
    let definition = logbook
        .add_definition(DefinitionInput {
            name: args.name,
            description: args.description,
            target_muscle_group: args.target_muscle_group,
            equipment: args.equipment,
            video_url: args.video_url,
            image_url: args.image_url,
        })
        .await?;
    println!(
        "Created definition ID: {}: {}",
        definition.id, definition.name
    );
    Ok(())
}

async fn handle_workout(
    logbook: &Logbook,
    session: &Session,
    command: WorkoutCommand,
) -> Result<(), AppError> {
    match command {
        WorkoutCommand::Start(args) => handle_workout_start(logbook, session, args).await,
        WorkoutCommand::Edit(args) => handle_workout_edit(logbook, session, args).await,
        WorkoutCommand::Finish(args) => handle_workout_finish(logbook, session, args).await,
        WorkoutCommand::Discard(args) => handle_workout_discard(logbook, session, args).await,
        WorkoutCommand::Show(args) => handle_workout_show(logbook, session, args).await,
        WorkoutCommand::List(args) => handle_workout_list(logbook, args).await,
        WorkoutCommand::Rename(args) => handle_workout_rename(logbook, args).await,
        WorkoutCommand::Remove(args) => handle_workout_remove(logbook, session, args).await,
        WorkoutCommand::Active => handle_workout_active(logbook, session).await,
    }
}

/// The session's in-progress draft, if it still is one.
async fn current_draft(
    logbook: &Logbook,
    session: &Session,
) -> Result<Option<workout::Model>, AppError> {
    let Some(active_id) = session.active_workout().await? else {
        return Ok(None);
    };
    let workout = logbook.get_workout(active_id).await?;
    if workout.status == WorkoutStatus::Draft.as_str() {
        Ok(Some(workout))
    } else {
        Ok(None)
    }
}

fn in_progress_error(draft_id: i64) -> AppError {
    AppError::InvalidInput(format!(
        "workout ID: {draft_id} is still in progress; finish or discard it, or pass --discard-current"
    ))
}

async fn handle_workout_start(
    logbook: &Logbook,
    session: &Session,
    args: WorkoutStart,
) -> Result<(), AppError> {
    let user = logbook.find_user(&args.user).await?;
    let replacing = current_draft(logbook, session)
        .await?
        .map(|draft| draft.id);
    if let Some(draft_id) = replacing {
        if !args.discard_current {
            return Err(in_progress_error(draft_id));
        }
    }
    let workout = logbook.start_workout(user.id, args.name, replacing).await?;
    session.set_active_workout(workout.id).await?;
    if let Some(draft_id) = replacing {
        println!("Discarded draft ID: {draft_id}.");
    }
    println!("Started workout ID: {}: {}", workout.id, workout.name);
    Ok(())
}

async fn handle_workout_edit(
    logbook: &Logbook,
    session: &Session,
    args: WorkoutEdit,
) -> Result<(), AppError> {
    if let Some(draft) = current_draft(logbook, session).await? {
        // Editing the draft itself, or the workout it copies, resumes it.
        let resumes = draft.id == args.id || draft.original_workout_id == Some(args.id);
        if !resumes {
            if !args.discard_current {
                return Err(in_progress_error(draft.id));
            }
            logbook.discard_draft(draft.id).await?;
            session.clear().await?;
            println!("Discarded draft ID: {}.", draft.id);
        }
    }

    let target = logbook.open_for_edit(args.id).await?;
    session.set_active_workout(target.draft_id()).await?;
    match target {
        EditTarget::Draft(draft_id) => println!("Editing draft ID: {draft_id}"),
        EditTarget::Copy {
            draft_id,
            original_id,
        } => println!("Editing workout ID: {original_id} as draft ID: {draft_id}"),
    }
    Ok(())
}

async fn resolve_workout_id(session: &Session, id: Option<i64>) -> Result<i64, AppError> {
    if let Some(id) = id {
        return Ok(id);
    }
    session
        .active_workout()
        .await?
        .ok_or_else(|| AppError::InvalidInput("no active workout; pass an id".to_string()))
}

async fn clear_if_active(session: &Session, workout_id: i64) -> Result<(), AppError> {
    if session.active_workout().await? == Some(workout_id) {
        session.clear().await?;
    }
    Ok(())
}

async fn handle_workout_finish(
    logbook: &Logbook,
    session: &Session,
    args: WorkoutFinish,
) -> Result<(), AppError> {
    let draft_id = resolve_workout_id(session, args.id).await?;
    let final_id = logbook.finalize_draft(draft_id, args.notes).await?;
    // The draft row of an edit is gone once it is absorbed.
    clear_if_active(session, draft_id).await?;
    println!("Finished workout ID: {final_id}");
    Ok(())
}

async fn handle_workout_discard(
    logbook: &Logbook,
    session: &Session,
    args: WorkoutDiscard,
) -> Result<(), AppError> {
    let draft_id = resolve_workout_id(session, args.id).await?;
    let outcome = logbook.discard_draft(draft_id).await?;
    clear_if_active(session, draft_id).await?;
    match outcome {
        DiscardOutcome::Discarded {
            original_workout_id,
        } => {
            println!("Discarded draft ID: {draft_id}.");
            if let Some(original_id) = original_workout_id {
                println!("Workout ID: {original_id} unchanged.");
            }
        }
        DiscardOutcome::AlreadyGone => println!("Draft ID: {draft_id} already discarded."),
    }
    Ok(())
}

async fn handle_workout_show(
    logbook: &Logbook,
    session: &Session,
    args: WorkoutShow,
) -> Result<(), AppError> {
    let id = resolve_workout_id(session, args.id).await?;
    let detail = logbook.get_workout_detail(id).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        println!("{}", format_workout_detail(&detail));
    }
    Ok(())
}

async fn handle_workout_list(logbook: &Logbook, args: WorkoutList) -> Result<(), AppError> {
    let user = logbook.find_user(&args.user).await?;
    let workouts = logbook
        .list_workouts(user.id, args.status.map(WorkoutStatus::from))
        .await?;
    if workouts.is_empty() {
        println!("No workouts.");
    }
    for workout in &workouts {
        println!("{}", format_workout_summary(workout));
    }
    Ok(())
}

async fn handle_workout_rename(logbook: &Logbook, args: WorkoutRename) -> Result<(), AppError> {
    if args.name.is_none() && args.notes.is_none() {
        return Err(AppError::InvalidInput(
            "nothing to update; pass --name or --notes".to_string(),
        ));
    }
    let workout = logbook
        .update_workout_details(
            args.id,
            WorkoutChanges {
                name: args.name,
                notes: args.notes,
            },
        )
        .await?;
    println!("Updated workout ID: {}: {}", workout.id, workout.name);
    Ok(())
}

async fn handle_workout_remove(
    logbook: &Logbook,
    session: &Session,
    args: WorkoutRemove,
) -> Result<(), AppError> {
    let drafts = logbook.delete_workout(args.id).await?;
    let mut forgotten = drafts.clone();
    forgotten.push(args.id);
    session.forget_workouts(&forgotten).await?;
    println!("Workout ID: {} removed.", args.id);
    if !drafts.is_empty() {
        println!("Removed {} pending draft(s).", drafts.len());
    }
    Ok(())
}

async fn handle_workout_active(logbook: &Logbook, session: &Session) -> Result<(), AppError> {
    let Some(workout_id) = session.active_workout().await? else {
        println!("No active workout.");
        return Ok(());
    };
    let detail = logbook.get_workout_detail(workout_id).await?;
    println!("{}", format_workout_detail(&detail));
    Ok(())
}

async fn handle_exercise(
    logbook: &Logbook,
    session: &Session,
    command: ExerciseCommand,
) -> Result<(), AppError> {
    match command {
        ExerciseCommand::Add(args) => handle_exercise_add(logbook, session, args).await,
        ExerciseCommand::Move(args) => handle_exercise_move(logbook, args).await,
        ExerciseCommand::Remove(args) => handle_exercise_remove(logbook, args).await,
        ExerciseCommand::Superset(args) => handle_exercise_superset(logbook, args).await,
        ExerciseCommand::Partner(args) => handle_exercise_partner(logbook, args).await,
        ExerciseCommand::Unlink(args) => handle_exercise_unlink(logbook, args).await,
        ExerciseCommand::Group(args) => handle_exercise_group(logbook, session, args).await,
        ExerciseCommand::History(args) => handle_exercise_history(logbook, args).await,
    }
}

async fn handle_exercise_add(
    logbook: &Logbook,
    session: &Session,
    args: ExerciseAdd,
) -> Result<(), AppError> {
    let workout_id = resolve_workout_id(session, args.workout).await?;
    let definition = logbook.get_definition(args.definition_id).await?;
    let exercise = logbook
        .add_exercise(workout_id, definition.id, args.after)
        .await?;
    println!(
        "Created exercise ID: {}: #{} {}",
        exercise.id, exercise.sort_number, definition.name
    );
    Ok(())
}

async fn handle_exercise_move(logbook: &Logbook, args: ExerciseMove) -> Result<(), AppError> {
    if args.to == 0 {
        return Err(AppError::InvalidInput("position starts at 1".to_string()));
    }
    let exercises = logbook.move_exercise(args.id, args.to).await?;
    let Some(first) = exercises.first() else {
        return Ok(());
    };
    println!("Reordered exercises for workout ID: {}:", first.workout_id);
    for exercise in &exercises {
        println!("  #{} exercise ID: {}", exercise.sort_number, exercise.id);
    }
    Ok(())
}

async fn handle_exercise_remove(logbook: &Logbook, args: ExerciseRemove) -> Result<(), AppError> {
    let remaining = logbook.remove_exercise(args.id).await?;
    println!("Exercise ID: {} removed.", args.id);
    println!("{} exercise(s) remain.", remaining.len());
    Ok(())
}

async fn handle_exercise_superset(
    logbook: &Logbook,
    args: ExerciseSuperset,
) -> Result<(), AppError> {
    let exercise = logbook.join_superset_group(args.id, &args.group).await?;
    let order = exercise.superset_order.unwrap_or_default();
    println!(
        "Exercise ID: {} joined superset '{}' at order {order}.",
        exercise.id,
        args.group.trim()
    );
    Ok(())
}

async fn handle_exercise_partner(
    logbook: &Logbook,
    args: ExercisePartner,
) -> Result<(), AppError> {
    let exercise = logbook.link_superset_partner(args.id, args.partner).await?;
    println!(
        "Exercise ID: {} partnered with exercise ID: {}.",
        exercise.id, args.partner
    );
    Ok(())
}

async fn handle_exercise_unlink(logbook: &Logbook, args: ExerciseUnlink) -> Result<(), AppError> {
    let exercise = logbook.clear_superset(args.id).await?;
    println!("Exercise ID: {} unlinked.", exercise.id);
    Ok(())
}

async fn handle_exercise_group(
    logbook: &Logbook,
    session: &Session,
    args: ExerciseGroup,
) -> Result<(), AppError> {
    let workout_id = resolve_workout_id(session, args.workout).await?;
    let members = logbook.superset_group(workout_id, &args.group).await?;
    if members.is_empty() {
        println!("Superset '{}' is empty.", args.group);
    }
    for member in &members {
        println!(
            "  {}. exercise ID: {} (#{})",
            member.superset_order.unwrap_or_default(),
            member.id,
            member.sort_number
        );
    }
    let next = logbook.next_superset_order(workout_id, &args.group).await?;
    println!("Next order: {next}");
    Ok(())
}

async fn handle_exercise_history(
    logbook: &Logbook,
    args: ExerciseHistory,
) -> Result<(), AppError> {
    let user = logbook.find_user(&args.user).await?;
    let definition = logbook.get_definition(args.definition_id).await?;
    let history = logbook.exercise_history(user.id, definition.id).await?;
    if history.is_empty() {
        println!("No history for {}.", definition.name);
        return Ok(());
    }
    println!("History for {}:", definition.name);
    println!("{}", format_history(&history));
    Ok(())
}

async fn handle_set(logbook: &Logbook, command: SetCommand) -> Result<(), AppError> {
    match command {
        SetCommand::Add(args) => handle_set_add(logbook, args).await,
        SetCommand::Update(args) => handle_set_update(logbook, args).await,
        SetCommand::Remove(args) => handle_set_remove(logbook, args).await,
    }
}

async fn handle_set_add(logbook: &Logbook, args: SetAdd) -> Result<(), AppError> {
    let set = logbook
        .add_set(
            args.exercise_id,
            SetInput {
                reps: args.reps,
                weight_kg: args.weight,
                set_type: args.set_type,
            },
        )
        .await?;
    println!(
        "Created set ID: {}: {}. {} x {}",
        set.id,
        set.set_number,
        set.reps,
        format_weight(set.weight_kg)
    );
    Ok(())
}

async fn handle_set_update(logbook: &Logbook, args: SetUpdate) -> Result<(), AppError> {
    if args.reps.is_none() && args.weight.is_none() && args.set_type.is_none() {
        return Err(AppError::InvalidInput(
            "nothing to update; pass --reps, --weight or --type".to_string(),
        ));
    }
    let set = logbook
        .update_set(
            args.id,
            SetChanges {
                reps: args.reps,
                weight_kg: args.weight,
                set_type: args.set_type,
            },
        )
        .await?;
    println!(
        "Updated set ID: {}: {}. {} x {}",
        set.id,
        set.set_number,
        set.reps,
        format_weight(set.weight_kg)
    );
    Ok(())
}

async fn handle_set_remove(logbook: &Logbook, args: SetRemove) -> Result<(), AppError> {
    let remaining = logbook.remove_set(args.id).await?;
    println!("Set ID: {} removed.", args.id);
    println!("{} set(s) remain.", remaining.len());
    Ok(())
}
