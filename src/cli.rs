use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use gymlog::config::{DB_ENV, SESSION_ENV};
use gymlog::model::WorkoutStatus;

#[derive(Parser, Debug)]
#[command(
    name = "gymlog",
    version,
    about = "Log gym workouts with draft edits in SQLite"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = DB_ENV,
        help = "SQLite database file (default: ~/.gymlog/gymlog.db)"
    )]
    pub db: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "ID",
        env = SESSION_ENV,
        help = "Session identifier"
    )]
    pub session_id: Option<String>,
    #[arg(long, global = true, help = "Log debug output to stderr")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    User(UserCommand),
    #[command(subcommand)]
    Definition(DefinitionCommand),
    #[command(subcommand)]
    Workout(WorkoutCommand),
    #[command(subcommand)]
    Exercise(ExerciseCommand),
    #[command(subcommand)]
    Set(SetCommand),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    Add(UserAdd),
    Show(UserShow),
}

#[derive(Subcommand, Debug)]
pub enum DefinitionCommand {
    Add(DefinitionAdd),
    List,
}

#[derive(Subcommand, Debug)]
pub enum WorkoutCommand {
    Start(WorkoutStart),
    Edit(WorkoutEdit),
    Finish(WorkoutFinish),
    Discard(WorkoutDiscard),
    Show(WorkoutShow),
    List(WorkoutList),
    Rename(WorkoutRename),
    Remove(WorkoutRemove),
    Active,
}

#[derive(Subcommand, Debug)]
pub enum ExerciseCommand {
    Add(ExerciseAdd),
    Move(ExerciseMove),
    Remove(ExerciseRemove),
    Superset(ExerciseSuperset),
    Partner(ExercisePartner),
    Unlink(ExerciseUnlink),
    Group(ExerciseGroup),
    History(ExerciseHistory),
}

#[derive(Subcommand, Debug)]
pub enum SetCommand {
    Add(SetAdd),
    Update(SetUpdate),
    Remove(SetRemove),
}

#[derive(Args, Debug)]
pub struct UserAdd {
    pub username: String,
}

#[derive(Args, Debug)]
pub struct UserShow {
    pub username: String,
}

#[derive(Args, Debug)]
pub struct DefinitionAdd {
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long = "muscle", value_name = "GROUP")]
    pub target_muscle_group: Option<String>,
    #[arg(long)]
    pub equipment: Option<String>,
    #[arg(long, value_name = "URL")]
    pub video_url: Option<String>,
    #[arg(long, value_name = "URL")]
    pub image_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct WorkoutStart {
    #[arg(long, value_name = "USERNAME")]
    pub user: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(
        long,
        help = "Discard the session's current draft instead of refusing to start"
    )]
    pub discard_current: bool,
}

#[derive(Args, Debug)]
pub struct WorkoutEdit {
    pub id: i64,
    #[arg(
        long,
        help = "Discard the session's current draft instead of refusing to edit"
    )]
    pub discard_current: bool,
}

#[derive(Args, Debug)]
pub struct WorkoutFinish {
    #[arg(long, help = "Draft to finish (default: the session's active workout)")]
    pub id: Option<i64>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct WorkoutDiscard {
    #[arg(long, help = "Draft to discard (default: the session's active workout)")]
    pub id: Option<i64>,
}

#[derive(Args, Debug)]
pub struct WorkoutShow {
    pub id: Option<i64>,
    #[arg(long, help = "Print the workout tree as JSON")]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct WorkoutList {
    #[arg(long, value_name = "USERNAME")]
    pub user: String,
    #[arg(long, value_enum)]
    pub status: Option<WorkoutStatusArg>,
}

#[derive(Args, Debug)]
pub struct WorkoutRename {
    pub id: i64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct WorkoutRemove {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct ExerciseAdd {
    pub definition_id: i64,
    #[arg(long, help = "Target draft (default: the session's active workout)")]
    pub workout: Option<i64>,
    #[arg(long, value_name = "NUMBER", help = "Insert after this sort number (0 = first)")]
    pub after: Option<i32>,
}

#[derive(Args, Debug)]
pub struct ExerciseMove {
    pub id: i64,
    #[arg(long)]
    pub to: usize,
}

#[derive(Args, Debug)]
pub struct ExerciseRemove {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct ExerciseSuperset {
    pub id: i64,
    pub group: String,
}

#[derive(Args, Debug)]
pub struct ExercisePartner {
    pub id: i64,
    pub partner: i64,
}

#[derive(Args, Debug)]
pub struct ExerciseUnlink {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct ExerciseGroup {
    pub group: String,
    #[arg(long, help = "Workout to inspect (default: the session's active workout)")]
    pub workout: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ExerciseHistory {
    pub definition_id: i64,
    #[arg(long, value_name = "USERNAME")]
    pub user: String,
}

#[derive(Args, Debug)]
pub struct SetAdd {
    pub exercise_id: i64,
    #[arg(long)]
    pub reps: i32,
    #[arg(long, value_name = "KG")]
    pub weight: f64,
    #[arg(long = "type", value_name = "TYPE")]
    pub set_type: Option<String>,
}

#[derive(Args, Debug)]
pub struct SetUpdate {
    pub id: i64,
    #[arg(long)]
    pub reps: Option<i32>,
    #[arg(long, value_name = "KG")]
    pub weight: Option<f64>,
    #[arg(long = "type", value_name = "TYPE")]
    pub set_type: Option<String>,
}

#[derive(Args, Debug)]
pub struct SetRemove {
    pub id: i64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum WorkoutStatusArg {
    Draft,
    Active,
    Archived,
}

impl From<WorkoutStatusArg> for WorkoutStatus {
    fn from(value: WorkoutStatusArg) -> Self {
        match value {
            WorkoutStatusArg::Draft => WorkoutStatus::Draft,
            WorkoutStatusArg::Active => WorkoutStatus::Active,
            WorkoutStatusArg::Archived => WorkoutStatus::Archived,
        }
    }
}
