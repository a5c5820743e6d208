use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new migration from a JSON definition
    Create {
        #[arg(long, help = "Migration definition file path (JSON)")]
        config: String,
    },
    /// Publish tasks onto a migration's queue
    Publish {
        #[arg(long, help = "Queue to publish onto")]
        queue: String,

        #[arg(long, help = "Task definitions file path (JSON array)")]
        config: String,
    },
    /// Process a migration's queue until it drains or a stop is observed
    Run {
        #[arg(long, help = "Migration name")]
        name: String,
    },
    /// Request a cooperative stop of a running migration
    Stop {
        #[arg(long, help = "Migration name")]
        name: String,
    },
    /// Show where a migration run currently stands
    Progress {
        #[arg(long, help = "Migration name")]
        name: String,

        #[arg(
            long,
            help = "If set, prints the progress information as JSON instead of a table"
        )]
        json: bool,
    },
    /// Apply pending schema scripts under the cross-instance table lock
    Schema {
        #[arg(long, help = "MySQL connection string")]
        db_url: String,

        #[arg(
            long,
            default_value = "drover_schema_lock",
            help = "Sentinel table used as the cross-instance mutex"
        )]
        lock_table: String,

        #[arg(long, help = "Directory holding versioned .sql scripts")]
        scripts_dir: String,
    },
}
