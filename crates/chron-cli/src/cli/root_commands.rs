use clap::{Args, Subcommand};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Audit table maintenance.
    Schema {
        #[command(subcommand)]
        action: SchemaCommands,
    },
    /// Page through committed revisions, newest first.
    Revisions(RevisionsArgs),
    /// Show one revision and every entity it changed.
    Revision(RevisionArgs),
    /// List the revisions that touched an entity.
    History(EntityArgs),
    /// Show an entity as of a revision.
    Show(ShowArgs),
    /// Compare an entity between two revisions.
    Diff(DiffArgs),
}

#[derive(Clone, Debug, Subcommand)]
pub enum SchemaCommands {
    /// Create missing audit tables and columns.
    Sync {
        /// Print the planned changes without applying them.
        #[arg(long)]
        dry_run: bool,

        /// Also create missing primary tables for every mapped entity.
        #[arg(long)]
        entities: bool,
    },
}

#[derive(Clone, Debug, Args)]
pub struct RevisionsArgs {
    /// Page number, starting at 1.
    #[arg(long, default_value_t = 1)]
    pub page: u32,
}

#[derive(Clone, Debug, Args)]
pub struct RevisionArgs {
    /// Revision id.
    pub rev: i64,
}

#[derive(Clone, Debug, Args)]
pub struct EntityArgs {
    /// Entity type name as configured.
    pub entity_type: String,

    /// Identifier; composite keys are comma-separated (`3,en`).
    pub id: String,
}

#[derive(Clone, Debug, Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub entity: EntityArgs,

    /// Revision to read the entity at.
    pub rev: i64,
}

#[derive(Clone, Debug, Args)]
pub struct DiffArgs {
    #[command(flatten)]
    pub entity: EntityArgs,

    /// Older revision.
    pub old: i64,

    /// Newer revision.
    pub new: i64,
}
