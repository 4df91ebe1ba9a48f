use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;
use crate::context::AppContext;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(command: Commands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Commands::Schema { action } => commands::schema::handle(&action, ctx, flags).await,
        Commands::Revisions(args) => commands::revisions::handle_index(&args, ctx, flags).await,
        Commands::Revision(args) => commands::revisions::handle_revision(&args, ctx, flags).await,
        Commands::History(args) => commands::entity::handle_history(&args, ctx, flags).await,
        Commands::Show(args) => commands::entity::handle_show(&args, ctx, flags).await,
        Commands::Diff(args) => commands::diff::handle(&args, ctx, flags).await,
    }
}
