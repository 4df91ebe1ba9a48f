use chron_db::schema::{SchemaChangeSet, entity_table_def};
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::SchemaCommands;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
pub struct SchemaSyncResponse {
    pub applied: bool,
    pub changes: Vec<String>,
    pub statements: Vec<String>,
}

/// Handle `chron schema`.
pub async fn handle(
    action: &SchemaCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        SchemaCommands::Sync { dry_run, entities } => {
            let response = sync(ctx, *dry_run, *entities).await?;
            if flags.quiet && response.changes.is_empty() {
                return Ok(());
            }
            output(&response, flags.format)
        }
    }
}

pub async fn sync(
    ctx: &AppContext,
    dry_run: bool,
    entities: bool,
) -> anyhow::Result<SchemaSyncResponse> {
    let service = &ctx.service;
    let mut sets: Vec<SchemaChangeSet> = Vec::new();

    if dry_run {
        if entities {
            let defs: Vec<_> = service
                .config()
                .mappings()
                .iter()
                .map(entity_table_def)
                .collect();
            sets.push(service.db().plan_tables(&defs).await?);
        }
        sets.push(service.plan_schema().await?);
    } else {
        if entities {
            sets.push(service.ensure_entity_tables().await?);
        }
        sets.push(service.synchronize_schema().await?);
    }

    let changes = sets
        .iter()
        .flat_map(|set| set.changes.iter().map(ToString::to_string))
        .collect();
    let statements = sets.iter().flat_map(SchemaChangeSet::statements).collect();
    Ok(SchemaSyncResponse {
        applied: !dry_run,
        changes,
        statements,
    })
}
