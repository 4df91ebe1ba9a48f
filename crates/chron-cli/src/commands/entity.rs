use chron_core::revision::{Revision, RevisionType};
use chron_core::value::FieldValue;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::{EntityArgs, ShowArgs};
use crate::commands::shared::parse_key;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entity_type: String,
    pub id: String,
    pub revisions: Vec<Revision>,
}

#[derive(Debug, Serialize)]
pub struct FieldEntry {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Serialize)]
pub struct ShowResponse {
    pub entity_type: String,
    pub id: String,
    pub revision: i64,
    /// Revision of the audit row the values come from.
    pub recorded_at: i64,
    pub revision_type: RevisionType,
    pub fields: Vec<FieldEntry>,
}

/// Handle `chron history`.
pub async fn handle_history(
    args: &EntityArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let response = fetch_history(args, ctx).await?;
    output(&response, flags.format)
}

/// Handle `chron show`.
pub async fn handle_show(args: &ShowArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let response = fetch_show(args, ctx).await?;
    output(&response, flags.format)
}

pub async fn fetch_history(args: &EntityArgs, ctx: &AppContext) -> anyhow::Result<HistoryResponse> {
    let key = parse_key(ctx, &args.entity_type, &args.id)?;
    let revisions = ctx
        .service
        .reader()
        .find_revisions(&args.entity_type, &key)
        .await?;
    Ok(HistoryResponse {
        entity_type: args.entity_type.clone(),
        id: args.id.clone(),
        revisions,
    })
}

/// Fields are listed in reverse name order.
pub async fn fetch_show(args: &ShowArgs, ctx: &AppContext) -> anyhow::Result<ShowResponse> {
    let entity = &args.entity;
    let key = parse_key(ctx, &entity.entity_type, &entity.id)?;
    let reader = ctx.service.reader();
    let snapshot = reader.find(&entity.entity_type, &key, args.rev).await?;

    let mut fields: Vec<FieldEntry> = reader
        .entity_values(&entity.entity_type, &snapshot)?
        .into_iter()
        .map(|(field, value)| FieldEntry { field, value })
        .collect();
    fields.sort_by(|a, b| b.field.cmp(&a.field));

    Ok(ShowResponse {
        entity_type: entity.entity_type.clone(),
        id: entity.id.clone(),
        revision: args.rev,
        recorded_at: snapshot.revision,
        revision_type: snapshot.revision_type,
        fields,
    })
}
