use chron_core::revision::{Page, Revision, RevisionType};
use chron_core::value::format_key;
use chron_db::reader::RevisionEntry;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::{RevisionArgs, RevisionsArgs};
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
pub struct RevisionIndexResponse {
    pub page: u32,
    pub page_size: u32,
    pub revisions: Vec<RevisionEntry>,
}

#[derive(Debug, Serialize)]
pub struct ChangeSummary {
    pub entity_type: String,
    pub id: String,
    pub revision_type: RevisionType,
}

#[derive(Debug, Serialize)]
pub struct RevisionResponse {
    pub revision: Revision,
    pub changes: Vec<ChangeSummary>,
}

/// Handle `chron revisions`.
pub async fn handle_index(
    args: &RevisionsArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let response = fetch_index(args, ctx).await?;
    output(&response, flags.format)
}

/// Handle `chron revision`.
pub async fn handle_revision(
    args: &RevisionArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let response = fetch_revision(args, ctx).await?;
    output(&response, flags.format)
}

pub async fn fetch_index(
    args: &RevisionsArgs,
    ctx: &AppContext,
) -> anyhow::Result<RevisionIndexResponse> {
    let page = Page::new(args.page, ctx.page_size());
    let revisions = ctx.service.reader().revision_index(page).await?;
    Ok(RevisionIndexResponse {
        page: page.number,
        page_size: page.size,
        revisions,
    })
}

pub async fn fetch_revision(
    args: &RevisionArgs,
    ctx: &AppContext,
) -> anyhow::Result<RevisionResponse> {
    let reader = ctx.service.reader();
    let revision = reader.find_revision(args.rev).await?;
    let changes = reader
        .find_entities_changed_at_revision(revision.id)
        .await?
        .into_iter()
        .map(|changed| ChangeSummary {
            id: format_key(&changed.key),
            entity_type: changed.type_name,
            revision_type: changed.revision_type,
        })
        .collect();
    Ok(RevisionResponse { revision, changes })
}
