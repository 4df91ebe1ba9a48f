use std::collections::BTreeMap;

use chron_core::snapshot::FieldDiff;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::DiffArgs;
use crate::commands::shared::parse_key;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
pub struct DiffResponse {
    pub entity_type: String,
    pub id: String,
    pub old: i64,
    pub new: i64,
    pub changes: BTreeMap<String, FieldDiff>,
}

/// Handle `chron diff`.
pub async fn handle(args: &DiffArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let response = fetch(args, ctx).await?;
    output(&response, flags.format)
}

pub async fn fetch(args: &DiffArgs, ctx: &AppContext) -> anyhow::Result<DiffResponse> {
    let entity = &args.entity;
    let key = parse_key(ctx, &entity.entity_type, &entity.id)?;
    let changes = ctx
        .service
        .reader()
        .diff(&entity.entity_type, &key, args.old, args.new)
        .await?;
    Ok(DiffResponse {
        entity_type: entity.entity_type.clone(),
        id: entity.id.clone(),
        old: args.old,
        new: args.new,
        changes,
    })
}

#[cfg(test)]
mod tests {
    use chron_core::value::FieldValue;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cli::root_commands::EntityArgs;
    use crate::commands::test_support::{record_tag, test_context};

    fn args(old: i64, new: i64) -> DiffArgs {
        DiffArgs {
            entity: EntityArgs {
                entity_type: "Tag".into(),
                id: "rust,en".into(),
            },
            old,
            new,
        }
    }

    #[tokio::test]
    async fn reports_changed_label() {
        let ctx = test_context().await;
        let r1 = record_tag(&ctx, "rust", "Rust").await;
        let r2 = record_tag(&ctx, "rust", "Rust lang").await;

        let response = fetch(&args(r1, r2), &ctx).await.unwrap();
        assert_eq!(response.changes.len(), 1);
        assert_eq!(
            response.changes["label"].new,
            Some(FieldValue::Text("Rust lang".into()))
        );
    }

    #[tokio::test]
    async fn missing_boundary_is_an_error() {
        let ctx = test_context().await;
        let r1 = record_tag(&ctx, "rust", "Rust").await;
        let err = fetch(&args(r1 - 1, r1), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("No revision of Tag"));
    }
}
